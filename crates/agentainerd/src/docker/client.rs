//! Docker client — core struct, constructor, error types.
//!
//! Domain methods live in sibling modules (`container`, `image`, `network`,
//! `event`) which add `impl DockerClient` blocks.

use bollard::Docker;
use thiserror::Error;

/// Label carrying the agent ID on every managed container.
pub const LABEL_AGENT_ID: &str = "agentainer.id";
/// Label carrying the human-readable agent name.
pub const LABEL_AGENT_NAME: &str = "agentainer.name";
/// Label marking resources owned by this control plane.
pub const LABEL_MANAGED_BY: &str = "managed-by";
/// Value for [`LABEL_MANAGED_BY`].
pub const MANAGED_BY: &str = "agentainer";

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Container not found: {0}")]
    ContainerNotFound(String),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Network not found: {0}")]
    NetworkNotFound(String),
    #[error("Bollard error: {0}")]
    BollardError(#[from] bollard::errors::Error),
}

#[derive(Debug, Clone)]
pub struct DockerClient {
    /// The bollard Docker client.  `pub(super)` so that domain modules
    /// in sibling files can call bollard APIs directly.
    pub(super) client: Docker,
}

impl DockerClient {
    pub fn new(engine_host: &str) -> Result<Self, DockerError> {
        let connection = if engine_host.is_empty() {
            Docker::connect_with_defaults()
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        } else {
            let clean_path = engine_host.trim_start_matches("unix://");
            Docker::connect_with_socket(clean_path, 120, &bollard::API_DEFAULT_VERSION)
                .map_err(|e| DockerError::ConnectionFailed(e.to_string()))?
        };

        Ok(DockerClient { client: connection })
    }

    /// Ping the Docker daemon. Used by the health endpoint and boot checks.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.client.ping().await.map_err(DockerError::from)?;
        Ok(())
    }
}

/// Maps a bollard 404 into the given not-found constructor, everything else
/// into [`DockerError::BollardError`].
pub(super) fn map_not_found(
    err: bollard::errors::Error,
    not_found: impl FnOnce() -> DockerError,
) -> DockerError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => not_found(),
        other => DockerError::BollardError(other),
    }
}
