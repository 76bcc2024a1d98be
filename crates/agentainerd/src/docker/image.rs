//! Image domain — existence checks for deploy validation.

use super::client::{DockerClient, DockerError};

impl DockerClient {
    /// Whether the image reference resolves on the engine.
    ///
    /// Deploy validates images up front so an agent record is never created
    /// for an image that cannot run.
    pub async fn image_exists(&self, reference: &str) -> Result<bool, DockerError> {
        match self.client.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(DockerError::from(e)),
        }
    }
}
