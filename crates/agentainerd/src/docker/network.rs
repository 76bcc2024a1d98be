//! Network domain — idempotent creation of the internal agent bridge.

use std::collections::HashMap;

use bollard::models::NetworkCreateRequest;

use super::client::{DockerClient, DockerError, LABEL_MANAGED_BY, MANAGED_BY};

impl DockerClient {
    /// Ensure the internal bridge network exists. Safe to call on every boot.
    ///
    /// Agents resolve each other (and the proxy resolves agents) by container
    /// hostname on this network; no host ports are ever published.
    pub async fn ensure_network(
        &self,
        name: &str,
        bridge_iface: &str,
    ) -> Result<(), DockerError> {
        match self
            .client
            .inspect_network(
                name,
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
        {
            Ok(_) => return Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(DockerError::from(e)),
        }

        let config = NetworkCreateRequest {
            name: name.to_string(),
            driver: Some("bridge".to_string()),
            options: Some(HashMap::from([(
                "com.docker.network.bridge.name".to_string(),
                bridge_iface.to_string(),
            )])),
            labels: Some(HashMap::from([(
                LABEL_MANAGED_BY.to_string(),
                MANAGED_BY.to_string(),
            )])),
            ..Default::default()
        };

        self.client
            .create_network(config)
            .await
            .map_err(DockerError::from)?;

        tracing::info!(network = %name, iface = %bridge_iface, "Created internal agent network");
        Ok(())
    }
}
