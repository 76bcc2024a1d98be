//! Container domain — create, lifecycle, inspect, label-scoped list, logs.

use std::collections::HashMap;
use std::pin::Pin;

use bollard::models::{
    ContainerCreateBody, HealthConfig, HostConfig, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StopContainerOptions,
};
use bytes::Bytes;
use futures_util::stream::StreamExt;
use futures_util::Stream;

use super::client::{map_not_found, DockerClient, DockerError, LABEL_AGENT_ID, LABEL_AGENT_NAME};
use super::info::ContainerInfo;

/// Everything the driver needs to realize one agent container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub agent_id: String,
    pub agent_name: String,
    pub image: String,
    pub env: HashMap<String, String>,
    /// Memory limit in bytes.
    pub memory_limit: Option<i64>,
    /// CPU limit in cores.
    pub cpu_limit: Option<f64>,
    pub auto_restart: bool,
    pub health_check: Option<String>,
    /// Host-path to container-path bind mounts.
    pub volumes: Vec<(String, String)>,
    /// Internal bridge network the container joins.
    pub network: String,
}

impl ContainerSpec {
    fn labels(&self) -> HashMap<String, String> {
        HashMap::from([
            (LABEL_AGENT_ID.to_string(), self.agent_id.clone()),
            (LABEL_AGENT_NAME.to_string(), self.agent_name.clone()),
        ])
    }

    fn env_list(&self) -> Vec<String> {
        self.env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }

    fn binds(&self) -> Option<Vec<String>> {
        if self.volumes.is_empty() {
            return None;
        }
        Some(
            self.volumes
                .iter()
                .map(|(source, target)| format!("{}:{}", source, target))
                .collect(),
        )
    }

    fn restart_policy(&self) -> RestartPolicy {
        let name = if self.auto_restart {
            RestartPolicyNameEnum::ALWAYS
        } else {
            RestartPolicyNameEnum::NO
        };
        RestartPolicy {
            name: Some(name),
            maximum_retry_count: None,
        }
    }

    fn create_body(&self) -> ContainerCreateBody {
        let health = self.health_check.as_ref().map(|cmd| HealthConfig {
            test: Some(vec!["CMD-SHELL".to_string(), cmd.clone()]),
            ..Default::default()
        });

        ContainerCreateBody {
            image: Some(self.image.clone()),
            env: Some(self.env_list()),
            labels: Some(self.labels()),
            // The agent ID doubles as the hostname on the internal network,
            // so agents are reachable at http://<id>:<port>.
            hostname: Some(self.agent_id.clone()),
            healthcheck: health,
            host_config: Some(HostConfig {
                network_mode: Some(self.network.clone()),
                memory: self.memory_limit,
                nano_cpus: self.cpu_limit.map(|cores| (cores * 1e9) as i64),
                binds: self.binds(),
                restart_policy: Some(self.restart_policy()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

impl DockerClient {
    /// Create a container from the spec and start it. Returns the container ID.
    pub async fn create_and_start(&self, spec: &ContainerSpec) -> Result<String, DockerError> {
        let options = Some(CreateContainerOptions {
            name: Some(spec.agent_id.clone()),
            ..Default::default()
        });

        let created = self
            .client
            .create_container(options, spec.create_body())
            .await
            .map_err(|e| {
                map_not_found(e, || DockerError::ImageNotFound(spec.image.clone()))
            })?;

        self.start_container(&created.id).await?;
        Ok(created.id)
    }

    /// Start a stopped container. A 304 (already started) counts as success.
    pub async fn start_container(&self, container_id: &str) -> Result<(), DockerError> {
        match self.client.start_container(container_id, None).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_not_found(e, || {
                DockerError::ContainerNotFound(container_id.to_string())
            })),
        }
    }

    /// Stop a running container, giving Docker `timeout_secs` before it kills.
    pub async fn stop_container(
        &self,
        container_id: &str,
        timeout_secs: Option<u32>,
    ) -> Result<(), DockerError> {
        let options = timeout_secs.map(|t| StopContainerOptions {
            t: Some(t as i32),
            ..Default::default()
        });

        match self.client.stop_container(container_id, options).await {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_not_found(e, || {
                DockerError::ContainerNotFound(container_id.to_string())
            })),
        }
    }

    /// Pause a running container (freezes all processes).
    pub async fn pause_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.client
            .pause_container(container_id)
            .await
            .map_err(|e| {
                map_not_found(e, || DockerError::ContainerNotFound(container_id.to_string()))
            })
    }

    /// Unpause a paused container.
    pub async fn unpause_container(&self, container_id: &str) -> Result<(), DockerError> {
        self.client
            .unpause_container(container_id)
            .await
            .map_err(|e| {
                map_not_found(e, || DockerError::ContainerNotFound(container_id.to_string()))
            })
    }

    /// Remove a container. If `force` is true, the container is killed first.
    pub async fn remove_container(
        &self,
        container_id: &str,
        force: bool,
    ) -> Result<(), DockerError> {
        let options = Some(RemoveContainerOptions {
            force,
            ..Default::default()
        });

        self.client
            .remove_container(container_id, options)
            .await
            .map_err(|e| {
                map_not_found(e, || DockerError::ContainerNotFound(container_id.to_string()))
            })
    }

    pub async fn inspect_container(&self, id: &str) -> Result<ContainerInfo, DockerError> {
        let details = self
            .client
            .inspect_container(id, None)
            .await
            .map_err(|e| map_not_found(e, || DockerError::ContainerNotFound(id.to_string())))?;
        Ok(ContainerInfo::from(details))
    }

    /// List all containers (running or not) carrying the given label key.
    ///
    /// Discovery is always label-based; container names are not stable
    /// identifiers.
    pub async fn list_by_label(&self, label: &str) -> Result<Vec<ContainerInfo>, DockerError> {
        let filters = HashMap::from([("label".to_string(), vec![label.to_string()])]);
        let options = Some(ListContainersOptions {
            all: true,
            filters: Some(filters),
            ..Default::default()
        });
        let containers = self.client.list_containers(options).await?;
        Ok(containers.into_iter().map(ContainerInfo::from).collect())
    }

    /// All managed agent containers.
    pub async fn list_agent_containers(&self) -> Result<Vec<ContainerInfo>, DockerError> {
        self.list_by_label(LABEL_AGENT_ID).await
    }

    /// Raw log byte stream for a container.
    pub fn container_logs(
        &self,
        container_id: &str,
        follow: bool,
        tail: Option<u64>,
    ) -> Pin<Box<dyn Stream<Item = Result<Bytes, DockerError>> + Send>> {
        let options = LogsOptions {
            follow,
            stdout: true,
            stderr: true,
            since: 0,
            until: 0,
            timestamps: false,
            tail: tail.map(|n| n.to_string()).unwrap_or_else(|| "all".to_string()),
        };

        let stream = self
            .client
            .logs(container_id, Some(options))
            .map(|result| match result {
                Ok(output) => Ok(output.into_bytes()),
                Err(e) => Err(DockerError::from(e)),
            });

        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            agent_id: "agent-1234".to_string(),
            agent_name: "ping-service".to_string(),
            image: "nginx:alpine".to_string(),
            env: HashMap::from([("PORT".to_string(), "8000".to_string())]),
            memory_limit: Some(512 * 1024 * 1024),
            cpu_limit: Some(0.5),
            auto_restart: true,
            health_check: None,
            volumes: vec![("/data/a".to_string(), "/var/lib/a".to_string())],
            network: "agentainer-network".to_string(),
        }
    }

    #[test]
    fn create_body_carries_identity_labels_and_hostname() {
        let body = spec().create_body();
        let labels = body.labels.unwrap();
        assert_eq!(labels.get(LABEL_AGENT_ID).unwrap(), "agent-1234");
        assert_eq!(labels.get(LABEL_AGENT_NAME).unwrap(), "ping-service");
        assert_eq!(body.hostname.as_deref(), Some("agent-1234"));
        assert_eq!(body.image.as_deref(), Some("nginx:alpine"));
    }

    #[test]
    fn create_body_applies_limits_and_network() {
        let body = spec().create_body();
        let host = body.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("agentainer-network"));
        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert_eq!(
            host.binds.unwrap(),
            vec!["/data/a:/var/lib/a".to_string()]
        );
    }

    #[test]
    fn restart_policy_follows_auto_restart() {
        let mut s = spec();
        assert_eq!(
            s.restart_policy().name,
            Some(RestartPolicyNameEnum::ALWAYS)
        );
        s.auto_restart = false;
        assert_eq!(s.restart_policy().name, Some(RestartPolicyNameEnum::NO));
    }

    #[test]
    fn env_list_joins_pairs() {
        let s = spec();
        assert_eq!(s.env_list(), vec!["PORT=8000".to_string()]);
    }

    #[test]
    fn health_check_becomes_cmd_shell() {
        let mut s = spec();
        s.health_check = Some("curl -f http://localhost:8000/health".to_string());
        let body = s.create_body();
        let test = body.healthcheck.unwrap().test.unwrap();
        assert_eq!(test[0], "CMD-SHELL");
        assert_eq!(test[1], "curl -f http://localhost:8000/health");
    }

    #[test]
    fn no_binds_when_no_volumes() {
        let mut s = spec();
        s.volumes.clear();
        assert!(s.binds().is_none());
    }
}
