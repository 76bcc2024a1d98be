//! Info — the slice of container state the control plane cares about.

use std::collections::HashMap;

use bollard::models::{ContainerInspectResponse, ContainerSummary};

use super::client::LABEL_AGENT_ID;

/// Container facts derived from Docker's list and inspect APIs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContainerInfo {
    /// Full 64-char container ID.
    pub id: String,
    /// Engine state: "running", "paused", "exited", ...
    pub state: String,
    pub labels: HashMap<String, String>,
    /// Names of the networks the container is attached to.
    pub networks: Vec<String>,
}

impl ContainerInfo {
    /// The agent this container belongs to, per its `agentainer.id` label.
    pub fn agent_id(&self) -> Option<&str> {
        self.labels.get(LABEL_AGENT_ID).map(String::as_str)
    }
}

impl From<ContainerSummary> for ContainerInfo {
    fn from(s: ContainerSummary) -> Self {
        let networks = s
            .network_settings
            .and_then(|ns| ns.networks)
            .map(|nets| nets.into_keys().collect())
            .unwrap_or_default();

        Self {
            id: s.id.unwrap_or_default(),
            state: s
                .state
                .map(|st| st.to_string())
                .unwrap_or_else(|| "unknown".into()),
            labels: s.labels.unwrap_or_default(),
            networks,
        }
    }
}

impl From<ContainerInspectResponse> for ContainerInfo {
    fn from(details: ContainerInspectResponse) -> Self {
        let networks = details
            .network_settings
            .and_then(|ns| ns.networks)
            .map(|nets| nets.into_keys().collect())
            .unwrap_or_default();

        Self {
            id: details.id.unwrap_or_default(),
            state: details
                .state
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "unknown".into()),
            labels: details
                .config
                .and_then(|c| c.labels)
                .unwrap_or_default(),
            networks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_reads_the_label() {
        let mut labels = HashMap::new();
        labels.insert(LABEL_AGENT_ID.to_string(), "agent-abc".to_string());
        let info = ContainerInfo {
            id: "deadbeef".to_string(),
            state: "running".to_string(),
            labels,
            networks: vec!["agentainer-network".to_string()],
        };
        assert_eq!(info.agent_id(), Some("agent-abc"));
    }

    #[test]
    fn agent_id_absent_without_label() {
        let info = ContainerInfo {
            id: "deadbeef".to_string(),
            state: "exited".to_string(),
            labels: HashMap::new(),
            networks: vec![],
        };
        assert_eq!(info.agent_id(), None);
    }
}
