//! Model — agent records, deploy specs, and status-change notifications.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::docker::ContainerSpec;

/// API-boundary size limits.
pub const MAX_NAME_BYTES: usize = 64;
pub const MAX_IMAGE_BYTES: usize = 256;
pub const MAX_ENV_ENTRIES: usize = 50;
pub const MAX_ID_BYTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Created,
    Running,
    Stopped,
    Paused,
    Failed,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Created => "created",
            AgentStatus::Running => "running",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Paused => "paused",
            AgentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A host-path to container-path bind mount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
}

/// The authoritative agent record, persisted under `agent:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    /// CPU limit in cores.
    pub cpu_limit: Option<f64>,
    /// Memory limit in bytes.
    pub memory_limit: Option<i64>,
    #[serde(default)]
    pub auto_restart: bool,
    pub health_check: Option<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Engine handle; empty until the first start.
    #[serde(default)]
    pub container_id: String,
    pub token: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Build the record for a freshly deployed agent.
    pub fn new(spec: DeploySpec) -> Self {
        let now = Utc::now();
        let token = spec
            .token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            // The ID doubles as the container hostname on the internal
            // network, so it must stay hostname-safe.
            id: format!("agent-{}", Uuid::new_v4()),
            name: spec.name,
            image: spec.image,
            env_vars: spec.env_vars,
            cpu_limit: spec.cpu_limit,
            memory_limit: spec.memory_limit,
            auto_restart: spec.auto_restart,
            health_check: spec.health_check,
            volumes: spec.volumes,
            container_id: String::new(),
            token,
            status: AgentStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// The container the driver should realize for this agent.
    pub fn container_spec(&self, network: &str) -> ContainerSpec {
        ContainerSpec {
            agent_id: self.id.clone(),
            agent_name: self.name.clone(),
            image: self.image.clone(),
            env: self.env_vars.clone(),
            memory_limit: self.memory_limit,
            cpu_limit: self.cpu_limit,
            auto_restart: self.auto_restart,
            health_check: self.health_check.clone(),
            volumes: self
                .volumes
                .iter()
                .map(|v| (v.source.clone(), v.target.clone()))
                .collect(),
            network: network.to_string(),
        }
    }
}

/// Deploy request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
    pub cpu_limit: Option<f64>,
    pub memory_limit: Option<i64>,
    #[serde(default)]
    pub auto_restart: bool,
    pub health_check: Option<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
    /// Classification token; generated when omitted.
    pub token: Option<String>,
}

impl DeploySpec {
    /// Validate API-boundary size limits before any state is created.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("agent name must not be empty".to_string());
        }
        if self.name.len() > MAX_NAME_BYTES {
            return Err(format!("agent name exceeds {} bytes", MAX_NAME_BYTES));
        }
        if self.image.is_empty() {
            return Err("image reference must not be empty".to_string());
        }
        if self.image.len() > MAX_IMAGE_BYTES {
            return Err(format!("image reference exceeds {} bytes", MAX_IMAGE_BYTES));
        }
        if self.env_vars.len() > MAX_ENV_ENTRIES {
            return Err(format!("env map exceeds {} entries", MAX_ENV_ENTRIES));
        }
        Ok(())
    }
}

/// Payload published on `agent:status:<id>` when the observed status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub agent_id: String,
    pub old_status: AgentStatus,
    pub new_status: AgentStatus,
    #[serde(default)]
    pub container_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DeploySpec {
        DeploySpec {
            name: "ping".to_string(),
            image: "nginx:alpine".to_string(),
            env_vars: HashMap::new(),
            cpu_limit: None,
            memory_limit: None,
            auto_restart: false,
            health_check: None,
            volumes: vec![],
            token: None,
        }
    }

    #[test]
    fn new_agent_starts_created_with_generated_identity() {
        let agent = Agent::new(spec());
        assert!(agent.id.starts_with("agent-"));
        assert!(agent.id.len() <= MAX_ID_BYTES);
        assert!(!agent.token.is_empty());
        assert_eq!(agent.status, AgentStatus::Created);
        assert!(agent.container_id.is_empty());
    }

    #[test]
    fn explicit_token_is_kept() {
        let mut s = spec();
        s.token = Some("tok-123".to_string());
        assert_eq!(Agent::new(s).token, "tok-123");
    }

    #[test]
    fn empty_token_is_replaced() {
        let mut s = spec();
        s.token = Some(String::new());
        assert!(!Agent::new(s).token.is_empty());
    }

    #[test]
    fn validate_rejects_oversized_name() {
        let mut s = spec();
        s.name = "n".repeat(MAX_NAME_BYTES + 1);
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_image() {
        let mut s = spec();
        s.image = "i".repeat(MAX_IMAGE_BYTES + 1);
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_rejects_too_many_env_entries() {
        let mut s = spec();
        for i in 0..=MAX_ENV_ENTRIES {
            s.env_vars.insert(format!("K{}", i), "v".to_string());
        }
        assert!(s.validate().is_err());
    }

    #[test]
    fn validate_accepts_boundary_sizes() {
        let mut s = spec();
        s.name = "n".repeat(MAX_NAME_BYTES);
        s.image = "i".repeat(MAX_IMAGE_BYTES);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AgentStatus::Running).unwrap(),
            "\"running\""
        );
        assert_eq!(AgentStatus::Paused.to_string(), "paused");
    }

    #[test]
    fn container_spec_mirrors_the_record() {
        let mut agent = Agent::new(spec());
        agent.volumes.push(VolumeMount {
            source: "/data".to_string(),
            target: "/var/data".to_string(),
        });
        let cs = agent.container_spec("agentainer-network");
        assert_eq!(cs.agent_id, agent.id);
        assert_eq!(cs.network, "agentainer-network");
        assert_eq!(cs.volumes, vec![("/data".to_string(), "/var/data".to_string())]);
    }
}
