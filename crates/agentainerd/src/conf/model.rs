//! Model — typed configuration tree.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub security: SecurityConfig,
    pub features: FeatureFlags,
    pub reconcile: ReconcileConfig,
    pub replay: ReplayConfig,
    pub requests: RequestConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl StoreConfig {
    /// Connection URL in the form `redis://[:password@]host:port/db`.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db)
            }
            _ => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Docker endpoint. Empty string means the default local socket.
    pub host: String,
    /// Name of the internal bridge network all agents attach to.
    pub network: String,
    /// Host interface name for the bridge.
    pub bridge_iface: String,
    /// Seconds Docker is given to stop a container before it is killed.
    pub stop_timeout_secs: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// The single shared bearer token for the authenticated API subtree.
    pub default_token: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Master switch for request persistence and replay.
    pub request_persistence: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestConfig {
    /// TTL for stored request records, in seconds.
    pub ttl_secs: u64,
    /// Replay attempts before a request is moved to the failed queue.
    pub max_retries: u32,
    /// Per-request deadline for forwards to agents, in seconds.
    pub forward_timeout_secs: u64,
    /// Port agent workloads listen on inside their container.
    pub agent_port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            security: SecurityConfig::default(),
            features: FeatureFlags::default(),
            reconcile: ReconcileConfig::default(),
            replay: ReplayConfig::default(),
            requests: RequestConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8081,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            network: "agentainer-network".to_string(),
            bridge_iface: "agentainer0".to_string(),
            stop_timeout_secs: 10,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            default_token: "agentainer-default-token".to_string(),
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            request_persistence: true,
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { interval_secs: 10 }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self { interval_secs: 5 }
    }
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            max_retries: 3,
            forward_timeout_secs: 30,
            agent_port: 8000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "agentainerd=info,tower_http=warn".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.engine.network, "agentainer-network");
        assert_eq!(config.engine.stop_timeout_secs, 10);
        assert_eq!(config.reconcile.interval_secs, 10);
        assert_eq!(config.replay.interval_secs, 5);
        assert_eq!(config.requests.ttl_secs, 86_400);
        assert_eq!(config.requests.max_retries, 3);
        assert_eq!(config.requests.forward_timeout_secs, 30);
        assert_eq!(config.requests.agent_port, 8000);
        assert!(config.features.request_persistence);
    }

    #[test]
    fn store_url_without_password() {
        let store = StoreConfig::default();
        assert_eq!(store.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn store_url_with_password() {
        let store = StoreConfig {
            password: Some("hunter2".to_string()),
            db: 3,
            ..StoreConfig::default()
        };
        assert_eq!(store.url(), "redis://:hunter2@localhost:6379/3");
    }

    #[test]
    fn empty_password_is_ignored() {
        let store = StoreConfig {
            password: Some(String::new()),
            ..StoreConfig::default()
        };
        assert_eq!(store.url(), "redis://localhost:6379/0");
    }

    #[test]
    fn bind_address_joins_host_and_port() {
        let server = ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 9000,
        };
        assert_eq!(server.bind_address(), "0.0.0.0:9000");
    }
}
