//! Shared application state, cloned into every handler and background loop.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::LifecycleManager;
use crate::conf::Config;
use crate::docker::DockerClient;
use crate::request::RequestStore;
use crate::store::RedisStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub docker: Arc<DockerClient>,
    pub store: Arc<RedisStore>,
    pub lifecycle: Arc<LifecycleManager>,
    pub requests: Arc<RequestStore>,
    /// Outbound client for proxy forwards and replay; carries the per-request
    /// forward deadline.
    pub http: reqwest::Client,
    /// Watch channel for shutdown signaling.
    /// Unlike broadcast, watch never loses messages — receivers always
    /// see the latest value, even if they subscribe after the send.
    pub shutdown_tx: tokio::sync::watch::Sender<bool>,
}

impl AppState {
    pub fn new(
        config: Config,
        docker: DockerClient,
        store: RedisStore,
    ) -> Result<Self, reqwest::Error> {
        let config = Arc::new(config);
        let docker = Arc::new(docker);
        let store = Arc::new(store);

        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::clone(&docker),
            Arc::clone(&store),
            Arc::clone(&config),
        ));

        let requests = Arc::new(RequestStore::new(
            Arc::clone(&store),
            Duration::from_secs(config.requests.ttl_secs),
            config.requests.max_retries,
        ));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.requests.forward_timeout_secs))
            .build()?;

        let (shutdown_tx, _) = tokio::sync::watch::channel(false);

        Ok(Self {
            config,
            docker,
            store,
            lifecycle,
            requests,
            http,
            shutdown_tx,
        })
    }

    /// Whether request persistence (and with it the replay worker) is on.
    pub fn persistence_enabled(&self) -> bool {
        self.config.features.request_persistence
    }

    /// Base URL of this process's own proxy listener; replay goes through it.
    pub fn local_proxy_base(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.server.host, self.config.server.port
        )
    }

    /// Signal shutdown to all background loops.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
