//! Lifecycle — authoritative CRUD over agent records, realized via the driver.
//!
//! Every mutating operation holds a per-agent lock for its whole
//! read-modify-write, so no two transitions run concurrently on one ID.
//! After each transition a targeted reconcile is scheduled to close the
//! intent/observation gap quickly.

use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use futures_util::Stream;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::conf::Config;
use crate::docker::{DockerClient, DockerError};
use crate::store::{keys, RedisStore, StoreError};

use super::model::{Agent, AgentStatus, DeploySpec};

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Agent not found: {0}")]
    NotFound(String),
    #[error("Agent {0} is already running")]
    AlreadyRunning(String),
    #[error("Agent {0} is already stopped")]
    AlreadyStopped(String),
    #[error("Agent {0} is not running")]
    NotRunning(String),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Invalid deploy spec: {0}")]
    Validation(String),
    #[error(transparent)]
    Docker(#[from] DockerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct LifecycleManager {
    docker: Arc<DockerClient>,
    store: Arc<RedisStore>,
    config: Arc<Config>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LifecycleManager {
    pub fn new(docker: Arc<DockerClient>, store: Arc<RedisStore>, config: Arc<Config>) -> Self {
        Self {
            docker,
            store,
            config,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, id: &str) -> Result<Agent, LifecycleError> {
        self.store
            .get_json::<Agent>(&keys::agent(id))
            .await?
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))
    }

    async fn save(&self, agent: &mut Agent) -> Result<(), LifecycleError> {
        agent.touch();
        self.store.set_json(&keys::agent(&agent.id), agent).await?;
        Ok(())
    }

    /// Fire-and-forget targeted reconcile after a state transition.
    fn schedule_sync(&self, id: &str) {
        let docker = Arc::clone(&self.docker);
        let store = Arc::clone(&self.store);
        let id = id.to_string();
        tokio::spawn(async move {
            if let Err(e) = crate::reconcile::sync_one(&docker, &store, &id).await {
                warn!(agent_id = %id, error = %e, "Post-transition sync failed");
            }
        });
    }

    // ── Operations ────────────────────────────────────────────────

    pub async fn deploy(&self, spec: DeploySpec) -> Result<Agent, LifecycleError> {
        spec.validate().map_err(LifecycleError::Validation)?;

        if !self.docker.image_exists(&spec.image).await? {
            return Err(LifecycleError::ImageNotFound(spec.image));
        }

        let agent = Agent::new(spec);
        self.store.set_json(&keys::agent(&agent.id), &agent).await?;
        self.store.sadd(keys::AGENTS_SET, &agent.id).await?;

        info!(agent_id = %agent.id, image = %agent.image, "Deployed agent");
        self.schedule_sync(&agent.id);
        Ok(agent)
    }

    pub async fn start(&self, id: &str) -> Result<Agent, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut agent = self.load(id).await?;
        self.start_locked(&mut agent).await?;
        self.schedule_sync(id);
        Ok(agent)
    }

    pub async fn stop(&self, id: &str) -> Result<Agent, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut agent = self.load(id).await?;
        if agent.status == AgentStatus::Stopped {
            return Err(LifecycleError::AlreadyStopped(id.to_string()));
        }
        self.stop_locked(&mut agent).await?;
        self.schedule_sync(id);
        Ok(agent)
    }

    pub async fn pause(&self, id: &str) -> Result<Agent, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut agent = self.load(id).await?;
        if agent.status != AgentStatus::Running {
            return Err(LifecycleError::NotRunning(id.to_string()));
        }
        self.docker.pause_container(&agent.container_id).await?;
        agent.status = AgentStatus::Paused;
        self.save(&mut agent).await?;

        info!(agent_id = %id, "Paused agent");
        self.schedule_sync(id);
        Ok(agent)
    }

    pub async fn resume(&self, id: &str) -> Result<Agent, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut agent = self.load(id).await?;
        if agent.status == AgentStatus::Running {
            return Err(LifecycleError::AlreadyRunning(id.to_string()));
        }

        if agent.status == AgentStatus::Paused && !agent.container_id.is_empty() {
            self.docker.unpause_container(&agent.container_id).await?;
        } else if !agent.container_id.is_empty() {
            // The recorded container may be gone or unstartable; fall back to
            // a fresh container under the same identity.
            if let Err(e) = self.docker.start_container(&agent.container_id).await {
                warn!(agent_id = %id, error = %e, "Start failed, recreating container");
                let _ = self.docker.remove_container(&agent.container_id, true).await;
                let spec = agent.container_spec(&self.config.engine.network);
                agent.container_id = self.docker.create_and_start(&spec).await?;
            }
        } else {
            let spec = agent.container_spec(&self.config.engine.network);
            agent.container_id = self.docker.create_and_start(&spec).await?;
        }

        agent.status = AgentStatus::Running;
        self.save(&mut agent).await?;

        info!(agent_id = %id, "Resumed agent");
        self.schedule_sync(id);
        Ok(agent)
    }

    /// Unconditional stop-then-start; both halves tolerate a container that
    /// is already in the target state.
    pub async fn restart(&self, id: &str) -> Result<Agent, LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        let mut agent = self.load(id).await?;
        self.stop_locked(&mut agent).await?;
        self.start_locked(&mut agent).await?;
        self.schedule_sync(id);
        Ok(agent)
    }

    /// Best-effort teardown: engine cleanup may fail, record cleanup may not.
    pub async fn remove(&self, id: &str) -> Result<(), LifecycleError> {
        let lock = self.lock_for(id);
        let _guard = lock.lock().await;

        if let Ok(agent) = self.load(id).await {
            if !agent.container_id.is_empty() {
                let timeout = self.config.engine.stop_timeout_secs;
                let _ = self
                    .docker
                    .stop_container(&agent.container_id, Some(timeout))
                    .await;
                if let Err(e) = self.docker.remove_container(&agent.container_id, true).await {
                    if !matches!(e, DockerError::ContainerNotFound(_)) {
                        warn!(agent_id = %id, error = %e, "Container removal failed");
                    }
                }
            }
        }

        // Containers can exist under the label even when the record lost its
        // handle; discovery is label-based.
        if let Ok(containers) = self.docker.list_agent_containers().await {
            for container in containers {
                if container.agent_id() == Some(id) {
                    let _ = self.docker.remove_container(&container.id, true).await;
                }
            }
        }

        self.store.del(&keys::agent(id)).await?;
        self.store.srem(keys::AGENTS_SET, id).await?;
        for queue in [keys::Queue::Pending, keys::Queue::Completed, keys::Queue::Failed] {
            self.store.del(&keys::queue(id, queue)).await?;
        }
        for key in self.store.scan(&keys::agent_prefix_pattern(id)).await? {
            self.store.del(&key).await?;
        }

        drop(_guard);
        self.locks.remove(id);

        info!(agent_id = %id, "Removed agent");
        Ok(())
    }

    pub async fn get_agent(&self, id: &str) -> Result<Agent, LifecycleError> {
        self.load(id).await
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>, LifecycleError> {
        let ids = self.store.smembers(keys::AGENTS_SET).await?;
        let mut agents = Vec::with_capacity(ids.len());
        for id in ids {
            // Dangling index entries are swept by the reconciler; skip here.
            if let Some(agent) = self.store.get_json::<Agent>(&keys::agent(&id)).await? {
                agents.push(agent);
            }
        }
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(agents)
    }

    pub async fn logs(
        &self,
        id: &str,
        follow: bool,
        tail: Option<u64>,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<Bytes, DockerError>> + Send>>, LifecycleError>
    {
        let agent = self.load(id).await?;
        if agent.container_id.is_empty() {
            return Err(LifecycleError::NotFound(format!(
                "agent {} has no container",
                id
            )));
        }
        Ok(self.docker.container_logs(&agent.container_id, follow, tail))
    }

    // ── Internal transitions (caller holds the per-ID lock) ───────

    async fn start_locked(&self, agent: &mut Agent) -> Result<(), LifecycleError> {
        if agent.status == AgentStatus::Running {
            return Err(LifecycleError::AlreadyRunning(agent.id.clone()));
        }

        if agent.container_id.is_empty() {
            let spec = agent.container_spec(&self.config.engine.network);
            let container_id = self.docker.create_and_start(&spec).await.map_err(|e| {
                match e {
                    DockerError::ImageNotFound(image) => LifecycleError::ImageNotFound(image),
                    other => LifecycleError::Docker(other),
                }
            })?;
            agent.container_id = container_id;
        } else {
            self.docker.start_container(&agent.container_id).await?;
        }

        agent.status = AgentStatus::Running;
        self.save(agent).await?;

        info!(agent_id = %agent.id, container_id = %agent.container_id, "Started agent");
        Ok(())
    }

    async fn stop_locked(&self, agent: &mut Agent) -> Result<(), LifecycleError> {
        if !agent.container_id.is_empty() {
            let timeout = self.config.engine.stop_timeout_secs;
            match self
                .docker
                .stop_container(&agent.container_id, Some(timeout))
                .await
            {
                Ok(()) => {}
                // A vanished container is as stopped as it gets.
                Err(DockerError::ContainerNotFound(_)) => agent.container_id.clear(),
                Err(e) => return Err(e.into()),
            }
        }

        agent.status = AgentStatus::Stopped;
        self.save(agent).await?;

        info!(agent_id = %agent.id, "Stopped agent");
        Ok(())
    }
}
