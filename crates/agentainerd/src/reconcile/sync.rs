//! Sync — derive agent status from container truth and write it back.

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::agent::model::{Agent, AgentStatus, StatusChange};
use crate::docker::{ContainerInfo, DockerClient, DockerError};
use crate::store::{keys, RedisStore, StoreError};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Docker(#[from] DockerError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Map an engine container state onto an agent status.
pub fn derive_status(engine_state: &str) -> AgentStatus {
    match engine_state {
        "running" => AgentStatus::Running,
        "paused" => AgentStatus::Paused,
        "created" => AgentStatus::Created,
        "exited" | "dead" | "removing" | "removed" => AgentStatus::Stopped,
        _ => AgentStatus::Failed,
    }
}

/// What a record write would change to, given the observed container.
///
/// `None` means the record already matches reality. A missing container only
/// forces a transition when the record claims the agent is live.
pub fn observed_delta(
    agent: &Agent,
    observed: Option<&ContainerInfo>,
) -> Option<(AgentStatus, String)> {
    match observed {
        Some(container) => {
            let status = derive_status(&container.state);
            if status != agent.status || container.id != agent.container_id {
                Some((status, container.id.clone()))
            } else {
                None
            }
        }
        None => match agent.status {
            AgentStatus::Running | AgentStatus::Paused => {
                Some((AgentStatus::Stopped, String::new()))
            }
            _ => None,
        },
    }
}

/// Write the observed delta (if any) and publish the status change.
async fn apply_observation(
    store: &RedisStore,
    mut agent: Agent,
    observed: Option<&ContainerInfo>,
) -> Result<bool, ReconcileError> {
    let Some((new_status, container_id)) = observed_delta(&agent, observed) else {
        return Ok(false);
    };

    let change = StatusChange {
        agent_id: agent.id.clone(),
        old_status: agent.status,
        new_status,
        container_id: container_id.clone(),
    };

    agent.status = new_status;
    agent.container_id = container_id;
    agent.touch();
    store.set_json(&keys::agent(&agent.id), &agent).await?;

    store
        .publish(
            &keys::status_channel(&agent.id),
            &serde_json::to_string(&change).map_err(StoreError::from)?,
        )
        .await?;

    info!(
        agent_id = %agent.id,
        old_status = %change.old_status,
        new_status = %change.new_status,
        "Reconciled agent status"
    );
    Ok(true)
}

/// Targeted reconcile of a single agent.
///
/// Used by the lifecycle manager after transitions and by the engine event
/// loop; also sweeps dangling index entries (a missing record while the ID is
/// still indexed).
pub async fn sync_one(
    docker: &DockerClient,
    store: &RedisStore,
    id: &str,
) -> Result<(), ReconcileError> {
    let Some(agent) = store.get_json::<Agent>(&keys::agent(id)).await? else {
        store.srem(keys::AGENTS_SET, id).await?;
        debug!(agent_id = %id, "Swept dangling index entry");
        return Ok(());
    };

    let observed = find_container(docker, &agent).await?;
    apply_observation(store, agent, observed.as_ref()).await?;
    Ok(())
}

/// One full reconcile pass over every indexed agent.
///
/// A single label-scoped list call feeds the whole pass. Returns how many
/// records were updated.
pub async fn sync_all(docker: &DockerClient, store: &RedisStore) -> Result<usize, ReconcileError> {
    let containers = docker.list_agent_containers().await?;
    let by_agent = index_by_agent(containers);

    let mut changed = 0;
    for id in store.smembers(keys::AGENTS_SET).await? {
        let Some(agent) = store.get_json::<Agent>(&keys::agent(&id)).await? else {
            store.srem(keys::AGENTS_SET, &id).await?;
            debug!(agent_id = %id, "Swept dangling index entry");
            continue;
        };

        if apply_observation(store, agent, by_agent.get(&id)).await? {
            changed += 1;
        }
    }
    Ok(changed)
}

/// Locate the agent's container: by recorded handle first, by label second.
async fn find_container(
    docker: &DockerClient,
    agent: &Agent,
) -> Result<Option<ContainerInfo>, ReconcileError> {
    if !agent.container_id.is_empty() {
        match docker.inspect_container(&agent.container_id).await {
            Ok(info) => return Ok(Some(info)),
            Err(DockerError::ContainerNotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let containers = docker.list_agent_containers().await?;
    Ok(index_by_agent(containers).remove(&agent.id))
}

/// Index containers by their `agentainer.id` label, preferring a live
/// container when an agent somehow has several.
pub fn index_by_agent(containers: Vec<ContainerInfo>) -> HashMap<String, ContainerInfo> {
    let mut map: HashMap<String, ContainerInfo> = HashMap::new();
    for container in containers {
        let Some(agent_id) = container.agent_id().map(str::to_string) else {
            continue;
        };
        match map.get(&agent_id) {
            Some(existing) if existing.state == "running" => {}
            _ => {
                map.insert(agent_id, container);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::model::DeploySpec;
    use std::collections::HashMap as StdHashMap;

    fn agent_with(status: AgentStatus, container_id: &str) -> Agent {
        let mut agent = Agent::new(DeploySpec {
            name: "a".to_string(),
            image: "nginx:alpine".to_string(),
            env_vars: StdHashMap::new(),
            cpu_limit: None,
            memory_limit: None,
            auto_restart: false,
            health_check: None,
            volumes: vec![],
            token: None,
        });
        agent.status = status;
        agent.container_id = container_id.to_string();
        agent
    }

    fn container(id: &str, agent_id: &str, state: &str) -> ContainerInfo {
        ContainerInfo {
            id: id.to_string(),
            state: state.to_string(),
            labels: StdHashMap::from([(
                crate::docker::LABEL_AGENT_ID.to_string(),
                agent_id.to_string(),
            )]),
            networks: vec![],
        }
    }

    #[test]
    fn derivation_table() {
        assert_eq!(derive_status("running"), AgentStatus::Running);
        assert_eq!(derive_status("paused"), AgentStatus::Paused);
        assert_eq!(derive_status("created"), AgentStatus::Created);
        assert_eq!(derive_status("exited"), AgentStatus::Stopped);
        assert_eq!(derive_status("dead"), AgentStatus::Stopped);
        assert_eq!(derive_status("removing"), AgentStatus::Stopped);
        assert_eq!(derive_status("removed"), AgentStatus::Stopped);
        assert_eq!(derive_status("restarting"), AgentStatus::Failed);
        assert_eq!(derive_status("unknown"), AgentStatus::Failed);
    }

    #[test]
    fn no_delta_when_record_matches() {
        let agent = agent_with(AgentStatus::Running, "c1");
        let observed = container("c1", &agent.id, "running");
        assert!(observed_delta(&agent, Some(&observed)).is_none());
    }

    #[test]
    fn delta_on_status_divergence() {
        let agent = agent_with(AgentStatus::Running, "c1");
        let observed = container("c1", &agent.id, "exited");
        assert_eq!(
            observed_delta(&agent, Some(&observed)),
            Some((AgentStatus::Stopped, "c1".to_string()))
        );
    }

    #[test]
    fn delta_on_container_id_divergence() {
        let agent = agent_with(AgentStatus::Running, "c1");
        let observed = container("c2", &agent.id, "running");
        assert_eq!(
            observed_delta(&agent, Some(&observed)),
            Some((AgentStatus::Running, "c2".to_string()))
        );
    }

    #[test]
    fn missing_container_stops_a_running_record() {
        let agent = agent_with(AgentStatus::Running, "c1");
        assert_eq!(
            observed_delta(&agent, None),
            Some((AgentStatus::Stopped, String::new()))
        );
    }

    #[test]
    fn missing_container_stops_a_paused_record() {
        let agent = agent_with(AgentStatus::Paused, "c1");
        assert_eq!(
            observed_delta(&agent, None),
            Some((AgentStatus::Stopped, String::new()))
        );
    }

    #[test]
    fn missing_container_leaves_created_and_stopped_alone() {
        assert!(observed_delta(&agent_with(AgentStatus::Created, ""), None).is_none());
        assert!(observed_delta(&agent_with(AgentStatus::Stopped, ""), None).is_none());
        assert!(observed_delta(&agent_with(AgentStatus::Failed, "c1"), None).is_none());
    }

    #[test]
    fn index_prefers_running_container() {
        let containers = vec![
            container("old", "agent-1", "exited"),
            container("new", "agent-1", "running"),
            container("other", "agent-2", "exited"),
        ];
        let map = index_by_agent(containers);
        assert_eq!(map.get("agent-1").unwrap().id, "new");
        assert_eq!(map.get("agent-2").unwrap().id, "other");
    }

    #[test]
    fn index_keeps_running_container_over_later_exited() {
        let containers = vec![
            container("new", "agent-1", "running"),
            container("old", "agent-1", "exited"),
        ];
        let map = index_by_agent(containers);
        assert_eq!(map.get("agent-1").unwrap().id, "new");
    }

    #[test]
    fn index_skips_unlabeled_containers() {
        let unlabeled = ContainerInfo {
            id: "x".to_string(),
            state: "running".to_string(),
            labels: StdHashMap::new(),
            networks: vec![],
        };
        assert!(index_by_agent(vec![unlabeled]).is_empty());
    }
}
