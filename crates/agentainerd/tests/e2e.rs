//! End-to-end scenarios against a live Docker daemon and Redis instance.
//!
//! Ignored by default; run with `cargo test -- --ignored` on a host where
//! both are available and the `nginx:alpine` image is pulled.

use std::collections::HashMap;
use std::future::IntoFuture;
use std::time::Duration;

use agentainerd::agent::{AgentStatus, DeploySpec, LifecycleError};
use agentainerd::api;
use agentainerd::conf::Config;
use agentainerd::docker::DockerClient;
use agentainerd::request::RequestStatus;
use agentainerd::state::AppState;
use agentainerd::store::{keys, RedisStore};
use agentainerd::{reconcile, replay};

fn deploy_spec(name: &str, image: &str) -> DeploySpec {
    DeploySpec {
        name: name.to_string(),
        image: image.to_string(),
        env_vars: HashMap::new(),
        cpu_limit: None,
        memory_limit: None,
        auto_restart: false,
        health_check: None,
        volumes: vec![],
        token: None,
    }
}

/// Boot a full control plane on an ephemeral port, background loops included.
async fn start_control_plane() -> AppState {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");

    let mut config = Config::default();
    config.server.host = addr.ip().to_string();
    config.server.port = addr.port();
    config.security.default_token = "e2e-token".to_string();
    config.reconcile.interval_secs = 2;
    config.replay.interval_secs = 1;

    let docker = DockerClient::new(&config.engine.host).expect("docker client");
    docker.ping().await.expect("docker daemon reachable");
    docker
        .ensure_network(&config.engine.network, &config.engine.bridge_iface)
        .await
        .expect("internal network");

    let store = RedisStore::connect(&config.store.url()).expect("store client");
    store.ping().await.expect("redis reachable");

    let state = AppState::new(config, docker, store).expect("app state");

    tokio::spawn(reconcile::run_periodic(state.clone()));
    tokio::spawn(reconcile::run_events(state.clone()));
    tokio::spawn(replay::run(state.clone()));
    tokio::spawn(axum::serve(listener, api::router(state.clone())).into_future());

    state
}

async fn wait_for<F, Fut>(what: &str, deadline: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
    panic!("timed out waiting for: {}", what);
}

#[tokio::test]
#[ignore = "requires a live Docker daemon and Redis"]
async fn lifecycle_round_trip_converges_and_ends_empty() {
    let state = start_control_plane().await;

    let agent = state
        .lifecycle
        .deploy(deploy_spec("round-trip", "nginx:alpine"))
        .await
        .expect("deploy");
    assert_eq!(agent.status, AgentStatus::Created);

    let agent = state.lifecycle.start(&agent.id).await.expect("start");
    assert_eq!(agent.status, AgentStatus::Running);
    assert!(!agent.container_id.is_empty());

    let agent = state.lifecycle.stop(&agent.id).await.expect("stop");
    assert_eq!(agent.status, AgentStatus::Stopped);

    let agent = state.lifecycle.start(&agent.id).await.expect("restart");
    assert_eq!(agent.status, AgentStatus::Running);
    let agent = state.lifecycle.stop(&agent.id).await.expect("stop again");

    state.lifecycle.remove(&agent.id).await.expect("remove");

    assert!(matches!(
        state.lifecycle.get_agent(&agent.id).await,
        Err(LifecycleError::NotFound(_))
    ));
    let leftovers = state
        .store
        .scan(&keys::agent_prefix_pattern(&agent.id))
        .await
        .expect("scan");
    assert!(leftovers.is_empty(), "leftover keys: {:?}", leftovers);
    assert!(!state
        .store
        .smembers(keys::AGENTS_SET)
        .await
        .expect("smembers")
        .contains(&agent.id));
}

#[tokio::test]
#[ignore = "requires a live Docker daemon and Redis"]
async fn unknown_image_creates_no_record() {
    let state = start_control_plane().await;

    let result = state
        .lifecycle
        .deploy(deploy_spec("bad-image", "does-not-exist:never"))
        .await;
    assert!(matches!(result, Err(LifecycleError::ImageNotFound(_))));

    let agents = state.lifecycle.list_agents().await.expect("list");
    assert!(agents.iter().all(|a| a.name != "bad-image"));
}

#[tokio::test]
#[ignore = "requires a live Docker daemon and Redis"]
async fn request_queued_while_stopped_replays_on_start() {
    let state = start_control_plane().await;
    let client = reqwest::Client::new();

    let agent = state
        .lifecycle
        .deploy(deploy_spec("queue-then-replay", "nginx:alpine"))
        .await
        .expect("deploy");

    // Not started: the proxy must queue, not forward.
    let response = client
        .post(format!("{}/agent/{}/", state.local_proxy_base(), agent.id))
        .json(&serde_json::json!({ "x": 1 }))
        .send()
        .await
        .expect("proxy reachable");
    assert_eq!(response.status().as_u16(), 202);

    let envelope: serde_json::Value = response.json().await.expect("json");
    let request_id = envelope["data"]["request_id"]
        .as_str()
        .expect("request id")
        .to_string();

    state.lifecycle.start(&agent.id).await.expect("start");

    let requests = state.requests.clone();
    let agent_id = agent.id.clone();
    let rid = request_id.clone();
    wait_for("queued request to complete", Duration::from_secs(15), || {
        let requests = requests.clone();
        let agent_id = agent_id.clone();
        let rid = rid.clone();
        async move {
            match requests.get_request(&agent_id, &rid).await {
                Ok(Some(r)) => {
                    r.status == RequestStatus::Completed
                        && r.response
                            .as_ref()
                            .map(|resp| (200..300).contains(&(resp.status_code as i32)))
                            .unwrap_or(false)
                }
                _ => false,
            }
        }
    })
    .await;

    let pending = state.requests.get_pending(&agent.id).await.expect("pending");
    assert!(pending.is_empty());

    state.lifecycle.remove(&agent.id).await.expect("cleanup");
}

#[tokio::test]
#[ignore = "requires a live Docker daemon and Redis"]
async fn status_reconciles_after_external_removal() {
    let state = start_control_plane().await;

    let agent = state
        .lifecycle
        .deploy(deploy_spec("external-kill", "nginx:alpine"))
        .await
        .expect("deploy");
    let agent = state.lifecycle.start(&agent.id).await.expect("start");

    // Kill the container behind the control plane's back.
    state
        .docker
        .remove_container(&agent.container_id, true)
        .await
        .expect("external removal");

    let lifecycle = state.lifecycle.clone();
    let agent_id = agent.id.clone();
    wait_for("record to converge to stopped", Duration::from_secs(10), || {
        let lifecycle = lifecycle.clone();
        let agent_id = agent_id.clone();
        async move {
            match lifecycle.get_agent(&agent_id).await {
                Ok(a) => a.status == AgentStatus::Stopped && a.container_id.is_empty(),
                Err(_) => false,
            }
        }
    })
    .await;

    state.lifecycle.remove(&agent.id).await.expect("cleanup");
}

#[tokio::test]
#[ignore = "requires a live Docker daemon and Redis"]
async fn auth_boundary_over_http() {
    let state = start_control_plane().await;
    let client = reqwest::Client::new();
    let base = state.local_proxy_base();

    // Control API without a token.
    let response = client
        .get(format!("{}/agents", base))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 401);

    // Control API with the wrong token.
    let response = client
        .get(format!("{}/agents", base))
        .bearer_auth("wrong")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 401);

    // Control API with the right token.
    let response = client
        .get(format!("{}/agents", base))
        .bearer_auth("e2e-token")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 200);

    // Proxy surface is public: unknown agent gives 404, never 401.
    let response = client
        .get(format!("{}/agent/agent-missing/", base))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status().as_u16(), 404);
}
