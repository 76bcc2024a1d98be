//! Worker — drains per-agent pending queues once the agent is running.
//!
//! Replays go through the local proxy rather than dialing containers
//! directly: the proxy is the one place that knows how to reach agents, and
//! its forwarding path already does all response-capture bookkeeping.

use std::time::Duration;

use axum::http::HeaderValue;
use futures_util::StreamExt;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::agent::{AgentStatus, LifecycleError, StatusChange};
use crate::proxy::{HEADER_REPLAY, HEADER_REQUEST_ID};
use crate::request::StoredRequest;
use crate::state::AppState;
use crate::store::keys;

/// Run the replay worker until shutdown. No-op when persistence is off.
pub async fn run(state: AppState) {
    if !state.persistence_enabled() {
        info!("Request persistence disabled, replay worker not started");
        return;
    }

    tokio::join!(run_ticker(state.clone()), run_status_listener(state));
}

/// Periodic pass over every pending queue.
async fn run_ticker(state: AppState) {
    let interval_secs = state.config.replay.interval_secs;
    info!("Starting replay worker (interval: {}s)", interval_secs);

    let mut interval = time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                drain_all(&state).await;
                prune_all(&state).await;
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Received shutdown signal, stopping replay worker");
                    break;
                }
            }
        }
    }
}

/// Reclaim queue slots whose request records have expired.
async fn prune_all(state: &AppState) {
    let cutoff = chrono::Utc::now()
        - chrono::Duration::from_std(state.requests.ttl()).unwrap_or(chrono::Duration::hours(24));

    let index_keys = match state.store.scan(keys::REQUEST_INDEX_PATTERN).await {
        Ok(index_keys) => index_keys,
        Err(e) => {
            error!(error = %e, "Request index scan failed");
            return;
        }
    };

    for key in index_keys {
        let Some(agent_id) = keys::agent_id_from_index_key(&key) else {
            continue;
        };
        if let Err(e) = state.requests.prune_expired(agent_id, cutoff).await {
            warn!(agent_id = %agent_id, error = %e, "Queue pruning failed");
        }
    }
}

/// Status-change subscriber: an agent turning `running` gets its queue
/// drained immediately instead of waiting out the tick.
async fn run_status_listener(state: AppState) {
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        let mut pubsub = match state.store.psubscribe(keys::STATUS_CHANNEL_PATTERN).await {
            Ok(pubsub) => pubsub,
            Err(e) => {
                warn!(error = %e, "Status subscription failed, retrying");
                tokio::select! {
                    _ = time::sleep(Duration::from_secs(5)) => continue,
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { return; }
                        continue;
                    }
                }
            }
        };

        let mut messages = pubsub.on_message();
        loop {
            tokio::select! {
                message = messages.next() => {
                    let Some(message) = message else {
                        warn!("Status subscription ended, resubscribing");
                        break;
                    };
                    let Ok(payload) = message.get_payload::<String>() else { continue };
                    let Ok(change) = serde_json::from_str::<StatusChange>(&payload) else {
                        continue;
                    };
                    if change.new_status == AgentStatus::Running {
                        debug!(agent_id = %change.agent_id, "Agent became running, draining queue");
                        drain_agent(&state, &change.agent_id).await;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping status listener");
                        return;
                    }
                }
            }
        }
    }
}

/// One pass: find agents with pending work, drain those that are running.
async fn drain_all(state: &AppState) {
    let queue_keys = match state.store.scan(keys::PENDING_QUEUE_PATTERN).await {
        Ok(queue_keys) => queue_keys,
        Err(e) => {
            error!(error = %e, "Pending queue scan failed");
            return;
        }
    };

    for key in queue_keys {
        let Some(agent_id) = keys::agent_id_from_pending_key(&key) else {
            continue;
        };
        drain_agent(state, agent_id).await;
    }
}

/// Replay an agent's pending queue, in FIFO order, sequentially.
pub async fn drain_agent(state: &AppState, agent_id: &str) {
    let agent = match state.lifecycle.get_agent(agent_id).await {
        Ok(agent) => agent,
        Err(LifecycleError::NotFound(_)) => return,
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "Agent lookup failed during replay");
            return;
        }
    };
    if agent.status != AgentStatus::Running {
        return;
    }

    let pending = match state.requests.get_pending(agent_id).await {
        Ok(pending) => pending,
        Err(e) => {
            warn!(agent_id = %agent_id, error = %e, "Pending queue read failed");
            return;
        }
    };
    if pending.is_empty() {
        return;
    }

    info!(agent_id = %agent_id, count = pending.len(), "Replaying pending requests");

    for request in pending {
        match replay_one(state, agent_id, &request).await {
            None => {}
            Some(Ok(status)) => {
                debug!(
                    agent_id = %agent_id,
                    request_id = %request.id,
                    status = status.as_u16(),
                    "Replay forwarded"
                );
            }
            Some(Err(e)) => {
                warn!(
                    agent_id = %agent_id,
                    request_id = %request.id,
                    error = %e,
                    "Replay could not reach the local proxy"
                );
            }
        }
    }
}

/// Gate and dispatch a single stored request: flag it in-flight, then re-send
/// it through the local proxy. `None` means the request was not replayable
/// (completed, already in flight, or out of retries) and nothing was sent.
///
/// The in-flight flag is the mutual exclusion between the background worker
/// and the manual replay endpoint; both must go through here.
pub async fn replay_one(
    state: &AppState,
    agent_id: &str,
    request: &StoredRequest,
) -> Option<Result<reqwest::StatusCode, reqwest::Error>> {
    if !request.replayable() {
        return None;
    }

    if let Err(e) = state.requests.mark_processing(agent_id, &request.id).await {
        warn!(
            agent_id = %agent_id,
            request_id = %request.id,
            error = %e,
            "Failed to flag request as processing"
        );
        return None;
    }

    match send_replay(state, request).await {
        Ok(status) => Some(Ok(status)),
        Err(e) => {
            // The local proxy itself was unreachable; this is not a delivery
            // attempt, so don't burn a retry.
            let _ = state.requests.reset_pending(agent_id, &request.id).await;
            Some(Err(e))
        }
    }
}

/// Re-send a stored request through the local proxy with the replay markers.
/// The proxy's forwarding path does the response/failure bookkeeping.
async fn send_replay(
    state: &AppState,
    request: &StoredRequest,
) -> Result<reqwest::StatusCode, reqwest::Error> {
    let url = format!(
        "{}/agent/{}{}",
        state.local_proxy_base(),
        request.agent_id,
        request.path
    );
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut headers = crate::proxy::forward::build_forward_headers(&request.headers, &request.id);
    headers.insert(HEADER_REPLAY, HeaderValue::from_static("true"));
    if let Ok(value) = HeaderValue::from_str(&request.id) {
        headers.insert(HEADER_REQUEST_ID, value);
    }

    let response = state
        .http
        .request(method, &url)
        .headers(headers)
        .body(request.body.clone())
        .send()
        .await?;

    Ok(response.status())
}
