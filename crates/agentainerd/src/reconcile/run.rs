//! Run — the periodic reconcile loop and the engine-event loop.
//!
//! Both loops run for the lifetime of the process; errors are logged and the
//! loop continues. One loop's failure never stops the other.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::docker::event::event_agent_id;
use crate::state::AppState;

use super::sync::{sync_all, sync_one};

/// Periodic full-pass reconcile: one label-scoped container listing per tick,
/// applied against every indexed agent.
pub async fn run_periodic(state: AppState) {
    let interval_secs = state.config.reconcile.interval_secs;
    info!("Starting reconcile loop (interval: {}s)", interval_secs);

    let mut interval = time::interval(Duration::from_secs(interval_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match sync_all(&state.docker, &state.store).await {
                    Ok(0) => debug!("Reconcile pass: no drift"),
                    Ok(changed) => info!(changed, "Reconcile pass applied changes"),
                    Err(e) => error!(error = %e, "Reconcile pass failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Received shutdown signal, stopping reconcile loop");
                    break;
                }
            }
        }
    }
}

/// Event-driven reconcile: each engine event for a labeled container triggers
/// a targeted sync, collapsing convergence latency to event delivery time.
pub async fn run_events(state: AppState) {
    info!("Starting engine event subscription");

    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        let stream = state.docker.stream_agent_events();
        tokio::pin!(stream);

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        let Some(agent_id) = event_agent_id(&event) else { continue };
                        debug!(agent_id = %agent_id, action = ?event.action, "Engine event");
                        if let Err(e) = sync_one(&state.docker, &state.store, &agent_id).await {
                            warn!(agent_id = %agent_id, error = %e, "Event-driven sync failed");
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Engine event stream error, resubscribing");
                        break;
                    }
                    None => {
                        warn!("Engine event stream ended, resubscribing");
                        break;
                    }
                },
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Received shutdown signal, stopping event loop");
                        return;
                    }
                }
            }
        }

        // Backoff before resubscribing, still responsive to shutdown.
        tokio::select! {
            _ = time::sleep(Duration::from_secs(1)) => {}
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    return;
                }
            }
        }
    }
}
