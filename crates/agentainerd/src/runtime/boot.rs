//! Boot — logging init, config load, engine and store connections, background
//! loop spawning.

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::conf::model::LoggingConfig;
use crate::conf::Config;
use crate::docker::DockerClient;
use crate::state::AppState;
use crate::store::RedisStore;
use crate::{reconcile, replay};

/// Initialise the tracing / logging subsystem.
pub fn init_logging(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.level.clone().into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Load config, connect to Docker and Redis (failing fast on either), ensure
/// the internal network, build shared state, and spawn the background loops.
pub async fn boot() -> Result<AppState> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    init_logging(&config.logging);

    info!("Starting agentainerd v{}", env!("CARGO_PKG_VERSION"));
    info!("Server will bind to: {}", config.server.bind_address());

    info!(
        "Connecting to Docker daemon at: {}",
        if config.engine.host.is_empty() {
            "default socket"
        } else {
            &config.engine.host
        }
    );
    let docker = DockerClient::new(&config.engine.host)
        .context("Failed to create Docker client")?;
    docker
        .ping()
        .await
        .context("Docker daemon is unreachable")?;
    info!("Successfully connected to Docker daemon");

    info!(
        "Connecting to store at: {}:{}",
        config.store.host, config.store.port
    );
    let store =
        RedisStore::connect(&config.store.url()).context("Failed to create store client")?;
    store.ping().await.context("Store is unreachable")?;
    info!("Successfully connected to store");

    docker
        .ensure_network(&config.engine.network, &config.engine.bridge_iface)
        .await
        .context("Failed to ensure internal agent network")?;
    info!("Internal agent network ready: {}", config.engine.network);

    let state = AppState::new(config, docker, store)
        .context("Failed to build application state")?;

    tokio::spawn(reconcile::run_periodic(state.clone()));
    tokio::spawn(reconcile::run_events(state.clone()));
    tokio::spawn(replay::run(state.clone()));

    Ok(state)
}
