//! Load — layered configuration: defaults, TOML file, environment.

use anyhow::{Context, Result};

use super::model::Config;

impl Config {
    /// Load configuration from agentainerd.toml and environment variables.
    ///
    /// Priority: environment > config file > compile-time defaults.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        // Compile-time defaults are the foundation; a key missing from every
        // file and the environment falls back to them.
        let defaults = config::Config::try_from(&Config::default())
            .context("Failed to serialize default configuration")?;

        let mut builder = config::Config::builder().add_source(defaults);

        // Layer config files (overrides defaults).
        // Locations tried in order:
        // 1. /etc/agentainer/agentainerd.toml (production)
        // 2. config/agentainerd.toml (local development)
        let config_paths = vec!["/etc/agentainer/agentainerd", "config/agentainerd"];

        for path in config_paths {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Layer environment variables (overrides everything).
        // Double underscore for nested keys: AGENTAINER_SERVER__PORT
        builder = builder.add_source(
            config::Environment::with_prefix("AGENTAINER")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("server.port must be > 0");
        }
        if self.security.default_token.is_empty() {
            anyhow::bail!("security.default_token must not be empty");
        }
        if self.engine.network.is_empty() {
            anyhow::bail!("engine.network must not be empty");
        }
        if self.reconcile.interval_secs == 0 {
            anyhow::bail!("reconcile.interval_secs must be > 0");
        }
        if self.replay.interval_secs == 0 {
            anyhow::bail!("replay.interval_secs must be > 0");
        }
        if self.requests.ttl_secs == 0 {
            anyhow::bail!("requests.ttl_secs must be > 0");
        }
        if self.requests.forward_timeout_secs == 0 {
            anyhow::bail!("requests.forward_timeout_secs must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn empty_token_is_rejected() {
        let mut config = Config::default();
        config.security.default_token = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_reconcile_interval_is_rejected() {
        let mut config = Config::default();
        config.reconcile.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }
}
