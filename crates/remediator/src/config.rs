//! Agent process configuration

use anyhow::{Context, Result};
use serde::Deserialize;

/// Process-level settings, from `REMEDIATOR_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// HTTP port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory holding per-remediator JSON config files
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Grace period for the HTTP listener on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            config_dir: default_config_dir(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_config_dir() -> String {
    "config".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl AgentConfig {
    pub fn load() -> Result<Self> {
        let source = config::Config::builder()
            .add_source(config::Environment::with_prefix("REMEDIATOR").try_parsing(true))
            .build()?;
        // A bad override is a startup error, not something to paper over
        // with defaults.
        source
            .try_deserialize()
            .context("reading agent configuration from environment")
    }
}
