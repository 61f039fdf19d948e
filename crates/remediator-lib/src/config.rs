//! Configuration loading
//!
//! Each remediator reads its own JSON file from a configuration directory,
//! overlaid with `REMEDIATOR_<KIND>_*` environment variables. The directory
//! is an explicit value handed to setup; nothing global, nothing mutable.
//! A `remediator_policy.json` file can disable remediators by name.

use crate::policy::{
    CompletedPodConfig, CrashLoopConfig, FailedPodConfig, HealthPolicy, OldPodConfig,
};
use crate::remediator::RemediatorKind;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const POLICY_FILE: &str = "remediator_policy";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("reading configuration for {remediator}: {source}")]
    Read {
        remediator: &'static str,
        #[source]
        source: config::ConfigError,
    },
    #[error("invalid configuration for {remediator}: {message}")]
    Invalid {
        remediator: &'static str,
        message: String,
    },
}

/// Source of per-remediator configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    config_dir: PathBuf,
}

impl Settings {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Load and validate the policy for one remediator kind. Missing files
    /// fall back to defaults; present-but-broken files and invalid values are
    /// fatal to startup.
    pub fn load_policy(&self, kind: RemediatorKind) -> Result<HealthPolicy, SettingsError> {
        let file = self.config_dir.join(format!("{}.json", kind.config_file()));
        info!(remediator = kind.name(), file = %file.display(), "Reading config");

        let source = self.build(kind, &file)?;
        let read = |source: config::Config| -> Result<HealthPolicy, config::ConfigError> {
            Ok(match kind {
                RemediatorKind::OldPodDeleter => {
                    HealthPolicy::OldPod(source.try_deserialize::<OldPodConfig>()?)
                }
                RemediatorKind::CompletedPodDeleter => {
                    HealthPolicy::CompletedPod(source.try_deserialize::<CompletedPodConfig>()?)
                }
                RemediatorKind::CrashLoopBackOffRescheduler => {
                    HealthPolicy::CrashLoop(source.try_deserialize::<CrashLoopConfig>()?)
                }
                RemediatorKind::FailedPodRescheduler => {
                    HealthPolicy::FailedPod(source.try_deserialize::<FailedPodConfig>()?)
                }
            })
        };
        let policy = read(source).map_err(|source| SettingsError::Read {
            remediator: kind.name(),
            source,
        })?;

        policy.validate().map_err(|message| SettingsError::Invalid {
            remediator: kind.name(),
            message,
        })?;
        Ok(policy)
    }

    fn build(&self, kind: RemediatorKind, file: &Path) -> Result<config::Config, SettingsError> {
        config::Config::builder()
            .add_source(config::File::from(file.to_path_buf()).required(false))
            .add_source(
                config::Environment::with_prefix(&format!("REMEDIATOR_{}", kind.env_segment()))
                    .try_parsing(true),
            )
            .build()
            .map_err(|source| SettingsError::Read {
                remediator: kind.name(),
                source,
            })
    }

    fn policy_file(&self) -> PathBuf {
        self.config_dir.join(format!("{POLICY_FILE}.json"))
    }
}

/// Process-level enable/disable policy for remediators.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemediatorPolicy {
    #[serde(default)]
    pub disabled_remediators: Vec<String>,
}

impl RemediatorPolicy {
    pub fn load(settings: &Settings) -> Result<Self, SettingsError> {
        let file = settings.policy_file();
        config::Config::builder()
            .add_source(config::File::from(file).required(false))
            .build()
            .and_then(|source| source.try_deserialize::<Self>())
            .map_err(|source| SettingsError::Read {
                remediator: "RemediatorPolicy",
                source,
            })
    }

    pub fn is_disabled(&self, remediator: &str) -> bool {
        self.disabled_remediators
            .iter()
            .any(|disabled| disabled.eq_ignore_ascii_case(remediator))
    }
}
