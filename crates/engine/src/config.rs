//! Controller configuration.
//!
//! Settings live in a YAML file, by default `<config dir>/jalan/controller.yaml`
//! or the path named by `JALAN_CONFIG_PATH`. A missing file means defaults.
//!
//! ```yaml
//! continueOnStepFailure: false
//! outputLifetime: perRun
//! runIdPrefix: release-
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use dirs_next::config_dir;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "JALAN_CONFIG_PATH";

static RUN_ID_PREFIX_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_-]*$").expect("valid prefix pattern"));

/// How long values in a handler's output store live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputLifetime {
    /// Cleared at the start of every run, like the profile and run id.
    #[default]
    PerRun,
    /// Kept across runs of the same controller.
    PerController,
}

/// Behavior switches for a compiled controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ControllerConfig {
    /// Report main-step failures without stopping the run.
    pub continue_on_step_failure: bool,
    pub output_lifetime: OutputLifetime,
    /// Prepended to every generated run id.
    pub run_id_prefix: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            continue_on_step_failure: false,
            output_lifetime: OutputLifetime::PerRun,
            run_id_prefix: "run-".to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Returns the default path for the controller configuration file.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV)
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jalan")
        .join("controller.yaml")
}

/// Loads controller configuration from the default path.
pub fn load_config() -> Result<ControllerConfig, ConfigError> {
    load_config_from_path(&default_config_path())
}

/// Loads controller configuration from a specific path.
pub fn load_config_from_path(path: &Path) -> Result<ControllerConfig, ConfigError> {
    if !path.exists() {
        debug!(path = %path.display(), "no controller configuration file; using defaults");
        return Ok(ControllerConfig::default());
    }

    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(ControllerConfig::default());
    }
    let config: ControllerConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    debug!(path = %path.display(), "loaded controller configuration");
    Ok(config)
}

pub fn validate_config(config: &ControllerConfig) -> Result<(), ConfigError> {
    if !RUN_ID_PREFIX_PATTERN.is_match(&config.run_id_prefix) {
        return Err(ConfigError::Invalid {
            field: "runIdPrefix",
            reason: "must contain only lowercase letters, digits, '_' and '-'".to_string(),
        });
    }
    Ok(())
}
