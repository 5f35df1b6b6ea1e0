use std::{env, path::Path, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::logger::{LogConfig, LogLevel};

pub const CALLBACK_TIMEOUT_VAR: &str = "DELIVERY_CALLBACK_TIMEOUT_SECS";
pub const LOG_LEVEL_VAR: &str = "DELIVERY_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "DELIVERY_LOG_DIR";

/// Bound on every callback-completed library call.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest accepted `DELIVERY_CALLBACK_TIMEOUT_SECS` (one day).
pub const MAX_CALLBACK_TIMEOUT_SECS: u64 = 86_400;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleConfig {
    pub callback_timeout: Duration,
    pub log: LogConfig,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            log: LogConfig::default(),
        }
    }
}

impl ModuleConfig {
    /// Reads the process environment, after loading `env_file` if it exists.
    ///
    /// Values already present in the environment win over the file.
    pub fn from_env(env_file: Option<&Path>) -> Result<Self> {
        if let Some(path) = env_file {
            if path.exists() {
                dotenvy::from_path(path)
                    .with_context(|| format!("could not load {}", path.display()))?;
                info!("Loaded .env from {}", path.display());
            } else {
                warn!("could not find .env at {}, using process environment", path.display());
            }
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(CALLBACK_TIMEOUT_VAR) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{CALLBACK_TIMEOUT_VAR} must be a whole number of seconds, got '{raw}'"))?;
            anyhow::ensure!(secs > 0, "{CALLBACK_TIMEOUT_VAR} must be greater than zero");
            anyhow::ensure!(
                secs <= MAX_CALLBACK_TIMEOUT_SECS,
                "{CALLBACK_TIMEOUT_VAR} must be at most {MAX_CALLBACK_TIMEOUT_SECS} seconds, got {secs}"
            );
            config.callback_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(LOG_LEVEL_VAR) {
            config.log.log_level = LogLevel::from_str(raw.trim())
                .with_context(|| format!("{LOG_LEVEL_VAR} has unknown level '{raw}'"))?;
        }

        if let Some(raw) = lookup(LOG_DIR_VAR) {
            let raw = raw.trim();
            if !raw.is_empty() {
                config.log.log_dir = Some(PathBuf::from(raw));
            }
        }

        Ok(config)
    }
}
