use std::{path::PathBuf, sync::OnceLock};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{Dispatch, dispatcher, level_filters::LevelFilter};
use tracing_appender::rolling::daily;
use tracing_subscriber::{Layer, Registry, fmt, prelude::__tracing_subscriber_SubscriberExt};

pub const LOG_FILE_NAME: &str = "delivery_module.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(ascii_case_insensitive, serialize_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Critical,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Critical => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    pub log_level: LogLevel,
    /// Daily rolling file in this directory; stderr when `None`.
    pub log_dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn new(log_level: LogLevel, log_dir: Option<PathBuf>) -> Self {
        Self { log_level, log_dir }
    }
}

static INSTALLED: OnceLock<LogConfig> = OnceLock::new();

/// Installs the global tracing subscriber.
///
/// Only the first call per process installs anything; later calls return
/// `Ok` and keep the original setup, since the host may load the module
/// more than once.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let level: LevelFilter = config.log_level.into();
    let dispatch = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|e| anyhow!("cannot create log dir {}: {}", dir.display(), e))?;
            let file_appender = daily(dir, LOG_FILE_NAME);
            Dispatch::new(
                Registry::default().with(
                    fmt::layer()
                        .with_ansi(false)
                        .with_target(false)
                        .with_thread_names(true)
                        .with_writer(file_appender)
                        .with_filter(level),
                ),
            )
        }
        None => Dispatch::new(
            Registry::default().with(
                fmt::layer()
                    .with_thread_names(true)
                    .with_writer(std::io::stderr)
                    .with_filter(level),
            ),
        ),
    };

    dispatcher::set_global_default(dispatch)
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;
    let _ = INSTALLED.set(config.clone());
    tracing::info!(level = %config.log_level, "delivery module logging initialised");
    Ok(())
}
