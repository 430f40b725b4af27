//! Logging setup
//!
//! The crate logs through `tracing`. Applications that do not install their
//! own subscriber can call [`init_logging`], which installs a formatted
//! subscriber filtered by `RUST_LOG` or, if unset, by the given level.
//!
//! ```rust
//! use conversations_core::logging::{init_logging, LogLevel};
//!
//! if let Some(handle) = init_logging(LogLevel::Info) {
//!     handle.set_level(LogLevel::Debug).unwrap();
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, reload, EnvFilter, Registry};

use crate::error::{ClientError, ClientResult};

/// Process-wide log verbosity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::default().add_directive(self.as_level_filter().into())
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(ClientError::invalid_argument(format!("Unknown log level: {}", other))),
        }
    }
}

/// Changes the level of the subscriber installed by [`init_logging`]
#[derive(Debug, Clone)]
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogHandle {
    pub fn set_level(&self, level: LogLevel) -> ClientResult<()> {
        self.handle
            .reload(level.env_filter())
            .map_err(|e| ClientError::internal(format!("Failed to change log level: {}", e)))?;
        tracing::info!("Log level set to {}", level);
        Ok(())
    }
}

/// Install the global subscriber
///
/// Returns `None` if a global subscriber is already installed, in which case
/// that subscriber keeps its own configuration.
pub fn init_logging(level: LogLevel) -> Option<LogHandle> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.env_filter());
    let (filter, handle) = reload::Layer::<EnvFilter, Registry>::new(filter);

    match tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer::layer())
        .try_init()
    {
        Ok(()) => Some(LogHandle { handle }),
        Err(_) => {
            tracing::debug!("A global tracing subscriber is already installed");
            None
        }
    }
}
