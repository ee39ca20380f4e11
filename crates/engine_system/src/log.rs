//! Diagnostic log sink.
//!
//! The runtime reports through `tracing`. Hosts and systems that want to
//! capture diagnostic messages themselves implement [`LogSink`]; a registered
//! system advertising [`capability::LOG_SINK`](crate::capability::LOG_SINK)
//! takes precedence over the default [`TracingSink`].

use std::fmt;

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A generic message sink: message in, nothing out.
pub trait LogSink {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards messages to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "engine_system::log", "{message}"),
            LogLevel::Info => tracing::info!(target: "engine_system::log", "{message}"),
            LogLevel::Warn => tracing::warn!(target: "engine_system::log", "{message}"),
            LogLevel::Error => tracing::error!(target: "engine_system::log", "{message}"),
        }
    }
}
