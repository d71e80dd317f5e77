//! Destinations for SQL trace lines.

use super::LogLevel;
use std::sync::{Mutex, PoisonError};

/// Tracing target of every SQL record written by [`TracingSink`].
pub const SQL_LOG_TARGET: &str = "dbkit::sql";

/// Receives one physical log line at a time.
pub trait SqlLogSink: Send + Sync {
    fn emit(&self, level: LogLevel, line: &str);
}

/// Forwards lines to `tracing` under [`SQL_LOG_TARGET`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl SqlLogSink for TracingSink {
    fn emit(&self, level: LogLevel, line: &str) {
        match level {
            LogLevel::Error => tracing::error!(target: SQL_LOG_TARGET, "{line}"),
            LogLevel::Warn => tracing::warn!(target: SQL_LOG_TARGET, "{line}"),
            LogLevel::Info => tracing::info!(target: SQL_LOG_TARGET, "{line}"),
            LogLevel::Silent => {}
        }
    }
}

/// Keeps every line in memory. Used to assert on log output.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Lines emitted at exactly `level`.
    pub fn lines_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl SqlLogSink for MemorySink {
    fn emit(&self, level: LogLevel, line: &str) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, line.to_string()));
    }
}
