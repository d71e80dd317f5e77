//! Datasource-related data models.
//!
//! This module defines types for datasource configuration: the backend type,
//! the timezone used for timestamps, and the per-datasource record itself.

use crate::config::PoolOptions;
use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Name of the datasource resolved when no name is given.
pub const DEFAULT_DATASOURCE: &str = "default";

/// Slow-query threshold used when the configured value is zero.
pub const DEFAULT_SLOW_THRESHOLD_MS: u64 = 200;

/// Per-statement timeout used when a datasource does not configure one.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseType {
    #[serde(rename = "postgres", alias = "postgresql")]
    PostgreSQL,
    #[serde(rename = "sqlite")]
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::SQLite => "SQLite",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Timezone used to render timestamps for a datasource.
///
/// Accepts `UTC` (or `Z`), `Local`, or a fixed offset such as `+08:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Timezone {
    #[default]
    Utc,
    Local,
    Fixed(FixedOffset),
}

impl Timezone {
    pub fn parse(value: &str) -> Result<Self, String> {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("utc") || value == "Z" {
            return Ok(Self::Utc);
        }
        if value.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        Self::parse_offset(value)
            .map(Self::Fixed)
            .ok_or_else(|| format!("Invalid timezone '{value}': expected UTC, Local or ±HH:MM"))
    }

    fn parse_offset(value: &str) -> Option<FixedOffset> {
        let sign = match value.as_bytes().first()? {
            b'+' => 1,
            b'-' => -1,
            _ => return None,
        };
        let (hours, minutes) = value[1..].split_once(':')?;
        let hours: i32 = hours.parse().ok()?;
        let minutes: i32 = minutes.parse().ok()?;
        if hours > 23 || minutes > 59 {
            return None;
        }
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
    }

    /// Offset in effect at the given instant.
    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            Self::Utc => Utc.fix(),
            Self::Local => Local.offset_from_utc_datetime(&instant.naive_utc()).fix(),
            Self::Fixed(offset) => *offset,
        }
    }

    /// Current time in this timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        let now = Utc::now();
        now.with_timezone(&self.offset_at(&now))
    }

    /// Convert Unix seconds to a timestamp in this timezone.
    pub fn from_unix(&self, secs: i64) -> Option<DateTime<FixedOffset>> {
        let instant = DateTime::<Utc>::from_timestamp(secs, 0)?;
        Some(instant.with_timezone(&self.offset_at(&instant)))
    }
}

impl TryFrom<String> for Timezone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl std::fmt::Display for Timezone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utc => write!(f, "UTC"),
            Self::Local => write!(f, "Local"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Configuration for one named datasource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceConfig {
    /// Lower-cased registry name; assigned by the binder, not read from the record.
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    pub dsn: String,
    /// Log every statement at info level.
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub timezone: Timezone,
    /// 0 selects the 200ms default.
    #[serde(default)]
    pub slow_threshold_ms: u64,
    /// Unset means colorized.
    #[serde(default)]
    pub colorful: Option<bool>,
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl DatasourceConfig {
    /// Create a datasource configuration with defaults for everything but the DSN.
    pub fn new(name: impl Into<String>, db_type: DatabaseType, dsn: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            db_type,
            dsn: dsn.into(),
            debug: false,
            timezone: Timezone::Utc,
            slow_threshold_ms: 0,
            colorful: None,
            query_timeout_secs: None,
            pool_options: PoolOptions::default(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.name.eq_ignore_ascii_case(DEFAULT_DATASOURCE)
    }

    /// Slow-query threshold with the zero-means-default rule applied.
    pub fn slow_threshold(&self) -> Duration {
        match self.slow_threshold_ms {
            0 => Duration::from_millis(DEFAULT_SLOW_THRESHOLD_MS),
            ms => Duration::from_millis(ms),
        }
    }

    pub fn colorful_or_default(&self) -> bool {
        self.colorful.unwrap_or(true)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(
            self.query_timeout_secs
                .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
        )
    }

    /// Get a display-safe version of the DSN (credentials masked).
    pub fn masked_dsn(&self) -> String {
        // Simple masking: replace password in URL
        if let Some(at_pos) = self.dsn.find('@') {
            if let Some(colon_pos) = self.dsn[..at_pos].rfind(':') {
                if self.dsn[colon_pos..].starts_with("://") {
                    return self.dsn.clone();
                }
                let prefix = &self.dsn[..colon_pos + 1];
                let suffix = &self.dsn[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.dsn.clone()
    }
}
