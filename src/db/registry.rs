//! Datasource registry.
//!
//! The registry is filled once during startup and then shared read-only behind an
//! `Arc`, so lookups never lock. Names are case-insensitive; the datasource named
//! `default` is also returned for an empty name.

use crate::db::logger::{LogLevel, SqlLogSink, TraceContext, TraceLogger};
use crate::db::pool::{DbPool, open_pool};
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::{DEFAULT_DATASOURCE, DatabaseType, DatasourceConfig, Timezone};
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// An open datasource: its pool plus everything a session derives from it.
#[derive(Debug)]
pub struct Datasource {
    name: String,
    pool: DbPool,
    logger: TraceLogger,
    timezone: Timezone,
    query_timeout: Duration,
    cancel: CancellationToken,
}

impl Datasource {
    /// Open the pool for `config` and build its trace logger.
    pub async fn open(
        config: &DatasourceConfig,
        sink: Arc<dyn SqlLogSink>,
        cancel: CancellationToken,
    ) -> DbResult<Self> {
        let pool = open_pool(config).await?;
        let server_version = pool.server_version().await;
        info!(
            datasource = %config.name,
            db_type = %config.db_type,
            server_version = ?server_version,
            "Datasource opened"
        );
        Ok(Self::new(config, pool, sink, cancel))
    }

    /// Wrap an already-open pool.
    pub fn new(
        config: &DatasourceConfig,
        pool: DbPool,
        sink: Arc<dyn SqlLogSink>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name: config.name.to_lowercase(),
            pool,
            logger: TraceLogger::for_datasource(config, sink),
            timezone: config.timezone,
            query_timeout: config.query_timeout(),
            cancel,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn logger(&self) -> &TraceLogger {
        &self.logger
    }

    pub fn timezone(&self) -> Timezone {
        self.timezone
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Token that cancels every in-flight statement on this datasource.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Current time in the datasource's timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.timezone.now()
    }

    pub async fn close(&self) {
        info!(datasource = %self.name, "Closing datasource");
        self.pool.close().await;
    }
}

/// Session annotations, applied in order. Later options override earlier ones.
#[derive(Debug, Clone)]
pub enum SessionOption {
    /// Select a datasource by name; empty means `default`.
    UseDb(String),
    /// Prefix every log line with `[<id>] `. Empty IDs are ignored.
    TraceId(String),
    /// Extra frames to skip when resolving the log call site. Zero is ignored.
    CallerSkip(usize),
    /// Per-statement timeout for this session.
    Timeout(Duration),
    /// Additional cancellation signal for this session's statements.
    CancelOn(CancellationToken),
    /// Override the datasource's logger level.
    LogLevel(LogLevel),
}

pub fn use_db(name: impl Into<String>) -> SessionOption {
    SessionOption::UseDb(name.into())
}

pub fn trace_id(trace_id: impl Into<String>) -> SessionOption {
    SessionOption::TraceId(trace_id.into())
}

pub fn caller_skip(skip: usize) -> SessionOption {
    SessionOption::CallerSkip(skip)
}

pub fn timeout(timeout: Duration) -> SessionOption {
    SessionOption::Timeout(timeout)
}

pub fn cancel_on(token: CancellationToken) -> SessionOption {
    SessionOption::CancelOn(token)
}

pub fn log_level(level: LogLevel) -> SessionOption {
    SessionOption::LogLevel(level)
}

/// Log every statement of this session.
pub fn debug() -> SessionOption {
    SessionOption::LogLevel(LogLevel::Info)
}

#[derive(Debug, Default)]
struct SessionSettings {
    db: String,
    trace: TraceContext,
    timeout: Option<Duration>,
    cancel_on: Option<CancellationToken>,
    level: Option<LogLevel>,
}

impl SessionSettings {
    fn apply(&mut self, option: SessionOption) {
        match option {
            SessionOption::UseDb(name) => self.db = name,
            SessionOption::TraceId(id) => {
                if !id.is_empty() {
                    self.trace.trace_id = Some(id);
                }
            }
            SessionOption::CallerSkip(skip) => {
                if skip > 0 {
                    self.trace.caller_skip = skip;
                }
            }
            SessionOption::Timeout(timeout) => self.timeout = Some(timeout),
            SessionOption::CancelOn(token) => self.cancel_on = Some(token),
            SessionOption::LogLevel(level) => self.level = Some(level),
        }
    }
}

/// Name-to-datasource map with a distinguished default entry.
#[derive(Debug, Default)]
pub struct DatasourceRegistry {
    entries: HashMap<String, Arc<Datasource>>,
    default: Option<Arc<Datasource>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `datasource` under the lower-cased `name`. The last registration wins.
    pub fn register(&mut self, name: &str, datasource: Datasource) -> Arc<Datasource> {
        let name = name.to_lowercase();
        let datasource = Arc::new(datasource);
        if name == DEFAULT_DATASOURCE {
            self.default = Some(Arc::clone(&datasource));
        }
        self.entries.insert(name, Arc::clone(&datasource));
        datasource
    }

    /// Look up a datasource; an empty name or `default` selects the default one.
    ///
    /// Misses are programming errors (see [`DbError::is_programming_error`]).
    pub fn resolve(&self, name: &str) -> DbResult<Arc<Datasource>> {
        if name.is_empty() || name.eq_ignore_ascii_case(DEFAULT_DATASOURCE) {
            return self.default.clone().ok_or(DbError::NoDefaultDatasource);
        }
        self.entries
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| DbError::datasource_not_configured(name))
    }

    /// A context-bound session built from `options`.
    pub fn session(
        &self,
        options: impl IntoIterator<Item = SessionOption>,
    ) -> DbResult<Session> {
        let mut settings = SessionSettings::default();
        for option in options {
            settings.apply(option);
        }
        let datasource = self.resolve(&settings.db)?;
        let logger = match settings.level {
            Some(level) => datasource.logger().with_level(level),
            None => datasource.logger().clone(),
        };
        let timeout = settings.timeout.unwrap_or(datasource.query_timeout());
        Ok(Session::new(
            datasource,
            settings.trace,
            logger,
            timeout,
            settings.cancel_on,
        ))
    }

    pub fn default_datasource(&self) -> Option<&Arc<Datasource>> {
        self.default.as_ref()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close every pool.
    pub async fn close_all(&self) {
        for name in self.names() {
            if let Some(datasource) = self.entries.get(&name) {
                datasource.close().await;
            }
        }
        info!("All datasources closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::logger::MemorySink;

    async fn sqlite_datasource(name: &str) -> Datasource {
        let config = DatasourceConfig::new(name, DatabaseType::SQLite, "sqlite::memory:");
        Datasource::open(&config, Arc::new(MemorySink::new()), CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_default_only_registry() {
        let mut registry = DatasourceRegistry::new();
        registry.register("default", sqlite_datasource("default").await);

        assert!(registry.resolve("").is_ok());
        assert!(registry.resolve("default").is_ok());
        assert!(registry.resolve("DEFAULT").is_ok());

        let err = registry.resolve("reporting").unwrap_err();
        assert!(err.is_programming_error());
        assert_eq!(err.to_string(), "No such datasource 'reporting' configured");
    }

    #[tokio::test]
    async fn test_missing_default() {
        let mut registry = DatasourceRegistry::new();
        registry.register("audit", sqlite_datasource("audit").await);
        assert!(matches!(
            registry.resolve(""),
            Err(DbError::NoDefaultDatasource)
        ));
        assert!(registry.resolve("AUDIT").is_ok());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let mut registry = DatasourceRegistry::new();
        let first = registry.register("Audit", sqlite_datasource("audit").await);
        let second = registry.register("audit", sqlite_datasource("audit").await);
        assert_eq!(registry.len(), 1);
        let resolved = registry.resolve("audit").unwrap();
        assert!(Arc::ptr_eq(&resolved, &second));
        assert!(!Arc::ptr_eq(&resolved, &first));
    }

    #[tokio::test]
    async fn test_session_options_apply_in_order() {
        let mut registry = DatasourceRegistry::new();
        registry.register("default", sqlite_datasource("default").await);
        registry.register("audit", sqlite_datasource("audit").await);

        let session = registry
            .session([
                use_db("missing"),
                use_db("audit"),
                trace_id("abc"),
                trace_id(""),
                caller_skip(2),
                caller_skip(0),
                timeout(Duration::from_secs(3)),
                debug(),
            ])
            .unwrap();
        assert_eq!(session.datasource().name(), "audit");
        assert_eq!(session.trace_context().trace_id.as_deref(), Some("abc"));
        assert_eq!(session.trace_context().caller_skip, 2);
        assert_eq!(session.timeout(), Duration::from_secs(3));
        assert_eq!(session.logger().level(), LogLevel::Info);

        let plain = registry.session([]).unwrap();
        assert_eq!(plain.datasource().name(), "default");
        assert_eq!(plain.logger().level(), LogLevel::Warn);
        assert_eq!(plain.timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_concurrent_resolve() {
        let mut registry = DatasourceRegistry::new();
        registry.register("default", sqlite_datasource("default").await);
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let session = registry.session([trace_id(format!("req-{i}"))]).unwrap();
                    session.trace_context().trace_id.clone()
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), Some(format!("req-{i}")));
        }
    }
}
