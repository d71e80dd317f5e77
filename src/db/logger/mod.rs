//! SQL trace logging.
//!
//! Every executed statement is reported to a [`TraceLogger`], which classifies it into
//! at most one record:
//!
//! 1. an error record when the statement failed (record-not-found may be suppressed),
//! 2. otherwise a slow-query warning when it ran longer than the slow threshold,
//! 3. otherwise an info record when the logger level is [`LogLevel::Info`].
//!
//! Records are split into physical lines, each prefixed with `[<traceId>] ` when the
//! session carries a trace ID, and handed to a [`SqlLogSink`].

mod callsite;
mod sink;
mod template;

pub use callsite::{BASE_SKIP, BacktraceFrames, CallSiteResolver, Frame, FrameSource, MAX_DEPTH};
pub use sink::{MemorySink, SQL_LOG_TARGET, SqlLogSink, TracingSink};

use crate::db::statement::Statement;
use crate::error::DbError;
use crate::models::{DatabaseType, DatasourceConfig};
use std::sync::Arc;
use std::time::Duration;
use template::{Templates, TraceFields};

/// Severity threshold of a [`TraceLogger`]. Higher levels let more records through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum LogLevel {
    Silent = 1,
    Error = 2,
    #[default]
    Warn = 3,
    Info = 4,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// Per-session annotations carried into every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: Option<String>,
    /// Extra frames to skip when resolving the call site.
    pub caller_skip: usize,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty IDs are ignored.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        if !trace_id.is_empty() {
            self.trace_id = Some(trace_id);
        }
        self
    }

    pub fn with_caller_skip(mut self, caller_skip: usize) -> Self {
        if caller_skip > 0 {
            self.caller_skip = caller_skip;
        }
        self
    }

    fn prefix(&self) -> String {
        match &self.trace_id {
            Some(id) => format!("[{id}] "),
            None => String::new(),
        }
    }
}

/// Logger settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLoggerConfig {
    pub level: LogLevel,
    pub slow_threshold: Duration,
    pub colorful: bool,
    pub ignore_record_not_found: bool,
    /// Log statements with placeholders instead of inlined literals.
    pub parameterized_queries: bool,
}

impl Default for TraceLoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            slow_threshold: Duration::from_millis(crate::models::DEFAULT_SLOW_THRESHOLD_MS),
            colorful: true,
            ignore_record_not_found: false,
            parameterized_queries: false,
        }
    }
}

impl From<&DatasourceConfig> for TraceLoggerConfig {
    fn from(config: &DatasourceConfig) -> Self {
        Self {
            level: if config.debug {
                LogLevel::Info
            } else {
                LogLevel::Warn
            },
            slow_threshold: config.slow_threshold(),
            colorful: config.colorful_or_default(),
            ..Self::default()
        }
    }
}

/// Turns statement completions into leveled, call-site annotated log lines.
#[derive(Clone)]
pub struct TraceLogger {
    config: TraceLoggerConfig,
    templates: Templates,
    resolver: Arc<CallSiteResolver>,
    sink: Arc<dyn SqlLogSink>,
}

impl std::fmt::Debug for TraceLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceLogger")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl TraceLogger {
    pub fn new(config: TraceLoggerConfig, sink: Arc<dyn SqlLogSink>) -> Self {
        Self {
            templates: Templates::new(config.colorful),
            config,
            resolver: Arc::new(CallSiteResolver::default()),
            sink,
        }
    }

    pub fn for_datasource(config: &DatasourceConfig, sink: Arc<dyn SqlLogSink>) -> Self {
        Self::new(TraceLoggerConfig::from(config), sink)
    }

    pub fn with_resolver(mut self, resolver: CallSiteResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn config(&self) -> &TraceLoggerConfig {
        &self.config
    }

    pub fn level(&self) -> LogLevel {
        self.config.level
    }

    /// A copy of this logger at a different level.
    pub fn with_level(&self, level: LogLevel) -> Self {
        let mut logger = self.clone();
        logger.config.level = level;
        logger
    }

    pub fn info(&self, ctx: &TraceContext, msg: &str) {
        if self.config.level >= LogLevel::Info {
            let record = self.templates.info(&self.caller(ctx), msg);
            self.printf(ctx, LogLevel::Info, &record);
        }
    }

    pub fn warn(&self, ctx: &TraceContext, msg: &str) {
        if self.config.level >= LogLevel::Warn {
            let record = self.templates.warn(&self.caller(ctx), msg);
            self.printf(ctx, LogLevel::Warn, &record);
        }
    }

    pub fn error(&self, ctx: &TraceContext, msg: &str) {
        if self.config.level >= LogLevel::Error {
            let record = self.templates.error(&self.caller(ctx), msg);
            self.printf(ctx, LogLevel::Error, &record);
        }
    }

    /// Report one completed statement.
    ///
    /// `fc` yields the statement text and the affected/returned row count (-1 when
    /// unknown); it is only called when a record is emitted.
    pub fn trace<F>(&self, ctx: &TraceContext, elapsed: Duration, err: Option<&DbError>, fc: F)
    where
        F: FnOnce() -> (String, i64),
    {
        let level = self.config.level;
        if level <= LogLevel::Silent {
            return;
        }
        let elapsed_ms = elapsed.as_nanos() as f64 / 1e6;
        let threshold = self.config.slow_threshold;

        match err {
            Some(err)
                if level >= LogLevel::Error
                    && (!err.is_record_not_found() || !self.config.ignore_record_not_found) =>
            {
                let (sql, rows) = fc();
                let caller = self.caller(ctx);
                let rows = rows_str(rows);
                let record = self.templates.trace_error(
                    &err.to_string(),
                    TraceFields {
                        caller: &caller,
                        elapsed_ms,
                        rows: &rows,
                        sql: &sql,
                    },
                );
                self.printf(ctx, LogLevel::Error, &record);
            }
            _ if elapsed > threshold && !threshold.is_zero() && level >= LogLevel::Warn => {
                let (sql, rows) = fc();
                let caller = self.caller(ctx);
                let rows = rows_str(rows);
                let slow = format!("SLOW SQL >= {threshold:?}");
                let record = self.templates.trace_warn(
                    &slow,
                    TraceFields {
                        caller: &caller,
                        elapsed_ms,
                        rows: &rows,
                        sql: &sql,
                    },
                );
                self.printf(ctx, LogLevel::Warn, &record);
            }
            _ if level == LogLevel::Info => {
                let (sql, rows) = fc();
                let caller = self.caller(ctx);
                let rows = rows_str(rows);
                let record = self.templates.trace(TraceFields {
                    caller: &caller,
                    elapsed_ms,
                    rows: &rows,
                    sql: &sql,
                });
                self.printf(ctx, LogLevel::Info, &record);
            }
            _ => {}
        }
    }

    /// Statement text as it appears in records.
    pub fn render_sql(&self, statement: &Statement, db_type: DatabaseType) -> String {
        if self.config.parameterized_queries {
            statement.sql.clone()
        } else {
            statement.explain(db_type)
        }
    }

    fn caller(&self, ctx: &TraceContext) -> String {
        self.resolver.resolve(ctx.caller_skip)
    }

    fn printf(&self, ctx: &TraceContext, level: LogLevel, record: &str) {
        let prefix = ctx.prefix();
        for line in record.split('\n') {
            self.sink.emit(level, &format!("{prefix}{line}"));
        }
    }
}

fn rows_str(rows: i64) -> String {
    if rows == -1 {
        "-".to_string()
    } else {
        rows.to_string()
    }
}
