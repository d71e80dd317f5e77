//! Database access layer.
//!
//! This module provides:
//! - Connection pools per backend and the dispatch macro over them
//! - Statement building and parameter binding
//! - The SQL trace logger
//! - The datasource registry and context-bound sessions
//! - The pagination query engine

#[macro_use]
pub mod macros;
pub mod logger;
pub mod pager;
pub mod params;
pub mod pool;
pub mod registry;
pub mod session;
pub mod statement;

pub use logger::{
    CallSiteResolver, LogLevel, MemorySink, SqlLogSink, TraceContext, TraceLogger,
    TraceLoggerConfig, TracingSink,
};
pub use pager::{PageQuery, Paginator, Record, Table, paginate};
pub use params::SqlValue;
pub use pool::{DbPool, open_pool};
pub use registry::{Datasource, DatasourceRegistry, SessionOption};
pub use session::{DbRow, Session};
pub use statement::{SqlBuilder, Statement};
