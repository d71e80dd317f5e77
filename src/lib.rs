//! dbkit
//!
//! Named, pooled SQL datasources (PostgreSQL, SQLite) with call-site annotated SQL
//! trace logging and a pagination query engine for list endpoints.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod module;

pub use config::Config;
pub use db::{DatasourceRegistry, Paginator, Session, SqlValue, Statement, Table};
pub use error::{DbError, DbResult};
pub use models::{PageRequest, PageResponse};
pub use module::{DbModule, run_until_cancelled};
