//! Data models for dbkit.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod page;

// Re-export commonly used types
pub use connection::{
    DEFAULT_DATASOURCE, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_SLOW_THRESHOLD_MS, DatabaseType,
    DatasourceConfig, Timezone,
};
pub use page::{DEFAULT_PAGE, DEFAULT_PAGE_SIZE, PageRequest, PageResponse, SortOrder};
