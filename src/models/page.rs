//! Page request and response models.
//!
//! These are the wire-facing types of list endpoints. Field names use camelCase
//! (`page`, `pageSize`, `begin`, `end`, `key`, `orderBy`, `order`).

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};

/// Page number used when the request leaves it unset or non-positive.
pub const DEFAULT_PAGE: i64 = 1;

/// Page size used when the request leaves it unset or non-positive.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Sort direction for the `orderBy` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "ASC", alias = "asc")]
    Asc,
    #[serde(rename = "DESC", alias = "desc")]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl std::fmt::Display for SortOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A normalized list request.
///
/// Accessors (`page()`, `page_size()`, ...) apply the defaults; the raw fields keep
/// whatever the client sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageRequest {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Inclusive lower bound, Unix seconds. 0 means unbounded.
    pub begin: i64,
    /// Inclusive upper bound, Unix seconds.
    pub end: Option<i64>,
    /// Fuzzy-match token; empty disables the keyword filter.
    pub key: String,
    /// Logical column alias; must be in the endpoint's allow-list.
    pub order_by: String,
    pub order: Option<SortOrder>,
}

impl PageRequest {
    /// Check the request before it reaches the query engine.
    pub fn validate(&self) -> DbResult<()> {
        if self.begin < 0 {
            return Err(DbError::invalid_input(format!(
                "begin must be >= 0, got {}",
                self.begin
            )));
        }
        if let Some(end) = self.end {
            if end < self.begin {
                return Err(DbError::invalid_input(format!(
                    "end ({}) must not be earlier than begin ({})",
                    end, self.begin
                )));
            }
        }
        if (self.page() - 1).checked_mul(self.page_size()).is_none() {
            return Err(DbError::invalid_input(format!(
                "page {} with pageSize {} is out of range",
                self.page(),
                self.page_size()
            )));
        }
        Ok(())
    }

    pub fn page(&self) -> i64 {
        match self.page {
            Some(page) if page > 0 => page,
            _ => DEFAULT_PAGE,
        }
    }

    pub fn page_size(&self) -> i64 {
        match self.page_size {
            Some(size) if size > 0 => size,
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    pub fn begin(&self) -> i64 {
        self.begin.max(0)
    }

    pub fn end(&self) -> i64 {
        match self.end {
            Some(end) if end > 0 => end,
            _ => 0,
        }
    }

    pub fn order(&self) -> SortOrder {
        self.order.unwrap_or_default()
    }

    /// Rows skipped before this page. Saturates; `validate` rejects the overflow.
    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.page_size())
    }

    pub fn limit(&self) -> i64 {
        self.page_size()
    }

    /// Empty response echoing the effective page and page size.
    pub fn build_response<R>(&self, results: Vec<R>) -> PageResponse<R> {
        PageResponse {
            total: 0,
            page: self.page(),
            page_size: self.page_size(),
            results,
        }
    }
}

/// One page of results plus the unpaginated match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<R> {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<R>,
}

impl<R> PageResponse<R> {
    /// Map every result, keeping the paging fields.
    pub fn map<V>(self, f: impl FnMut(R) -> V) -> PageResponse<V> {
        PageResponse {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}
