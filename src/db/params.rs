//! Parameter binding utilities for database queries.
//!
//! Statements carry their bound values as [`SqlValue`]s; this module turns them into
//! backend-specific argument buffers and renders them as SQL literals for logs.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use sqlx::Arguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<FixedOffset>),
}

impl SqlValue {
    /// Render as a SQL literal for log output. Never used to build executed SQL.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Text(v) => format!("'{}'", v.replace('\'', "''")),
            Self::Timestamp(v) => format!("'{}'", v.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

fn bind_error(err: sqlx::error::BoxDynError) -> DbError {
    DbError::internal(format!("Failed to bind parameter: {err}"))
}

/// Build PostgreSQL arguments for a parameter list.
pub(crate) fn postgres_arguments(params: &[SqlValue]) -> DbResult<PgArguments> {
    let mut args = PgArguments::default();
    for param in params {
        let bound = match param {
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Bool(v) => args.add(*v),
            SqlValue::Int(v) => args.add(*v),
            SqlValue::Float(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::Timestamp(v) => args.add(*v),
        };
        bound.map_err(bind_error)?;
    }
    Ok(args)
}

/// Build SQLite arguments for a parameter list.
pub(crate) fn sqlite_arguments<'q>(params: &[SqlValue]) -> DbResult<SqliteArguments<'q>> {
    let mut args = SqliteArguments::default();
    for param in params {
        let bound = match param {
            SqlValue::Null => args.add(None::<String>),
            SqlValue::Bool(v) => args.add(*v),
            SqlValue::Int(v) => args.add(*v),
            SqlValue::Float(v) => args.add(*v),
            SqlValue::Text(v) => args.add(v.clone()),
            SqlValue::Timestamp(v) => args.add(*v),
        };
        bound.map_err(bind_error)?;
    }
    Ok(args)
}
