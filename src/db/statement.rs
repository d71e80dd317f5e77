//! SQL statement assembly.
//!
//! [`SqlBuilder`] accumulates SQL text and bound values, writing placeholders in the
//! dialect of the target backend (`$1, $2, ...` for PostgreSQL, `?` for SQLite).
//! Caller-supplied fragments always use `?`; they are rewritten on the way in.

use crate::db::params::SqlValue;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;

/// A finished SQL statement and its bound values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }

    /// The statement text with bound values substituted as literals.
    ///
    /// For log output only; the executed statement always keeps its placeholders.
    pub fn explain(&self, db_type: DatabaseType) -> String {
        let mut out = String::with_capacity(self.sql.len());
        let mut in_quote = false;
        let mut chars = self.sql.chars().peekable();
        let mut next = 0usize;
        while let Some(c) = chars.next() {
            match c {
                '\'' => {
                    in_quote = !in_quote;
                    out.push(c);
                }
                '?' if !in_quote && db_type == DatabaseType::SQLite => {
                    match self.params.get(next) {
                        Some(value) => out.push_str(&value.to_literal()),
                        None => out.push(c),
                    }
                    next += 1;
                }
                '$' if !in_quote
                    && db_type == DatabaseType::PostgreSQL
                    && chars.peek().is_some_and(|d| d.is_ascii_digit()) =>
                {
                    let mut digits = String::new();
                    while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                        digits.push(d);
                        chars.next();
                    }
                    let index = digits.parse::<usize>().unwrap_or(0);
                    match index.checked_sub(1).and_then(|i| self.params.get(i)) {
                        Some(value) => out.push_str(&value.to_literal()),
                        None => {
                            out.push('$');
                            out.push_str(&digits);
                        }
                    }
                }
                _ => out.push(c),
            }
        }
        out
    }
}

/// Incremental statement builder with dialect-aware placeholders.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    db_type: DatabaseType,
    sql: String,
    params: Vec<SqlValue>,
}

impl SqlBuilder {
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Append raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append one placeholder bound to `value`.
    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.params.push(value.into());
        match self.db_type {
            DatabaseType::PostgreSQL => {
                self.sql.push('$');
                self.sql.push_str(&self.params.len().to_string());
            }
            DatabaseType::SQLite => self.sql.push('?'),
        }
        self
    }

    /// Append a fragment written with `?` placeholders, binding `params` in order.
    ///
    /// Question marks inside single-quoted literals are left alone. The number of
    /// placeholders must match the number of values.
    pub fn push_fragment(&mut self, fragment: &str, params: &[SqlValue]) -> DbResult<&mut Self> {
        let placeholders = count_placeholders(fragment);
        if placeholders != params.len() {
            return Err(DbError::invalid_input(format!(
                "SQL fragment '{}' has {} placeholder(s) but {} value(s)",
                fragment,
                placeholders,
                params.len()
            )));
        }
        let mut in_quote = false;
        let mut values = params.iter();
        for c in fragment.chars() {
            match c {
                '\'' => {
                    in_quote = !in_quote;
                    self.sql.push(c);
                }
                '?' if !in_quote => {
                    if let Some(value) = values.next() {
                        self.push_bind(value.clone());
                    }
                }
                _ => self.sql.push(c),
            }
        }
        Ok(self)
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn build(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn count_placeholders(fragment: &str) -> usize {
    let mut in_quote = false;
    let mut count = 0;
    for c in fragment.chars() {
        match c {
            '\'' => in_quote = !in_quote,
            '?' if !in_quote => count += 1,
            _ => {}
        }
    }
    count
}
