//! Pagination query engine.
//!
//! A [`Paginator`] collects the per-endpoint settings (time-range column, fuzzy-match
//! columns, the `orderBy` allow-list, extra filters and orderings, a result
//! converter) and turns a [`PageRequest`] into a count statement and a page
//! statement that share one filter set.
//!
//! ```ignore
//! let page = Paginator::<User>::new()
//!     .fuzzy_columns(["name", "email"])
//!     .order_column("name", "name")
//!     .filter("age >= ?", vec![SqlValue::Int(18)])
//!     .convert(UserView::from)
//!     .fetch(&session, &request)
//!     .await?;
//! ```

use crate::db::params::SqlValue;
use crate::db::session::{DbRow, Session};
use crate::db::statement::{SqlBuilder, Statement};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, PageRequest, PageResponse, Timezone};
use std::collections::BTreeMap;
use std::marker::PhantomData;

/// Default column for `begin`/`end` filtering and the default ordering.
pub const DEFAULT_TIME_COLUMN: &str = "created_at";

/// Table identity of a row type.
pub trait Table {
    fn table_name() -> &'static str;

    /// Soft-delete marker column. Rows where it is not NULL are never listed.
    fn deleted_at_column() -> Option<&'static str> {
        None
    }
}

/// A row type that can be paginated.
pub trait Record: Table + DbRow {}

impl<T: Table + DbRow> Record for T {}

/// The two statements of one page lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PageQuery {
    /// Total match count, ignoring limit and offset.
    pub count: Statement,
    /// The requested page.
    pub select: Statement,
}

type Converter<T, R> = Box<dyn Fn(T) -> R + Send + Sync>;

pub struct Paginator<T, R = T> {
    time_column: String,
    fuzzy_columns: Vec<String>,
    order_columns: BTreeMap<String, String>,
    filters: Vec<(String, Vec<SqlValue>)>,
    orders: Vec<String>,
    converter: Converter<T, R>,
    _row: PhantomData<fn() -> T>,
}

impl<T, R> std::fmt::Debug for Paginator<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("time_column", &self.time_column)
            .field("fuzzy_columns", &self.fuzzy_columns)
            .field("order_columns", &self.order_columns)
            .field("filters", &self.filters)
            .field("orders", &self.orders)
            .finish_non_exhaustive()
    }
}

impl<T> Paginator<T> {
    pub fn new() -> Self {
        Self {
            time_column: DEFAULT_TIME_COLUMN.to_string(),
            fuzzy_columns: Vec::new(),
            order_columns: BTreeMap::new(),
            filters: Vec::new(),
            orders: Vec::new(),
            converter: Box::new(|row| row),
            _row: PhantomData,
        }
    }
}

impl<T> Default for Paginator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> Paginator<T, R> {
    /// Column compared against `begin`/`end`; also the default sort column.
    pub fn time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = column.into();
        self
    }

    pub fn fuzzy_column(mut self, column: impl Into<String>) -> Self {
        self.fuzzy_columns.push(column.into());
        self
    }

    /// Replace the fuzzy-match columns.
    pub fn fuzzy_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fuzzy_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Allow `orderBy=<alias>`, sorting by `column`.
    pub fn order_column(mut self, alias: impl Into<String>, column: impl Into<String>) -> Self {
        self.order_columns.insert(alias.into(), column.into());
        self
    }

    /// Replace the `orderBy` allow-list.
    pub fn order_columns<I, A, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, C)>,
        A: Into<String>,
        C: Into<String>,
    {
        self.order_columns = columns
            .into_iter()
            .map(|(alias, column)| (alias.into(), column.into()))
            .collect();
        self
    }

    /// Add a raw condition written with `?` placeholders.
    pub fn filter(mut self, condition: impl Into<String>, params: Vec<SqlValue>) -> Self {
        self.filters.push((condition.into(), params));
        self
    }

    /// Add a raw ordering clause. Not checked against the allow-list.
    pub fn order(mut self, clause: impl Into<String>) -> Self {
        self.orders.push(clause.into());
        self
    }

    /// Map every fetched row through `converter`.
    pub fn convert<V, F>(self, converter: F) -> Paginator<T, V>
    where
        F: Fn(T) -> V + Send + Sync + 'static,
    {
        Paginator {
            time_column: self.time_column,
            fuzzy_columns: self.fuzzy_columns,
            order_columns: self.order_columns,
            filters: self.filters,
            orders: self.orders,
            converter: Box::new(converter),
            _row: PhantomData,
        }
    }

    fn allowed_aliases(&self) -> String {
        self.order_columns
            .keys()
            .map(|alias| format!("'{alias}'"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl<T: Table, R> Paginator<T, R> {
    /// Build the count and page statements for `req`.
    pub fn build(
        &self,
        db_type: DatabaseType,
        timezone: Timezone,
        req: &PageRequest,
    ) -> DbResult<PageQuery> {
        req.validate()?;

        let mut conditions = SqlBuilder::new(db_type);
        let mut first = true;
        let mut and = |b: &mut SqlBuilder| {
            b.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        for (condition, params) in &self.filters {
            and(&mut conditions);
            conditions.push("(");
            conditions.push_fragment(condition, params)?;
            conditions.push(")");
        }
        if let Some(column) = T::deleted_at_column() {
            and(&mut conditions);
            conditions.push(column).push(" IS NULL");
        }
        if req.begin() > 0 {
            and(&mut conditions);
            conditions
                .push(&self.time_column)
                .push(" >= ")
                .push_bind(unix_to_timestamp(timezone, req.begin())?);
        }
        if req.end() > 0 {
            and(&mut conditions);
            conditions
                .push(&self.time_column)
                .push(" <= ")
                .push_bind(unix_to_timestamp(timezone, req.end())?);
        }

        let mut orders = self.orders.clone();
        if req.order_by.is_empty() {
            orders.push(format!("{} DESC", self.time_column));
        } else {
            let column = self.order_columns.get(&req.order_by).ok_or_else(|| {
                DbError::invalid_input(format!(
                    "orderBy '{}' not allowed , must be one of [{}]",
                    req.order_by,
                    self.allowed_aliases()
                ))
            })?;
            orders.push(format!("{} {}", column, req.order()));
        }

        if !req.key.is_empty() && !self.fuzzy_columns.is_empty() {
            and(&mut conditions);
            let pattern = format!("%{}%", req.key);
            conditions.push("(");
            for (i, column) in self.fuzzy_columns.iter().enumerate() {
                if i > 0 {
                    conditions.push(" OR ");
                }
                conditions.push(column).push(" LIKE ").push_bind(pattern.clone());
            }
            conditions.push(")");
        }

        let table = T::table_name();
        let filter = conditions.build();
        let count = Statement {
            sql: format!("SELECT COUNT(*) FROM {}{}", table, filter.sql),
            params: filter.params.clone(),
        };
        let select = Statement {
            sql: format!(
                "SELECT * FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
                table,
                filter.sql,
                orders.join(", "),
                req.limit(),
                req.offset()
            ),
            params: filter.params,
        };
        Ok(PageQuery { count, select })
    }
}

impl<T: Record, R> Paginator<T, R> {
    /// Count the matches, fetch the requested page and convert it.
    ///
    /// Errors from either statement are returned unchanged; no partial page is built.
    pub async fn fetch(&self, session: &Session, req: &PageRequest) -> DbResult<PageResponse<R>> {
        let query = self.build(session.db_type(), session.timezone(), req)?;
        let total = session.fetch_count(&query.count).await?;
        let rows: Vec<T> = session.fetch_all(&query.select).await?;
        let mut response = req.build_response(rows.into_iter().map(&self.converter).collect());
        response.total = total;
        Ok(response)
    }
}

/// Fetch one page of `T` described by `req`.
pub async fn paginate<T: Record, R>(
    session: &Session,
    req: &PageRequest,
    paginator: &Paginator<T, R>,
) -> DbResult<PageResponse<R>> {
    paginator.fetch(session, req).await
}

fn unix_to_timestamp(timezone: Timezone, secs: i64) -> DbResult<SqlValue> {
    timezone
        .from_unix(secs)
        .map(SqlValue::Timestamp)
        .ok_or_else(|| DbError::invalid_input(format!("timestamp {secs} is out of range")))
}
