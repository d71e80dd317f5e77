//! Context-bound sessions.
//!
//! A [`Session`] is what application code executes statements through. It pins one
//! datasource together with the caller's trace annotations, timeout and cancellation
//! signal. Sessions are cheap to create and never share mutable state, so concurrent
//! callers cannot see each other's trace IDs.

use crate::db::logger::{TraceContext, TraceLogger};
use crate::db::params::{postgres_arguments, sqlite_arguments};
use crate::db::registry::Datasource;
use crate::db::statement::Statement;
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, Timezone};
use chrono::{DateTime, FixedOffset};
use sqlx::FromRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A row type decodable from both backends.
pub trait DbRow:
    for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin
{
}

impl<T> DbRow for T where
    T: for<'r> FromRow<'r, PgRow> + for<'r> FromRow<'r, SqliteRow> + Send + Unpin
{
}

#[derive(Debug, Clone)]
pub struct Session {
    datasource: Arc<Datasource>,
    trace: TraceContext,
    logger: TraceLogger,
    timeout: Duration,
    cancel_on: Option<CancellationToken>,
}

impl Session {
    pub(crate) fn new(
        datasource: Arc<Datasource>,
        trace: TraceContext,
        logger: TraceLogger,
        timeout: Duration,
        cancel_on: Option<CancellationToken>,
    ) -> Self {
        Self {
            datasource,
            trace,
            logger,
            timeout,
            cancel_on,
        }
    }

    pub fn datasource(&self) -> &Arc<Datasource> {
        &self.datasource
    }

    pub fn db_type(&self) -> DatabaseType {
        self.datasource.db_type()
    }

    pub fn timezone(&self) -> Timezone {
        self.datasource.timezone()
    }

    /// Current time in the datasource's timezone.
    pub fn now(&self) -> DateTime<FixedOffset> {
        self.datasource.now()
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace
    }

    pub fn logger(&self) -> &TraceLogger {
        &self.logger
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&self, statement: &Statement) -> DbResult<u64> {
        let fut = async {
            let done = impl_db_dispatch!(self.datasource.pool(), {
                Postgres(pool) => sqlx::query_with(&statement.sql, postgres_arguments(&statement.params)?)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected()),
                SQLite(pool) => sqlx::query_with(&statement.sql, sqlite_arguments(&statement.params)?)
                    .execute(pool)
                    .await
                    .map(|r| r.rows_affected()),
            });
            done.map_err(DbError::from)
        };
        self.run("execute", statement, fut, |rows| {
            i64::try_from(*rows).unwrap_or(i64::MAX)
        })
        .await
    }

    /// Fetch every row.
    pub async fn fetch_all<T: DbRow>(&self, statement: &Statement) -> DbResult<Vec<T>> {
        let fut = async {
            let rows = impl_db_dispatch!(self.datasource.pool(), {
                Postgres(pool) => sqlx::query_as_with::<_, T, _>(&statement.sql, postgres_arguments(&statement.params)?)
                    .fetch_all(pool)
                    .await,
                SQLite(pool) => sqlx::query_as_with::<_, T, _>(&statement.sql, sqlite_arguments(&statement.params)?)
                    .fetch_all(pool)
                    .await,
            });
            rows.map_err(DbError::from)
        };
        self.run("fetch_all", statement, fut, |rows| rows.len() as i64)
            .await
    }

    /// Fetch exactly one row; an empty result is [`DbError::RecordNotFound`].
    pub async fn fetch_one<T: DbRow>(&self, statement: &Statement) -> DbResult<T> {
        let fut = async {
            let row = impl_db_dispatch!(self.datasource.pool(), {
                Postgres(pool) => sqlx::query_as_with::<_, T, _>(&statement.sql, postgres_arguments(&statement.params)?)
                    .fetch_one(pool)
                    .await,
                SQLite(pool) => sqlx::query_as_with::<_, T, _>(&statement.sql, sqlite_arguments(&statement.params)?)
                    .fetch_one(pool)
                    .await,
            });
            row.map_err(DbError::from)
        };
        self.run("fetch_one", statement, fut, |_| 1).await
    }

    /// Fetch a single integer, typically `COUNT(*)`.
    pub async fn fetch_count(&self, statement: &Statement) -> DbResult<i64> {
        let fut = async {
            let count = impl_db_dispatch!(self.datasource.pool(), {
                Postgres(pool) => sqlx::query_scalar_with::<_, i64, _>(&statement.sql, postgres_arguments(&statement.params)?)
                    .fetch_one(pool)
                    .await,
                SQLite(pool) => sqlx::query_scalar_with::<_, i64, _>(&statement.sql, sqlite_arguments(&statement.params)?)
                    .fetch_one(pool)
                    .await,
            });
            count.map_err(DbError::from)
        };
        self.run("fetch_count", statement, fut, |_| 1).await
    }

    /// Drive `fut` under the session's timeout and cancellation, then report it.
    async fn run<T, F>(
        &self,
        operation: &'static str,
        statement: &Statement,
        fut: F,
        rows_of: impl FnOnce(&T) -> i64,
    ) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        let start = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.datasource.cancellation_token().cancelled() => {
                Err(DbError::cancelled(operation))
            }
            _ = cancelled(self.cancel_on.as_ref()) => {
                Err(DbError::cancelled(operation))
            }
            outcome = tokio::time::timeout(self.timeout, fut) => match outcome {
                Ok(result) => result,
                Err(_) => Err(DbError::timeout(operation, self.timeout)),
            },
        };
        let elapsed = start.elapsed();

        let rows = match &result {
            Ok(value) => rows_of(value),
            Err(_) => -1,
        };
        self.logger
            .trace(&self.trace, elapsed, result.as_ref().err(), || {
                (self.logger.render_sql(statement, self.db_type()), rows)
            });
        result
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::logger::{LogLevel, MemorySink};
    use crate::db::registry::{DatasourceRegistry, cancel_on, debug, timeout, trace_id};
    use crate::models::DatasourceConfig;

    #[derive(Debug, sqlx::FromRow, PartialEq)]
    struct Item {
        id: i64,
        name: String,
    }

    async fn registry(sink: Arc<MemorySink>) -> DatasourceRegistry {
        let mut config = DatasourceConfig::new("default", DatabaseType::SQLite, "sqlite::memory:");
        config.colorful = Some(false);
        let datasource = Datasource::open(&config, sink, CancellationToken::new())
            .await
            .unwrap();
        let mut registry = DatasourceRegistry::new();
        registry.register("default", datasource);
        registry
    }

    #[tokio::test]
    async fn test_execute_and_fetch() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone()).await;
        let session = registry.session([]).unwrap();

        session
            .execute(&Statement::new(
                "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
            ))
            .await
            .unwrap();
        let inserted = session
            .execute(
                &Statement::new("INSERT INTO items (id, name) VALUES (?, ?), (?, ?)")
                    .bind(1i64)
                    .bind("a")
                    .bind(2i64)
                    .bind("b"),
            )
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let items: Vec<Item> = session
            .fetch_all(&Statement::new("SELECT id, name FROM items ORDER BY id"))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "b");

        let count = session
            .fetch_count(&Statement::new("SELECT COUNT(*) FROM items"))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let one: Item = session
            .fetch_one(&Statement::new("SELECT id, name FROM items WHERE id = ?").bind(2i64))
            .await
            .unwrap();
        assert_eq!(one, Item { id: 2, name: "b".to_string() });

        // Fast statements at the default level stay quiet.
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_one_missing_is_logged_as_error() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone()).await;
        let session = registry.session([trace_id("req-9")]).unwrap();
        session
            .execute(&Statement::new("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT)"))
            .await
            .unwrap();

        let result: DbResult<Item> = session
            .fetch_one(&Statement::new("SELECT id, name FROM items WHERE id = ?").bind(7i64))
            .await;
        assert!(matches!(result, Err(DbError::RecordNotFound)));

        let lines = sink.lines_at(LogLevel::Error);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("[req-9] "));
        assert!(lines[0].ends_with("Record not found"));
        assert!(lines[1].ends_with("[rows:-] SELECT id, name FROM items WHERE id = 7"));
    }

    #[tokio::test]
    async fn test_debug_session_logs_every_statement() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink.clone()).await;
        let session = registry.session([debug()]).unwrap();
        session
            .fetch_count(&Statement::new("SELECT ?").bind(41i64))
            .await
            .unwrap();
        let lines = sink.lines_at(LogLevel::Info);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("[rows:1] SELECT 41"));
    }

    #[tokio::test]
    async fn test_sub_second_timeout_is_reported_in_millis() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink).await;
        let session = registry
            .session([timeout(Duration::from_millis(1))])
            .unwrap();
        let statement = Statement::new(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 5000000) \
             SELECT COUNT(*) FROM c",
        );
        let err = session.fetch_count(&statement).await.unwrap_err();
        assert_eq!(err.to_string(), "Timeout: fetch_count exceeded 1ms");
    }

    #[tokio::test]
    async fn test_cancelled_session() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink).await;
        let token = CancellationToken::new();
        token.cancel();
        let session = registry.session([cancel_on(token)]).unwrap();
        let result = session.fetch_count(&Statement::new("SELECT 1")).await;
        assert!(matches!(result, Err(DbError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_zero_timeout() {
        let sink = Arc::new(MemorySink::new());
        let registry = registry(sink).await;
        let session = registry.session([timeout(Duration::ZERO)]).unwrap();
        let statement = Statement::new(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 5000000) \
             SELECT COUNT(*) FROM c",
        );
        let result = session.fetch_count(&statement).await;
        let err = result.unwrap_err();
        assert!(matches!(err, DbError::Timeout { .. }));
        assert_eq!(err.to_string(), "Timeout: fetch_count exceeded 0ns");
    }
}
