use dbkit::config::bind_settings;
use dbkit::db::registry::{cancel_on, use_db};
use dbkit::db::{DatasourceRegistry, MemorySink, Statement};
use dbkit::models::{DatabaseType, DatasourceConfig};
use dbkit::{DbError, DbModule, run_until_cancelled};
use futures_util::FutureExt;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

fn memory(name: &str) -> DatasourceConfig {
    DatasourceConfig::new(name, DatabaseType::SQLite, "sqlite::memory:")
}

fn module(configs: Vec<DatasourceConfig>) -> DbModule {
    DbModule::new(configs).with_log_sink(Arc::new(MemorySink::new()))
}

#[tokio::test]
async fn test_resolve_default_only() {
    let registry = module(vec![memory("default")]).start().await.unwrap();

    assert_eq!(registry.names(), vec!["default"]);
    assert!(registry.resolve("").is_ok());
    assert!(registry.resolve("default").is_ok());

    let err = registry.resolve("reporting").unwrap_err();
    assert!(matches!(err, DbError::DatasourceNotConfigured { .. }));
    assert!(err.is_programming_error());

    let err = registry.session([use_db("reporting")]).unwrap_err();
    assert!(err.is_programming_error());
}

#[tokio::test]
async fn test_named_datasources_are_case_insensitive() {
    let registry = module(vec![memory("default"), memory("Audit")])
        .start()
        .await
        .unwrap();
    assert_eq!(registry.names(), vec!["audit", "default"]);

    let a = registry.resolve("AUDIT").unwrap();
    let b = registry.resolve("audit").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.name(), "audit");
}

#[tokio::test]
async fn test_migration_runs_once_after_open() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    let registry = module(vec![memory("default"), memory("audit")])
        .setup_migrate(move |registry: Arc<DatasourceRegistry>| {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(registry.len(), 2);
                let session = registry.session([])?;
                session
                    .execute(&Statement::new(
                        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, name TEXT)",
                    ))
                    .await?;
                Ok::<(), DbError>(())
            }
            .boxed()
        })
        .start()
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let count = registry
        .session([])
        .unwrap()
        .fetch_count(&Statement::new("SELECT COUNT(*) FROM accounts"))
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_migration_failure_aborts_startup() {
    let err = module(vec![memory("default")])
        .setup_migrate(|_registry| async { Err::<(), _>(DbError::internal("schema drift")) }.boxed())
        .start()
        .await
        .unwrap_err();

    match &err {
        DbError::Startup { stage, source } => {
            assert_eq!(stage, "migrate");
            assert!(source.to_string().contains("schema drift"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_settings_tree_start() {
    let configs = bind_settings(&json!({
        "type": "sqlite",
        "dsn": "sqlite::memory:",
        "debug": true,
        "reporting": {
            "type": "sqlite",
            "dsn": "sqlite::memory:",
            "slowThresholdMs": 50
        }
    }))
    .unwrap();

    let registry = module(configs).start().await.unwrap();
    assert_eq!(registry.names(), vec!["default", "reporting"]);
    assert!(registry.resolve("").unwrap().logger().config().level > dbkit::db::LogLevel::Warn);
}

#[tokio::test]
async fn test_shutdown_closes_pools_and_cancels_statements() {
    let cancel = CancellationToken::new();
    let registry = module(vec![memory("default")])
        .with_cancellation(cancel.clone())
        .start()
        .await
        .unwrap();
    let datasource = registry.resolve("").unwrap();
    let session = registry.session([]).unwrap();

    let runner = tokio::spawn(run_until_cancelled(Arc::clone(&registry), cancel.clone()));
    cancel.cancel();
    runner.await.unwrap();

    assert!(datasource.pool().is_closed());
    let err = session
        .fetch_count(&Statement::new("SELECT 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Cancelled { .. }));
}

#[tokio::test]
async fn test_request_cancellation_is_per_session() {
    let registry = module(vec![memory("default")]).start().await.unwrap();

    let request = CancellationToken::new();
    let cancelled = registry.session([cancel_on(request.clone())]).unwrap();
    let other = registry.session([]).unwrap();
    request.cancel();

    let err = cancelled
        .fetch_count(&Statement::new("SELECT 1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Cancelled { .. }));
    assert_eq!(
        other
            .fetch_count(&Statement::new("SELECT 1"))
            .await
            .unwrap(),
        1
    );
}
