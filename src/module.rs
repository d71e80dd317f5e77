//! Module lifecycle: bind configuration, open datasources, migrate, serve, close.

use crate::config::Config;
use crate::db::logger::{SqlLogSink, TracingSink};
use crate::db::registry::{Datasource, DatasourceRegistry};
use crate::error::{DbError, DbResult};
use crate::models::DatasourceConfig;
use futures_util::future::BoxFuture;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Migration callback, run once after every datasource is open.
pub type MigrateFn =
    Box<dyn FnOnce(Arc<DatasourceRegistry>) -> BoxFuture<'static, DbResult<()>> + Send>;

pub struct DbModule {
    configs: Vec<DatasourceConfig>,
    migrator: Option<MigrateFn>,
    cancel: CancellationToken,
    sink: Arc<dyn SqlLogSink>,
}

impl std::fmt::Debug for DbModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbModule")
            .field(
                "datasources",
                &self.configs.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("has_migrator", &self.migrator.is_some())
            .finish_non_exhaustive()
    }
}

impl DbModule {
    pub fn new(configs: Vec<DatasourceConfig>) -> Self {
        Self {
            configs,
            migrator: None,
            cancel: CancellationToken::new(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Bind the datasources described by the command line and settings file.
    pub fn from_config(config: &Config) -> DbResult<Self> {
        let configs = config
            .bind_datasources()
            .map_err(|e| DbError::startup("bind config", e))?;
        Ok(Self::new(configs))
    }

    /// Register the migration callback. A later call replaces an earlier one.
    pub fn setup_migrate<F>(mut self, migrate: F) -> Self
    where
        F: FnOnce(Arc<DatasourceRegistry>) -> BoxFuture<'static, DbResult<()>> + Send + 'static,
    {
        self.migrator = Some(Box::new(migrate));
        self
    }

    /// Lifecycle token; cancelling it aborts in-flight statements on every datasource.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn SqlLogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open every datasource, register it and run the migration.
    ///
    /// Any failure aborts startup; datasources opened so far are closed again.
    pub async fn start(self) -> DbResult<Arc<DatasourceRegistry>> {
        if self.configs.is_empty() {
            return Err(DbError::startup(
                "bind config",
                DbError::config("no valid db config found"),
            ));
        }

        let mut registry = DatasourceRegistry::new();
        for config in &self.configs {
            let stage = format!("open datasource '{}'", config.name);
            match Datasource::open(config, Arc::clone(&self.sink), self.cancel.child_token()).await
            {
                Ok(datasource) => {
                    registry.register(&config.name, datasource);
                }
                Err(e) => {
                    error!(datasource = %config.name, error = %e, "Failed to open datasource");
                    registry.close_all().await;
                    return Err(DbError::startup(stage, e));
                }
            }
        }
        let registry = Arc::new(registry);

        if let Some(migrate) = self.migrator {
            info!("Running migration");
            if let Err(e) = migrate(Arc::clone(&registry)).await {
                error!(error = %e, "Migration failed");
                registry.close_all().await;
                return Err(DbError::startup("migrate", e));
            }
        }

        info!(datasources = ?registry.names(), "Database module started");
        Ok(registry)
    }
}

/// Hold the datasources until `cancel` fires, then close every pool.
pub async fn run_until_cancelled(registry: Arc<DatasourceRegistry>, cancel: CancellationToken) {
    cancel.cancelled().await;
    info!("Shutting down database module");
    registry.close_all().await;
}
