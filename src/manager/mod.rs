//! The `DbManager` facade.
//!
//! One explicit context object owns every registry: connections, query
//! templates, operations and the monitor. It is cheap to clone and every clone
//! shares the same state.
//!
//! Facade methods fail soft: they report failures through the monitor and
//! return `false`/`None`. The exceptions are THROW binding mode and `dev_mode`
//! transaction begins, which return `Err`.

mod binder;
mod cursor;
mod execute;
mod maintenance;
mod traits;
mod transaction;

pub use traits::{Binder, ConnectionStore, OperationStore, TransactionController};

/// Traits implemented by [`DbManager`], for callers that want a narrow interface.
pub mod prelude {
    pub use super::traits::{Binder, ConnectionStore, OperationStore, TransactionController};
}

use crate::builder::BuiltQuery;
use crate::db::{
    ConnectionHandle, ConnectionRegistry, Operation, OperationHandle, OperationRegistry,
    PreparedSql, QueryRegistry,
};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, ConnectionInfo};
use crate::monitor::{Mode, Monitor};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Start-up options.
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Require verified TLS for networked engines. Default: true
    pub ssl_force: bool,
    /// Modes applied at start-up, in order
    pub modes: Vec<Mode>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            ssl_force: true,
            modes: Vec::new(),
        }
    }
}

impl ManagerOptions {
    pub fn with_ssl_force(mut self, ssl_force: bool) -> Self {
        self.ssl_force = ssl_force;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.modes.push(mode);
        self
    }
}

struct Inner {
    connections: ConnectionRegistry,
    queries: QueryRegistry,
    operations: OperationRegistry,
    monitor: Monitor,
    started: AtomicBool,
    ssl_force: bool,
}

#[derive(Clone)]
pub struct DbManager {
    inner: Arc<Inner>,
}

impl DbManager {
    /// Start a manager: default modes (LOG, STOP) first, then `options.modes`.
    pub fn new(options: ManagerOptions) -> Self {
        let monitor = Monitor::with_defaults();
        for mode in options.modes {
            monitor.set_mode(mode);
        }
        info!(ssl_force = options.ssl_force, "Database manager started");
        Self {
            inner: Arc::new(Inner {
                connections: ConnectionRegistry::new(),
                queries: QueryRegistry::new(),
                operations: OperationRegistry::new(),
                monitor,
                started: AtomicBool::new(true),
                ssl_force: options.ssl_force,
            }),
        }
    }

    /// Start with default options.
    pub fn prepare() -> Self {
        Self::new(ManagerOptions::default())
    }

    pub fn monitor(&self) -> &Monitor {
        &self.inner.monitor
    }

    pub fn set_mode(&self, mode: Mode) {
        self.inner.monitor.set_mode(mode);
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_started(&self) -> DbResult<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(DbError::not_started("the database manager has been shut down"))
        }
    }

    /// Run `result` through the monitor, turning it into a success flag.
    pub(crate) fn report<T>(&self, context: &str, result: DbResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.inner.monitor.monitor(format!("{}: {}", context, e));
                None
            }
        }
    }

    /// Close every connection, drop every operation and refuse further calls.
    pub async fn shutdown(&self) {
        if !self.inner.started.swap(false, Ordering::AcqRel) {
            return;
        }
        self.inner.operations.clear().await;
        self.inner.connections.close_all().await;
        info!("Database manager stopped");
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Store a connection configuration, replacing any previous one.
    pub async fn define(&self, config: ConnectionConfig) -> bool {
        let id = config.id.clone();
        let result = match self.ensure_started() {
            Ok(()) => Ok(self.inner.connections.define(config).await),
            Err(e) => Err(e),
        };
        self.report(&format!("define {}", id), result).is_some()
    }

    /// Parse `url` (`mysql://`, `postgres://`, `sqlite:`) and define it under `id`.
    pub async fn define_url(&self, id: &str, url: &str) -> bool {
        match ConnectionConfig::from_url(id, url) {
            Ok(config) => self.define(config).await,
            Err(e) => {
                self.inner.monitor.monitor(format!("define {}: {}", id, e));
                false
            }
        }
    }

    pub async fn try_connect(&self, id: &str) -> DbResult<ConnectionHandle> {
        self.ensure_started()?;
        self.inner.connections.connect(id, self.inner.ssl_force).await
    }

    pub async fn connect(&self, id: &str) -> bool {
        self.connect_with_handle(id).await.is_some()
    }

    pub async fn connect_with_handle(&self, id: &str) -> Option<ConnectionHandle> {
        let result = self.try_connect(id).await;
        if result.is_ok() {
            self.inner
                .monitor
                .monitor(format!("Connected to database {}", id));
        }
        self.report(&format!("connect {}", id), result)
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.inner.connections.is_connected(id).await
    }

    pub async fn connection_info(&self, id: &str) -> Option<ConnectionInfo> {
        let handle = self
            .report("connection_info", self.inner.connections.handle(id).await)?;
        Some(handle.info().await)
    }

    pub async fn connection_ids(&self) -> Vec<String> {
        self.inner.connections.connection_ids().await
    }

    /// Release one live connection, rolling back any open transaction.
    pub async fn close(&self, id: &str) -> bool {
        let closed = self.inner.connections.close(id).await;
        if !closed {
            self.inner
                .monitor
                .monitor(format!("close: connection {} is not open", id));
        }
        closed
    }

    pub async fn close_all(&self) {
        self.inner.connections.close_all().await;
    }

    /// Set the manager-side autocommit flag of a live connection.
    ///
    /// With autocommit enabled, executions never commit a transaction on the
    /// caller's behalf.
    pub async fn set_autocommit(&self, id: &str, autocommit: bool) -> bool {
        let result: DbResult<()> = async {
            self.ensure_started()?;
            let conn = self.inner.connections.get(id).await?;
            conn.lock().await.autocommit = autocommit;
            Ok(())
        }
        .await;
        debug!(connection_id = %id, autocommit, "Autocommit flag changed");
        self.report("set_autocommit", result).is_some()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Register (or replace) a named SQL template.
    pub async fn query(&self, id: &str, sql: &str) -> bool {
        let result = match self.ensure_started() {
            Ok(()) => {
                self.inner.queries.register(id, sql).await;
                Ok(())
            }
            Err(e) => Err(e),
        };
        self.report(&format!("query {}", id), result).is_some()
    }

    /// Register the SQL compiled by a query builder.
    pub async fn query_from_builder(&self, id: &str, built: &BuiltQuery) -> bool {
        self.query(id, &built.sql).await
    }

    pub async fn query_sql(&self, id: &str) -> Option<String> {
        self.report("query_sql", self.inner.queries.get(id).await)
    }

    /// Run one parameterless statement immediately, outside the operation registry.
    pub async fn query_direct(&self, db_id: &str, sql: &str) -> bool {
        let result: DbResult<u64> = async {
            self.ensure_started()?;
            let handle = self.inner.connections.handle(db_id).await?;
            handle.execute_raw(sql).await
        }
        .await;
        if let Ok(affected) = &result {
            self.inner.monitor.monitor(format!(
                "Direct query on {} affected {} rows",
                db_id, affected
            ));
        }
        self.report(&format!("query_direct {}", db_id), result)
            .is_some()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    async fn prepare_operation(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> DbResult<Operation> {
        self.ensure_started()?;
        let conn = self.inner.connections.get(connection_id).await?;
        let sql = self.inner.queries.get(query_id).await?;

        let mut live = conn.lock().await;
        let statement = PreparedSql::new(&sql, live.connection.db_type());
        let columns = live
            .connection
            .prepare(&statement.rendered)
            .await
            .map_err(|e| DbError::prepare_failed(operation_id, e.to_string()))?;

        debug!(
            operation_id,
            connection_id = %connection_id,
            query_id = %query_id,
            placeholders = statement.slots.len(),
            "Statement prepared"
        );
        Ok(Operation::new(
            operation_id,
            connection_id,
            query_id,
            statement,
            columns,
        ))
    }

    /// Prepare `query_id` on `connection_id` under `operation_id`, replacing any
    /// operation already registered there.
    pub async fn new_operation(&self, connection_id: &str, operation_id: i64, query_id: &str) -> bool {
        self.new_operation_with_handle(connection_id, operation_id, query_id)
            .await
            .is_some()
    }

    pub async fn new_operation_with_handle(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> Option<OperationHandle> {
        let result = self
            .prepare_operation(connection_id, operation_id, query_id)
            .await;
        let operation = self.report(&format!("new_operation {}", operation_id), result)?;
        let handle = self.inner.operations.insert(operation).await;
        self.inner
            .monitor
            .monitor(format!("Operation {} created", operation_id));
        Some(handle)
    }

    /// Like `new_operation`, but refuses an id that is already registered.
    pub async fn create_operation(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> DbResult<OperationHandle> {
        if self.inner.operations.contains(operation_id).await {
            return Err(DbError::OperationExists { operation_id });
        }
        let operation = self
            .prepare_operation(connection_id, operation_id, query_id)
            .await?;
        self.inner.operations.insert_new(operation).await
    }

    pub async fn operation(&self, operation_id: i64) -> Option<OperationHandle> {
        self.report("operation", self.inner.operations.handle(operation_id).await)
    }

    pub async fn remove_operation(&self, operation_id: i64) -> bool {
        self.inner.operations.remove(operation_id).await
    }

    pub async fn operation_ids(&self) -> Vec<i64> {
        self.inner.operations.operation_ids().await
    }
}

impl Default for DbManager {
    fn default() -> Self {
        Self::prepare()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceKind;

    async fn manager_with_memory_db() -> DbManager {
        let manager = DbManager::prepare();
        assert!(manager.define(ConnectionConfig::sqlite("mem", ":memory:")).await);
        assert!(manager.connect("mem").await);
        manager
    }

    #[tokio::test]
    async fn test_new_operation_requires_connection_and_query() {
        let manager = manager_with_memory_db().await;
        assert!(!manager.new_operation("nope", 1, "default").await);
        assert!(!manager.new_operation("mem", 1, "nope").await);
        assert!(manager.operation_ids().await.is_empty());

        assert!(manager.new_operation("mem", 1, "default").await);
        assert_eq!(manager.operation_ids().await, vec![1]);
    }

    #[tokio::test]
    async fn test_prepare_failure_leaves_registry_unchanged() {
        let manager = manager_with_memory_db().await;
        manager.query("broken", "SELEC nonsense FROM").await;
        assert!(!manager.new_operation("mem", 7, "broken").await);
        assert!(manager.operation(7).await.is_none());
        assert!(
            manager
                .monitor()
                .logs()
                .iter()
                .any(|e| e.message.contains("Prepare failed for operation 7"))
        );
    }

    #[tokio::test]
    async fn test_create_operation_refuses_taken_id() {
        let manager = manager_with_memory_db().await;
        manager.create_operation("mem", 5, "default").await.unwrap();
        let err = manager
            .create_operation("mem", 5, "default")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::OperationExists { operation_id: 5 }));

        let err = manager
            .create_operation("mem", 6, "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::NotFound {
                kind: ResourceKind::Query,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_further_calls() {
        let manager = manager_with_memory_db().await;
        manager.shutdown().await;
        assert!(!manager.is_started());
        assert!(!manager.is_connected("mem").await);
        assert!(!manager.define(ConnectionConfig::sqlite("x", ":memory:")).await);
        assert!(!manager.query("q", "SELECT 1").await);
        assert!(matches!(
            manager.try_connect("mem").await,
            Err(DbError::NotStarted { .. })
        ));
    }

    #[tokio::test]
    async fn test_query_direct_and_define_url() {
        let manager = DbManager::prepare();
        assert!(manager.define_url("mem", "sqlite::memory:").await);
        assert!(!manager.define_url("bad", "oracle://x").await);
        assert!(manager.connect("mem").await);

        assert!(manager.query_direct("mem", "CREATE TABLE t (a INTEGER)").await);
        assert!(!manager.query_direct("mem", "INSERT INTO missing VALUES (1)").await);
        assert!(!manager.query_direct("other", "SELECT 1").await);
    }
}
