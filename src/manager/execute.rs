//! Operation execution.

use super::DbManager;
use crate::db::operation::Operation;
use crate::db::{TxScope, executor, transaction};
use crate::error::DbResult;
use crate::models::{BindSet, ExecuteOptions};
use tracing::debug;

impl DbManager {
    /// Execute an operation with its current bindings.
    pub async fn execute(&self, operation_id: i64) -> bool {
        self.execute_opts(operation_id, ExecuteOptions::new()).await
    }

    /// Execute with inline parameters that take precedence over stored bindings.
    pub async fn execute_with(&self, operation_id: i64, binds: BindSet) -> bool {
        self.execute_opts(operation_id, ExecuteOptions::new().with_binds(binds))
            .await
    }

    /// Execute only if `guard(data)` approves.
    pub async fn execute_when<T, F>(&self, operation_id: i64, data: &T, guard: F) -> bool
    where
        T: ?Sized,
        F: FnOnce(&T) -> bool,
    {
        if !self.inner.operations.contains(operation_id).await {
            self.monitor()
                .monitor(format!("execute: operation {} not found", operation_id));
            return false;
        }
        if !guard(data) {
            self.monitor().monitor(format!(
                "execute: operation {} rejected by guard",
                operation_id
            ));
            return false;
        }
        self.execute(operation_id).await
    }

    pub async fn execute_opts(&self, operation_id: i64, options: ExecuteOptions) -> bool {
        match self.try_execute(operation_id, &options).await {
            Ok(()) => {
                self.monitor()
                    .monitor(format!("Operation {} executed successfully", operation_id));
                true
            }
            Err(e) => {
                self.monitor().monitor(format!("execute: {}", e));
                false
            }
        }
    }

    pub(crate) async fn try_execute(
        &self,
        operation_id: i64,
        options: &ExecuteOptions,
    ) -> DbResult<()> {
        self.ensure_started()?;
        let operation = self.inner.operations.get(operation_id).await?;
        let mut operation = operation.lock().await;
        let result = self.run_locked(&mut operation, options).await;
        if let Err(e) = &result {
            operation.record_error(e);
        }
        result
    }

    /// Lock order: the operation is already held, the connection is taken here.
    async fn run_locked(&self, operation: &mut Operation, options: &ExecuteOptions) -> DbResult<()> {
        let params = operation.resolve_params(options.binds.as_ref())?;
        let conn = self.inner.connections.get(&operation.connection_id).await?;
        let mut live = conn.lock().await;

        let outcome = executor::run(&mut live.connection, &operation.statement, &params).await?;
        operation.record(outcome);

        if options.auto_commit && !live.autocommit && live.tx == Some(TxScope::Explicit) {
            match transaction::commit(&mut live.connection).await {
                Ok(()) => {
                    live.tx = None;
                    debug!(
                        operation_id = operation.id,
                        connection_id = %live.id,
                        "Transaction auto-committed"
                    );
                }
                Err(e) => self.monitor().debug(format!(
                    "Auto-commit after operation {} failed: {}",
                    operation.id, e
                )),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionConfig;

    async fn setup() -> DbManager {
        let manager = DbManager::prepare();
        manager
            .define(ConnectionConfig::sqlite("mem", ":memory:"))
            .await;
        manager.connect("mem").await;
        manager
            .query_direct("mem", "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT)")
            .await;
        manager
            .query("add", "INSERT INTO items (label) VALUES (:label)")
            .await;
        manager.new_operation("mem", 1, "add").await;
        manager
    }

    #[tokio::test]
    async fn test_execute_unknown_operation() {
        let manager = setup().await;
        assert!(!manager.execute(42).await);
    }

    #[tokio::test]
    async fn test_execute_missing_binding_records_error() {
        let manager = setup().await;
        assert!(!manager.execute(1).await);
        let info = manager.error_info(1).await.unwrap();
        assert!(!info.is_ok());
    }

    #[tokio::test]
    async fn test_execute_with_inline_binds() {
        let manager = setup().await;
        assert!(
            manager
                .execute_with(1, BindSet::named([("label", "a")]))
                .await
        );
        assert_eq!(manager.row_count(1).await, Some(1));
    }

    #[tokio::test]
    async fn test_execute_when_guard() {
        let manager = setup().await;
        manager.bind_value(1, "label", "b").await.unwrap();
        let limit = 3;
        assert!(!manager.execute_when(1, &limit, |n| *n > 5).await);
        assert!(manager.execute_when(1, &limit, |n| *n < 5).await);
        assert!(!manager.execute_when(9, &limit, |_| true).await);
    }

    #[tokio::test]
    async fn test_auto_commit_only_when_requested() {
        let manager = setup().await;
        manager.bind_value(1, "label", "c").await.unwrap();

        assert!(manager.begin_transaction("mem", None, false).await.unwrap());
        assert!(manager.execute(1).await);
        assert!(manager.in_transaction("mem").await);

        let opts = ExecuteOptions::new().with_auto_commit(true);
        assert!(manager.execute_opts(1, opts.clone()).await);
        assert!(!manager.in_transaction("mem").await);

        manager.set_autocommit("mem", true).await;
        assert!(manager.begin_transaction("mem", None, false).await.unwrap());
        assert!(manager.execute_opts(1, opts).await);
        assert!(manager.in_transaction("mem").await);
        assert!(manager.roll_back("mem").await);
    }
}
