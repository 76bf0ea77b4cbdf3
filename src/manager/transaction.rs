//! Per-connection transaction lifecycle: `Idle` -> `InTransaction` -> `Idle`.
//!
//! Every entry point re-checks the state under the connection lock, so a double
//! begin or a commit racing an auto-commit is refused instead of reaching the
//! engine.

use super::DbManager;
use crate::db::{TxScope, transaction};
use crate::error::{DbError, DbResult};
use crate::models::IsolationLevel;
use futures_util::future::BoxFuture;
use tracing::debug;

impl DbManager {
    /// Begin a transaction on `db_id`.
    ///
    /// Unknown connections and already-open transactions give `Ok(false)`. An
    /// engine failure gives `Ok(false)` unless `dev_mode` is set, in which case
    /// the error is returned.
    pub async fn begin_transaction(
        &self,
        db_id: &str,
        isolation: Option<IsolationLevel>,
        dev_mode: bool,
    ) -> DbResult<bool> {
        match self.begin_scoped(db_id, isolation, TxScope::Explicit).await {
            Ok(()) => {
                self.monitor()
                    .monitor(format!("Transaction started on {}", db_id));
                Ok(true)
            }
            Err(e @ (DbError::Database { .. } | DbError::Connection { .. })) => {
                self.monitor()
                    .monitor(format!("begin_transaction on {}: {}", db_id, e));
                if dev_mode { Err(e) } else { Ok(false) }
            }
            Err(e) => {
                self.monitor()
                    .monitor(format!("begin_transaction on {}: {}", db_id, e));
                Ok(false)
            }
        }
    }

    /// Like `begin_transaction`, with the isolation level given by name
    /// (`"read committed"`, `"SERIALIZABLE"`, ...).
    pub async fn begin_transaction_named(
        &self,
        db_id: &str,
        isolation: &str,
        dev_mode: bool,
    ) -> DbResult<bool> {
        match isolation.parse::<IsolationLevel>() {
            Ok(level) => self.begin_transaction(db_id, Some(level), dev_mode).await,
            Err(e) => {
                self.monitor()
                    .monitor(format!("begin_transaction on {}: {}", db_id, e));
                if dev_mode { Err(e) } else { Ok(false) }
            }
        }
    }

    async fn begin_scoped(
        &self,
        db_id: &str,
        isolation: Option<IsolationLevel>,
        scope: TxScope,
    ) -> DbResult<()> {
        self.ensure_started()?;
        let conn = self.inner.connections.get(db_id).await?;
        let mut live = conn.lock().await;
        if live.in_transaction() {
            return Err(DbError::transaction("a transaction is already active", db_id));
        }
        transaction::begin(&mut live.connection, isolation).await?;
        live.tx = Some(scope);
        Ok(())
    }

    pub async fn commit(&self, db_id: &str) -> bool {
        let result = self.finish(db_id, None, true).await;
        self.report_finish("commit", db_id, result)
    }

    pub async fn roll_back(&self, db_id: &str) -> bool {
        let result = self.finish(db_id, None, false).await;
        self.report_finish("roll_back", db_id, result)
    }

    fn report_finish(&self, action: &str, db_id: &str, result: DbResult<()>) -> bool {
        match result {
            Ok(()) => {
                self.monitor()
                    .monitor(format!("{} succeeded on {}", action, db_id));
                true
            }
            Err(e) => {
                self.monitor()
                    .monitor(format!("{} on {}: {}", action, db_id, e));
                false
            }
        }
    }

    /// Commit or roll back. With `scope`, only a transaction opened by that
    /// scope is finished.
    async fn finish(&self, db_id: &str, scope: Option<&TxScope>, commit: bool) -> DbResult<()> {
        self.ensure_started()?;
        let conn = self.inner.connections.get(db_id).await?;
        let mut live = conn.lock().await;
        match (&live.tx, scope) {
            (None, _) => {
                return Err(DbError::transaction("no active transaction", db_id));
            }
            (Some(current), Some(wanted)) if current != wanted => {
                return Err(DbError::transaction(
                    "the active transaction belongs to another scope",
                    db_id,
                ));
            }
            _ => {}
        }
        if commit {
            transaction::commit(&mut live.connection).await?;
        } else {
            transaction::rollback(&mut live.connection).await?;
        }
        live.tx = None;
        Ok(())
    }

    pub async fn in_transaction(&self, db_id: &str) -> bool {
        match self.inner.connections.get(db_id).await {
            Ok(conn) => conn.lock().await.in_transaction(),
            Err(_) => false,
        }
    }

    async fn in_scope(&self, db_id: &str, scope: &TxScope) -> bool {
        match self.inner.connections.get(db_id).await {
            Ok(conn) => conn.lock().await.tx.as_ref() == Some(scope),
            Err(_) => false,
        }
    }

    /// Run `body` inside a transaction on `db_id`.
    ///
    /// `Ok(true)` commits, `Ok(false)` rolls back, `Err` rolls back and is
    /// reported. The result is never propagated.
    ///
    /// ```ignore
    /// let moved = manager
    ///     .transaction("bank_db", |m| Box::pin(async move {
    ///         Ok(m.execute(201).await && m.execute(202).await)
    ///     }))
    ///     .await;
    /// ```
    pub async fn transaction<F>(&self, db_id: &str, body: F) -> bool
    where
        F: for<'a> FnOnce(&'a DbManager) -> BoxFuture<'a, DbResult<bool>>,
    {
        let scope = TxScope::Scoped(transaction::generate_scope_id());
        if let Err(e) = self.begin_scoped(db_id, None, scope.clone()).await {
            self.monitor()
                .monitor(format!("Transaction failed on {}: {}", db_id, e));
            return false;
        }
        debug!(connection_id = %db_id, scope = ?scope, "Scoped transaction started");

        match body(self).await {
            Ok(true) => {
                if !self.in_scope(db_id, &scope).await {
                    self.monitor().debug(format!(
                        "Transaction on {} was already finished inside the callback",
                        db_id
                    ));
                    return true;
                }
                let result = self.finish(db_id, Some(&scope), true).await;
                self.report_finish("commit", db_id, result)
            }
            Ok(false) => {
                if self.in_scope(db_id, &scope).await {
                    let result = self.finish(db_id, Some(&scope), false).await;
                    self.report_finish("roll_back", db_id, result);
                }
                false
            }
            Err(e) => {
                if self.in_scope(db_id, &scope).await {
                    let result = self.finish(db_id, Some(&scope), false).await;
                    self.report_finish("roll_back", db_id, result);
                }
                self.monitor()
                    .monitor(format!("Transaction failed on {}: {}", db_id, e));
                false
            }
        }
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
            .query_direct("mem", "CREATE TABLE t (a INTEGER)")
            .await;
        manager
    }

    async fn count(manager: &DbManager) -> i64 {
        manager.query("count", "SELECT COUNT(*) AS n FROM t").await;
        manager.new_operation("mem", 900, "count").await;
        manager.execute(900).await;
        manager
            .fetch(900)
            .await
            .and_then(|row| row.get("n").and_then(|v| v.as_i64()))
            .unwrap_or(-1)
    }

    #[tokio::test]
    async fn test_guards() {
        let manager = setup().await;
        assert!(!manager.commit("mem").await);
        assert!(!manager.roll_back("mem").await);
        assert!(!manager.begin_transaction("nope", None, true).await.unwrap());

        assert!(manager.begin_transaction("mem", None, false).await.unwrap());
        assert!(!manager.begin_transaction("mem", None, true).await.unwrap());
        assert!(manager.in_transaction("mem").await);
        assert!(manager.commit("mem").await);
        assert!(!manager.in_transaction("mem").await);
        assert!(!manager.commit("mem").await);
    }

    #[tokio::test]
    async fn test_named_isolation_levels() {
        let manager = setup().await;
        assert!(!manager.begin_transaction_named("mem", "chaotic", false).await.unwrap());
        assert!(matches!(
            manager.begin_transaction_named("mem", "chaotic", true).await,
            Err(DbError::InvalidIsolationLevel { .. })
        ));
        assert!(
            manager
                .begin_transaction_named("mem", "serializable", true)
                .await
                .unwrap()
        );
        assert!(manager.roll_back("mem").await);
    }

    #[tokio::test]
    async fn test_scoped_transaction_commit_and_rollback() {
        let manager = setup().await;

        let committed = manager
            .transaction("mem", |m| {
                Box::pin(async move { Ok(m.query_direct("mem", "INSERT INTO t VALUES (1)").await) })
            })
            .await;
        assert!(committed);
        assert_eq!(count(&manager).await, 1);

        let rolled_back = manager
            .transaction("mem", |m| {
                Box::pin(async move {
                    m.query_direct("mem", "INSERT INTO t VALUES (2)").await;
                    Ok(false)
                })
            })
            .await;
        assert!(!rolled_back);
        assert_eq!(count(&manager).await, 1);

        let failed = manager
            .transaction("mem", |m| {
                Box::pin(async move {
                    m.query_direct("mem", "INSERT INTO t VALUES (3)").await;
                    Err(DbError::internal("boom"))
                })
            })
            .await;
        assert!(!failed);
        assert!(!manager.in_transaction("mem").await);
        assert_eq!(count(&manager).await, 1);
    }

    #[tokio::test]
    async fn test_scoped_transaction_is_not_auto_committed() {
        let manager = setup().await;
        manager.query("ins", "INSERT INTO t VALUES (:a)").await;
        manager.new_operation("mem", 1, "ins").await;
        manager.bind_value(1, "a", 5).await.unwrap();

        let ok = manager
            .transaction("mem", |m| {
                Box::pin(async move {
                    let opts = crate::models::ExecuteOptions::new().with_auto_commit(true);
                    let executed = m.execute_opts(1, opts).await;
                    Ok(executed && m.in_transaction("mem").await)
                })
            })
            .await;
        assert!(ok);
        assert_eq!(count(&manager).await, 1);
    }
}
