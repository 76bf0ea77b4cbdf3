//! Narrow interfaces over the manager.
//!
//! Code that only binds parameters, or only drives transactions, can depend on
//! one of these instead of the whole facade.

use super::DbManager;
use crate::builder::BuiltQuery;
use crate::db::{ConnectionHandle, OperationHandle};
use crate::error::DbResult;
use crate::models::{BindSet, BoundCell, ConnectionConfig, IsolationLevel, QueryParam};
use futures_util::future::BoxFuture;
use std::future::Future;

pub trait ConnectionStore {
    fn define(&self, config: ConnectionConfig) -> impl Future<Output = bool> + Send;
    fn connect_with_handle(
        &self,
        id: &str,
    ) -> impl Future<Output = Option<ConnectionHandle>> + Send;
    fn is_connected(&self, id: &str) -> impl Future<Output = bool> + Send;
    fn close(&self, id: &str) -> impl Future<Output = bool> + Send;
}

pub trait OperationStore {
    fn query(&self, id: &str, sql: &str) -> impl Future<Output = bool> + Send;
    fn new_operation_with_handle(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> impl Future<Output = Option<OperationHandle>> + Send;
    fn create_operation(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> impl Future<Output = DbResult<OperationHandle>> + Send;
    fn remove_operation(&self, operation_id: i64) -> impl Future<Output = bool> + Send;
    fn execute_with(&self, operation_id: i64, binds: BindSet)
    -> impl Future<Output = bool> + Send;
}

pub trait Binder {
    fn bind_value(
        &self,
        operation_id: i64,
        name: &str,
        value: QueryParam,
    ) -> impl Future<Output = DbResult<bool>> + Send;
    fn bind_parameter(
        &self,
        operation_id: i64,
        name: &str,
        cell: &BoundCell,
    ) -> impl Future<Output = DbResult<bool>> + Send;
    fn bind_values(
        &self,
        operation_id: i64,
        built: &BuiltQuery,
    ) -> impl Future<Output = DbResult<bool>> + Send;
}

pub trait TransactionController {
    fn begin_transaction(
        &self,
        db_id: &str,
        isolation: Option<IsolationLevel>,
        dev_mode: bool,
    ) -> impl Future<Output = DbResult<bool>> + Send;
    fn commit(&self, db_id: &str) -> impl Future<Output = bool> + Send;
    fn roll_back(&self, db_id: &str) -> impl Future<Output = bool> + Send;
    fn in_transaction(&self, db_id: &str) -> impl Future<Output = bool> + Send;
    fn transaction<F>(&self, db_id: &str, body: F) -> impl Future<Output = bool> + Send
    where
        F: for<'a> FnOnce(&'a DbManager) -> BoxFuture<'a, DbResult<bool>> + Send;
}

impl ConnectionStore for DbManager {
    fn define(&self, config: ConnectionConfig) -> impl Future<Output = bool> + Send {
        DbManager::define(self, config)
    }

    fn connect_with_handle(
        &self,
        id: &str,
    ) -> impl Future<Output = Option<ConnectionHandle>> + Send {
        DbManager::connect_with_handle(self, id)
    }

    fn is_connected(&self, id: &str) -> impl Future<Output = bool> + Send {
        DbManager::is_connected(self, id)
    }

    fn close(&self, id: &str) -> impl Future<Output = bool> + Send {
        DbManager::close(self, id)
    }
}

impl OperationStore for DbManager {
    fn query(&self, id: &str, sql: &str) -> impl Future<Output = bool> + Send {
        DbManager::query(self, id, sql)
    }

    fn new_operation_with_handle(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> impl Future<Output = Option<OperationHandle>> + Send {
        DbManager::new_operation_with_handle(self, connection_id, operation_id, query_id)
    }

    fn create_operation(
        &self,
        connection_id: &str,
        operation_id: i64,
        query_id: &str,
    ) -> impl Future<Output = DbResult<OperationHandle>> + Send {
        DbManager::create_operation(self, connection_id, operation_id, query_id)
    }

    fn remove_operation(&self, operation_id: i64) -> impl Future<Output = bool> + Send {
        DbManager::remove_operation(self, operation_id)
    }

    fn execute_with(
        &self,
        operation_id: i64,
        binds: BindSet,
    ) -> impl Future<Output = bool> + Send {
        DbManager::execute_with(self, operation_id, binds)
    }
}

impl Binder for DbManager {
    fn bind_value(
        &self,
        operation_id: i64,
        name: &str,
        value: QueryParam,
    ) -> impl Future<Output = DbResult<bool>> + Send {
        DbManager::bind_value(self, operation_id, name, value)
    }

    fn bind_parameter(
        &self,
        operation_id: i64,
        name: &str,
        cell: &BoundCell,
    ) -> impl Future<Output = DbResult<bool>> + Send {
        DbManager::bind_parameter(self, operation_id, name, cell)
    }

    fn bind_values(
        &self,
        operation_id: i64,
        built: &BuiltQuery,
    ) -> impl Future<Output = DbResult<bool>> + Send {
        DbManager::bind_values(self, operation_id, built)
    }
}

impl TransactionController for DbManager {
    fn begin_transaction(
        &self,
        db_id: &str,
        isolation: Option<IsolationLevel>,
        dev_mode: bool,
    ) -> impl Future<Output = DbResult<bool>> + Send {
        DbManager::begin_transaction(self, db_id, isolation, dev_mode)
    }

    fn commit(&self, db_id: &str) -> impl Future<Output = bool> + Send {
        DbManager::commit(self, db_id)
    }

    fn roll_back(&self, db_id: &str) -> impl Future<Output = bool> + Send {
        DbManager::roll_back(self, db_id)
    }

    fn in_transaction(&self, db_id: &str) -> impl Future<Output = bool> + Send {
        DbManager::in_transaction(self, db_id)
    }

    fn transaction<F>(&self, db_id: &str, body: F) -> impl Future<Output = bool> + Send
    where
        F: for<'a> FnOnce(&'a DbManager) -> BoxFuture<'a, DbResult<bool>> + Send,
    {
        DbManager::transaction(self, db_id, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionConfig;

    async fn record_deposit<S, B>(store: &S, binder: &B) -> bool
    where
        S: OperationStore,
        B: Binder,
    {
        store
            .query("deposit", "INSERT INTO ledger (amount) VALUES (:amount)")
            .await;
        if store
            .new_operation_with_handle("mem", 1, "deposit")
            .await
            .is_none()
        {
            return false;
        }
        binder
            .bind_value(1, "amount", QueryParam::Int(250))
            .await
            .unwrap_or(false)
            && store.execute_with(1, BindSet::named([("amount", 300)])).await
    }

    #[tokio::test]
    async fn test_narrow_interfaces() {
        let manager = DbManager::prepare();
        assert!(ConnectionStore::define(&manager, ConnectionConfig::sqlite("mem", ":memory:")).await);
        assert!(ConnectionStore::connect_with_handle(&manager, "mem").await.is_some());
        manager
            .query_direct("mem", "CREATE TABLE ledger (amount INTEGER)")
            .await;

        assert!(record_deposit(&manager, &manager).await);
        assert!(TransactionController::begin_transaction(&manager, "mem", None, false)
            .await
            .unwrap());
        assert!(TransactionController::roll_back(&manager, "mem").await);
    }
}
