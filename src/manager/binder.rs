//! Parameter binding on registered operations.

use super::DbManager;
use crate::builder::BuiltQuery;
use crate::db::statement::normalize_placeholder;
use crate::error::{DbError, DbResult};
use crate::models::{Binding, BoundCell, QueryParam};
use crate::monitor::NameErrorBinding;

impl DbManager {
    /// Bind a copy of `value` to `name` (leading `:` optional).
    ///
    /// Returns `Ok(false)` when the operation is unknown or, outside THROW mode,
    /// when the statement has no such placeholder.
    pub async fn bind_value(
        &self,
        operation_id: i64,
        name: &str,
        value: impl Into<QueryParam>,
    ) -> DbResult<bool> {
        self.bind(operation_id, name, Binding::Value(value.into()))
            .await
    }

    /// Bind `cell`; its value is read each time the operation executes.
    pub async fn bind_parameter(
        &self,
        operation_id: i64,
        name: &str,
        cell: &BoundCell,
    ) -> DbResult<bool> {
        self.bind(operation_id, name, Binding::Cell(cell.clone()))
            .await
    }

    /// Bind every value a query builder produced. Stops at the first refusal.
    pub async fn bind_values(&self, operation_id: i64, built: &BuiltQuery) -> DbResult<bool> {
        for (name, value) in &built.bindings {
            if !self.bind_value(operation_id, name, value.clone()).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn bind(&self, operation_id: i64, name: &str, binding: Binding) -> DbResult<bool> {
        if let Err(e) = self.ensure_started() {
            self.monitor().monitor(format!("bind: {}", e));
            return Ok(false);
        }
        let operation = match self.inner.operations.get(operation_id).await {
            Ok(op) => op,
            Err(e) => {
                self.monitor().monitor(format!("bind: {}", e));
                return Ok(false);
            }
        };

        let placeholder = normalize_placeholder(name);
        let mut operation = operation.lock().await;
        if operation.statement.has_placeholder(&placeholder) {
            operation.bind(placeholder, binding);
            return Ok(true);
        }

        let message = format!("{} does not appear in the statement", placeholder);
        match self.monitor().name_error_binding() {
            Some(NameErrorBinding::Continue) => Ok(false),
            Some(NameErrorBinding::Throw) => {
                Err(DbError::bind_failed(operation_id, placeholder, message))
            }
            Some(NameErrorBinding::Stop) => {
                self.monitor().monitor(format!(
                    "Binding {} failed on operation {}: {}",
                    placeholder, operation_id, message
                ));
                Ok(false)
            }
            None => {
                self.monitor()
                    .monitor(format!("Binding failed on operation {}", operation_id));
                Ok(false)
            }
        }
    }
}
