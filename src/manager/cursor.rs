//! Reading results and statement details of executed operations.

use super::DbManager;
use crate::db::operation::{Operation, SharedOperation};
use crate::models::{ColumnMetadata, ErrorInfo, ExecuteOptions, Row};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

impl DbManager {
    async fn operation_for(&self, context: &str, operation_id: i64) -> Option<SharedOperation> {
        let result = match self.ensure_started() {
            Ok(()) => self.inner.operations.get(operation_id).await,
            Err(e) => Err(e),
        };
        self.report(context, result)
    }

    async fn with_operation<T>(
        &self,
        context: &str,
        operation_id: i64,
        f: impl FnOnce(&mut Operation) -> T,
    ) -> Option<T> {
        let operation = self.operation_for(context, operation_id).await?;
        let mut operation = operation.lock().await;
        Some(f(&mut operation))
    }

    /// Next buffered row, or `None` when exhausted, unknown or never executed.
    pub async fn fetch(&self, operation_id: i64) -> Option<Row> {
        let row = self
            .with_operation("fetch", operation_id, |op| op.cursor_mut().next_row())
            .await
            .flatten();
        if row.is_none() {
            self.monitor()
                .monitor(format!("fetch: no row available on operation {}", operation_id));
        }
        row
    }

    /// All rows not fetched yet. `Some(vec![])` when the statement produced none.
    pub async fn fetch_all(&self, operation_id: i64) -> Option<Vec<Row>> {
        let rows = self
            .with_operation("fetch_all", operation_id, |op| {
                op.executed().then(|| op.cursor_mut().remaining())
            })
            .await
            .flatten();
        if rows.is_none() {
            self.monitor().monitor(format!(
                "fetch_all: operation {} has not been executed",
                operation_id
            ));
        }
        rows
    }

    /// Next row deserialized into `T`.
    pub async fn fetch_object<T: DeserializeOwned>(&self, operation_id: i64) -> Option<T> {
        let row = self.fetch(operation_id).await?;
        match serde_json::from_value(JsonValue::Object(row)) {
            Ok(value) => Some(value),
            Err(e) => {
                self.monitor().monitor(format!(
                    "fetch_object: row of operation {} does not match: {}",
                    operation_id, e
                ));
                None
            }
        }
    }

    /// Column `index` of the next row.
    pub async fn fetch_column(&self, operation_id: i64, index: usize) -> Option<JsonValue> {
        self.with_operation("fetch_column", operation_id, |op| {
            op.cursor_mut().next_column(index)
        })
        .await
        .flatten()
    }

    /// The SQL the operation was created from.
    pub async fn get_query(&self, operation_id: i64) -> Option<String> {
        self.with_operation("get_query", operation_id, |op| op.statement.source.clone())
            .await
    }

    pub async fn row_count(&self, operation_id: i64) -> Option<u64> {
        self.with_operation("row_count", operation_id, |op| op.row_count())
            .await
    }

    pub async fn column_count(&self, operation_id: i64) -> Option<usize> {
        self.with_operation("column_count", operation_id, |op| op.column_count())
            .await
    }

    /// Name and declared type of result column `index`, as seen at prepare time.
    pub async fn column_meta(&self, operation_id: i64, index: usize) -> Option<ColumnMetadata> {
        let meta = self
            .with_operation("column_meta", operation_id, |op| op.column_meta(index).cloned())
            .await
            .flatten();
        if meta.is_none() {
            self.monitor().monitor(format!(
                "column_meta: operation {} has no column {}",
                operation_id, index
            ));
        }
        meta
    }

    /// Statement text and current bindings, for diagnostics.
    pub async fn debug_dump_params(&self, operation_id: i64) -> Option<String> {
        self.with_operation("debug_dump_params", operation_id, |op| op.dump_params())
            .await
    }

    /// Drop buffered rows.
    pub async fn close_cursor(&self, operation_id: i64) -> bool {
        self.with_operation("close_cursor", operation_id, |op| op.close_cursor())
            .await
            .is_some()
    }

    /// Drop buffered rows and execute again with the current bindings.
    pub async fn reset_cursor(&self, operation_id: i64) -> bool {
        if !self.close_cursor(operation_id).await {
            return false;
        }
        self.execute_opts(operation_id, ExecuteOptions::new()).await
    }

    /// Error details of the last execution; `00000` after a success.
    pub async fn error_info(&self, operation_id: i64) -> Option<ErrorInfo> {
        self.with_operation("error_info", operation_id, |op| op.error_info())
            .await
    }

    pub async fn error_code(&self, operation_id: i64) -> Option<String> {
        self.error_info(operation_id).await.map(|info| info.sql_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionConfig;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: i64,
        label: String,
    }

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
            .query_direct("mem", "INSERT INTO items (label) VALUES ('a'), ('b'), ('c')")
            .await;
        manager
            .query("all", "SELECT id, label FROM items ORDER BY id")
            .await;
        manager.new_operation("mem", 1, "all").await;
        manager
    }

    #[tokio::test]
    async fn test_fetch_before_execute() {
        let manager = setup().await;
        assert!(manager.fetch(1).await.is_none());
        assert!(manager.fetch_all(1).await.is_none());
        assert_eq!(manager.column_count(1).await, Some(2));
    }

    #[tokio::test]
    async fn test_fetch_sequence() {
        let manager = setup().await;
        assert!(manager.execute(1).await);

        let first: Item = manager.fetch_object(1).await.unwrap();
        assert_eq!(
            first,
            Item {
                id: 1,
                label: "a".into()
            }
        );
        assert_eq!(manager.fetch_column(1, 1).await, Some(serde_json::json!("b")));
        let rest = manager.fetch_all(1).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(manager.fetch(1).await.is_none());
        assert_eq!(manager.fetch_all(1).await, Some(vec![]));
        assert_eq!(manager.row_count(1).await, Some(3));
    }

    #[tokio::test]
    async fn test_reset_cursor_re_executes() {
        let manager = setup().await;
        manager.execute(1).await;
        manager.fetch_all(1).await;
        assert!(manager.reset_cursor(1).await);
        assert_eq!(manager.fetch_all(1).await.unwrap().len(), 3);

        assert!(manager.close_cursor(1).await);
        assert!(manager.fetch_all(1).await.is_none());
    }

    #[tokio::test]
    async fn test_statement_details() {
        let manager = setup().await;
        assert_eq!(
            manager.get_query(1).await.as_deref(),
            Some("SELECT id, label FROM items ORDER BY id")
        );
        assert!(manager.get_query(2).await.is_none());
        manager.execute(1).await;
        assert!(manager.error_info(1).await.unwrap().is_ok());
        assert_eq!(manager.error_code(1).await.as_deref(), Some("00000"));
        assert!(manager.error_code(2).await.is_none());
    }

    #[tokio::test]
    async fn test_column_meta() {
        let manager = setup().await;
        let id = manager.column_meta(1, 0).await.unwrap();
        assert_eq!(id.name, "id");
        assert_eq!(id.type_name, "INTEGER");
        let label = manager.column_meta(1, 1).await.unwrap();
        assert_eq!(label.name, "label");
        assert_eq!(label.type_name, "TEXT");

        assert!(manager.column_meta(1, 2).await.is_none());
        assert!(manager.column_meta(9, 0).await.is_none());
    }

    #[tokio::test]
    async fn test_debug_dump_params() {
        let manager = setup().await;
        manager
            .query("by_label", "SELECT id FROM items WHERE label = :label")
            .await;
        manager.new_operation("mem", 2, "by_label").await;
        assert!(manager.bind_value(2, "label", "b").await.unwrap());

        let dump = manager.debug_dump_params(2).await.unwrap();
        assert!(dump.starts_with("SQL: [41] SELECT id FROM items WHERE label = :label"));
        assert!(dump.contains(":label = String(\"b\")"));
        assert!(manager.debug_dump_params(9).await.is_none());
    }
}
