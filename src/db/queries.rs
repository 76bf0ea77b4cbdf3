//! Named SQL templates.

use crate::error::{DbError, DbResult, ResourceKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Id of the template registered at start-up.
pub const DEFAULT_QUERY_ID: &str = "default";

/// SQL of the start-up template.
pub const DEFAULT_QUERY_SQL: &str = "SELECT 1";

#[derive(Clone)]
pub struct QueryRegistry {
    queries: Arc<RwLock<HashMap<String, String>>>,
}

impl QueryRegistry {
    /// Create a registry holding only the default template.
    pub fn new() -> Self {
        let mut queries = HashMap::new();
        queries.insert(DEFAULT_QUERY_ID.to_string(), DEFAULT_QUERY_SQL.to_string());
        Self {
            queries: Arc::new(RwLock::new(queries)),
        }
    }

    /// Store `sql` under `id`. SQL is not validated here; bad SQL fails at prepare.
    pub async fn register(&self, id: &str, sql: impl Into<String>) {
        let replaced = self
            .queries
            .write()
            .await
            .insert(id.to_string(), sql.into())
            .is_some();
        debug!(query_id = %id, replaced, "Query registered");
    }

    pub async fn get(&self, id: &str) -> DbResult<String> {
        self.queries
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found(ResourceKind::Query, id))
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.queries.read().await.contains_key(id)
    }

    pub async fn query_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.queries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_query_exists() {
        let registry = QueryRegistry::new();
        assert_eq!(registry.get(DEFAULT_QUERY_ID).await.unwrap(), DEFAULT_QUERY_SQL);
    }

    #[tokio::test]
    async fn test_register_overwrites() {
        let registry = QueryRegistry::new();
        registry.register("get_balance", "SELECT 1").await;
        registry
            .register("get_balance", "SELECT balance FROM customers WHERE id = :id")
            .await;
        assert!(registry.get("get_balance").await.unwrap().contains(":id"));
        assert_eq!(registry.query_ids().await, vec!["default", "get_balance"]);
    }

    #[tokio::test]
    async fn test_unknown_query() {
        let registry = QueryRegistry::new();
        assert!(matches!(
            registry.get("nope").await,
            Err(DbError::NotFound {
                kind: ResourceKind::Query,
                ..
            })
        ));
    }
}
