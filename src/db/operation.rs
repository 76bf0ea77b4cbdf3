//! Operations: integer-keyed prepared statements with their bindings and the
//! buffered result of their last execution.

use crate::db::executor::Outcome;
use crate::db::statement::{PreparedSql, Slot, normalize_placeholder};
use crate::error::{DbError, DbResult, ResourceKind};
use crate::models::{BindSet, Binding, ColumnMetadata, ErrorInfo, QueryParam, Row};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Rows buffered from the last execution, read front to back.
#[derive(Debug, Default)]
pub struct Cursor {
    columns: Vec<String>,
    rows: Vec<Row>,
    position: usize,
}

impl Cursor {
    pub fn next_row(&mut self) -> Option<Row> {
        let row = self.rows.get(self.position).cloned()?;
        self.position += 1;
        Some(row)
    }

    /// Drain everything not yet fetched.
    pub fn remaining(&mut self) -> Vec<Row> {
        let rest = self.rows.get(self.position..).unwrap_or_default().to_vec();
        self.position = self.rows.len();
        rest
    }

    /// Value at column `index` of the next row, advancing past that row.
    pub fn next_column(&mut self, index: usize) -> Option<JsonValue> {
        let name = self.columns.get(index)?.clone();
        let row = self.next_row()?;
        row.get(&name).cloned()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug)]
pub struct Operation {
    pub id: i64,
    pub connection_id: String,
    pub query_id: String,
    pub statement: PreparedSql,
    /// Result columns reported by the server at prepare time
    pub prepared_columns: Vec<ColumnMetadata>,
    bindings: HashMap<String, Binding>,
    cursor: Cursor,
    executed: bool,
    rows_affected: u64,
    last_error: Option<ErrorInfo>,
}

impl Operation {
    pub fn new(
        id: i64,
        connection_id: impl Into<String>,
        query_id: impl Into<String>,
        statement: PreparedSql,
        prepared_columns: Vec<ColumnMetadata>,
    ) -> Self {
        Self {
            id,
            connection_id: connection_id.into(),
            query_id: query_id.into(),
            statement,
            prepared_columns,
            bindings: HashMap::new(),
            cursor: Cursor::default(),
            executed: false,
            rows_affected: 0,
            last_error: None,
        }
    }

    /// Attach a binding. The placeholder must already be normalized and present.
    pub fn bind(&mut self, placeholder: String, binding: Binding) {
        debug!(operation_id = self.id, placeholder = %placeholder, "Parameter bound");
        self.bindings.insert(placeholder, binding);
    }

    /// Produce the driver parameter list, preferring per-call overrides.
    pub fn resolve_params(&self, overrides: Option<&BindSet>) -> DbResult<Vec<QueryParam>> {
        let named: HashMap<String, &QueryParam> = match overrides {
            Some(BindSet::Named(pairs)) => {
                let mut map = HashMap::with_capacity(pairs.len());
                for (name, value) in pairs {
                    let placeholder = normalize_placeholder(name);
                    if !self.statement.has_placeholder(&placeholder) {
                        return Err(DbError::execute_failed(
                            self.id,
                            format!("{} does not appear in the statement", placeholder),
                        ));
                    }
                    map.insert(placeholder, value);
                }
                map
            }
            _ => HashMap::new(),
        };
        let positional: &[QueryParam] = match overrides {
            Some(BindSet::Positional(values)) => values,
            _ => &[],
        };

        if !positional.is_empty() && positional.len() != self.statement.positional_count() {
            return Err(DbError::execute_failed(
                self.id,
                format!(
                    "statement expects {} positional parameters, got {}",
                    self.statement.positional_count(),
                    positional.len()
                ),
            ));
        }

        self.statement
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Named(name) => named
                    .get(name)
                    .map(|v| (*v).clone())
                    .or_else(|| self.bindings.get(name).map(Binding::resolve))
                    .ok_or_else(|| {
                        DbError::execute_failed(self.id, format!("no value bound for {}", name))
                    }),
                Slot::Positional(i) => positional.get(*i).cloned().ok_or_else(|| {
                    DbError::execute_failed(
                        self.id,
                        format!("no value supplied for positional parameter {}", i + 1),
                    )
                }),
            })
            .collect()
    }

    /// Store a successful execution's outcome, replacing the previous cursor.
    pub fn record(&mut self, outcome: Outcome) {
        self.executed = true;
        self.last_error = None;
        match outcome {
            Outcome::Rows { columns, rows } => {
                self.rows_affected = 0;
                self.cursor = Cursor {
                    columns,
                    rows,
                    position: 0,
                };
            }
            Outcome::Affected(n) => {
                self.rows_affected = n;
                self.cursor = Cursor::default();
            }
        }
    }

    pub fn record_error(&mut self, err: &DbError) {
        self.last_error = Some(ErrorInfo::from(err));
    }

    pub fn executed(&self) -> bool {
        self.executed
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    /// Rows returned by the last SELECT-like execution, or rows affected by the last write.
    pub fn row_count(&self) -> u64 {
        if self.statement.returns_rows {
            self.cursor.len() as u64
        } else {
            self.rows_affected
        }
    }

    pub fn column_count(&self) -> usize {
        if self.cursor.columns().is_empty() {
            self.prepared_columns.len()
        } else {
            self.cursor.columns().len()
        }
    }

    pub fn column_meta(&self, index: usize) -> Option<&ColumnMetadata> {
        self.prepared_columns.get(index)
    }

    /// Statement text followed by one line per named placeholder and its
    /// current value.
    pub fn dump_params(&self) -> String {
        let mut seen = HashSet::new();
        let names: Vec<&str> = self
            .statement
            .slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Named(name) if seen.insert(name.as_str()) => Some(name.as_str()),
                _ => None,
            })
            .collect();

        let mut out = format!(
            "SQL: [{}] {}\nParams: {}\n",
            self.statement.source.len(),
            self.statement.source,
            names.len() + self.statement.positional_count()
        );
        for name in names {
            let _ = match self.bindings.get(name) {
                Some(binding) => writeln!(out, "{} = {:?}", name, binding.resolve()),
                None => writeln!(out, "{} unbound", name),
            };
        }
        out
    }

    /// Discard buffered rows so the statement can be executed again.
    pub fn close_cursor(&mut self) {
        self.cursor = Cursor::default();
        self.executed = false;
    }

    pub fn error_info(&self) -> ErrorInfo {
        self.last_error.clone().unwrap_or_else(ErrorInfo::ok)
    }
}

pub type SharedOperation = Arc<Mutex<Operation>>;

/// A caller-held reference to a registered operation.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    id: i64,
    inner: SharedOperation,
}

impl OperationHandle {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub async fn sql(&self) -> String {
        self.inner.lock().await.statement.source.clone()
    }

    pub async fn connection_id(&self) -> String {
        self.inner.lock().await.connection_id.clone()
    }

    pub async fn query_id(&self) -> String {
        self.inner.lock().await.query_id.clone()
    }
}

#[derive(Clone)]
pub struct OperationRegistry {
    operations: Arc<RwLock<HashMap<i64, SharedOperation>>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register `operation`, replacing (and dropping) any operation under the same id.
    pub async fn insert(&self, operation: Operation) -> OperationHandle {
        let id = operation.id;
        let shared = Arc::new(Mutex::new(operation));
        let previous = self
            .operations
            .write()
            .await
            .insert(id, Arc::clone(&shared));
        if previous.is_some() {
            warn!(operation_id = id, "Operation replaced");
        }
        OperationHandle { id, inner: shared }
    }

    /// Register `operation` only if its id is free.
    pub async fn insert_new(&self, operation: Operation) -> DbResult<OperationHandle> {
        let id = operation.id;
        let mut operations = self.operations.write().await;
        if operations.contains_key(&id) {
            return Err(DbError::OperationExists { operation_id: id });
        }
        let shared = Arc::new(Mutex::new(operation));
        operations.insert(id, Arc::clone(&shared));
        Ok(OperationHandle { id, inner: shared })
    }

    pub async fn get(&self, id: i64) -> DbResult<SharedOperation> {
        self.operations
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found(ResourceKind::Operation, id))
    }

    pub async fn handle(&self, id: i64) -> DbResult<OperationHandle> {
        Ok(OperationHandle {
            id,
            inner: self.get(id).await?,
        })
    }

    pub async fn contains(&self, id: i64) -> bool {
        self.operations.read().await.contains_key(&id)
    }

    pub async fn remove(&self, id: i64) -> bool {
        self.operations.write().await.remove(&id).is_some()
    }

    pub async fn operation_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.operations.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn clear(&self) {
        self.operations.write().await.clear();
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
