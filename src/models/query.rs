//! Query-related data models.
//!
//! This module defines parameter values, bindings and the result shapes
//! produced by executing an operation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, RwLock};

/// One result row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// A result column as reported by the server when the statement is prepared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "INTEGER", "int8", "VARCHAR")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Convert a decoded JSON cell back into a parameter.
    ///
    /// Arrays and objects are bound as their JSON text.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => n.as_f64().map(Self::Float).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::String(s.clone()),
            other => Self::String(other.to_string()),
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for QueryParam {
    fn from(v: u32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A shared, mutable parameter slot for by-reference binding.
///
/// The caller keeps a clone and writes into it; the operation reads the current
/// value each time it executes.
#[derive(Debug, Clone, Default)]
pub struct BoundCell(Arc<RwLock<QueryParam>>);

impl BoundCell {
    pub fn new(value: impl Into<QueryParam>) -> Self {
        Self(Arc::new(RwLock::new(value.into())))
    }

    pub fn set(&self, value: impl Into<QueryParam>) {
        let mut slot = self.0.write().unwrap_or_else(|e| e.into_inner());
        *slot = value.into();
    }

    pub fn get(&self) -> QueryParam {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// A placeholder binding held by an operation.
#[derive(Debug, Clone)]
pub enum Binding {
    /// Copied in at bind time
    Value(QueryParam),
    /// Read at execute time
    Cell(BoundCell),
}

impl Binding {
    pub fn resolve(&self) -> QueryParam {
        match self {
            Self::Value(v) => v.clone(),
            Self::Cell(cell) => cell.get(),
        }
    }
}

/// Inline parameters passed to a single execution, overriding prior bindings.
#[derive(Debug, Clone)]
pub enum BindSet {
    /// Matched to `?` (or `$n`) markers in order
    Positional(Vec<QueryParam>),
    /// Matched to `:name` placeholders; the leading colon is optional
    Named(Vec<(String, QueryParam)>),
}

impl BindSet {
    pub fn named<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn positional<V, I>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub binds: Option<BindSet>,
    /// Commit a transaction opened with `begin_transaction` once this execution succeeds.
    /// Default: false
    pub auto_commit: bool,
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binds(mut self, binds: BindSet) -> Self {
        self.binds = Some(binds);
        self
    }

    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }
}

/// Error details of the last failed execution on an operation.
///
/// Shaped after the SQLSTATE triple: state, driver code, message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// `00000` when the operation has not failed
    pub sql_state: String,
    pub driver_code: Option<String>,
    pub message: Option<String>,
}

impl ErrorInfo {
    pub const SUCCESS_STATE: &'static str = "00000";
    pub const GENERAL_ERROR_STATE: &'static str = "HY000";

    pub fn ok() -> Self {
        Self {
            sql_state: Self::SUCCESS_STATE.to_string(),
            driver_code: None,
            message: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.sql_state == Self::SUCCESS_STATE
    }
}

impl From<&crate::error::DbError> for ErrorInfo {
    fn from(err: &crate::error::DbError) -> Self {
        let driver_code = match err {
            crate::error::DbError::Database { sql_state, .. } => sql_state.clone(),
            _ => None,
        };
        Self {
            sql_state: driver_code
                .clone()
                .unwrap_or_else(|| Self::GENERAL_ERROR_STATE.to_string()),
            driver_code,
            message: Some(err.to_string()),
        }
    }
}
