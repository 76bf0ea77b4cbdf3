//! Data models shared by the registries, the executor and the query builder.

pub mod connection;
pub mod query;

pub use connection::{
    ConnectionConfig, ConnectionConfigError, ConnectionInfo, DEFAULT_CHARSET, DatabaseType,
    IsolationLevel,
};
pub use query::{
    BindSet, Binding, BoundCell, ColumnMetadata, ErrorInfo, ExecuteOptions, QueryParam, Row,
};
