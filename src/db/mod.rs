//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Database dispatch macros for reducing code duplication
//! - Live connections and their registry
//! - Named query templates
//! - Operations (prepared statements keyed by integer id)
//! - Placeholder rendering and statement classification
//! - Statement execution and row conversion
//! - Engine-level transaction control

#[macro_use]
pub mod macros;
pub mod connection;
pub mod executor;
pub mod operation;
pub mod params;
pub mod queries;
pub mod statement;
pub mod transaction;
pub mod types;

pub use connection::{ConnectionHandle, ConnectionRegistry, DbConnection, LiveConnection, TxScope};
pub use executor::Outcome;
pub use operation::{Operation, OperationHandle, OperationRegistry};
pub use queries::{DEFAULT_QUERY_ID, DEFAULT_QUERY_SQL, QueryRegistry};
pub use statement::PreparedSql;
