//! db-manager Library
//!
//! A single facade over SQLite, PostgreSQL and MySQL connections: named
//! connections and query templates, integer-keyed prepared operations,
//! placeholder binding with configurable error modes, buffered cursors,
//! transactions and a fluent query builder.

pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod models;
pub mod monitor;

pub use builder::{BuiltQuery, QueryBuilder};
pub use config::Config;
pub use error::{DbError, DbResult};
pub use manager::{DbManager, ManagerOptions, prelude};
pub use monitor::{LogMonitoring, Mode, Monitor, NameErrorBinding};
