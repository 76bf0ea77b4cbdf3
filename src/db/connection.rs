//! Live connection management.
//!
//! One dedicated driver connection per connection id. Each live connection sits
//! behind its own `tokio::sync::Mutex` so statements and transaction control on
//! the same id are serialized while different ids proceed independently.

use crate::db::executor;
use crate::error::{DbError, DbResult, ResourceKind};
use crate::models::{ColumnMetadata, ConnectionConfig, ConnectionInfo, DatabaseType, Row};
use chrono::{DateTime, Utc};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{ConnectOptions, Connection, MySqlConnection, PgConnection, SqliteConnection};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Database-specific connection (avoids `AnyConnection` limitations).
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
    SQLite(SqliteConnection),
}

/// Whether a TLS backend was compiled in.
pub fn tls_available() -> bool {
    cfg!(any(feature = "tls-native", feature = "tls-rustls"))
}

impl DbConnection {
    /// Open a connection for `config`.
    ///
    /// With `ssl_force` the server certificate and host name are verified; without
    /// it TLS is preferred but not required.
    pub async fn open(config: &ConnectionConfig, ssl_force: bool) -> DbResult<Self> {
        if ssl_force && config.db_type.is_networked() && !tls_available() {
            return Err(DbError::not_started(
                "SSL is required but no TLS backend is compiled in (enable tls-native or tls-rustls)",
            ));
        }

        let failed = |e: sqlx::Error| {
            DbError::connection(
                format!("Failed to connect to {}: {}", config.masked(), e),
                connection_suggestion(config.db_type),
            )
        };

        match config.db_type {
            DatabaseType::MySQL => {
                let (host, port) = config.host_port();
                let mut options = MySqlConnectOptions::new()
                    .host(host)
                    .username(&config.username)
                    .charset(&config.charset)
                    .ssl_mode(if ssl_force {
                        MySqlSslMode::VerifyIdentity
                    } else {
                        MySqlSslMode::Preferred
                    });
                if let Some(port) = port {
                    options = options.port(port);
                }
                if !config.password.is_empty() {
                    options = options.password(&config.password);
                }
                if !config.database.is_empty() {
                    options = options.database(&config.database);
                }
                let conn = options.connect().await.map_err(failed)?;
                Ok(DbConnection::MySql(conn))
            }
            DatabaseType::PostgreSQL => {
                let (host, port) = config.host_port();
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .username(&config.username)
                    .ssl_mode(if ssl_force {
                        PgSslMode::VerifyFull
                    } else {
                        PgSslMode::Prefer
                    });
                if let Some(port) = port {
                    options = options.port(port);
                }
                if !config.password.is_empty() {
                    options = options.password(&config.password);
                }
                if !config.database.is_empty() {
                    options = options.database(&config.database);
                }
                let conn = options.connect().await.map_err(failed)?;
                Ok(DbConnection::Postgres(conn))
            }
            DatabaseType::SQLite => {
                let options = if config.database == ":memory:" {
                    SqliteConnectOptions::from_str("sqlite::memory:").map_err(failed)?
                } else {
                    SqliteConnectOptions::new()
                        .filename(&config.database)
                        .create_if_missing(true)
                };
                let conn = options.connect().await.map_err(failed)?;
                Ok(DbConnection::SQLite(conn))
            }
        }
    }

    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::Postgres(_) => DatabaseType::PostgreSQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Prepare `sql` on the server and describe its result columns.
    pub async fn prepare(&mut self, sql: &str) -> DbResult<Vec<ColumnMetadata>> {
        use sqlx::{Column, Executor, Statement, TypeInfo};
        let columns = with_db_connection!(self, c => c
            .prepare(sql)
            .await?
            .columns()
            .iter()
            .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
            .collect());
        Ok(columns)
    }

    /// Run a statement without parameters and return rows affected.
    pub async fn execute_raw(&mut self, sql: &str) -> DbResult<u64> {
        executor::execute_raw(self, sql).await
    }

    /// Run a row-returning statement without parameters.
    pub async fn fetch_raw(&mut self, sql: &str) -> DbResult<Vec<Row>> {
        executor::fetch_raw(self, sql).await
    }

    pub async fn server_version(&mut self) -> Option<String> {
        let sql = match self.db_type() {
            DatabaseType::SQLite => "SELECT sqlite_version() AS version",
            _ => "SELECT version() AS version",
        };
        match self.fetch_raw(sql).await {
            Ok(rows) => rows
                .first()
                .and_then(|row| row.get("version"))
                .and_then(|v| v.as_str())
                .map(String::from),
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }

    /// Close the connection gracefully.
    pub async fn close(self) {
        let result = with_db_connection!(self, c => c.close().await);
        if let Err(e) = result {
            warn!(error = %e, "Error while closing connection");
        }
    }
}

fn connection_suggestion(db_type: DatabaseType) -> &'static str {
    match db_type {
        DatabaseType::MySQL => "Check host, port, credentials and that the MySQL server is reachable",
        DatabaseType::PostgreSQL => {
            "Check host, port, credentials and that the PostgreSQL server is reachable"
        }
        DatabaseType::SQLite => "Check that the database file path exists and is writable",
    }
}

/// Who opened the transaction currently running on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxScope {
    /// Opened with `begin_transaction`
    Explicit,
    /// Owned by a `transaction()` call; carries its scope id
    Scoped(String),
}

/// A connected database handle plus its manager-side state.
#[derive(Debug)]
pub struct LiveConnection {
    pub id: String,
    pub connection: DbConnection,
    /// Always false at creation
    pub autocommit: bool,
    pub tx: Option<TxScope>,
    pub server_version: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl LiveConnection {
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            connection_id: self.id.clone(),
            database_type: self.connection.db_type(),
            server_version: self.server_version.clone(),
            autocommit: self.autocommit,
            in_transaction: self.in_transaction(),
            connected_at: self.connected_at,
        }
    }
}

pub type SharedConnection = Arc<Mutex<LiveConnection>>;

/// A caller-held reference to a live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: String,
    inner: SharedConnection,
}

impl ConnectionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn info(&self) -> ConnectionInfo {
        self.inner.lock().await.info()
    }

    pub async fn in_transaction(&self) -> bool {
        self.inner.lock().await.in_transaction()
    }

    /// Run DDL or another statement that takes no parameters.
    pub async fn execute_raw(&self, sql: &str) -> DbResult<u64> {
        self.inner.lock().await.connection.execute_raw(sql).await
    }

    pub async fn fetch_raw(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.inner.lock().await.connection.fetch_raw(sql).await
    }
}

/// Named connection configurations and live connections.
#[derive(Clone)]
pub struct ConnectionRegistry {
    configs: Arc<RwLock<HashMap<String, ConnectionConfig>>>,
    live: Arc<RwLock<HashMap<String, SharedConnection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            configs: Arc::new(RwLock::new(HashMap::new())),
            live: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a configuration, replacing any previous one under the same id.
    pub async fn define(&self, config: ConnectionConfig) -> bool {
        let id = config.id.clone();
        let replaced = self.configs.write().await.insert(id.clone(), config).is_some();
        debug!(connection_id = %id, replaced, "Connection defined");
        replaced
    }

    pub async fn config(&self, id: &str) -> DbResult<ConnectionConfig> {
        self.configs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found(ResourceKind::Database, id))
    }

    /// Open the defined connection and register it as live.
    ///
    /// Reconnecting an id replaces the previous live connection, which is closed
    /// after the swap.
    pub async fn connect(&self, id: &str, ssl_force: bool) -> DbResult<ConnectionHandle> {
        let config = self.config(id).await?;

        info!(
            connection_id = %id,
            db_type = %config.db_type,
            target = %config.masked(),
            "Connecting to database"
        );

        let mut connection = DbConnection::open(&config, ssl_force).await?;
        let server_version = connection.server_version().await;

        let live = Arc::new(Mutex::new(LiveConnection {
            id: id.to_string(),
            connection,
            autocommit: false,
            tx: None,
            server_version: server_version.clone(),
            connected_at: Utc::now(),
        }));

        let previous = self
            .live
            .write()
            .await
            .insert(id.to_string(), Arc::clone(&live));

        if let Some(previous) = previous {
            warn!(connection_id = %id, "Replacing existing live connection");
            Self::release(previous).await;
        }

        info!(
            connection_id = %id,
            server_version = ?server_version,
            "Connected successfully"
        );

        Ok(ConnectionHandle {
            id: id.to_string(),
            inner: live,
        })
    }

    /// Get a live connection by id.
    pub async fn get(&self, id: &str) -> DbResult<SharedConnection> {
        self.live
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found(ResourceKind::Connection, id))
    }

    pub async fn handle(&self, id: &str) -> DbResult<ConnectionHandle> {
        Ok(ConnectionHandle {
            id: id.to_string(),
            inner: self.get(id).await?,
        })
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.live.read().await.contains_key(id)
    }

    /// List all live connection ids.
    pub async fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.live.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove and close one live connection. Returns false if it was not connected.
    pub async fn close(&self, id: &str) -> bool {
        let removed = self.live.write().await.remove(id);
        match removed {
            Some(conn) => {
                Self::release(conn).await;
                info!(connection_id = %id, "Connection closed");
                true
            }
            None => false,
        }
    }

    /// Close all live connections.
    pub async fn close_all(&self) {
        let drained: Vec<(String, SharedConnection)> = self.live.write().await.drain().collect();
        for (id, conn) in drained {
            info!(connection_id = %id, "Closing connection");
            Self::release(conn).await;
        }
        info!("All connections closed");
    }

    /// Roll back any open transaction, then close the driver connection once no
    /// other holder (an operation mid-execute) still references it.
    async fn release(conn: SharedConnection) {
        {
            let mut live = conn.lock().await;
            if live.tx.is_some() {
                if let Err(e) = live.connection.execute_raw("ROLLBACK").await {
                    warn!(connection_id = %live.id, error = %e, "Rollback on close failed");
                }
                live.tx = None;
            }
        }
        match Arc::try_unwrap(conn) {
            Ok(mutex) => mutex.into_inner().connection.close().await,
            Err(_) => debug!("Connection still referenced; it closes when the last holder drops it"),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
