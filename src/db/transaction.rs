//! Engine-level transaction control.
//!
//! Transactions are driven with plain SQL on the live connection rather than
//! sqlx's borrowing `Transaction` guard, because the open transaction must
//! outlive any single call: it is begun, used by many operations and finished
//! by separate manager calls. Callers hold the connection's mutex throughout.

use crate::db::connection::DbConnection;
use crate::error::DbResult;
use crate::models::{DatabaseType, IsolationLevel};
use tracing::{debug, warn};

/// Generate a unique id for a scoped transaction.
pub fn generate_scope_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

/// The statement that sets the isolation level, run before (MySQL, SQLite) or
/// right after (PostgreSQL) the transaction starts.
pub fn isolation_statement(db_type: DatabaseType, level: IsolationLevel) -> String {
    match db_type {
        DatabaseType::MySQL | DatabaseType::PostgreSQL => {
            format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql())
        }
        // SQLite only distinguishes dirty reads, and only in shared-cache mode.
        DatabaseType::SQLite => format!(
            "PRAGMA read_uncommitted = {}",
            u8::from(level == IsolationLevel::ReadUncommitted)
        ),
    }
}

fn begin_statement(db_type: DatabaseType, level: Option<IsolationLevel>) -> &'static str {
    match (db_type, level) {
        (DatabaseType::MySQL, _) => "START TRANSACTION",
        (DatabaseType::SQLite, Some(IsolationLevel::Serializable)) => "BEGIN IMMEDIATE",
        _ => "BEGIN",
    }
}

/// Start a transaction, applying `level` first when given.
pub async fn begin(conn: &mut DbConnection, level: Option<IsolationLevel>) -> DbResult<()> {
    let db_type = conn.db_type();
    match (db_type, level) {
        (DatabaseType::PostgreSQL, Some(level)) => {
            conn.execute_raw(begin_statement(db_type, Some(level))).await?;
            if let Err(e) = conn
                .execute_raw(&isolation_statement(db_type, level))
                .await
            {
                if let Err(rollback_err) = conn.execute_raw("ROLLBACK").await {
                    warn!(error = %rollback_err, "Rollback after failed isolation change failed");
                }
                return Err(e);
            }
        }
        (_, Some(level)) => {
            conn.execute_raw(&isolation_statement(db_type, level)).await?;
            conn.execute_raw(begin_statement(db_type, Some(level))).await?;
        }
        (_, None) => {
            conn.execute_raw(begin_statement(db_type, None)).await?;
        }
    }
    debug!(db_type = %db_type, isolation = ?level, "Transaction started");
    Ok(())
}

pub async fn commit(conn: &mut DbConnection) -> DbResult<()> {
    conn.execute_raw("COMMIT").await?;
    debug!("Transaction committed");
    Ok(())
}

pub async fn rollback(conn: &mut DbConnection) -> DbResult<()> {
    conn.execute_raw("ROLLBACK").await?;
    debug!("Transaction rolled back");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConnectionConfig;

    #[test]
    fn test_generate_scope_id() {
        let id1 = generate_scope_id();
        let id2 = generate_scope_id();

        assert!(id1.starts_with("tx_"));
        assert_eq!(id1.len(), 35);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_isolation_statements() {
        assert_eq!(
            isolation_statement(DatabaseType::MySQL, IsolationLevel::ReadCommitted),
            "SET TRANSACTION ISOLATION LEVEL READ COMMITTED"
        );
        assert_eq!(
            isolation_statement(DatabaseType::SQLite, IsolationLevel::ReadUncommitted),
            "PRAGMA read_uncommitted = 1"
        );
        assert_eq!(
            isolation_statement(DatabaseType::SQLite, IsolationLevel::Serializable),
            "PRAGMA read_uncommitted = 0"
        );
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let mut conn = DbConnection::open(&ConnectionConfig::sqlite("t", ":memory:"), false)
            .await
            .unwrap();
        conn.execute_raw("CREATE TABLE t (a INTEGER)").await.unwrap();

        begin(&mut conn, Some(IsolationLevel::Serializable)).await.unwrap();
        conn.execute_raw("INSERT INTO t VALUES (1)").await.unwrap();
        rollback(&mut conn).await.unwrap();

        let rows = conn.fetch_raw("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(rows[0]["n"], serde_json::json!(0));
    }

    #[tokio::test]
    async fn test_commit_keeps_writes() {
        let mut conn = DbConnection::open(&ConnectionConfig::sqlite("t", ":memory:"), false)
            .await
            .unwrap();
        conn.execute_raw("CREATE TABLE t (a INTEGER)").await.unwrap();

        begin(&mut conn, None).await.unwrap();
        conn.execute_raw("INSERT INTO t VALUES (1)").await.unwrap();
        commit(&mut conn).await.unwrap();

        let rows = conn.fetch_raw("SELECT COUNT(*) AS n FROM t").await.unwrap();
        assert_eq!(rows[0]["n"], serde_json::json!(1));
    }
}
