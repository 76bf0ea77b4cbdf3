//! Table maintenance: existence checks and id renumbering.

use super::DbManager;
use crate::db::connection::DbConnection;
use crate::db::{TxScope, executor, transaction};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, QueryParam};
use tracing::{debug, warn};

/// Accept only plain (optionally schema-qualified) identifiers.
fn validate_identifier(name: &str) -> DbResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && !name.ends_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!("invalid identifier: {:?}", name)))
    }
}

fn table_exists_sql(db_type: DatabaseType) -> &'static str {
    match db_type {
        DatabaseType::MySQL => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
        DatabaseType::PostgreSQL => {
            "SELECT COUNT(*) AS n FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1"
        }
        DatabaseType::SQLite => {
            "SELECT COUNT(*) AS n FROM sqlite_master WHERE type = 'table' AND name = ?"
        }
    }
}

fn placeholder(db_type: DatabaseType, index: usize) -> String {
    match db_type {
        DatabaseType::PostgreSQL => format!("${}", index + 1),
        _ => "?".to_string(),
    }
}

impl DbManager {
    /// Whether `table` exists in the connection's current schema.
    pub async fn table_exists(&self, db_id: &str, table: &str) -> bool {
        let result = self.try_table_exists(db_id, table).await;
        self.report("table_exists", result).unwrap_or(false)
    }

    async fn try_table_exists(&self, db_id: &str, table: &str) -> DbResult<bool> {
        self.ensure_started()?;
        let conn = self.inner.connections.get(db_id).await?;
        let mut live = conn.lock().await;
        let sql = table_exists_sql(live.connection.db_type());
        let (_, rows) =
            executor::fetch(&mut live.connection, sql, &[QueryParam::from(table)]).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("n"))
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(count > 0)
    }

    /// Rewrite `table` so its `id` column runs 1..=n in `order_by` order.
    ///
    /// Runs in a single transaction on an idle connection and rolls back on any
    /// failure. Values pass through JSON, so engine-specific types (decimals,
    /// binary, timestamps) are re-inserted in their text form.
    pub async fn tidy(&self, db_id: &str, table: &str, order_by: &str) -> bool {
        match self.try_tidy(db_id, table, order_by).await {
            Ok(rows) => {
                self.monitor()
                    .monitor(format!("tidy: table {} tidied ({} rows)", table, rows));
                true
            }
            Err(e) => {
                self.monitor()
                    .monitor(format!("tidy: error tidying table {}: {}", table, e));
                false
            }
        }
    }

    async fn try_tidy(&self, db_id: &str, table: &str, order_by: &str) -> DbResult<usize> {
        validate_identifier(table)?;
        validate_identifier(order_by)?;
        self.ensure_started()?;

        let conn = self.inner.connections.get(db_id).await?;
        let mut live = conn.lock().await;
        if live.in_transaction() {
            return Err(DbError::transaction(
                "tidy needs a connection without an active transaction",
                db_id,
            ));
        }
        let db_type = live.connection.db_type();

        transaction::begin(&mut live.connection, None).await?;
        live.tx = Some(TxScope::Scoped(transaction::generate_scope_id()));

        let rebuilt = rebuild(&mut live.connection, table, order_by).await;
        if db_type == DatabaseType::MySQL {
            if let Err(e) = live.connection.execute_raw("SET FOREIGN_KEY_CHECKS = 1").await {
                warn!(connection_id = %db_id, error = %e, "Failed to restore foreign key checks");
            }
        }

        let finished = match rebuilt {
            Ok(rows) => transaction::commit(&mut live.connection).await.map(|()| rows),
            Err(e) => Err(e),
        };
        let rows = match finished {
            Ok(rows) => {
                live.tx = None;
                rows
            }
            Err(e) => {
                if let Err(rollback_err) = transaction::rollback(&mut live.connection).await {
                    warn!(connection_id = %db_id, error = %rollback_err, "Rollback after failed tidy failed");
                }
                live.tx = None;
                return Err(e);
            }
        };

        reset_sequence(&mut live.connection, table, rows).await;
        Ok(rows)
    }
}

async fn rebuild(conn: &mut DbConnection, table: &str, order_by: &str) -> DbResult<usize> {
    let db_type = conn.db_type();
    let relax = match db_type {
        DatabaseType::MySQL => "SET FOREIGN_KEY_CHECKS = 0",
        DatabaseType::PostgreSQL => "SET CONSTRAINTS ALL DEFERRED",
        DatabaseType::SQLite => "PRAGMA defer_foreign_keys = ON",
    };
    conn.execute_raw(relax).await?;

    let select = format!("SELECT * FROM {} ORDER BY {}", table, order_by);
    let (columns, rows) = executor::fetch(conn, &select, &[]).await?;
    if rows.is_empty() {
        return Ok(0);
    }
    if !columns.iter().any(|c| c == "id") {
        return Err(DbError::invalid_input(format!(
            "table {} has no id column",
            table
        )));
    }
    for column in &columns {
        validate_identifier(column)?;
    }

    conn.execute_raw(&format!("DELETE FROM {}", table)).await?;

    let placeholders: Vec<String> = (0..columns.len()).map(|i| placeholder(db_type, i)).collect();
    let insert = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    );

    for (index, row) in rows.iter().enumerate() {
        let params: Vec<QueryParam> = columns
            .iter()
            .map(|column| {
                if column == "id" {
                    QueryParam::Int(index as i64 + 1)
                } else {
                    row.get(column)
                        .map(QueryParam::from_json)
                        .unwrap_or_default()
                }
            })
            .collect();
        executor::execute(conn, &insert, &params).await?;
    }

    debug!(table = %table, rows = rows.len(), "Table rebuilt");
    Ok(rows.len())
}

/// Point the id generator past the last renumbered row. Best-effort.
async fn reset_sequence(conn: &mut DbConnection, table: &str, rows: usize) {
    let result = match conn.db_type() {
        DatabaseType::MySQL => conn
            .execute_raw(&format!("ALTER TABLE {} AUTO_INCREMENT = {}", table, rows + 1))
            .await
            .map(|_| ()),
        DatabaseType::SQLite => executor::execute(
            conn,
            "UPDATE sqlite_sequence SET seq = ? WHERE name = ?",
            &[QueryParam::Int(rows as i64), QueryParam::from(table)],
        )
        .await
        .map(|_| ()),
        DatabaseType::PostgreSQL if rows > 0 => executor::fetch(
            conn,
            "SELECT setval(pg_get_serial_sequence($1, 'id'), $2)::bigint AS seq",
            &[QueryParam::from(table), QueryParam::Int(rows as i64)],
        )
        .await
        .map(|_| ()),
        DatabaseType::PostgreSQL => Ok(()),
    };
    if let Err(e) = result {
        debug!(table = %table, error = %e, "Sequence not reset");
    }
}
