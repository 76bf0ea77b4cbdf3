//! Statement execution on a single live connection.
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific fetch and write
//! - `postgres`: PostgreSQL-specific fetch and write
//! - `sqlite`: SQLite-specific fetch and write
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::connection::DbConnection;
use crate::db::params::{bind_all, bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::statement::PreparedSql;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, Row};
use std::time::Instant;
use tracing::debug;

/// What an execution produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    Rows { columns: Vec<String>, rows: Vec<Row> },
    Affected(u64),
}

/// Execute a prepared statement with its resolved parameters.
pub async fn run(
    conn: &mut DbConnection,
    statement: &PreparedSql,
    params: &[QueryParam],
) -> DbResult<Outcome> {
    let start = Instant::now();
    debug!(
        sql = %statement.rendered,
        params = params.len(),
        returns_rows = statement.returns_rows,
        "Executing statement"
    );

    let outcome = if statement.returns_rows {
        let (columns, rows) = fetch(conn, &statement.rendered, params).await?;
        Outcome::Rows { columns, rows }
    } else {
        Outcome::Affected(execute(conn, &statement.rendered, params).await?)
    };

    debug!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Statement finished"
    );
    Ok(outcome)
}

/// Fetch all rows of a (driver-style) statement.
pub async fn fetch(
    conn: &mut DbConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<(Vec<String>, Vec<Row>)> {
    impl_db_dispatch!(conn, {
        MySql(c) => mysql::fetch_rows(c, sql, params).await.map(process_rows),
        Postgres(c) => postgres::fetch_rows(c, sql, params).await.map(process_rows),
        SQLite(c) => sqlite::fetch_rows(c, sql, params).await.map(process_rows),
    })
}

/// Run a (driver-style) write statement and return rows affected.
pub async fn execute(conn: &mut DbConnection, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
    impl_db_dispatch!(conn, {
        MySql(c) => mysql::execute_write(c, sql, params).await,
        Postgres(c) => postgres::execute_write(c, sql, params).await,
        SQLite(c) => sqlite::execute_write(c, sql, params).await,
    })
}

pub async fn execute_raw(conn: &mut DbConnection, sql: &str) -> DbResult<u64> {
    execute(conn, sql, &[]).await
}

pub async fn fetch_raw(conn: &mut DbConnection, sql: &str) -> DbResult<Vec<Row>> {
    fetch(conn, sql, &[]).await.map(|(_, rows)| rows)
}

fn process_rows<R: RowToJson>(rows: Vec<R>) -> (Vec<String>, Vec<Row>) {
    let columns = rows.first().map(|r| r.column_names()).unwrap_or_default();
    let rows = rows.iter().map(|r| r.to_row()).collect();
    (columns, rows)
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Without parameters the SQL is sent as a plain (unprepared) query so that
// transaction control and DDL go through the simple protocol.

mod mysql {
    use super::*;
    use sqlx::MySqlConnection;
    use sqlx::mysql::MySqlRow;

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<MySqlRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            return conn.fetch_all(sql).await.map_err(DbError::from);
        }
        bind_all!(bind_mysql_param, sql, params).fetch_all(conn).await.map_err(DbError::from)
    }

    pub async fn execute_write(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            conn.execute(sql).await
        } else {
            bind_all!(bind_mysql_param, sql, params).execute(conn).await
        };
        result.map(|r| r.rows_affected()).map_err(DbError::from)
    }
}

mod postgres {
    use super::*;
    use sqlx::PgConnection;
    use sqlx::postgres::PgRow;

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<PgRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            return conn.fetch_all(sql).await.map_err(DbError::from);
        }
        bind_all!(bind_postgres_param, sql, params).fetch_all(conn).await.map_err(DbError::from)
    }

    pub async fn execute_write(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            conn.execute(sql).await
        } else {
            bind_all!(bind_postgres_param, sql, params).execute(conn).await
        };
        result.map(|r| r.rows_affected()).map_err(DbError::from)
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqliteConnection;
    use sqlx::sqlite::SqliteRow;

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<SqliteRow>> {
        if params.is_empty() {
            use sqlx::Executor;
            return conn.fetch_all(sql).await.map_err(DbError::from);
        }
        bind_all!(bind_sqlite_param, sql, params).fetch_all(conn).await.map_err(DbError::from)
    }

    pub async fn execute_write(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            use sqlx::Executor;
            conn.execute(sql).await
        } else {
            bind_all!(bind_sqlite_param, sql, params).execute(conn).await
        };
        result.map(|r| r.rows_affected()).map_err(DbError::from)
    }
}
