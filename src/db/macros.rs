//! Database dispatch macros for reducing code duplication.
//!
//! The macros expand to plain `match` arms over `DbConnection` variants, so each
//! engine keeps its own concrete driver type in the arm body.

/// Generate a `match` over a `DbConnection` with one arm per engine.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::fetch_rows(c, sql, params).await,
///     Postgres(c) => postgres::fetch_rows(c, sql, params).await,
///     SQLite(c) => sqlite::fetch_rows(c, sql, params).await,
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

/// Apply the same expression to whichever driver connection is inside.
///
/// Only usable when the body type-checks for every engine, e.g. sqlx trait
/// methods shared by all three connection types.
#[macro_export]
macro_rules! with_db_connection {
    ($conn:expr, $c:ident => $body:expr) => {
        $crate::impl_db_dispatch!($conn, {
            MySql($c) => $body,
            Postgres($c) => $body,
            SQLite($c) => $body,
        })
    };
}

pub use impl_db_dispatch;
pub use with_db_connection;

#[cfg(test)]
mod tests {
    use crate::db::connection::DbConnection;
    use crate::models::{ConnectionConfig, DatabaseType};

    #[tokio::test]
    async fn test_dispatch_reaches_sqlite_arm() {
        let conn = DbConnection::open(&ConnectionConfig::sqlite("m", ":memory:"), false)
            .await
            .unwrap();
        let engine = impl_db_dispatch!(&conn, {
            MySql(_c) => DatabaseType::MySQL,
            Postgres(_c) => DatabaseType::PostgreSQL,
            SQLite(_c) => DatabaseType::SQLite,
        });
        assert_eq!(engine, DatabaseType::SQLite);
    }
}
