//! Parameter binding onto driver queries.
//!
//! Every engine binds a resolved `QueryParam` the same way apart from its
//! argument buffer type, so one macro generates the per-engine binder.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

macro_rules! impl_bind_param {
    ($(#[$meta:meta])* $name:ident, $db:ty, $args:ty, $lt:lifetime) => {
        $(#[$meta])*
        pub(crate) fn $name<$lt>(
            query: sqlx::query::Query<$lt, $db, $args>,
            param: &$lt QueryParam,
        ) -> sqlx::query::Query<$lt, $db, $args> {
            match param {
                QueryParam::Null => query.bind(None::<String>),
                QueryParam::Bool(v) => query.bind(*v),
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Float(v) => query.bind(*v),
                QueryParam::String(v) => query.bind(v.as_str()),
                QueryParam::Bytes(v) => query.bind(v.as_slice()),
            }
        }
    };
}

impl_bind_param!(bind_mysql_param, MySql, MySqlArguments, 'q);
impl_bind_param!(
    /// NULL goes out as untyped text; PostgreSQL coerces it to the column type.
    bind_postgres_param,
    Postgres,
    PgArguments,
    'q
);
impl_bind_param!(bind_sqlite_param, Sqlite, SqliteArguments<'q>, 'q);

/// Bind every resolved value in order.
macro_rules! bind_all {
    ($binder:path, $sql:expr, $params:expr) => {{
        let mut query = sqlx::query($sql);
        for param in $params {
            query = $binder(query, param);
        }
        query
    }};
}

pub(crate) use bind_all;
