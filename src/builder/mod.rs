//! Fluent SQL construction.
//!
//! `QueryBuilder::table(name)` picks the table, one of `select`, `insert`,
//! `update` or `delete` picks the statement, and clause methods refine it.
//! Every value goes through a named placeholder; `build()` returns the SQL text
//! plus the placeholder bindings, ready for [`DbManager::query_from_builder`]
//! and [`DbManager::bind_values`].
//!
//! Misuse (a clause before an operation, an unknown operator, WHERE on an
//! INSERT, ...) does not panic. The first error is kept and `build()` returns it.
//!
//! ```ignore
//! let built = QueryBuilder::table("t")
//!     .select(&["a", "b"])
//!     .where_("a", "=", 1)
//!     .limit(5)
//!     .build()?;
//! assert_eq!(built.sql, "SELECT a, b FROM t WHERE a = :where_a_0 LIMIT 5");
//! ```
//!
//! [`DbManager::query_from_builder`]: crate::DbManager::query_from_builder
//! [`DbManager::bind_values`]: crate::DbManager::bind_values

mod compile;
mod condition;
mod operators;

pub use condition::Connector;
pub use operators::{ALLOWED_OPERATORS, Direction, normalize_operator, sanitize};

use crate::db::statement::normalize_placeholder;
use crate::error::DbError;
use crate::models::QueryParam;
use condition::{Clause, Condition};
use operators::placeholder_name;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryType::Select => "SELECT",
            QueryType::Insert => "INSERT",
            QueryType::Update => "UPDATE",
            QueryType::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Compiled statement: SQL text and the value of every placeholder in it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltQuery {
    pub sql: String,
    pub bindings: BTreeMap<String, QueryParam>,
}

#[derive(Debug, Default)]
pub struct QueryBuilder {
    table: Option<String>,
    kind: Option<QueryType>,
    columns: Vec<String>,
    /// Column and placeholder pairs of INSERT values / UPDATE assignments
    assignments: Vec<(String, String)>,
    conditions: Vec<Clause>,
    next_connector: Option<Connector>,
    group_by: Vec<String>,
    having: Vec<Clause>,
    order_by: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    bindings: BTreeMap<String, QueryParam>,
    /// Placeholder numbering starts here; non-zero for sub-builders
    base: usize,
    error: Option<DbError>,
}

impl QueryBuilder {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set (or replace) the table. Sub-query builders start without one.
    pub fn from(mut self, name: impl Into<String>) -> Self {
        self.table = Some(name.into());
        self
    }

    fn sub_builder(&self, table: Option<String>, kind: Option<QueryType>) -> Self {
        Self {
            table,
            kind,
            base: self.next_index(),
            ..Self::default()
        }
    }

    pub fn query_type(&self) -> Option<QueryType> {
        self.kind
    }

    /// The first error recorded so far, if any.
    pub fn error(&self) -> Option<&DbError> {
        self.error.as_ref()
    }

    fn next_index(&self) -> usize {
        self.base + self.bindings.len()
    }

    fn fail(&mut self, err: DbError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn bind(&mut self, prefix: &str, column: &str, value: QueryParam) -> String {
        let placeholder = placeholder_name(prefix, column, self.next_index());
        self.bindings.insert(placeholder.clone(), value);
        placeholder
    }

    fn merge(&mut self, bindings: BTreeMap<String, QueryParam>) {
        self.bindings.extend(bindings);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    fn start(mut self, kind: QueryType) -> Self {
        if self.table.is_none() {
            self.fail(DbError::not_ready(format!(
                "{} needs a table; call table() or from() first",
                kind
            )));
            return self;
        }
        let base = self.base;
        let table = self.table.take();
        let error = self.error.take();
        Self {
            table,
            kind: Some(kind),
            base,
            error,
            ..Self::default()
        }
    }

    /// `SELECT columns`; an empty list selects `*`.
    pub fn select(self, columns: &[&str]) -> Self {
        let mut builder = self.start(QueryType::Select);
        builder.columns = columns.iter().map(|c| c.to_string()).collect();
        builder
    }

    pub fn insert<K, V, I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.assign(QueryType::Insert, "ins", values)
    }

    pub fn update<K, V, I>(self, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        self.assign(QueryType::Update, "set", values)
    }

    fn assign<K, V, I>(self, kind: QueryType, prefix: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        let mut builder = self.start(kind);
        if builder.kind != Some(kind) {
            return builder;
        }
        for (column, value) in values {
            let column = column.into();
            let placeholder = builder.bind(prefix, &column, value.into());
            builder.assignments.push((column, placeholder));
        }
        if builder.assignments.is_empty() {
            builder.fail(DbError::invalid_input(format!("{} needs at least one column", kind)));
        }
        builder
    }

    pub fn delete(self) -> Self {
        self.start(QueryType::Delete)
    }

    // =========================================================================
    // WHERE
    // =========================================================================

    /// Check that a WHERE condition may be added now.
    fn where_allowed(&mut self) -> bool {
        match self.kind {
            None => {
                self.fail(DbError::not_ready(
                    "choose select, insert, update or delete before adding clauses",
                ));
                false
            }
            Some(QueryType::Insert) => {
                self.fail(DbError::unsupported("WHERE clauses are not allowed for INSERT"));
                false
            }
            Some(_) => self.error.is_none(),
        }
    }

    fn push(&mut self, connector: Option<Connector>, condition: Condition) {
        let connector = connector
            .or(self.next_connector.take())
            .unwrap_or(Connector::And);
        self.conditions.push(Clause {
            connector,
            condition,
        });
    }

    fn compare(
        mut self,
        connector: Option<Connector>,
        column: &str,
        operator: &str,
        value: QueryParam,
        negated: bool,
    ) -> Self {
        if !self.where_allowed() {
            return self;
        }
        let operator = match normalize_operator(operator) {
            Ok(op) => op,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        let key = operator.clone();
        let condition = match key.as_str() {
            "IS NULL" | "IS NOT NULL" => Condition::Null {
                column: column.to_string(),
                negated: (key == "IS NOT NULL") != negated,
            },
            "IN" | "NOT IN" => {
                let placeholder = self.bind(if negated { "not" } else { "where" }, column, value);
                Condition::In {
                    column: column.to_string(),
                    negated: (key == "NOT IN") != negated,
                    placeholders: vec![placeholder],
                }
            }
            "BETWEEN" | "NOT BETWEEN" => {
                self.fail(DbError::invalid_input(
                    "BETWEEN takes two bounds; use where_between",
                ));
                return self;
            }
            _ if negated => Condition::Not {
                column: column.to_string(),
                placeholder: self.bind("not", column, value),
                operator,
            },
            _ => Condition::Compare {
                column: column.to_string(),
                placeholder: self.bind("where", column, value),
                operator,
            },
        };
        self.push(connector, condition);
        self
    }

    /// `column operator :where_column_n`
    pub fn where_(self, column: &str, operator: &str, value: impl Into<QueryParam>) -> Self {
        self.compare(None, column, operator, value.into(), false)
    }

    pub fn and_where(self, column: &str, operator: &str, value: impl Into<QueryParam>) -> Self {
        self.compare(Some(Connector::And), column, operator, value.into(), false)
    }

    pub fn or_where(self, column: &str, operator: &str, value: impl Into<QueryParam>) -> Self {
        self.compare(Some(Connector::Or), column, operator, value.into(), false)
    }

    /// Join the next condition with OR instead of AND.
    pub fn or(mut self) -> Self {
        self.next_connector = Some(Connector::Or);
        self
    }

    /// `NOT (column operator :not_column_n)`
    pub fn where_not(self, column: &str, operator: &str, value: impl Into<QueryParam>) -> Self {
        self.compare(None, column, operator, value.into(), true)
    }

    pub fn where_in<V, I>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        self.membership(column, values, false)
    }

    pub fn where_not_in<V, I>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        self.membership(column, values, true)
    }

    fn membership<V, I>(mut self, column: &str, values: I, negated: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        if !self.where_allowed() {
            return self;
        }
        let prefix = if negated { "notin" } else { "in" };
        let placeholders: Vec<String> = values
            .into_iter()
            .map(|v| self.bind(prefix, column, v.into()))
            .collect();
        if placeholders.is_empty() {
            self.fail(DbError::invalid_input(format!(
                "{} on {} needs at least one value",
                if negated { "NOT IN" } else { "IN" },
                column
            )));
            return self;
        }
        self.push(
            None,
            Condition::In {
                column: column.to_string(),
                negated,
                placeholders,
            },
        );
        self
    }

    /// `column BETWEEN low AND high`; reversed bounds are swapped.
    pub fn where_between<V, I>(self, column: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        self.range(column, bounds, false)
    }

    pub fn where_not_between<V, I>(self, column: &str, bounds: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        self.range(column, bounds, true)
    }

    fn range<V, I>(mut self, column: &str, bounds: I, negated: bool) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<QueryParam>,
    {
        if !self.where_allowed() {
            return self;
        }
        let mut bounds: Vec<QueryParam> = bounds.into_iter().map(Into::into).collect();
        if bounds.len() != 2 {
            self.fail(DbError::invalid_range(format!(
                "BETWEEN on {} requires exactly 2 bounds, got {}",
                column,
                bounds.len()
            )));
            return self;
        }
        if compare_params(&bounds[0], &bounds[1]) == Some(Ordering::Greater) {
            bounds.swap(0, 1);
        }
        let prefix = if negated { "nbtw" } else { "btw" };
        let mut bounds = bounds.into_iter();
        let (Some(low), Some(high)) = (bounds.next(), bounds.next()) else {
            return self;
        };
        let low = self.bind(prefix, column, low);
        let high = self.bind(prefix, column, high);
        self.push(
            None,
            Condition::Between {
                column: column.to_string(),
                negated,
                low,
                high,
            },
        );
        self
    }

    pub fn where_null(mut self, column: &str) -> Self {
        if self.where_allowed() {
            self.push(
                None,
                Condition::Null {
                    column: column.to_string(),
                    negated: false,
                },
            );
        }
        self
    }

    pub fn where_not_null(mut self, column: &str) -> Self {
        if self.where_allowed() {
            self.push(
                None,
                Condition::Null {
                    column: column.to_string(),
                    negated: true,
                },
            );
        }
        self
    }

    pub fn where_like(self, column: &str, pattern: impl Into<QueryParam>) -> Self {
        self.where_(column, "LIKE", pattern)
    }

    pub fn where_not_like(self, column: &str, pattern: impl Into<QueryParam>) -> Self {
        self.where_(column, "NOT LIKE", pattern)
    }

    /// `EXISTS (sub-query)`. The closure receives a builder without a table;
    /// call `from()` on it.
    pub fn where_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists(build, false)
    }

    pub fn where_not_exists<F>(self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        self.exists(build, true)
    }

    fn exists<F>(mut self, build: F, negated: bool) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        if !self.where_allowed() {
            return self;
        }
        let sub = build(self.sub_builder(None, None));
        match sub.build() {
            Ok(built) => {
                self.merge(built.bindings);
                self.push(
                    None,
                    Condition::Exists {
                        negated,
                        sql: built.sql,
                    },
                );
            }
            Err(e) => self.fail(e),
        }
        self
    }

    /// A parenthesized group of conditions built on the same table.
    pub fn where_nested<F>(mut self, build: F) -> Self
    where
        F: FnOnce(QueryBuilder) -> QueryBuilder,
    {
        if !self.where_allowed() {
            return self;
        }
        let seed = self.sub_builder(self.table.clone(), self.kind);
        let mut sub = build(seed);
        if let Some(e) = sub.error.take() {
            self.fail(e);
            return self;
        }
        if sub.conditions.is_empty() {
            return self;
        }
        let sql = condition::render_clauses(&sub.conditions);
        self.merge(sub.bindings);
        self.push(None, Condition::Nested(sql));
        self
    }

    /// A verbatim SQL fragment.
    pub fn where_raw(self, sql: &str) -> Self {
        self.where_raw_with(sql, Vec::<(String, QueryParam)>::new())
    }

    /// A verbatim SQL fragment whose `:placeholders` are bound to `bindings`.
    pub fn where_raw_with<K, V, I>(mut self, sql: &str, bindings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<QueryParam>,
    {
        if !self.where_allowed() {
            return self;
        }
        for (name, value) in bindings {
            self.bindings
                .insert(normalize_placeholder(name.as_ref()), value.into());
        }
        self.push(None, Condition::Raw(sql.to_string()));
        self
    }

    // =========================================================================
    // SELECT-only clauses
    // =========================================================================

    fn select_clause_allowed(&mut self, clause: &str) -> bool {
        match self.kind {
            None => {
                self.fail(DbError::not_ready(
                    "choose select, insert, update or delete before adding clauses",
                ));
                false
            }
            Some(QueryType::Select) => self.error.is_none(),
            Some(kind) => {
                self.fail(DbError::unsupported(format!(
                    "{} is not supported for {}",
                    clause, kind
                )));
                false
            }
        }
    }

    pub fn group_by(mut self, columns: &[&str]) -> Self {
        if self.select_clause_allowed("GROUP BY") {
            self.group_by.extend(columns.iter().map(|c| c.to_string()));
        }
        self
    }

    /// `HAVING column operator :having_column_n`, joined with AND.
    pub fn having(mut self, column: &str, operator: &str, value: impl Into<QueryParam>) -> Self {
        if !self.select_clause_allowed("HAVING") {
            return self;
        }
        match normalize_operator(operator) {
            Ok(operator) => {
                let placeholder = self.bind("having", column, value.into());
                self.having.push(Clause {
                    connector: Connector::And,
                    condition: Condition::Compare {
                        column: column.to_string(),
                        operator,
                        placeholder,
                    },
                });
            }
            Err(e) => self.fail(e),
        }
        self
    }

    /// `ORDER BY column direction`; `direction` is `DESC` or anything else for `ASC`.
    pub fn order_by(mut self, column: &str, direction: &str) -> Self {
        if self.select_clause_allowed("ORDER BY") {
            self.order_by
                .push((column.to_string(), Direction::parse(direction)));
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        if self.select_clause_allowed("LIMIT") {
            self.limit = Some(limit);
        }
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        if self.select_clause_allowed("OFFSET") {
            self.offset = Some(offset);
        }
        self
    }
}

/// Order two bounds when they are comparable (both numeric or both text).
fn compare_params(a: &QueryParam, b: &QueryParam) -> Option<Ordering> {
    match (a, b) {
        (QueryParam::Int(x), QueryParam::Int(y)) => Some(x.cmp(y)),
        (QueryParam::Int(x), QueryParam::Float(y)) => (*x as f64).partial_cmp(y),
        (QueryParam::Float(x), QueryParam::Int(y)) => x.partial_cmp(&(*y as f64)),
        (QueryParam::Float(x), QueryParam::Float(y)) => x.partial_cmp(y),
        (QueryParam::String(x), QueryParam::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_params() {
        assert_eq!(
            compare_params(&QueryParam::Int(10), &QueryParam::Int(5)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_params(&QueryParam::Float(1.5), &QueryParam::Int(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_params(&QueryParam::from("b"), &QueryParam::from("a")),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_params(&QueryParam::Null, &QueryParam::Int(1)), None);
    }

    #[test]
    fn test_clause_before_operation() {
        let builder = QueryBuilder::table("t").where_("a", "=", 1);
        assert!(matches!(builder.error(), Some(DbError::NotReady { .. })));
    }

    #[test]
    fn test_first_error_wins() {
        let builder = QueryBuilder::table("t")
            .select(&[])
            .where_("a", "===", 1)
            .where_between("b", [1]);
        assert!(matches!(builder.error(), Some(DbError::InvalidOperator { .. })));
    }

    #[test]
    fn test_operation_switch_resets_clauses() {
        let builder = QueryBuilder::table("t")
            .select(&["a"])
            .where_("a", "=", 1)
            .delete();
        assert_eq!(builder.query_type(), Some(QueryType::Delete));
        assert!(builder.conditions.is_empty());
        assert!(builder.bindings.is_empty());
    }
}
