//! Operator allow-list and placeholder naming.

use crate::error::{DbError, DbResult};

/// Comparison, pattern and set operators accepted in WHERE and HAVING clauses.
pub const ALLOWED_OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "<=>", "LIKE", "NOT LIKE", "ILIKE", "IN", "NOT IN",
    "BETWEEN", "NOT BETWEEN", "IS NULL", "IS NOT NULL",
];

/// Uppercase `operator`, collapse inner whitespace and check it against the allow-list.
pub fn normalize_operator(operator: &str) -> DbResult<String> {
    let normalized = operator
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    if ALLOWED_OPERATORS.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(DbError::invalid_operator(operator))
    }
}

/// Replace everything outside `[A-Za-z0-9_]` with `_`.
pub fn sanitize(column: &str) -> String {
    column
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `:<prefix>_<sanitized column>_<index>`
pub fn placeholder_name(prefix: &str, column: &str, index: usize) -> String {
    format!(":{}_{}_{}", prefix, sanitize(column), index)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    /// `DESC` (any case) is descending; anything else ascends.
    pub fn parse(direction: &str) -> Self {
        if direction.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_operator() {
        assert_eq!(normalize_operator("=").unwrap(), "=");
        assert_eq!(normalize_operator("not   like").unwrap(), "NOT LIKE");
        assert_eq!(normalize_operator("ilike").unwrap(), "ILIKE");
        assert!(matches!(
            normalize_operator("; DROP"),
            Err(DbError::InvalidOperator { .. })
        ));
        assert!(normalize_operator("==").is_err());
    }

    #[test]
    fn test_placeholder_name() {
        assert_eq!(placeholder_name("where", "a", 0), ":where_a_0");
        assert_eq!(placeholder_name("in", "orders.total", 3), ":in_orders_total_3");
    }

    #[test]
    fn test_direction() {
        assert_eq!(Direction::parse("desc"), Direction::Desc);
        assert_eq!(Direction::parse("sideways"), Direction::Asc);
    }
}
