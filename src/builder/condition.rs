//! WHERE / HAVING conditions and their SQL rendering.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Condition {
    /// `column op placeholder`
    Compare {
        column: String,
        operator: String,
        placeholder: String,
    },
    /// `NOT (column op placeholder)`
    Not {
        column: String,
        operator: String,
        placeholder: String,
    },
    In {
        column: String,
        negated: bool,
        placeholders: Vec<String>,
    },
    Between {
        column: String,
        negated: bool,
        low: String,
        high: String,
    },
    Null {
        column: String,
        negated: bool,
    },
    Exists {
        negated: bool,
        sql: String,
    },
    /// Pre-rendered group, emitted inside parentheses
    Nested(String),
    Raw(String),
}

impl Condition {
    pub(crate) fn to_sql(&self) -> String {
        match self {
            Condition::Compare {
                column,
                operator,
                placeholder,
            } => format!("{} {} {}", column, operator, placeholder),
            Condition::Not {
                column,
                operator,
                placeholder,
            } => format!("NOT ({} {} {})", column, operator, placeholder),
            Condition::In {
                column,
                negated,
                placeholders,
            } => format!(
                "{} {} ({})",
                column,
                if *negated { "NOT IN" } else { "IN" },
                placeholders.join(", ")
            ),
            Condition::Between {
                column,
                negated,
                low,
                high,
            } => format!(
                "{} {} {} AND {}",
                column,
                if *negated { "NOT BETWEEN" } else { "BETWEEN" },
                low,
                high
            ),
            Condition::Null { column, negated } => format!(
                "{} {}",
                column,
                if *negated { "IS NOT NULL" } else { "IS NULL" }
            ),
            Condition::Exists { negated, sql } => format!(
                "{} ({})",
                if *negated { "NOT EXISTS" } else { "EXISTS" },
                sql
            ),
            Condition::Nested(sql) => format!("({})", sql),
            Condition::Raw(sql) => sql.clone(),
        }
    }
}

/// A condition plus the connector joining it to the one before.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Clause {
    pub connector: Connector,
    pub condition: Condition,
}

/// Join clauses; the first clause's connector is ignored.
pub(crate) fn render_clauses(clauses: &[Clause]) -> String {
    let mut sql = String::new();
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            sql.push(' ');
            sql.push_str(clause.connector.as_sql());
            sql.push(' ');
        }
        sql.push_str(&clause.condition.to_sql());
    }
    sql
}
