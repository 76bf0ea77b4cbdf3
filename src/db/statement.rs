//! Statement analysis: named placeholder discovery, driver-style rendering and
//! row-returning classification.
//!
//! Operations are written with `:name` placeholders regardless of engine. Before
//! a statement reaches the driver it is rendered to the engine's native marker
//! style: `?` per occurrence for MySQL and SQLite, `$n` per distinct name for
//! PostgreSQL. Text inside quotes and comments is never touched, and `::` casts
//! are left alone.

use crate::models::DatabaseType;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};
use sqlparser::parser::Parser;

/// One parameter position in a rendered statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    /// A `:name` placeholder (stored with its colon)
    Named(String),
    /// A native positional marker (`?` or `$n`), zero-based
    Positional(usize),
}

/// A statement ready to hand to the driver.
#[derive(Debug, Clone)]
pub struct PreparedSql {
    /// SQL as registered by the caller
    pub source: String,
    /// SQL in the driver's marker style
    pub rendered: String,
    /// `slots[i]` supplies the i-th driver parameter
    pub slots: Vec<Slot>,
    pub returns_rows: bool,
}

impl PreparedSql {
    pub fn new(source: &str, db_type: DatabaseType) -> Self {
        let (rendered, slots) = render(source, db_type);
        let returns_rows = returns_rows(&rendered, db_type);
        Self {
            source: source.to_string(),
            rendered,
            slots,
            returns_rows,
        }
    }

    pub fn has_placeholder(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, Slot::Named(n) if n == name))
    }

    /// Number of native positional markers the statement expects.
    pub fn positional_count(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Positional(i) => Some(i + 1),
                Slot::Named(_) => None,
            })
            .max()
            .unwrap_or(0)
    }
}

/// Prepend the colon if the caller left it off.
pub fn normalize_placeholder(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.starts_with(':') {
        trimmed.to_string()
    } else {
        format!(":{}", trimmed)
    }
}

#[derive(Debug)]
enum Token {
    Text(String),
    Named(String),
    Question,
    Dollar(usize),
}

/// Split SQL into literal text and parameter markers.
///
/// Backslash escapes inside quotes exist only in MySQL; SQLite and
/// standard-conforming PostgreSQL strings end at the first unpaired quote.
fn tokenize(sql: &str, db_type: DatabaseType) -> Vec<Token> {
    let backslash_escapes = db_type == DatabaseType::MySQL;
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, tokens: &mut Vec<Token>| {
        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(text)));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                // Quoted run; a doubled quote is an escape and stays inside.
                text.push(c);
                i += 1;
                while i < chars.len() {
                    text.push(chars[i]);
                    if chars[i] == c {
                        if chars.get(i + 1) == Some(&c) {
                            text.push(c);
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    if backslash_escapes && chars[i] == '\\' && c != '`' {
                        if let Some(&next) = chars.get(i + 1) {
                            text.push(next);
                            i += 1;
                        }
                    }
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    text.push(chars[i]);
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                text.push_str("/*");
                i += 2;
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        text.push_str("*/");
                        i += 2;
                        break;
                    }
                    text.push(chars[i]);
                    i += 1;
                }
            }
            ':' if chars.get(i + 1) == Some(&':') => {
                text.push_str("::");
                i += 2;
            }
            ':' if chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_') =>
            {
                flush(&mut text, &mut tokens);
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Named(chars[start..i].iter().collect()));
            }
            '?' => {
                flush(&mut text, &mut tokens);
                tokens.push(Token::Question);
                i += 1;
            }
            '$' if chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end].is_ascii_digit() {
                    end += 1;
                }
                let digits: String = chars[start..end].iter().collect();
                match digits.parse::<usize>() {
                    Ok(n) if n > 0 => {
                        flush(&mut text, &mut tokens);
                        tokens.push(Token::Dollar(n));
                    }
                    _ => text.push_str(&chars[i..end].iter().collect::<String>()),
                }
                i = end;
            }
            _ => {
                text.push(c);
                i += 1;
            }
        }
    }
    flush(&mut text, &mut tokens);
    tokens
}

/// Render `:name` placeholders into the driver's marker style.
///
/// Returns the rewritten SQL and, for each driver parameter in order, where its
/// value comes from.
pub fn render(sql: &str, db_type: DatabaseType) -> (String, Vec<Slot>) {
    let tokens = tokenize(sql, db_type);
    let mut out = String::with_capacity(sql.len());
    let mut slots = Vec::new();

    match db_type {
        DatabaseType::MySQL | DatabaseType::SQLite => {
            let mut positional = 0;
            for token in tokens {
                match token {
                    Token::Text(t) => out.push_str(&t),
                    Token::Named(name) => {
                        out.push('?');
                        slots.push(Slot::Named(name));
                    }
                    Token::Question => {
                        out.push('?');
                        slots.push(Slot::Positional(positional));
                        positional += 1;
                    }
                    Token::Dollar(n) => out.push_str(&format!("${}", n)),
                }
            }
        }
        DatabaseType::PostgreSQL => {
            let native = tokens
                .iter()
                .filter_map(|t| match t {
                    Token::Dollar(n) => Some(*n),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            slots.extend((0..native).map(Slot::Positional));

            let mut names: Vec<String> = Vec::new();
            for token in tokens {
                match token {
                    Token::Text(t) => out.push_str(&t),
                    Token::Dollar(n) => out.push_str(&format!("${}", n)),
                    Token::Question => out.push('?'),
                    Token::Named(name) => {
                        let index = match names.iter().position(|n| *n == name) {
                            Some(idx) => idx,
                            None => {
                                names.push(name.clone());
                                slots.push(Slot::Named(name));
                                names.len() - 1
                            }
                        };
                        out.push_str(&format!("${}", native + index + 1));
                    }
                }
            }
        }
    }

    (out, slots)
}

/// Get the appropriate SQL dialect for the given database type.
fn get_dialect(db_type: DatabaseType) -> Box<dyn Dialect> {
    match db_type {
        DatabaseType::PostgreSQL => Box::new(PostgreSqlDialect {}),
        DatabaseType::MySQL => Box::new(MySqlDialect {}),
        DatabaseType::SQLite => Box::new(SQLiteDialect {}),
    }
}

/// Whether executing `sql` produces a result set.
///
/// Uses the parsed statement when sqlparser understands it, otherwise falls back
/// to the leading keyword.
pub fn returns_rows(sql: &str, db_type: DatabaseType) -> bool {
    let dialect = get_dialect(db_type);
    match Parser::parse_sql(dialect.as_ref(), sql) {
        Ok(statements) if !statements.is_empty() => statements.iter().any(statement_returns_rows)
            || contains_returning(sql),
        _ => keyword_returns_rows(sql),
    }
}

fn statement_returns_rows(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::Query(_)
            | Statement::Explain { .. }
            | Statement::ExplainTable { .. }
            | Statement::Pragma { .. }
            | Statement::ShowTables { .. }
            | Statement::ShowColumns { .. }
            | Statement::ShowDatabases { .. }
            | Statement::ShowVariables { .. }
            | Statement::ShowVariable { .. }
            | Statement::ShowStatus { .. }
            | Statement::ShowCreate { .. }
    )
}

fn contains_returning(sql: &str) -> bool {
    sql.to_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|word| word == "RETURNING")
}

fn keyword_returns_rows(sql: &str) -> bool {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_uppercase();
    matches!(
        first.as_str(),
        "SELECT" | "WITH" | "SHOW" | "PRAGMA" | "EXPLAIN" | "VALUES" | "DESCRIBE" | "DESC"
    ) || contains_returning(sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSERT_CUSTOMER: &str =
        "INSERT INTO customers (name, email, balance) VALUES (:name, :email, :balance)";

    #[test]
    fn test_render_question_marks() {
        let (sql, slots) = render(INSERT_CUSTOMER, DatabaseType::SQLite);
        assert_eq!(
            sql,
            "INSERT INTO customers (name, email, balance) VALUES (?, ?, ?)"
        );
        assert_eq!(
            slots,
            vec![
                Slot::Named(":name".into()),
                Slot::Named(":email".into()),
                Slot::Named(":balance".into()),
            ]
        );
    }

    #[test]
    fn test_render_postgres_reuses_numbers() {
        let (sql, slots) = render(
            "UPDATE accounts SET balance = balance - :amt WHERE id = :id AND balance >= :amt",
            DatabaseType::PostgreSQL,
        );
        assert_eq!(
            sql,
            "UPDATE accounts SET balance = balance - $1 WHERE id = $2 AND balance >= $1"
        );
        assert_eq!(slots.len(), 2);
    }

    #[test]
    fn test_render_mysql_repeats_slots() {
        let (_, slots) = render("SELECT :a + :a", DatabaseType::MySQL);
        assert_eq!(
            slots,
            vec![Slot::Named(":a".into()), Slot::Named(":a".into())]
        );
    }

    #[test]
    fn test_render_skips_quotes_comments_and_casts() {
        let sql = "SELECT ':not_me', \"x:y\", created::date -- :nor_me\nFROM t /* :hidden */ WHERE a = :real";
        let (rendered, slots) = render(sql, DatabaseType::PostgreSQL);
        assert_eq!(slots, vec![Slot::Named(":real".into())]);
        assert!(rendered.contains("':not_me'"));
        assert!(rendered.contains("created::date"));
        assert!(rendered.ends_with("a = $1"));
    }

    #[test]
    fn test_render_escaped_quote_stays_literal() {
        let (_, slots) = render("SELECT 'it''s :x' WHERE b = :y", DatabaseType::SQLite);
        assert_eq!(slots, vec![Slot::Named(":y".into())]);
    }

    #[test]
    fn test_trailing_backslash_closes_literal_outside_mysql() {
        let sql = "SELECT id FROM files WHERE path = 'C:\\' AND id = :id";
        for db_type in [DatabaseType::SQLite, DatabaseType::PostgreSQL] {
            let prepared = PreparedSql::new(sql, db_type);
            assert!(prepared.has_placeholder(":id"), "{:?}", db_type);
            assert_eq!(prepared.slots, vec![Slot::Named(":id".into())]);
            assert!(prepared.rendered.contains("'C:\\'"));
            assert!(!prepared.rendered.contains(":id"));
        }
        let (rendered, _) = render(sql, DatabaseType::SQLite);
        assert!(rendered.ends_with("id = ?"));
    }

    #[test]
    fn test_mysql_backslash_escapes_quote() {
        let prepared = PreparedSql::new(
            "SELECT 'it\\'s :x' AS s WHERE b = :y",
            DatabaseType::MySQL,
        );
        assert_eq!(prepared.slots, vec![Slot::Named(":y".into())]);
    }

    #[test]
    fn test_native_positional_markers() {
        let prepared = PreparedSql::new("SELECT * FROM t WHERE a = ? AND b = ?", DatabaseType::SQLite);
        assert_eq!(prepared.positional_count(), 2);
        assert!(!prepared.slots.iter().any(|s| matches!(s, Slot::Named(_))));

        let prepared = PreparedSql::new("SELECT * FROM t WHERE a = $2 OR a = $1", DatabaseType::PostgreSQL);
        assert_eq!(prepared.positional_count(), 2);
    }

    #[test]
    fn test_placeholder_presence_is_exact() {
        let prepared = PreparedSql::new(
            "SELECT * FROM customers WHERE email = :email_address",
            DatabaseType::MySQL,
        );
        assert!(prepared.has_placeholder(":email_address"));
        assert!(!prepared.has_placeholder(":email"));
    }

    #[test]
    fn test_normalize_placeholder() {
        assert_eq!(normalize_placeholder("name"), ":name");
        assert_eq!(normalize_placeholder(":name"), ":name");
        assert_eq!(normalize_placeholder(" balance "), ":balance");
    }

    #[test]
    fn test_returns_rows() {
        assert!(returns_rows("SELECT balance FROM customers WHERE id = ?", DatabaseType::SQLite));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x", DatabaseType::PostgreSQL));
        assert!(returns_rows("PRAGMA table_info(customers)", DatabaseType::SQLite));
        assert!(!returns_rows(
            "INSERT INTO customers (name) VALUES (?)",
            DatabaseType::SQLite
        ));
        assert!(returns_rows(
            "INSERT INTO customers (name) VALUES ($1) RETURNING id",
            DatabaseType::PostgreSQL
        ));
        assert!(!returns_rows("DELETE FROM customers", DatabaseType::MySQL));
    }

    #[test]
    fn test_keyword_fallback() {
        assert!(keyword_returns_rows("  (select 1)"));
        assert!(keyword_returns_rows("DESCRIBE customers"));
        assert!(!keyword_returns_rows("CREATE TRIGGER t"));
    }
}
