use crate::core::{EngineResult, SqlValue};
use async_trait::async_trait;
use std::sync::Arc;

/// One result row: column name and stored value, in select order
pub type Row = Vec<(String, SqlValue)>;

/// What the engine reports after running a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

/// How a multi-statement batch treats individual failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchMode {
    /// Record each statement's result and commit whatever succeeded
    #[default]
    BestEffort,
    /// Roll back and fail on the first error
    AllOrNothing,
}

/// Whether a statement goes down the "fetch rows" path or the
/// "apply and count" path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    pub fn of(sql: &str) -> Self {
        let words = bare_words(sql);
        let Some(first) = words.first() else {
            return Self::Write;
        };

        let reads = match first.as_str() {
            "SELECT" | "PRAGMA" | "VALUES" | "EXPLAIN" => true,
            // A CTE may front a write
            "WITH" => !words
                .iter()
                .any(|w| matches!(w.as_str(), "INSERT" | "UPDATE" | "DELETE" | "REPLACE")),
            _ => false,
        };
        if reads || words.iter().any(|w| w == "RETURNING") {
            Self::Read
        } else {
            Self::Write
        }
    }

    /// Whether the statement carries a `RETURNING` clause. Literals,
    /// quoted identifiers and comments are not looked at.
    pub fn has_returning(sql: &str) -> bool {
        bare_words(sql).iter().any(|w| w == "RETURNING")
    }

    pub fn is_insert(sql: &str) -> bool {
        bare_words(sql)
            .first()
            .is_some_and(|w| w == "INSERT" || w == "REPLACE")
    }
}

/// Upper-cased keywords and bare identifiers of `sql` in order
fn bare_words(sql: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut chars = sql.chars().peekable();
    let mut word = String::new();

    while let Some(c) = chars.next() {
        if c.is_ascii_alphanumeric() || c == '_' {
            word.push(c.to_ascii_uppercase());
            continue;
        }
        if !word.is_empty() {
            words.push(std::mem::take(&mut word));
        }
        match c {
            // A doubled quote closes and reopens, which skips the same span.
            '\'' | '"' | '`' => {
                for next in chars.by_ref() {
                    if next == c {
                        break;
                    }
                }
            }
            '[' => {
                for next in chars.by_ref() {
                    if next == ']' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for next in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            _ => {}
        }
    }
    if !word.is_empty() {
        words.push(word);
    }
    words
}

/// A statement the engine has parsed once and can run many times
#[async_trait]
pub trait PreparedStatement: Send + Sync {
    fn sql(&self) -> &str;

    /// Run and collect every returned row
    async fn all(&self, args: &[SqlValue]) -> EngineResult<Vec<Row>>;

    /// Run for its effect and report the affected row count
    async fn run(&self, args: &[SqlValue]) -> EngineResult<ExecOutcome>;
}

/// Storage engine trait - allows pluggable relational backends
///
/// The adapter only needs parameterized statements, catalog introspection
/// and transactions; everything else stays behind this seam.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn prepare(&self, sql: &str) -> EngineResult<Arc<dyn PreparedStatement>>;

    /// Run `statements` inside one transaction
    async fn run_batch(
        &self,
        statements: Vec<(String, Vec<SqlValue>)>,
        mode: BatchMode,
    ) -> EngineResult<Vec<EngineResult<ExecOutcome>>>;

    /// Whether `INSERT/UPDATE ... RETURNING *` is available
    fn supports_returning(&self) -> bool {
        false
    }

    /// Implicit per-row identity usable after an insert (e.g. SQLite `rowid`)
    fn identity_column(&self) -> Option<&str> {
        None
    }

    /// Column type used for lazily added columns. Empty means untyped.
    fn generic_column_type(&self) -> &str {
        "TEXT"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind() {
        assert_eq!(StatementKind::of("SELECT 1"), StatementKind::Read);
        assert_eq!(StatementKind::of("  select * from x"), StatementKind::Read);
        assert_eq!(StatementKind::of("PRAGMA table_info(\"user\")"), StatementKind::Read);
        assert_eq!(StatementKind::of("INSERT INTO \"user\" DEFAULT VALUES"), StatementKind::Write);
        assert_eq!(
            StatementKind::of("INSERT INTO \"user\" (\"id\") VALUES (?) RETURNING *"),
            StatementKind::Read
        );
        assert_eq!(StatementKind::of("DELETE FROM \"user\" WHERE \"id\" = ?"), StatementKind::Write);
    }

    #[test]
    fn test_is_insert() {
        assert!(StatementKind::is_insert("insert into t default values"));
        assert!(!StatementKind::is_insert("UPDATE t SET a = 1"));
        assert!(!StatementKind::is_insert("INS"));
        assert!(StatementKind::is_insert("  -- seed\nINSERT INTO t DEFAULT VALUES"));
    }

    #[test]
    fn test_returning_inside_literals_is_ignored() {
        let sql = "INSERT INTO t VALUES ('b', 'no returning please')";
        assert!(!StatementKind::has_returning(sql));
        assert_eq!(StatementKind::of(sql), StatementKind::Write);

        let sql = "UPDATE t SET \"x returning y\" = 'a RETURNING b' /* RETURNING */ -- returning";
        assert!(!StatementKind::has_returning(sql));
        assert_eq!(StatementKind::of(sql), StatementKind::Write);

        assert!(StatementKind::has_returning("UPDATE t SET a = 'it''s' RETURNING *"));
        assert!(StatementKind::has_returning("DELETE FROM t\nRETURNING\tid"));
    }

    #[test]
    fn test_cte_fronting_a_write() {
        assert_eq!(
            StatementKind::of("WITH s AS (SELECT 1) SELECT * FROM s"),
            StatementKind::Read
        );
        assert_eq!(
            StatementKind::of("WITH s AS (SELECT 1 AS v) INSERT INTO t SELECT v FROM s"),
            StatementKind::Write
        );
    }
}
