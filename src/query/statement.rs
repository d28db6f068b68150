use crate::core::SqlValue;

/// SQL text with its positional arguments
///
/// `labels[i]` names what argument `i` is bound for (a field name, `limit`,
/// `offset`, ...). Labels only feed diagnostics and redaction.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub args: Vec<SqlValue>,
    pub labels: Vec<String>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
            labels: Vec::new(),
        }
    }

    pub fn bind(mut self, label: impl Into<String>, value: SqlValue) -> Self {
        self.push(label, value);
        self
    }

    pub fn push(&mut self, label: impl Into<String>, value: SqlValue) {
        self.labels.push(label.into());
        self.args.push(value);
    }

    pub fn extend(&mut self, other: WhereClause) {
        self.args.extend(other.args);
        self.labels.extend(other.labels);
    }
}

/// Rendered `WHERE` body (without the keyword) and its arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub args: Vec<SqlValue>,
    pub labels: Vec<String>,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}
