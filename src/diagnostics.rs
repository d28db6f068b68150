//! Debug output switches and secret redaction.
//!
//! Diagnostics are opt-in per operation category. Anything that reaches the
//! log passes through [`redact_args`] or [`redact_record`] first, so values
//! bound to password/token/secret/key/hash/email-like fields never leave the
//! process in clear text.

use crate::core::{Record, SqlValue, Value};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

pub const REDACTED: &str = "[REDACTED]";

lazy_static! {
    static ref SENSITIVE_KEY: Regex =
        Regex::new(r"(?i)(password|passwd|token|secret|key|hash|e[-_]?mail)")
            .expect("static pattern");
}

/// Operation categories that can emit diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    UpdateMany,
    FindOne,
    FindMany,
    Delete,
    DeleteMany,
    Count,
    Schema,
    Batch,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::UpdateMany => "updateMany",
            Self::FindOne => "findOne",
            Self::FindMany => "findMany",
            Self::Delete => "delete",
            Self::DeleteMany => "deleteMany",
            Self::Count => "count",
            Self::Schema => "schema",
            Self::Batch => "batch",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which operation categories log their statements, arguments and row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugLogs {
    pub create: bool,
    pub update: bool,
    pub update_many: bool,
    pub find_one: bool,
    pub find_many: bool,
    pub delete: bool,
    pub delete_many: bool,
    pub count: bool,
    pub schema: bool,
    pub batch: bool,
}

impl DebugLogs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            create: true,
            update: true,
            update_many: true,
            find_one: true,
            find_many: true,
            delete: true,
            delete_many: true,
            count: true,
            schema: true,
            batch: true,
        }
    }

    pub fn enable(mut self, operation: Operation) -> Self {
        *self.slot(operation) = true;
        self
    }

    pub fn is_enabled(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.create,
            Operation::Update => self.update,
            Operation::UpdateMany => self.update_many,
            Operation::FindOne => self.find_one,
            Operation::FindMany => self.find_many,
            Operation::Delete => self.delete,
            Operation::DeleteMany => self.delete_many,
            Operation::Count => self.count,
            Operation::Schema => self.schema,
            Operation::Batch => self.batch,
        }
    }

    /// The operation to tag diagnostics with, or `None` when it is switched off.
    pub fn trace(&self, operation: Operation) -> Option<Operation> {
        self.is_enabled(operation).then_some(operation)
    }

    fn slot(&mut self, operation: Operation) -> &mut bool {
        match operation {
            Operation::Create => &mut self.create,
            Operation::Update => &mut self.update,
            Operation::UpdateMany => &mut self.update_many,
            Operation::FindOne => &mut self.find_one,
            Operation::FindMany => &mut self.find_many,
            Operation::Delete => &mut self.delete,
            Operation::DeleteMany => &mut self.delete_many,
            Operation::Count => &mut self.count,
            Operation::Schema => &mut self.schema,
            Operation::Batch => &mut self.batch,
        }
    }
}

pub fn is_sensitive(key: &str) -> bool {
    SENSITIVE_KEY.is_match(key)
}

/// Render bound arguments for a log line. `labels[i]` names the field
/// argument `i` is bound for; arguments without a label are shown as-is.
pub fn redact_args(labels: &[String], args: &[SqlValue]) -> Vec<String> {
    args.iter()
        .enumerate()
        .map(|(i, arg)| match labels.get(i) {
            Some(label) if is_sensitive(label) => format!("{}={}", label, REDACTED),
            Some(label) => format!("{}={}", label, arg),
            None => arg.to_string(),
        })
        .collect()
}

pub fn redact_record(record: &Record) -> Record {
    record
        .iter()
        .map(|(key, value)| {
            let shown = if is_sensitive(key) {
                Value::Text(REDACTED.to_string())
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_keys() {
        for key in ["password", "accessToken", "clientSecret", "apiKey", "passwordHash", "email", "userEmail"] {
            assert!(is_sensitive(key), "{} should be redacted", key);
        }
        for key in ["id", "name", "age", "createdAt"] {
            assert!(!is_sensitive(key), "{} should be visible", key);
        }
    }

    #[test]
    fn test_redact_args_uses_labels() {
        let labels = vec!["name".to_string(), "password".to_string()];
        let args = vec![SqlValue::from("Ann"), SqlValue::from("hunter2")];
        let shown = redact_args(&labels, &args);
        assert_eq!(shown, vec!["name='Ann'".to_string(), format!("password={}", REDACTED)]);
    }

    #[test]
    fn test_redact_record() {
        let mut record = Record::new();
        record.insert("email".into(), Value::from("a@b.c"));
        record.insert("name".into(), Value::from("Ann"));
        let redacted = redact_record(&record);
        assert_eq!(redacted["email"], Value::from(REDACTED));
        assert_eq!(redacted["name"], Value::from("Ann"));
    }

    #[test]
    fn test_debug_logs_toggle() {
        let logs = DebugLogs::none().enable(Operation::FindMany);
        assert!(logs.is_enabled(Operation::FindMany));
        assert!(!logs.is_enabled(Operation::Create));
        assert_eq!(logs.trace(Operation::Create), None);
        assert!(DebugLogs::all().is_enabled(Operation::Schema));
    }
}
