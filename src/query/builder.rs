//! Where/sort/paging -> parameterized SQL
//!
//! Pure functions: no I/O and no state. Every identifier is re-checked with
//! the field validator and quoted; every value becomes a bound argument.

use super::statement::{SqlStatement, WhereClause};
use crate::core::{AdapterError, Condition, FindOptions, Operator, Record, Result, SqlValue, Value};
use crate::marshal::{SerializationOutcome, serialize};
use crate::validation::{ValidatedModel, validate_field_name};
use log::warn;

const LIKE_ESCAPE: char = '\\';

fn storage_value(value: &Value) -> SqlValue {
    let outcome = serialize(value);
    if let SerializationOutcome::Fallback { reason, .. } = &outcome {
        warn!("stored a {} as plain text: {}", value.type_name(), reason);
    }
    outcome.into_value()
}

fn count_arg(n: u64) -> SqlValue {
    SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
}

fn comparison_sql(operator: Operator) -> &'static str {
    match operator {
        Operator::Eq => "=",
        Operator::Ne => "!=",
        Operator::Lt => "<",
        Operator::Lte => "<=",
        Operator::Gt => ">",
        Operator::Gte => ">=",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
        Operator::StartsWith | Operator::EndsWith | Operator::Contains => "LIKE",
    }
}

/// Escape LIKE wildcards so the caller's text matches literally
pub fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 4);
    for c in text.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Render ANDed conditions. An empty list renders an empty clause.
pub fn build_where(conditions: &[Condition]) -> Result<WhereClause> {
    let mut clause = WhereClause::default();
    let mut parts = Vec::with_capacity(conditions.len());

    for condition in conditions {
        let field = validate_field_name(&condition.field)?;
        let column = field.quoted();
        let operator = condition.operator;

        let part = match operator {
            Operator::Eq if condition.value.is_null() => format!("{} IS NULL", column),
            Operator::Ne if condition.value.is_null() => format!("{} IS NOT NULL", column),
            Operator::Eq | Operator::Ne | Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                clause.labels.push(field.to_string());
                clause.args.push(storage_value(&condition.value));
                format!("{} {} ?", column, comparison_sql(operator))
            }
            Operator::In | Operator::NotIn => {
                let items: Vec<&Value> = match &condition.value {
                    Value::List(items) => items.iter().collect(),
                    single => vec![single],
                };
                if items.is_empty() {
                    // Nothing is in an empty set; everything is outside it.
                    if operator == Operator::In { "1 = 0".to_string() } else { "1 = 1".to_string() }
                } else {
                    for item in &items {
                        clause.labels.push(field.to_string());
                        clause.args.push(storage_value(item));
                    }
                    let placeholders = vec!["?"; items.len()].join(", ");
                    format!("{} {} ({})", column, comparison_sql(operator), placeholders)
                }
            }
            Operator::StartsWith | Operator::EndsWith | Operator::Contains => {
                let raw = match &condition.value {
                    Value::Text(s) => s.clone(),
                    other => other.to_string(),
                };
                let escaped = escape_like(&raw);
                let pattern = match operator {
                    Operator::StartsWith => format!("{}%", escaped),
                    Operator::EndsWith => format!("%{}", escaped),
                    _ => format!("%{}%", escaped),
                };
                clause.labels.push(field.to_string());
                clause.args.push(SqlValue::Text(pattern));
                format!("{} LIKE ? ESCAPE '{}'", column, LIKE_ESCAPE)
            }
        };
        parts.push(part);
    }

    clause.sql = parts.join(" AND ");
    Ok(clause)
}

fn require_where(operation: &'static str, model: &ValidatedModel, conditions: &[Condition]) -> Result<()> {
    if conditions.is_empty() {
        return Err(AdapterError::EmptyWhereClause {
            operation,
            model: model.to_string(),
        });
    }
    Ok(())
}

fn push_where(sql: &mut String, statement: &mut SqlStatement, clause: WhereClause) {
    if !clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clause.sql);
        statement.extend(clause);
    }
}

pub fn build_insert(model: &ValidatedModel, record: &Record, returning: bool) -> Result<SqlStatement> {
    let mut statement = SqlStatement::new(String::new());
    let mut sql = if record.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", model.quoted())
    } else {
        let mut columns = Vec::with_capacity(record.len());
        for (key, value) in record {
            let field = validate_field_name(key)?;
            columns.push(field.quoted());
            statement.push(field.to_string(), storage_value(value));
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            model.quoted(),
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        )
    };

    if returning {
        sql.push_str(" RETURNING *");
    }
    statement.sql = sql;
    Ok(statement)
}

/// `SET` arguments come first, then `WHERE` arguments.
pub fn build_update(
    model: &ValidatedModel,
    conditions: &[Condition],
    patch: &Record,
    returning: bool,
) -> Result<SqlStatement> {
    require_where("update", model, conditions)?;
    if patch.is_empty() {
        return Err(AdapterError::InvalidStatement(format!(
            "update of '{}' has no fields to set",
            model
        )));
    }

    let mut statement = SqlStatement::new(String::new());
    let mut assignments = Vec::with_capacity(patch.len());
    for (key, value) in patch {
        let field = validate_field_name(key)?;
        assignments.push(format!("{} = ?", field.quoted()));
        statement.push(field.to_string(), storage_value(value));
    }

    let mut sql = format!("UPDATE {} SET {}", model.quoted(), assignments.join(", "));
    push_where(&mut sql, &mut statement, build_where(conditions)?);
    if returning {
        sql.push_str(" RETURNING *");
    }
    statement.sql = sql;
    Ok(statement)
}

pub fn build_delete(model: &ValidatedModel, conditions: &[Condition]) -> Result<SqlStatement> {
    require_where("delete", model, conditions)?;

    let mut statement = SqlStatement::new(String::new());
    let mut sql = format!("DELETE FROM {}", model.quoted());
    push_where(&mut sql, &mut statement, build_where(conditions)?);
    statement.sql = sql;
    Ok(statement)
}

/// An empty `conditions` list selects every row. Sort keys are emitted in
/// the order given; rows tied on all of them come back in engine order.
pub fn build_select(model: &ValidatedModel, conditions: &[Condition], options: &FindOptions) -> Result<SqlStatement> {
    let projection = if options.select.is_empty() {
        "*".to_string()
    } else {
        options
            .select
            .iter()
            .map(|name| validate_field_name(name).map(|f| f.quoted()))
            .collect::<Result<Vec<_>>>()?
            .join(", ")
    };

    let mut statement = SqlStatement::new(String::new());
    let mut sql = format!("SELECT {} FROM {}", projection, model.quoted());
    push_where(&mut sql, &mut statement, build_where(conditions)?);

    if !options.sort.is_empty() {
        let keys = options
            .sort
            .iter()
            .map(|spec| {
                validate_field_name(&spec.field)
                    .map(|f| format!("{} {}", f.quoted(), spec.direction.as_sql()))
            })
            .collect::<Result<Vec<_>>>()?;
        sql.push_str(" ORDER BY ");
        sql.push_str(&keys.join(", "));
    }

    match (options.limit, options.offset) {
        (Some(limit), offset) => {
            sql.push_str(" LIMIT ?");
            statement.push("limit", count_arg(limit));
            if let Some(offset) = offset {
                sql.push_str(" OFFSET ?");
                statement.push("offset", count_arg(offset));
            }
        }
        (None, Some(offset)) => {
            // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
            sql.push_str(" LIMIT -1 OFFSET ?");
            statement.push("offset", count_arg(offset));
        }
        (None, None) => {}
    }

    statement.sql = sql;
    Ok(statement)
}

pub fn build_count(model: &ValidatedModel, conditions: &[Condition]) -> Result<SqlStatement> {
    let mut statement = SqlStatement::new(String::new());
    let mut sql = format!("SELECT COUNT(*) AS \"count\" FROM {}", model.quoted());
    push_where(&mut sql, &mut statement, build_where(conditions)?);
    statement.sql = sql;
    Ok(statement)
}
