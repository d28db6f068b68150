//! DDL text for lazily created tables and columns

use crate::validation::{ValidatedField, ValidatedModel, quote};

/// Catalog lookup for one table; the name is bound as the single argument.
pub const TABLE_EXISTS_SQL: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?";

/// Column introspection for `model`. PRAGMA arguments cannot be bound.
pub fn table_info_sql(model: &ValidatedModel) -> String {
    format!("PRAGMA table_info({})", model.quoted())
}

/// `ALTER TABLE ... ADD COLUMN`. An empty `sql_type` adds an untyped column.
pub fn add_column_sql(model: &ValidatedModel, field: &ValidatedField, sql_type: &str) -> String {
    let mut sql = format!("ALTER TABLE {} ADD COLUMN {}", model.quoted(), field.quoted());
    if !sql_type.is_empty() {
        sql.push(' ');
        sql.push_str(sql_type);
    }
    sql
}

/// Builder for CREATE TABLE statements
pub struct CreateTableBuilder {
    table_name: String,
    columns: Vec<(String, String)>, // (quoted name, type + constraints)
}

impl CreateTableBuilder {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        let quoted = quote(name);
        self.columns.iter().any(|(n, _)| *n == quoted)
    }

    pub fn add_column(mut self, name: &str, sql_type: &str, constraints: &[String]) -> Self {
        let mut definition = sql_type.to_string();
        for constraint in constraints.iter().filter(|c| !c.is_empty()) {
            if !definition.is_empty() {
                definition.push(' ');
            }
            definition.push_str(constraint);
        }
        self.columns.push((quote(name), definition));
        self
    }

    fn column_defs(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|(name, definition)| {
                if definition.is_empty() {
                    name.clone()
                } else {
                    format!("{} {}", name, definition)
                }
            })
            .collect()
    }

    pub fn build(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote(&self.table_name),
            self.column_defs().join(", ")
        )
    }

    /// One column per line, for schema files meant to be read by people
    pub fn build_pretty(&self) -> String {
        let body: Vec<String> = self.column_defs().into_iter().map(|c| format!("  {}", c)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
            quote(&self.table_name),
            body.join(",\n")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterConfig;
    use crate::validation::{IdentifierValidator, validate_field_name};

    #[test]
    fn test_create_table() {
        let sql = CreateTableBuilder::new("user")
            .add_column("id", "TEXT", &["PRIMARY KEY".to_string()])
            .add_column("name", "", &[])
            .build();
        assert_eq!(sql, "CREATE TABLE IF NOT EXISTS \"user\" (\"id\" TEXT PRIMARY KEY, \"name\")");
    }

    #[test]
    fn test_add_column_untyped() {
        let model = IdentifierValidator::new(AdapterConfig::default().known_models)
            .validate_model("session")
            .unwrap();
        let field = validate_field_name("ipAddress").unwrap();
        assert_eq!(
            add_column_sql(&model, &field, ""),
            "ALTER TABLE \"session\" ADD COLUMN \"ipAddress\""
        );
        assert_eq!(
            add_column_sql(&model, &field, "TEXT"),
            "ALTER TABLE \"session\" ADD COLUMN \"ipAddress\" TEXT"
        );
        assert_eq!(table_info_sql(&model), "PRAGMA table_info(\"session\")");
    }
}
