//! Schema generation
//!
//! Produces `CREATE TABLE IF NOT EXISTS` text for a set of declared models.
//! Writing the text anywhere is left to the caller.

use super::ddl::CreateTableBuilder;
use crate::core::Result;
use crate::validation::{IdentifierValidator, validate_field_name};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Declared type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    /// Anything else degrades to text
    #[serde(other)]
    Other,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            Self::Number | Self::Boolean => "INTEGER",
            Self::String | Self::Date | Self::Other => "TEXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, rename = "defaultValue", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

impl FieldSpec {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: false,
            unique: false,
            default_value: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<JsonValue>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    fn constraints(&self) -> Vec<String> {
        let mut constraints = Vec::new();
        if self.required {
            constraints.push("NOT NULL".to_string());
        }
        if self.unique {
            constraints.push("UNIQUE".to_string());
        }
        if let Some(default) = &self.default_value {
            constraints.push(format!("DEFAULT {}", default_literal(default)));
        }
        constraints
    }
}

/// model -> field -> declaration
pub type TableSpecs = BTreeMap<String, BTreeMap<String, FieldSpec>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedSchema {
    pub sql: String,
    pub path: PathBuf,
}

fn sql_string(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// DEFAULT clauses cannot be bound, so literals are rendered here.
fn default_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => sql_string(s),
        nested => sql_string(&nested.to_string()),
    }
}

/// Render DDL for every model in `tables`, each starting with `"id" TEXT PRIMARY KEY`
pub fn generate(tables: &TableSpecs, validator: &IdentifierValidator, path: &Path) -> Result<GeneratedSchema> {
    let mut statements = Vec::with_capacity(tables.len());

    for (model, fields) in tables {
        let model = validator.validate_model(model)?;
        let mut builder = CreateTableBuilder::new(&model).add_column("id", "TEXT", &["PRIMARY KEY".to_string()]);

        for (name, spec) in fields {
            let field = validate_field_name(name)?;
            if builder.has_column(&field) {
                continue;
            }
            builder = builder.add_column(&field, spec.field_type.sql_type(), &spec.constraints());
        }
        statements.push(builder.build_pretty());
    }

    Ok(GeneratedSchema {
        sql: statements.join("\n\n"),
        path: path.to_path_buf(),
    })
}
