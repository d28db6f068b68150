//! Identifier validation
//!
//! Values always travel as bound parameters. Table and column names cannot,
//! so every identifier that ends up in SQL text passes through here first:
//! models against an allow-list, fields against `[A-Za-z][A-Za-z0-9_]*`.

use crate::core::{AdapterError, Result};
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;

pub const MAX_IDENTIFIER_LEN: usize = 64;

/// A model name that passed the allow-list check
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedModel(String);

/// A field name that passed the pattern check
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ValidatedField(String);

macro_rules! identifier_impls {
    ($name:ident) => {
        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Double-quoted form for SQL text
            pub fn quoted(&self) -> String {
                quote(&self.0)
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

identifier_impls!(ValidatedModel);
identifier_impls!(ValidatedField);

/// Quote an identifier, doubling any embedded quote characters
pub fn quote(identifier: &str) -> String {
    let escaped = identifier.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

#[derive(Debug, Clone)]
pub struct IdentifierValidator {
    known_models: HashSet<String>,
}

impl IdentifierValidator {
    pub fn new(known_models: HashSet<String>) -> Self {
        Self { known_models }
    }

    pub fn validate_model(&self, name: &str) -> Result<ValidatedModel> {
        check_length(name).map_err(|reason| AdapterError::invalid_model(name, reason))?;

        if !self.known_models.contains(name) {
            return Err(AdapterError::invalid_model(name, "not a registered model"));
        }

        Ok(ValidatedModel(name.to_string()))
    }

    pub fn validate_field(&self, name: &str) -> Result<ValidatedField> {
        validate_field_name(name)
    }

    pub fn validate_fields<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<ValidatedField>> {
        names.into_iter().map(validate_field_name).collect()
    }

    pub fn is_known_model(&self, name: &str) -> bool {
        self.known_models.contains(name)
    }
}

/// Validates field names to prevent injection
pub fn validate_field_name(name: &str) -> Result<ValidatedField> {
    check_length(name).map_err(|reason| AdapterError::invalid_field(name, reason))?;

    let mut chars = name.chars();
    // check_length guarantees a first character
    let first = chars.next().unwrap_or_default();
    if !first.is_ascii_alphabetic() {
        return Err(AdapterError::invalid_field(name, "must start with a letter"));
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AdapterError::invalid_field(
            name,
            "can only contain letters, digits and underscores",
        ));
    }

    Ok(ValidatedField(name.to_string()))
}

fn check_length(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("cannot be empty".to_string());
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(format!("too long (max {} characters)", MAX_IDENTIFIER_LEN));
    }
    Ok(())
}
