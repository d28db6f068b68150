// ============================================================================
// lazytable Library
// ============================================================================

//! Entity CRUD over a relational engine whose tables and columns are created
//! the first time they are referenced.
//!
//! A call flows through the same stages every time: identifier validation,
//! lazy schema preparation, translation to a parameterized statement,
//! execution through a prepared-statement cache, and decoding of the rows.

pub mod cache;
pub mod config;
pub mod core;
pub mod diagnostics;
pub mod executor;
pub mod facade;
pub mod marshal;
pub mod query;
pub mod schema;
pub mod storage;
pub mod validation;

// Re-export main types for convenience
pub use config::{AdapterConfig, ColumnDef, ReturningMode};
pub use crate::core::{
    AdapterError, Condition, Direction, EngineError, FindOptions, Operator, Record, Result, SortSpec, SqlValue,
    Value,
};
pub use diagnostics::{DebugLogs, Operation};
pub use executor::HealthStatus;
pub use facade::Adapter;
pub use query::SqlStatement;
pub use schema::{EnsureOutcome, FieldSpec, FieldType, GeneratedSchema, TableSpecs};
pub use storage::{BatchMode, Engine, ExecOutcome, PreparedStatement, SqliteEngine};
