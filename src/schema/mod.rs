//! Lazy schema management and schema generation

pub mod ddl;
pub mod generator;
pub mod registry;

pub use generator::{FieldSpec, FieldType, GeneratedSchema, TableSpecs, generate};
pub use registry::{EnsureOutcome, SchemaRegistry, Strictness};
