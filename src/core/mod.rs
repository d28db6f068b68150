pub mod error;
pub mod types;
pub mod value;

pub use error::{AdapterError, EngineError, EngineResult, IdentifierKind, Result};
pub use types::{Condition, Direction, FindOptions, Operator, SortSpec};
pub use value::{Record, SqlValue, Value};
