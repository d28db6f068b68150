//! Engine seam and the SQLite engine

pub mod engine;
pub mod sqlite;

pub use engine::{BatchMode, Engine, ExecOutcome, PreparedStatement, Row, StatementKind};
pub use sqlite::SqliteEngine;
