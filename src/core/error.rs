use thiserror::Error;

/// Failure raised by a storage engine. Carried through the adapter unchanged.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Engine task failed: {0}")]
    Task(String),

    #[error("Engine error: {0}")]
    Backend(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Which kind of identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Model,
    Field,
}

impl std::fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Field => write!(f, "field"),
        }
    }
}

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Invalid {kind} name '{name}': {reason}")]
    InvalidIdentifier {
        kind: IdentifierKind,
        name: String,
        reason: String,
    },

    #[error("Refusing to {operation} '{model}' without a where clause")]
    EmptyWhereClause {
        operation: &'static str,
        model: String,
    },

    #[error("Insert into '{0}' affected no rows")]
    CreateFailed(String),

    #[error("Inserted row in '{0}' could not be read back")]
    RetrieveAfterCreateFailed(String),

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl AdapterError {
    pub(crate) fn invalid_model(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind: IdentifierKind::Model,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_field(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            kind: IdentifierKind::Field,
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// The engine error underneath, if this failure came from the engine.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
