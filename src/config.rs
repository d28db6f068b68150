use crate::diagnostics::DebugLogs;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Column created together with a table the first time the table is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: String,
    pub constraint: Option<String>,
}

impl ColumnDef {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            constraint: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.constraint = Some("PRIMARY KEY".to_string());
        self
    }
}

/// Whether inserts and updates ask the engine for the affected row directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturningMode {
    /// Use `RETURNING` when the engine supports it.
    #[default]
    Auto,
    /// Always read rows back with a follow-up `SELECT`.
    Disabled,
}

/// Adapter configuration
///
/// Built the same way as a connection config: start from [`AdapterConfig::new`]
/// and chain setters.
///
/// # Examples
///
/// ```
/// use lazytable::AdapterConfig;
///
/// let config = AdapterConfig::new()
///     .register_model("post")
///     .boolean_field("published")
///     .schema_cache_capacity(64);
///
/// assert!(config.known_models.contains("posts"));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Model names accepted by the identifier validator
    pub known_models: HashSet<String>,

    /// Fields whose stored 0/1 is read back as a boolean
    pub boolean_fields: HashSet<String>,

    /// Columns every lazily created table starts with
    pub baseline_columns: Vec<ColumnDef>,

    /// Extra baseline columns for specific models
    pub model_columns: HashMap<String, Vec<ColumnDef>>,

    /// Maximum number of tables remembered as existing
    pub schema_cache_capacity: usize,

    /// Maximum number of (table, column) pairs remembered as existing
    pub column_cache_capacity: usize,

    /// Maximum number of prepared statements kept
    pub statement_cache_capacity: usize,

    /// Maximum number of memoized string decode decisions
    pub value_cache_capacity: usize,

    /// Strings longer than this are decoded without touching the cache
    pub value_cache_max_len: usize,

    pub returning: ReturningMode,

    /// Assign a UUID `id` to records created without one
    pub generate_ids: bool,

    /// Default target path reported by schema generation
    pub schema_path: PathBuf,

    pub debug_logs: DebugLogs,
}

impl AdapterConfig {
    pub fn new() -> Self {
        let mut config = Self {
            known_models: HashSet::new(),
            boolean_fields: ["emailVerified", "twoFactorEnabled", "banned", "isAnonymous"]
                .into_iter()
                .map(String::from)
                .collect(),
            baseline_columns: vec![ColumnDef::new("id", "TEXT").primary_key()],
            model_columns: HashMap::new(),
            schema_cache_capacity: 256,
            column_cache_capacity: 4096,
            statement_cache_capacity: 128,
            value_cache_capacity: 1024,
            value_cache_max_len: 512,
            returning: ReturningMode::Auto,
            generate_ids: false,
            schema_path: PathBuf::from("./migrations/schema.sql"),
            debug_logs: DebugLogs::none(),
        };
        for model in ["user", "session", "account", "verification"] {
            config = config.register_model(model);
        }
        config
    }

    /// Register a model in both singular and plural form
    pub fn register_model(mut self, name: &str) -> Self {
        self.known_models.insert(name.to_string());
        self.known_models.insert(pluralize(name));
        self
    }

    /// Register a single exact model name
    pub fn register_exact_model(mut self, name: &str) -> Self {
        self.known_models.insert(name.to_string());
        self
    }

    pub fn boolean_field(mut self, name: &str) -> Self {
        self.boolean_fields.insert(name.to_string());
        self
    }

    pub fn baseline_columns(mut self, columns: Vec<ColumnDef>) -> Self {
        self.baseline_columns = columns;
        self
    }

    /// Add baseline columns created only for `model`
    pub fn model_columns(mut self, model: &str, columns: Vec<ColumnDef>) -> Self {
        self.model_columns.insert(model.to_string(), columns);
        self
    }

    pub fn schema_cache_capacity(mut self, capacity: usize) -> Self {
        self.schema_cache_capacity = capacity;
        self
    }

    pub fn column_cache_capacity(mut self, capacity: usize) -> Self {
        self.column_cache_capacity = capacity;
        self
    }

    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    pub fn value_cache_capacity(mut self, capacity: usize) -> Self {
        self.value_cache_capacity = capacity;
        self
    }

    pub fn value_cache_max_len(mut self, len: usize) -> Self {
        self.value_cache_max_len = len;
        self
    }

    pub fn returning(mut self, mode: ReturningMode) -> Self {
        self.returning = mode;
        self
    }

    pub fn generate_ids(mut self, enabled: bool) -> Self {
        self.generate_ids = enabled;
        self
    }

    pub fn schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    pub fn debug_logs(mut self, logs: DebugLogs) -> Self {
        self.debug_logs = logs;
        self
    }

    /// Baseline columns for `model`: the shared set followed by its extras
    pub fn columns_for(&self, model: &str) -> Vec<ColumnDef> {
        let mut columns = self.baseline_columns.clone();
        if let Some(extra) = self.model_columns.get(model) {
            for column in extra {
                if !columns.iter().any(|c| c.name == column.name) {
                    columns.push(column.clone());
                }
            }
        }
        columns
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.known_models.is_empty() {
            return Err("At least one model must be registered".to_string());
        }

        for (name, capacity) in [
            ("schema_cache_capacity", self.schema_cache_capacity),
            ("column_cache_capacity", self.column_cache_capacity),
            ("statement_cache_capacity", self.statement_cache_capacity),
            ("value_cache_capacity", self.value_cache_capacity),
        ] {
            if capacity == 0 {
                return Err(format!("{} must be > 0", name));
            }
        }

        if self.baseline_columns.iter().any(|c| c.name.is_empty()) {
            return Err("Baseline column names cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// English plural good enough for entity names
pub fn pluralize(name: &str) -> String {
    if name.ends_with('s')
        || name.ends_with('x')
        || name.ends_with('z')
        || name.ends_with("ch")
        || name.ends_with("sh")
    {
        return format!("{}es", name);
    }
    if let Some(stem) = name.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", name)
}
