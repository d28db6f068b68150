//! Schema Registry
//!
//! Remembers which tables and columns are known to exist and creates missing
//! ones on first use. Both caches are bounded and drop their oldest entry
//! first; dropping a table also drops every cached column of that table.
//!
//! Creation races with other writers are expected. `CREATE TABLE IF NOT
//! EXISTS` is idempotent and a failed `ADD COLUMN` is reported as
//! [`EnsureOutcome::Ignored`] rather than raised.

use super::ddl::{CreateTableBuilder, TABLE_EXISTS_SQL, add_column_sql, table_info_sql};
use crate::cache::BoundedCache;
use crate::config::AdapterConfig;
use crate::core::{Result, SqlValue};
use crate::diagnostics::Operation;
use crate::executor::Executor;
use crate::query::SqlStatement;
use crate::validation::{ValidatedField, ValidatedModel, validate_field_name};
use log::{debug, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// What an ensure call found or did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// Already known; no engine round trip
    Cached,
    /// Found in the catalog
    Existed,
    Created,
    /// Creation failed; the entry is cached anyway so it is not retried
    Ignored(String),
}

impl EnsureOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }
}

/// How a table-creation failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Log and carry on; used ahead of reads and bulk writes
    BestEffort,
    /// Log and return the error; used by `create`
    Strict,
}

pub struct SchemaRegistry {
    executor: Arc<Executor>,
    config: Arc<AdapterConfig>,
    tables: Mutex<BoundedCache<String, ()>>,
    columns: Mutex<BoundedCache<String, ()>>,
}

fn column_key(model: &str, field: &str) -> String {
    format!("{}.{}", model, field)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SchemaRegistry {
    pub fn new(executor: Arc<Executor>, config: Arc<AdapterConfig>) -> Self {
        Self {
            tables: Mutex::new(BoundedCache::new(config.schema_cache_capacity)),
            columns: Mutex::new(BoundedCache::new(config.column_cache_capacity)),
            executor,
            config,
        }
    }

    pub fn is_table_known(&self, model: &str) -> bool {
        lock(&self.tables).contains(model)
    }

    pub fn is_column_known(&self, model: &str, field: &str) -> bool {
        lock(&self.columns).contains(&column_key(model, field))
    }

    pub fn known_tables(&self) -> usize {
        lock(&self.tables).len()
    }

    pub fn known_columns(&self) -> usize {
        lock(&self.columns).len()
    }

    /// Forget everything. The next call for each table goes back to the catalog.
    pub fn clear(&self) {
        lock(&self.tables).clear();
        lock(&self.columns).clear();
    }

    fn remember_table(&self, model: &str) {
        let evicted = lock(&self.tables).insert(model.to_string(), ());
        if let Some((old, _)) = evicted {
            let prefix = column_key(&old, "");
            let dropped = lock(&self.columns).remove_where(|key| key.starts_with(&prefix));
            debug!("schema cache evicted table '{}' and {} column(s)", old, dropped);
        }
    }

    fn remember_columns<'a>(&self, model: &str, fields: impl IntoIterator<Item = &'a str>) {
        let mut columns = lock(&self.columns);
        for field in fields {
            columns.insert(column_key(model, field), ());
        }
    }

    /// Names of the columns `model` has, or `None` when the table is missing
    async fn lookup_table(&self, model: &ValidatedModel, trace: Option<Operation>) -> Result<Option<Vec<String>>> {
        let exists = SqlStatement::new(TABLE_EXISTS_SQL).bind("model", SqlValue::from(model.as_str()));
        if self.executor.execute(&exists, trace).await?.rows.is_empty() {
            return Ok(None);
        }
        self.introspect(model, trace).await.map(Some)
    }

    async fn introspect(&self, model: &ValidatedModel, trace: Option<Operation>) -> Result<Vec<String>> {
        let outcome = self
            .executor
            .execute(&SqlStatement::new(table_info_sql(model)), trace)
            .await?;

        Ok(outcome
            .rows
            .into_iter()
            .filter_map(|row| {
                row.into_iter()
                    .find(|(column, _)| column == "name")
                    .and_then(|(_, value)| value.as_str().map(str::to_string))
            })
            .collect())
    }

    async fn create_table(&self, model: &ValidatedModel, trace: Option<Operation>) -> Result<Vec<String>> {
        let mut builder = CreateTableBuilder::new(model);
        let mut names = Vec::new();
        for column in self.config.columns_for(model) {
            let field = validate_field_name(&column.name)?;
            let constraints: Vec<String> = column.constraint.iter().cloned().collect();
            builder = builder.add_column(&field, &column.sql_type, &constraints);
            names.push(field.to_string());
        }

        self.executor
            .execute(&SqlStatement::new(builder.build()), trace)
            .await?;
        Ok(names)
    }

    /// Make sure `model` exists, creating it with its baseline columns if needed
    pub async fn ensure_table(
        &self,
        model: &ValidatedModel,
        strictness: Strictness,
        trace: Option<Operation>,
    ) -> Result<EnsureOutcome> {
        if self.is_table_known(model) {
            return Ok(EnsureOutcome::Cached);
        }

        let result = match self.lookup_table(model, trace).await {
            Ok(Some(columns)) => {
                self.remember_columns(model, columns.iter().map(String::as_str));
                Ok(EnsureOutcome::Existed)
            }
            Ok(None) => self.create_table(model, trace).await.map(|columns| {
                self.remember_columns(model, columns.iter().map(String::as_str));
                EnsureOutcome::Created
            }),
            Err(e) => Err(e),
        };
        self.remember_table(model);

        match result {
            Ok(outcome) => {
                if outcome == EnsureOutcome::Created {
                    debug!("created table '{}'", model);
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!("could not prepare table '{}': {}", model, e);
                match strictness {
                    Strictness::Strict => Err(e),
                    Strictness::BestEffort => Ok(EnsureOutcome::Ignored(e.to_string())),
                }
            }
        }
    }

    pub async fn ensure_column(
        &self,
        model: &ValidatedModel,
        field: &ValidatedField,
        trace: Option<Operation>,
    ) -> EnsureOutcome {
        self.ensure_columns(model, std::slice::from_ref(field), trace)
            .await
            .pop()
            .unwrap_or(EnsureOutcome::Cached)
    }

    /// Make sure every field exists as a column of `model`
    ///
    /// Uncached fields cost one introspection in total plus one
    /// `ADD COLUMN` per field that is really missing. Every field ends up
    /// cached whatever the outcome. Returns one outcome per input field.
    pub async fn ensure_columns(
        &self,
        model: &ValidatedModel,
        fields: &[ValidatedField],
        trace: Option<Operation>,
    ) -> Vec<EnsureOutcome> {
        let mut outcomes = vec![EnsureOutcome::Cached; fields.len()];
        let missing: Vec<usize> = {
            let columns = lock(&self.columns);
            (0..fields.len())
                .filter(|&i| !columns.contains(&column_key(model, &fields[i])))
                .collect()
        };
        if missing.is_empty() {
            return outcomes;
        }

        let existing: HashSet<String> = match self.introspect(model, trace).await {
            Ok(columns) => {
                self.remember_columns(model, columns.iter().map(String::as_str));
                columns.into_iter().collect()
            }
            Err(e) => {
                warn!("could not read columns of '{}': {}", model, e);
                HashSet::new()
            }
        };

        let column_type = self.executor.engine().generic_column_type().to_string();
        let mut added = HashSet::new();
        for i in missing {
            let field = &fields[i];
            if existing.contains(field.as_str()) {
                outcomes[i] = EnsureOutcome::Existed;
                continue;
            }
            if !added.insert(field.as_str()) {
                outcomes[i] = EnsureOutcome::Cached;
                continue;
            }

            let alter = SqlStatement::new(add_column_sql(model, field, &column_type));
            outcomes[i] = match self.executor.execute(&alter, trace).await {
                Ok(_) => {
                    debug!("added column '{}.{}'", model, field);
                    EnsureOutcome::Created
                }
                Err(e) => {
                    // Usually another writer added it first.
                    warn!("could not add column '{}.{}': {}", model, field, e);
                    EnsureOutcome::Ignored(e.to_string())
                }
            };
            self.remember_columns(model, [field.as_str()]);
        }

        outcomes
    }
}
