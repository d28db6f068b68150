use crate::config::{AdapterConfig, ReturningMode};
use crate::core::{AdapterError, Condition, FindOptions, Operator, Record, Result, SortSpec, Value};
use crate::diagnostics::{DebugLogs, Operation, redact_record};
use crate::executor::{Executor, HealthStatus};
use crate::marshal::{Marshaller, TypeDecoder};
use crate::query::{SqlStatement, build_count, build_delete, build_insert, build_select, build_update};
use crate::schema::{GeneratedSchema, SchemaRegistry, Strictness, TableSpecs, generate};
use crate::storage::{BatchMode, Engine, ExecOutcome};
use crate::validation::{IdentifierValidator, ValidatedField, ValidatedModel, validate_field_name};
use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

struct Inner {
    config: Arc<AdapterConfig>,
    validator: IdentifierValidator,
    executor: Arc<Executor>,
    registry: SchemaRegistry,
    marshaller: Marshaller,
}

/// Entity CRUD over a relational engine whose layout is discovered lazily
///
/// Every call validates identifiers, makes sure the table and the columns it
/// touches exist, translates the request into a parameterized statement and
/// decodes the returned rows. Cloning is cheap; clones share all caches.
///
/// # Examples
///
/// ```
/// use lazytable::{Adapter, Condition, Record, SqliteEngine, Value};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> lazytable::Result<()> {
/// let adapter = Adapter::new(SqliteEngine::open_in_memory()?);
///
/// let mut user = Record::new();
/// user.insert("id".into(), Value::from("u1"));
/// user.insert("name".into(), Value::from("Ann"));
/// adapter.create("user", user).await?;
///
/// let found = adapter.find_one("user", &[Condition::eq("id", "u1")], &[]).await?;
/// assert_eq!(found.and_then(|r| r.get("name").cloned()), Some(Value::from("Ann")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Adapter {
    inner: Arc<Inner>,
    debug: DebugLogs,
}

impl Adapter {
    /// Adapter with the default configuration
    pub fn new(engine: impl Engine + 'static) -> Self {
        let config = AdapterConfig::default();
        let marshaller = Marshaller::new(&config);
        Self::build(Arc::new(engine), config, marshaller)
    }

    pub fn with_config(engine: impl Engine + 'static, config: AdapterConfig) -> Result<Self> {
        config.validate().map_err(AdapterError::InvalidConfig)?;
        let marshaller = Marshaller::new(&config);
        Ok(Self::build(Arc::new(engine), config, marshaller))
    }

    /// Replace the read-side type recovery, e.g. with a
    /// [`SchemaDecoder`](crate::marshal::SchemaDecoder)
    pub fn with_decoder(
        engine: impl Engine + 'static,
        config: AdapterConfig,
        decoder: Arc<dyn TypeDecoder>,
    ) -> Result<Self> {
        config.validate().map_err(AdapterError::InvalidConfig)?;
        let marshaller = Marshaller::with_decoder(decoder, config.value_cache_capacity);
        Ok(Self::build(Arc::new(engine), config, marshaller))
    }

    fn build(engine: Arc<dyn Engine>, config: AdapterConfig, marshaller: Marshaller) -> Self {
        let debug = config.debug_logs;
        let config = Arc::new(config);
        let executor = Arc::new(Executor::new(engine, config.statement_cache_capacity));
        let registry = SchemaRegistry::new(Arc::clone(&executor), Arc::clone(&config));

        Self {
            inner: Arc::new(Inner {
                validator: IdentifierValidator::new(config.known_models.clone()),
                config,
                executor,
                registry,
                marshaller,
            }),
            debug,
        }
    }

    /// A handle sharing every cache but emitting diagnostics for `logs`
    pub fn with_debug(&self, logs: DebugLogs) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            debug: logs,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub fn executor(&self) -> &Executor {
        &self.inner.executor
    }

    pub fn marshaller(&self) -> &Marshaller {
        &self.inner.marshaller
    }

    pub fn validator(&self) -> &IdentifierValidator {
        &self.inner.validator
    }

    /// Drop every cached table, column, statement and decode decision
    pub fn clear_caches(&self) {
        self.inner.registry.clear();
        self.inner.executor.clear_statement_cache();
        self.inner.marshaller.clear_cache();
    }

    fn model(&self, name: &str) -> Result<ValidatedModel> {
        self.inner.validator.validate_model(name)
    }

    fn uses_returning(&self) -> bool {
        self.inner.config.returning == ReturningMode::Auto && self.inner.executor.engine().supports_returning()
    }

    async fn execute(&self, statement: &SqlStatement, op: Operation) -> Result<ExecOutcome> {
        self.inner.executor.execute(statement, self.debug.trace(op)).await
    }

    /// Ensure the table and every referenced column, absorbing failures
    async fn prepare_schema(&self, model: &ValidatedModel, fields: &[ValidatedField], strictness: Strictness) -> Result<()> {
        let trace = self.debug.trace(Operation::Schema);
        self.inner.registry.ensure_table(model, strictness, trace).await?;
        if !fields.is_empty() {
            self.inner.registry.ensure_columns(model, fields, trace).await;
        }
        Ok(())
    }

    fn decode_first(&self, outcome: ExecOutcome) -> Option<Record> {
        outcome
            .rows
            .into_iter()
            .next()
            .map(|row| self.inner.marshaller.deserialize_row(row))
    }

    fn log_record(&self, op: Operation, model: &ValidatedModel, record: Option<&Record>) {
        if let Some(op) = self.debug.trace(op) {
            match record {
                Some(record) => debug!("[{}] {} -> {:?}", op, model, redact_record(record)),
                None => debug!("[{}] {} -> none", op, model),
            }
        }
    }

    pub async fn create(&self, model: &str, mut data: Record) -> Result<Record> {
        let model = self.model(model)?;

        if self.inner.config.generate_ids && data.get("id").is_none_or(Value::is_null) {
            data.insert("id".to_string(), Value::Text(Uuid::new_v4().to_string()));
        }

        let fields = fields_of(data.keys())?;
        self.prepare_schema(&model, &fields, Strictness::Strict).await?;

        let returning = self.uses_returning();
        let statement = build_insert(&model, &data, returning)?;
        let outcome = self.execute(&statement, Operation::Create).await?;

        let record = if returning {
            self.decode_first(outcome)
                .ok_or_else(|| AdapterError::CreateFailed(model.to_string()))?
        } else {
            if outcome.rows_affected == 0 {
                return Err(AdapterError::CreateFailed(model.to_string()));
            }
            self.retrieve_created(&model, &data, &outcome).await?
        };

        self.log_record(Operation::Create, &model, Some(&record));
        Ok(record)
    }

    /// Read back a row just inserted without `RETURNING`
    ///
    /// Tries the engine's identity column with the last insert id, then an
    /// explicit `id`. Without either, it matches every non-null scalar field
    /// and takes the newest row, which can pick the wrong row when identical
    /// records are inserted concurrently. When the identity lookup errors or
    /// finds nothing (e.g. a SQLite `WITHOUT ROWID` table), the next strategy
    /// is tried.
    async fn retrieve_created(&self, model: &ValidatedModel, data: &Record, outcome: &ExecOutcome) -> Result<Record> {
        let mut identity = self.inner.executor.engine().identity_column().map(str::to_string);

        if let Some((column, row_id)) = identity.clone().zip(outcome.last_insert_id) {
            let conditions = [Condition::eq(column.as_str(), row_id)];
            match self.find_created(model, &conditions, &FindOptions::new().limit(1)).await {
                Ok(Some(record)) => return Ok(record),
                Ok(None) => debug!("no '{}' row with {} {}, reading back another way", model, column, row_id),
                Err(e) => debug!("'{}' has no usable {} column, reading back another way: {}", model, column, e),
            }
            identity = None;
        }

        let mut options = FindOptions::new().limit(1);
        let conditions = match data.get("id") {
            Some(id) if !id.is_null() => vec![Condition::eq("id", id.clone())],
            _ => {
                warn!(
                    "reading back '{}' insert by matching field values; supply an id to make this exact",
                    model
                );
                if let Some(column) = &identity {
                    options = options.sort_by(SortSpec::desc(column.as_str()));
                }
                data.iter()
                    .filter(|(_, value)| value.is_scalar())
                    .map(|(key, value)| Condition::eq(key.as_str(), value.clone()))
                    .collect()
            }
        };

        self.find_created(model, &conditions, &options)
            .await?
            .ok_or_else(|| AdapterError::RetrieveAfterCreateFailed(model.to_string()))
    }

    async fn find_created(
        &self,
        model: &ValidatedModel,
        conditions: &[Condition],
        options: &FindOptions,
    ) -> Result<Option<Record>> {
        let statement = build_select(model, conditions, options)?;
        let found = self.execute(&statement, Operation::Create).await?;
        Ok(self.decode_first(found))
    }

    /// Update matching rows and return the first of them after the change
    pub async fn update(&self, model: &str, conditions: &[Condition], patch: Record) -> Result<Option<Record>> {
        let model = self.model(model)?;
        require_where("update", &model, conditions)?;
        if patch.is_empty() {
            return self.find_one(&model, conditions, &[]).await;
        }

        let fields = fields_of(conditions.iter().map(|c| &c.field).chain(patch.keys()))?;
        self.prepare_schema(&model, &fields, Strictness::BestEffort).await?;

        let returning = self.uses_returning();
        let statement = build_update(&model, conditions, &patch, returning)?;
        let outcome = self.execute(&statement, Operation::Update).await?;

        let record = if returning {
            self.decode_first(outcome)
        } else if outcome.rows_affected == 0 {
            None
        } else {
            // The patch may have changed fields the where clause filtered on.
            let conditions = reread_conditions(conditions, &patch);
            let statement = build_select(&model, &conditions, &FindOptions::new().limit(1))?;
            self.decode_first(self.execute(&statement, Operation::Update).await?)
        };

        self.log_record(Operation::Update, &model, record.as_ref());
        Ok(record)
    }

    pub async fn update_many(&self, model: &str, conditions: &[Condition], patch: Record) -> Result<u64> {
        let model = self.model(model)?;
        require_where("update", &model, conditions)?;
        if patch.is_empty() {
            return Ok(0);
        }

        let fields = fields_of(conditions.iter().map(|c| &c.field).chain(patch.keys()))?;
        self.prepare_schema(&model, &fields, Strictness::BestEffort).await?;

        let statement = build_update(&model, conditions, &patch, false)?;
        Ok(self.execute(&statement, Operation::UpdateMany).await?.rows_affected)
    }

    pub async fn delete(&self, model: &str, conditions: &[Condition]) -> Result<()> {
        self.delete_where(model, conditions, Operation::Delete).await.map(|_| ())
    }

    pub async fn delete_many(&self, model: &str, conditions: &[Condition]) -> Result<u64> {
        self.delete_where(model, conditions, Operation::DeleteMany).await
    }

    async fn delete_where(&self, model: &str, conditions: &[Condition], op: Operation) -> Result<u64> {
        let model = self.model(model)?;
        require_where("delete", &model, conditions)?;

        let fields = fields_of(conditions.iter().map(|c| &c.field))?;
        self.prepare_schema(&model, &fields, Strictness::BestEffort).await?;

        let statement = build_delete(&model, conditions)?;
        Ok(self.execute(&statement, op).await?.rows_affected)
    }

    /// First matching row, restricted to `select` when it is not empty
    pub async fn find_one(&self, model: &str, conditions: &[Condition], select: &[&str]) -> Result<Option<Record>> {
        let model = self.model(model)?;
        let options = FindOptions::new().limit(1).select(select.iter().copied());
        let fields = read_fields(conditions, &options)?;
        self.prepare_schema(&model, &fields, Strictness::BestEffort).await?;

        let statement = build_select(&model, conditions, &options)?;
        let record = self.decode_first(self.execute(&statement, Operation::FindOne).await?);
        self.log_record(Operation::FindOne, &model, record.as_ref());
        Ok(record)
    }

    pub async fn find_many(&self, model: &str, conditions: &[Condition], options: &FindOptions) -> Result<Vec<Record>> {
        let model = self.model(model)?;
        let fields = read_fields(conditions, options)?;
        self.prepare_schema(&model, &fields, Strictness::BestEffort).await?;

        let statement = build_select(&model, conditions, options)?;
        let outcome = self.execute(&statement, Operation::FindMany).await?;
        Ok(outcome
            .rows
            .into_iter()
            .map(|row| self.inner.marshaller.deserialize_row(row))
            .collect())
    }

    pub async fn count(&self, model: &str, conditions: &[Condition]) -> Result<u64> {
        let model = self.model(model)?;
        let fields = fields_of(conditions.iter().map(|c| &c.field))?;
        self.prepare_schema(&model, &fields, Strictness::BestEffort).await?;

        let statement = build_count(&model, conditions)?;
        let outcome = self.execute(&statement, Operation::Count).await?;
        let count = outcome
            .rows
            .first()
            .and_then(|row| row.iter().find(|(name, _)| name == "count"))
            .and_then(|(_, value)| value.as_i64())
            .unwrap_or(0);
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// DDL for `tables`, tagged with `path` or the configured schema path
    pub fn generate_schema(&self, tables: &TableSpecs, path: Option<&Path>) -> Result<GeneratedSchema> {
        let path = path.unwrap_or(self.inner.config.schema_path.as_path());
        let schema = generate(tables, &self.inner.validator, path)?;
        if let Some(op) = self.debug.trace(Operation::Schema) {
            debug!("[{}] generated {} table(s) for {}", op, tables.len(), schema.path.display());
        }
        Ok(schema)
    }

    /// Run raw statements in one transaction
    pub async fn execute_batch(
        &self,
        statements: Vec<SqlStatement>,
        mode: BatchMode,
    ) -> Result<Vec<Result<ExecOutcome>>> {
        self.inner
            .executor
            .execute_batch(statements, mode, self.debug.trace(Operation::Batch))
            .await
    }

    pub async fn check_health(&self) -> HealthStatus {
        self.inner.executor.check_health().await
    }
}

fn require_where(operation: &'static str, model: &ValidatedModel, conditions: &[Condition]) -> Result<()> {
    if conditions.is_empty() {
        return Err(AdapterError::EmptyWhereClause {
            operation,
            model: model.to_string(),
        });
    }
    Ok(())
}

/// Validated, de-duplicated field names in first-seen order
fn fields_of<'a>(names: impl IntoIterator<Item = &'a String>) -> Result<Vec<ValidatedField>> {
    let mut fields: Vec<ValidatedField> = Vec::new();
    for name in names {
        if !fields.iter().any(|f| f.as_str() == name) {
            fields.push(validate_field_name(name)?);
        }
    }
    Ok(fields)
}

fn read_fields(conditions: &[Condition], options: &FindOptions) -> Result<Vec<ValidatedField>> {
    fields_of(
        conditions
            .iter()
            .map(|c| &c.field)
            .chain(options.sort.iter().map(|s| &s.field))
            .chain(options.select.iter()),
    )
}

/// Conditions that still find the updated row after `patch` is applied
fn reread_conditions(conditions: &[Condition], patch: &Record) -> Vec<Condition> {
    conditions
        .iter()
        .map(|condition| match patch.get(&condition.field) {
            Some(value) => Condition::new(condition.field.clone(), Operator::Eq, value.clone()),
            None => condition.clone(),
        })
        .collect()
}
