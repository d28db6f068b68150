//! Shared test helpers: record builders and an engine wrapper that records
//! every prepared statement and can inject failures.

#![allow(dead_code)]

use async_trait::async_trait;
use lazytable::core::EngineResult;
use lazytable::storage::Row;
use lazytable::{BatchMode, Engine, EngineError, ExecOutcome, PreparedStatement, Record, SqlValue, SqliteEngine, Value};
use std::sync::{Arc, Mutex};

pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

/// What the wrapped engine does with `INSERT` statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertBehavior {
    Normal,
    /// Skip the insert and report zero affected rows
    Drop,
    /// Skip the insert but claim one row was written
    Phantom,
}

/// Shared view of what a [`RecordingEngine`] was asked to prepare
#[derive(Clone, Default)]
pub struct Recorder {
    prepared: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn prepared(&self) -> Vec<String> {
        self.prepared.lock().unwrap().clone()
    }

    pub fn count(&self, sql: &str) -> usize {
        self.prepared().iter().filter(|s| s.as_str() == sql).count()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.prepared().iter().filter(|s| s.starts_with(prefix)).count()
    }
}

pub struct RecordingEngine {
    inner: SqliteEngine,
    recorder: Recorder,
    fail_prefix: Option<String>,
    returning: bool,
    identity: bool,
    inserts: InsertBehavior,
}

impl RecordingEngine {
    pub fn new() -> (Self, Recorder) {
        let recorder = Recorder::default();
        let engine = Self {
            inner: SqliteEngine::open_in_memory().unwrap(),
            recorder: recorder.clone(),
            fail_prefix: None,
            returning: true,
            identity: true,
            inserts: InsertBehavior::Normal,
        };
        (engine, recorder)
    }

    /// Fail every statement starting with `prefix` at prepare time
    pub fn failing(mut self, prefix: &str) -> Self {
        self.fail_prefix = Some(prefix.to_string());
        self
    }

    pub fn without_returning(mut self) -> Self {
        self.returning = false;
        self
    }

    pub fn without_identity(mut self) -> Self {
        self.identity = false;
        self
    }

    pub fn inserts(mut self, behavior: InsertBehavior) -> Self {
        self.inserts = behavior;
        self
    }
}

struct RecordingStatement {
    inner: Arc<dyn PreparedStatement>,
    inserts: InsertBehavior,
}

impl RecordingStatement {
    fn is_insert(&self) -> bool {
        self.inner.sql().starts_with("INSERT")
    }
}

#[async_trait]
impl PreparedStatement for RecordingStatement {
    fn sql(&self) -> &str {
        self.inner.sql()
    }

    async fn all(&self, args: &[SqlValue]) -> EngineResult<Vec<Row>> {
        if self.is_insert() && self.inserts != InsertBehavior::Normal {
            return Ok(Vec::new());
        }
        self.inner.all(args).await
    }

    async fn run(&self, args: &[SqlValue]) -> EngineResult<ExecOutcome> {
        if self.is_insert() {
            match self.inserts {
                InsertBehavior::Normal => {}
                InsertBehavior::Drop => return Ok(ExecOutcome::default()),
                InsertBehavior::Phantom => {
                    return Ok(ExecOutcome {
                        rows: Vec::new(),
                        rows_affected: 1,
                        last_insert_id: Some(999),
                    });
                }
            }
        }
        self.inner.run(args).await
    }
}

#[async_trait]
impl Engine for RecordingEngine {
    async fn prepare(&self, sql: &str) -> EngineResult<Arc<dyn PreparedStatement>> {
        self.recorder.prepared.lock().unwrap().push(sql.to_string());

        if let Some(prefix) = &self.fail_prefix {
            if sql.starts_with(prefix.as_str()) {
                return Err(EngineError::Backend(format!("injected failure: {}", sql)));
            }
        }

        let inner = self.inner.prepare(sql).await?;
        Ok(Arc::new(RecordingStatement {
            inner,
            inserts: self.inserts,
        }))
    }

    async fn run_batch(
        &self,
        statements: Vec<(String, Vec<SqlValue>)>,
        mode: BatchMode,
    ) -> EngineResult<Vec<EngineResult<ExecOutcome>>> {
        self.inner.run_batch(statements, mode).await
    }

    fn supports_returning(&self) -> bool {
        self.returning && self.inner.supports_returning()
    }

    fn identity_column(&self) -> Option<&str> {
        if self.identity {
            self.inner.identity_column()
        } else {
            None
        }
    }

    fn generic_column_type(&self) -> &str {
        self.inner.generic_column_type()
    }
}
