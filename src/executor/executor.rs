use super::HealthStatus;
use crate::cache::BoundedCache;
use crate::core::{AdapterError, Result};
use crate::diagnostics::{Operation, redact_args};
use crate::query::SqlStatement;
use crate::storage::{BatchMode, Engine, ExecOutcome, PreparedStatement, StatementKind};
use log::debug;
use std::sync::{Arc, Mutex, PoisonError};

const HEALTH_CHECK_SQL: &str = "SELECT 1";

pub struct Executor {
    engine: Arc<dyn Engine>,
    statements: Mutex<BoundedCache<String, Arc<dyn PreparedStatement>>>,
}

impl Executor {
    pub fn new(engine: Arc<dyn Engine>, statement_cache_capacity: usize) -> Self {
        Self {
            engine,
            statements: Mutex::new(BoundedCache::new(statement_cache_capacity)),
        }
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn cached_statements(&self) -> usize {
        self.lock_statements().len()
    }

    pub fn clear_statement_cache(&self) {
        self.lock_statements().clear();
    }

    fn lock_statements(&self) -> std::sync::MutexGuard<'_, BoundedCache<String, Arc<dyn PreparedStatement>>> {
        self.statements.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prepared handle for `sql`, keyed by the exact text
    pub async fn prepare(&self, sql: &str) -> Result<Arc<dyn PreparedStatement>> {
        if let Some(prepared) = self.lock_statements().get(sql).cloned() {
            return Ok(prepared);
        }

        // Two tasks may both miss and prepare; the second insert just
        // replaces the first handle.
        let prepared = self.engine.prepare(sql).await?;
        self.lock_statements()
            .insert(sql.to_string(), Arc::clone(&prepared));
        Ok(prepared)
    }

    /// Run one statement. Engine errors come back unchanged.
    pub async fn execute(&self, statement: &SqlStatement, trace: Option<Operation>) -> Result<ExecOutcome> {
        check_sql(statement)?;

        if let Some(op) = trace {
            debug!(
                "[{}] {} [{}]",
                op,
                statement.sql,
                redact_args(&statement.labels, &statement.args).join(", ")
            );
        }

        let result = self.run(statement).await;

        if let Some(op) = trace {
            match &result {
                Ok(outcome) => debug!(
                    "[{}] rows={} affected={}",
                    op,
                    outcome.rows.len(),
                    outcome.rows_affected
                ),
                Err(e) => debug!("[{}] failed: {}", op, e),
            }
        }

        result
    }

    async fn run(&self, statement: &SqlStatement) -> Result<ExecOutcome> {
        let prepared = self.prepare(&statement.sql).await?;

        match StatementKind::of(&statement.sql) {
            StatementKind::Read => {
                let rows = prepared.all(&statement.args).await?;
                let rows_affected = if StatementKind::has_returning(&statement.sql) {
                    rows.len() as u64
                } else {
                    0
                };
                Ok(ExecOutcome {
                    rows,
                    rows_affected,
                    last_insert_id: None,
                })
            }
            StatementKind::Write => Ok(prepared.run(&statement.args).await?),
        }
    }

    /// Run `statements` in one transaction
    ///
    /// With [`BatchMode::BestEffort`] every statement gets its own entry in
    /// the returned list and the successes are committed. With
    /// [`BatchMode::AllOrNothing`] the first failure rolls everything back
    /// and is returned as the error.
    pub async fn execute_batch(
        &self,
        statements: Vec<SqlStatement>,
        mode: BatchMode,
        trace: Option<Operation>,
    ) -> Result<Vec<Result<ExecOutcome>>> {
        match statements.len() {
            0 => return Ok(Vec::new()),
            1 => {
                let result = self.execute(&statements[0], trace).await;
                return match mode {
                    BatchMode::AllOrNothing => Ok(vec![Ok(result?)]),
                    BatchMode::BestEffort => Ok(vec![result]),
                };
            }
            _ => {}
        }

        for statement in &statements {
            check_sql(statement)?;
            if let Some(op) = trace {
                debug!(
                    "[{}] batch: {} [{}]",
                    op,
                    statement.sql,
                    redact_args(&statement.labels, &statement.args).join(", ")
                );
            }
        }

        let pairs = statements.into_iter().map(|s| (s.sql, s.args)).collect();
        let results = self.engine.run_batch(pairs, mode).await?;

        if let Some(op) = trace {
            let failed = results.iter().filter(|r| r.is_err()).count();
            debug!("[{}] batch of {} finished, {} failed", op, results.len(), failed);
        }

        Ok(results
            .into_iter()
            .map(|r| r.map_err(AdapterError::from))
            .collect())
    }

    pub async fn check_health(&self) -> HealthStatus {
        match self.execute(&SqlStatement::new(HEALTH_CHECK_SQL), None).await {
            Ok(_) => HealthStatus::healthy(),
            Err(e) => HealthStatus::unhealthy(e),
        }
    }
}

fn check_sql(statement: &SqlStatement) -> Result<()> {
    if statement.sql.trim().is_empty() {
        return Err(AdapterError::InvalidStatement("SQL text is empty".to_string()));
    }
    if statement.args.len() != statement.labels.len() && !statement.labels.is_empty() {
        return Err(AdapterError::InvalidStatement(format!(
            "{} arguments but {} labels",
            statement.args.len(),
            statement.labels.len()
        )));
    }
    Ok(())
}
