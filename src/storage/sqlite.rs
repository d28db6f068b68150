//! SQLite engine on top of `rusqlite`.
//!
//! The connection is blocking, so every call hops onto tokio's blocking pool
//! and holds the connection mutex only for the duration of one statement or
//! one batch.

use super::engine::{BatchMode, Engine, ExecOutcome, PreparedStatement, Row, StatementKind};
use crate::core::{EngineError, EngineResult, SqlValue};
use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, Statement, ToSql, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const DRIVER_STATEMENT_CACHE: usize = 64;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Real(f),
        ValueRef::Text(text) => SqlValue::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

fn query_rows(conn: &Connection, sql: &str, args: &[SqlValue]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params_from_iter(args.iter()))?;

    let mut out = Vec::new();
    let mut names: Option<Vec<String>> = None;
    while let Some(row) = rows.next()? {
        // Read the column list after the first step: an `ALTER TABLE` since
        // the last run makes SQLite re-prepare and `*` may widen.
        let names = names.get_or_insert_with(|| {
            let stmt: &Statement = row.as_ref();
            stmt.column_names().into_iter().map(String::from).collect()
        });
        let mut values = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            values.push((name.clone(), value_from_ref(row.get_ref(i)?)));
        }
        out.push(values);
    }
    Ok(out)
}

fn execute(conn: &Connection, sql: &str, args: &[SqlValue]) -> rusqlite::Result<ExecOutcome> {
    let mut stmt = conn.prepare_cached(sql)?;
    let changed = stmt.execute(params_from_iter(args.iter()))?;
    let last_insert_id = StatementKind::is_insert(sql).then(|| conn.last_insert_rowid());
    Ok(ExecOutcome {
        rows: Vec::new(),
        rows_affected: changed as u64,
        last_insert_id,
    })
}

fn run_one(conn: &Connection, sql: &str, args: &[SqlValue]) -> rusqlite::Result<ExecOutcome> {
    match StatementKind::of(sql) {
        StatementKind::Read => {
            let rows = query_rows(conn, sql, args)?;
            let rows_affected = if StatementKind::has_returning(sql) {
                rows.len() as u64
            } else {
                0
            };
            Ok(ExecOutcome {
                rows,
                rows_affected,
                last_insert_id: StatementKind::is_insert(sql).then(|| conn.last_insert_rowid()),
            })
        }
        StatementKind::Write => execute(conn, sql, args),
    }
}

async fn blocking<F, T>(conn: &Arc<Mutex<Connection>>, f: F) -> EngineResult<T>
where
    F: FnOnce(&mut Connection) -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *guard)
    })
    .await
    .map_err(|e| EngineError::Task(e.to_string()))?
}

/// SQLite-backed [`Engine`]
///
/// # Examples
///
/// ```
/// use lazytable::SqliteEngine;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = SqliteEngine::open_in_memory()?;
/// # let _ = engine;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SqliteEngine {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteEngine {
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> EngineResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.set_prepared_statement_cache_capacity(DRIVER_STATEMENT_CACHE);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

struct SqlitePrepared {
    sql: String,
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl PreparedStatement for SqlitePrepared {
    fn sql(&self) -> &str {
        &self.sql
    }

    async fn all(&self, args: &[SqlValue]) -> EngineResult<Vec<Row>> {
        let sql = self.sql.clone();
        let args = args.to_vec();
        blocking(&self.conn, move |conn| Ok(query_rows(conn, &sql, &args)?)).await
    }

    async fn run(&self, args: &[SqlValue]) -> EngineResult<ExecOutcome> {
        let sql = self.sql.clone();
        let args = args.to_vec();
        blocking(&self.conn, move |conn| Ok(execute(conn, &sql, &args)?)).await
    }
}

#[async_trait]
impl Engine for SqliteEngine {
    async fn prepare(&self, sql: &str) -> EngineResult<Arc<dyn PreparedStatement>> {
        let owned = sql.to_string();
        blocking(&self.conn, move |conn| {
            // Parse once so syntax errors surface here; the driver keeps the handle.
            conn.prepare_cached(&owned)?;
            Ok(())
        })
        .await?;

        Ok(Arc::new(SqlitePrepared {
            sql: sql.to_string(),
            conn: Arc::clone(&self.conn),
        }))
    }

    async fn run_batch(
        &self,
        statements: Vec<(String, Vec<SqlValue>)>,
        mode: BatchMode,
    ) -> EngineResult<Vec<EngineResult<ExecOutcome>>> {
        blocking(&self.conn, move |conn| {
            let tx = conn.transaction()?;
            let mut results = Vec::with_capacity(statements.len());

            for (sql, args) in &statements {
                match run_one(&tx, sql, args) {
                    Ok(outcome) => results.push(Ok(outcome)),
                    // Dropping `tx` rolls back.
                    Err(e) if mode == BatchMode::AllOrNothing => return Err(e.into()),
                    Err(e) => results.push(Err(e.into())),
                }
            }

            tx.commit()?;
            Ok(results)
        })
        .await
    }

    fn supports_returning(&self) -> bool {
        // RETURNING arrived in SQLite 3.35.0
        rusqlite::version_number() >= 3_035_000
    }

    fn identity_column(&self) -> Option<&str> {
        Some("rowid")
    }

    fn generic_column_type(&self) -> &str {
        // Untyped columns have no affinity, so each value keeps its storage class.
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_and_run() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        let create = engine.prepare("CREATE TABLE t (id TEXT, n)").await.unwrap();
        create.run(&[]).await.unwrap();

        let insert = engine.prepare("INSERT INTO t (id, n) VALUES (?, ?)").await.unwrap();
        let outcome = insert
            .run(&[SqlValue::from("a"), SqlValue::Integer(7)])
            .await
            .unwrap();
        assert_eq!(outcome.rows_affected, 1);
        assert_eq!(outcome.last_insert_id, Some(1));

        let select = engine.prepare("SELECT id, n FROM t").await.unwrap();
        let rows = select.all(&[]).await.unwrap();
        assert_eq!(
            rows,
            vec![vec![
                ("id".to_string(), SqlValue::from("a")),
                ("n".to_string(), SqlValue::Integer(7)),
            ]]
        );
    }

    #[tokio::test]
    async fn test_prepare_reports_syntax_errors() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        let result = engine.prepare("SELEC nonsense").await;
        assert!(matches!(result, Err(EngineError::Sqlite(_))));
    }

    #[tokio::test]
    async fn test_batch_best_effort_keeps_successes() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine.prepare("CREATE TABLE t (id TEXT PRIMARY KEY)").await.unwrap().run(&[]).await.unwrap();

        let results = engine
            .run_batch(
                vec![
                    ("INSERT INTO t (id) VALUES (?)".into(), vec![SqlValue::from("a")]),
                    ("INSERT INTO t (id) VALUES (?)".into(), vec![SqlValue::from("a")]),
                    ("INSERT INTO t (id) VALUES (?)".into(), vec![SqlValue::from("b")]),
                ],
                BatchMode::BestEffort,
            )
            .await
            .unwrap();

        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());

        let rows = engine.prepare("SELECT id FROM t").await.unwrap().all(&[]).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_all_or_nothing_rolls_back() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        engine.prepare("CREATE TABLE t (id TEXT PRIMARY KEY)").await.unwrap().run(&[]).await.unwrap();

        let result = engine
            .run_batch(
                vec![
                    ("INSERT INTO t (id) VALUES (?)".into(), vec![SqlValue::from("a")]),
                    ("INSERT INTO t (id) VALUES (?)".into(), vec![SqlValue::from("a")]),
                ],
                BatchMode::AllOrNothing,
            )
            .await;
        assert!(result.is_err());

        let rows = engine.prepare("SELECT id FROM t").await.unwrap().all(&[]).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_returning_rows() {
        let engine = SqliteEngine::open_in_memory().unwrap();
        assert!(engine.supports_returning());
        engine.prepare("CREATE TABLE t (id TEXT, n)").await.unwrap().run(&[]).await.unwrap();
        let rows = engine
            .prepare("INSERT INTO t (id, n) VALUES (?, ?) RETURNING *")
            .await
            .unwrap()
            .all(&[SqlValue::from("x"), SqlValue::Integer(1)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], ("id".to_string(), SqlValue::from("x")));
    }
}
