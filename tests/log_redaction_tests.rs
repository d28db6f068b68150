/// Log redaction tests
///
/// Installs a capturing logger and checks that secrets bound to
/// sensitive-looking fields never reach a log line.
/// Run with: cargo test --test log_redaction_tests
mod common;

use common::record;
use lazytable::{Adapter, BatchMode, Condition, DebugLogs, FindOptions, SqlStatement, SqlValue, SqliteEngine, Value};
use log::{Level, LevelFilter, Log, Metadata, Record as LogRecord};
use std::sync::Mutex;

struct CapturingLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &LogRecord) {
        if self.enabled(record.metadata()) {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    lines: Mutex::new(Vec::new()),
};

const TOKEN: &str = "tok-7f3a9c";
const PASSWORD: &str = "hunter2-pw";
const EMAIL: &str = "ann@example.com";

#[tokio::test]
async fn test_sensitive_values_never_reach_the_log() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Debug);

    let adapter = Adapter::new(SqliteEngine::open_in_memory().unwrap()).with_debug(DebugLogs::all());

    adapter
        .create(
            "account",
            record(&[
                ("id", Value::from("a1")),
                ("accessToken", Value::from(TOKEN)),
                ("password", Value::from(PASSWORD)),
                ("scope", Value::from("read")),
            ]),
        )
        .await
        .unwrap();
    adapter
        .update(
            "account",
            &[Condition::eq("accessToken", TOKEN)],
            record(&[("password", Value::from(PASSWORD))]),
        )
        .await
        .unwrap();
    adapter
        .find_many("account", &[Condition::eq("accessToken", TOKEN)], &FindOptions::new())
        .await
        .unwrap();
    adapter
        .create("user", record(&[("id", Value::from("u1")), ("email", Value::from(EMAIL))]))
        .await
        .unwrap();
    adapter
        .execute_batch(
            vec![
                SqlStatement::new("UPDATE \"account\" SET \"accessToken\" = ? WHERE \"id\" = ?")
                    .bind("accessToken", SqlValue::from(TOKEN))
                    .bind("id", SqlValue::from("a1")),
                SqlStatement::new("SELECT 1"),
            ],
            BatchMode::BestEffort,
        )
        .await
        .unwrap();

    let lines = LOGGER.lines.lock().unwrap().clone();
    assert!(lines.iter().any(|l| l.contains("[create]")), "{:?}", lines);
    assert!(lines.iter().any(|l| l.contains("[batch]")), "{:?}", lines);
    assert!(lines.iter().any(|l| l.contains("[REDACTED]")), "{:?}", lines);
    // Non-sensitive values stay visible.
    assert!(lines.iter().any(|l| l.contains("read")), "{:?}", lines);

    for line in &lines {
        for secret in [TOKEN, PASSWORD, EMAIL] {
            assert!(!line.contains(secret), "leaked {} in: {}", secret, line);
        }
    }
}
