//! SQLite-backed structured log store.
//!
//! This is the query engine the orchestrator's SQL path runs against: ad-hoc
//! read-only SQL, plan-only validation via `EXPLAIN`, and schema introspection.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DbError, DbResult};
use crate::rows::{QueryRows, SqlValue};
use crate::sqlite::{SqliteFile, SqliteSettings};

/// Name of the log table.
pub const LOGS_TABLE: &str = "logs";

/// Canonical timestamp layout stored in the `timestamp` column.
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LOGS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS logs (
    timestamp TEXT NOT NULL,
    severity TEXT,
    service_name TEXT,
    trace_id TEXT,
    body TEXT,
    environment TEXT,
    app_id TEXT,
    department TEXT,
    host TEXT,
    region TEXT,
    context TEXT
);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs (timestamp);
";

/// One log event to insert.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: String,
    pub service_name: String,
    #[serde(default)]
    pub trace_id: Option<String>,
    pub body: String,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// A distinct mined template seen in the log table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplatePattern {
    pub template_id: String,
    pub body: String,
    pub service_name: String,
    pub severity: String,
    pub occurrences: i64,
}

/// The structured log store.
#[derive(Debug, Clone)]
pub struct LogStore {
    file: SqliteFile,
}

impl LogStore {
    /// Open (creating if needed) the log database and its schema.
    pub fn open(path: impl Into<PathBuf>, settings: SqliteSettings) -> DbResult<Self> {
        let file = SqliteFile::new(path, settings)?;
        debug!("Opening log store at {}", file.path().display());
        file.with_connection(false, |conn| conn.execute_batch(LOGS_SCHEMA))?;
        Ok(Self { file })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Execute a statement and collect every row.
    pub fn run_sql(&self, sql: &str, read_only: bool, params: &[SqlValue]) -> DbResult<QueryRows> {
        let sql = normalize_statement(sql);
        trace!("run_sql(read_only={}): {}", read_only, sql);
        let bound: Vec<_> = params.iter().map(SqlValue::to_sqlite).collect();

        self.file.with_connection(read_only, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
            let width = columns.len();

            let mut rows = stmt.query(params_from_iter(bound.iter()))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(SqlValue::from_ref(row.get_ref(i)?));
                }
                out.push(values);
            }
            Ok(QueryRows::new(columns, out))
        })
    }

    /// Plan a statement without executing it.
    pub fn explain(&self, sql: &str) -> DbResult<()> {
        let sql = normalize_statement(sql);
        if sql.is_empty() {
            return Err(DbError::query("empty SQL statement"));
        }
        let explain = format!("EXPLAIN {}", sql);
        self.file.with_connection(true, |conn| {
            let mut stmt = conn.prepare(&explain)?;
            let mut rows = stmt.query([])?;
            while rows.next()?.is_some() {}
            Ok(())
        })
    }

    /// Column names of a table, in declaration order.
    pub fn describe_table(&self, table: &str) -> DbResult<Vec<String>> {
        if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || table.is_empty() {
            return Err(DbError::TableNotFound(table.to_string()));
        }
        let pragma = format!("PRAGMA table_info({})", table);
        let columns = self.file.with_connection(true, |conn| {
            let mut stmt = conn.prepare(&pragma)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })?;

        if columns.is_empty() {
            return Err(DbError::TableNotFound(table.to_string()));
        }
        Ok(columns)
    }

    /// Append log records in one transaction.
    pub fn insert_logs(&self, records: &[LogRecord]) -> DbResult<usize> {
        debug!("Inserting {} log records", records.len());
        self.file.with_connection(false, |conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO logs (timestamp, severity, service_name, trace_id, body, \
                     environment, app_id, department, host, region, context) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                )?;
                for r in records {
                    let context = if r.context.is_null() {
                        None
                    } else {
                        Some(r.context.to_string())
                    };
                    stmt.execute(params![
                        r.timestamp.format(LOG_TIMESTAMP_FORMAT).to_string(),
                        r.severity,
                        r.service_name,
                        r.trace_id,
                        r.body,
                        r.environment,
                        r.app_id,
                        r.department,
                        r.host,
                        r.region,
                        context,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
    }

    /// Distinct `context.template_id` values with a representative row each.
    pub fn template_patterns(&self, limit: usize) -> DbResult<Vec<TemplatePattern>> {
        let limit = limit as i64;
        self.file.with_connection(true, |conn| {
            let mut stmt = conn.prepare(
                "SELECT CAST(json_extract(context, '$.template_id') AS TEXT) AS template_id, \
                        MAX(body), MAX(service_name), MAX(severity), COUNT(*) \
                 FROM logs \
                 WHERE CASE WHEN json_valid(context) \
                       THEN json_extract(context, '$.template_id') END IS NOT NULL \
                 GROUP BY template_id \
                 ORDER BY COUNT(*) DESC \
                 LIMIT ?1",
            )?;
            let patterns = stmt
                .query_map([limit], |row| {
                    Ok(TemplatePattern {
                        template_id: row.get(0)?,
                        body: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        service_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        severity: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        occurrences: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(patterns)
        })
    }
}

/// Parse a stored log timestamp (`YYYY-MM-DD HH:MM:SS[.fff]`, `T` separator or RFC 3339).
pub fn parse_log_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Trim whitespace and trailing semicolons so the statement prepares as one.
fn normalize_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn store(temp: &TempDir) -> LogStore {
        LogStore::open(temp.path().join("logs.db"), SqliteSettings::immediate()).unwrap()
    }

    fn record(secs: u32, service: &str, body: &str, template: Option<i64>) -> LogRecord {
        LogRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, secs).unwrap(),
            severity: "ERROR".to_string(),
            service_name: service.to_string(),
            body: body.to_string(),
            context: template
                .map(|t| serde_json::json!({ "template_id": t }))
                .unwrap_or(serde_json::Value::Null),
            ..Default::default()
        }
    }

    #[test]
    fn test_run_sql_count() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .insert_logs(&[record(1, "auth", "login failed", Some(3)), record(2, "db", "slow", None)])
            .unwrap();

        let rows = store.run_sql("SELECT count(*) FROM logs;", true, &[]).unwrap();
        assert_eq!(rows.to_string(), "[(2,)]");
    }

    #[test]
    fn test_run_sql_with_params() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.insert_logs(&[record(1, "auth", "a", None), record(2, "db", "b", None)]).unwrap();

        let rows = store
            .run_sql(
                "SELECT service_name FROM logs WHERE service_name = ?",
                true,
                &[SqlValue::from("db")],
            )
            .unwrap();
        assert_eq!(rows.columns, vec!["service_name"]);
        assert_eq!(rows.to_string(), "[('db',)]");
    }

    #[test]
    fn test_read_only_run_rejects_writes() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.run_sql("DELETE FROM logs", true, &[]).is_err());
    }

    #[test]
    fn test_explain_accepts_valid_and_rejects_invalid() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.explain("SELECT count(*) FROM logs").is_ok());
        assert!(store.explain("SELEC count(*) FROM logs").is_err());
        assert!(store.explain("SELECT nope FROM logs").is_err());
        assert!(store.explain("   ").is_err());
    }

    #[test]
    fn test_explain_does_not_execute() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.insert_logs(&[record(1, "auth", "a", None)]).unwrap();
        // Read-only connection, so even the plan of a DELETE must not remove rows.
        let _ = store.explain("DELETE FROM logs");
        let rows = store.run_sql("SELECT count(*) FROM logs", true, &[]).unwrap();
        assert_eq!(rows.to_string(), "[(1,)]");
    }

    #[test]
    fn test_describe_table() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let columns = store.describe_table("logs").unwrap();
        assert_eq!(columns.first().map(String::as_str), Some("timestamp"));
        assert!(columns.contains(&"service_name".to_string()));
        assert!(columns.contains(&"context".to_string()));

        assert!(matches!(store.describe_table("missing"), Err(DbError::TableNotFound(_))));
        assert!(matches!(store.describe_table("logs; DROP"), Err(DbError::TableNotFound(_))));
    }

    #[test]
    fn test_template_patterns() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store
            .insert_logs(&[
                record(1, "auth", "login failed for <*>", Some(7)),
                record(2, "auth", "login failed for <*>", Some(7)),
                record(3, "db", "pool exhausted", Some(9)),
                record(4, "web", "no template", None),
            ])
            .unwrap();

        let patterns = store.template_patterns(10).unwrap();
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].template_id, "7");
        assert_eq!(patterns[0].occurrences, 2);
        assert_eq!(patterns[1].service_name, "db");
    }

    #[test]
    fn test_parse_log_timestamp() {
        assert!(parse_log_timestamp("2024-05-01 10:00:01").is_some());
        assert!(parse_log_timestamp("2024-05-01 10:00:01.250").is_some());
        assert!(parse_log_timestamp("2024-05-01T10:00:01").is_some());
        assert!(parse_log_timestamp("2024-05-01T10:00:01Z").is_some());
        assert!(parse_log_timestamp("yesterday").is_none());
    }
}
