//! Metrics sink for shadow-model evaluation runs.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use crate::error::DbResult;
use crate::sqlite::{SqliteFile, SqliteSettings};

const SHADOW_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS shadow_logs (
    timestamp TEXT NOT NULL,
    query TEXT NOT NULL,
    shadow_model TEXT NOT NULL,
    answer TEXT,
    latency REAL NOT NULL
);
";

/// One shadow generation, as written to `shadow_logs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowRow {
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub shadow_model: String,
    pub answer: Option<String>,
    /// Seconds.
    pub latency: f64,
}

/// SQLite-backed metrics store.
#[derive(Debug, Clone)]
pub struct MetricsStore {
    file: SqliteFile,
}

impl MetricsStore {
    pub fn open(path: impl Into<PathBuf>, settings: SqliteSettings) -> DbResult<Self> {
        let file = SqliteFile::new(path, settings)?;
        file.with_connection(false, |conn| conn.execute_batch(SHADOW_SCHEMA))?;
        Ok(Self { file })
    }

    pub fn record_shadow(&self, row: &ShadowRow) -> DbResult<()> {
        self.file.with_connection(false, |conn| {
            conn.execute(
                "INSERT INTO shadow_logs (timestamp, query, shadow_model, answer, latency) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    row.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                    row.query,
                    row.shadow_model,
                    row.answer,
                    row.latency,
                ],
            )
        })?;
        Ok(())
    }

    /// Most recent shadow rows, newest first.
    pub fn recent_shadow(&self, limit: usize) -> DbResult<Vec<ShadowRow>> {
        self.file.with_connection(true, |conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, query, shadow_model, answer, latency FROM shadow_logs \
                 ORDER BY rowid DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], |row| {
                    let ts: String = row.get(0)?;
                    Ok(ShadowRow {
                        timestamp: DateTime::parse_from_rfc3339(&ts)
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or_default(),
                        query: row.get(1)?,
                        shadow_model: row.get(2)?,
                        answer: row.get(3)?,
                        latency: row.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_read_back() {
        let temp = TempDir::new().unwrap();
        let store =
            MetricsStore::open(temp.path().join("metrics.db"), SqliteSettings::immediate()).unwrap();

        store
            .record_shadow(&ShadowRow {
                timestamp: Utc::now(),
                query: "Count errors".to_string(),
                shadow_model: "mistral".to_string(),
                answer: Some("100 errors".to_string()),
                latency: 0.42,
            })
            .unwrap();

        let rows = store.recent_shadow(5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shadow_model, "mistral");
        assert!((rows[0].latency - 0.42).abs() < 1e-9);
    }
}
