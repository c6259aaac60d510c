//! Append-only conversation history per session.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::sqlite::{SqliteFile, SqliteSettings};

const HISTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chat_history (
    id TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    session_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history (session_id, timestamp);
";

/// Who authored a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredRole {
    User,
    Assistant,
}

impl StoredRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for StoredRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StoredRole {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" | "human" => Ok(Self::User),
            "assistant" | "ai" => Ok(Self::Assistant),
            other => Err(DbError::InvalidRole(other.to_string())),
        }
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: String,
    pub role: StoredRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// SQLite-backed chat history.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    file: SqliteFile,
}

impl HistoryStore {
    /// Open (creating if needed) the history database.
    pub fn open(path: impl Into<PathBuf>, settings: SqliteSettings) -> DbResult<Self> {
        let file = SqliteFile::new(path, settings)?;
        file.with_connection(false, |conn| conn.execute_batch(HISTORY_SCHEMA))?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Append one message to a session.
    pub fn append(&self, session_id: &str, role: StoredRole, content: &str) -> DbResult<StoredMessage> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        };
        debug!("Appending {} message to session `{}`", role, session_id);

        self.file.with_connection(false, |conn| {
            conn.execute(
                "INSERT INTO chat_history (id, timestamp, session_id, role, content) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    message.id,
                    message.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
                    message.session_id,
                    message.role.as_str(),
                    message.content,
                ],
            )
        })?;
        Ok(message)
    }

    /// The last `limit` messages of a session, oldest first.
    pub fn recent(&self, session_id: &str, limit: usize) -> DbResult<Vec<StoredMessage>> {
        let raw = self.file.with_connection(false, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timestamp, session_id, role, content FROM chat_history \
                 WHERE session_id = ?1 ORDER BY rowid DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![session_id, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let mut messages = raw
            .into_iter()
            .map(|(id, ts, session_id, role, content)| {
                let timestamp = DateTime::parse_from_rfc3339(&ts)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| DbError::query(format!("bad timestamp `{}`: {}", ts, e)))?;
                Ok(StoredMessage {
                    id,
                    session_id,
                    role: role.parse()?,
                    content,
                    timestamp,
                })
            })
            .collect::<DbResult<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }
}
