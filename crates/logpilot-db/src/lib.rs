//! # logpilot-db
//!
//! Infrastructure layer for LogPilot: the structured log store, conversation
//! history, the shadow metrics sink, and the knowledge vector store.
//!
//! Keeping SQLite and file storage out of `logpilot-core` means the
//! orchestrator only sees narrow traits and can be tested with fakes.
//!
//! ## Architecture
//!
//! ```text
//! logpilot-cli → logpilot-core → (traits)
//!                     ↑
//!                logpilot-db (implements storage for those traits)
//!                logpilot-model (implements generation/embeddings)
//! ```
//!
//! ## Modules
//!
//! - `sqlite`: short-lived connections with busy retry
//! - `logs`: the `logs` table, ad-hoc SQL, `EXPLAIN`, introspection
//! - `history`: `chat_history` per session
//! - `metrics`: `shadow_logs`
//! - `knowledge`: JSONL vector store of runbook cards and log patterns
//! - `rows`: typed values and tuple-style result rendering

pub mod error;
pub mod history;
pub mod knowledge;
pub mod logs;
pub mod metrics;
pub mod rows;
pub mod sqlite;

pub use error::{DbError, DbResult};
pub use history::{HistoryStore, StoredMessage, StoredRole};
pub use knowledge::{
    KnowledgeHit, KnowledgeRecord, KnowledgeStore, Metadata, CLUSTER_ID_KEY, RUNBOOK_CARD_TYPE,
    TYPE_KEY,
};
pub use logs::{parse_log_timestamp, LogRecord, LogStore, TemplatePattern, LOGS_TABLE};
pub use metrics::{MetricsStore, ShadowRow};
pub use rows::{QueryRows, SqlValue};
pub use sqlite::SqliteSettings;
