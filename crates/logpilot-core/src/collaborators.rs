//! Interfaces the orchestrator consumes.
//!
//! Concrete implementations over the infrastructure crates live in
//! [`crate::db_adapter`] and [`crate::model_adapter`]. Every trait is
//! `Send + Sync` so one set of clients can serve concurrent executions.

use serde::{Deserialize, Serialize};

use crate::errors::PilotError;
use crate::types::{Role, Turn};

pub use logpilot_db::{Metadata, QueryRows, SqlValue};
pub use logpilot_model::ModelTier;
pub use logpilot_utils::SearchResult;

/// Text generation over a fast/smart model registry.
pub trait GenerationService: Send + Sync {
    fn generate(&self, prompt: &str, tier: ModelTier) -> Result<String, PilotError>;
}

/// SQL access to the log store.
pub trait QueryEngine: Send + Sync {
    /// Execute `sql` with positional `params`.
    fn run_sql(&self, sql: &str, read_only: bool, params: &[SqlValue])
        -> Result<QueryRows, PilotError>;

    /// Plan `sql` without executing it. `Ok` means it would run.
    fn explain_sql(&self, sql: &str) -> Result<(), PilotError>;

    /// Column names of `table`, in declaration order.
    fn describe_table(&self, table: &str) -> Result<Vec<String>, PilotError>;
}

/// One retrieved knowledge item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub score: f32,
}

impl RetrievedItem {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
            score: 0.0,
        }
    }

    /// String form of a metadata value, whatever its JSON type.
    pub fn metadata_str(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Semantic search over log patterns and runbook cards.
pub trait KnowledgeRetriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedItem>, PilotError>;
}

/// Append-only per-session message log.
pub trait ConversationStore: Send + Sync {
    fn append_message(&self, session: &str, role: Role, content: &str) -> Result<(), PilotError>;

    /// The last `limit` turns of `session`, oldest first.
    fn recent_messages(&self, session: &str, limit: usize) -> Result<Vec<Turn>, PilotError>;
}

/// Public web search.
pub trait WebSearcher: Send + Sync {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, PilotError>;
}

/// One shadow evaluation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowRecord {
    pub query: String,
    pub shadow_model: String,
    /// `None` when the shadow generation failed.
    pub answer: Option<String>,
    /// Seconds spent in the shadow generation call.
    pub latency: f64,
}

/// Where shadow evaluation outcomes are written.
pub trait ShadowSink: Send + Sync {
    fn record(&self, record: &ShadowRecord) -> Result<(), PilotError>;
}
