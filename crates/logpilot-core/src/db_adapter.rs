//! Adapter layer for logpilot-db infrastructure.
//!
//! Bridges the SQLite stores and the knowledge vector store to the
//! collaborator traits the orchestrator consumes:
//!
//! - Error conversion from `DbError` to `PilotError`
//! - `QueryEngine` for [`LogStore`]
//! - `ConversationStore` for [`HistoryStore`]
//! - `ShadowSink` for [`MetricsStore`]
//! - [`VectorRetriever`]: `KnowledgeRetriever` over [`KnowledgeStore`] plus an
//!   embedding model from logpilot-model
//!
//! ```text
//! orchestrator nodes
//!        ↓ (collaborator traits)
//!   db_adapter (this module)
//!        ↓
//!   logpilot-db (SQLite log/history/metrics stores, JSONL vectors)
//! ```

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use logpilot_db::{
    DbError, DbResult, HistoryStore, KnowledgeStore, LogStore, MetricsStore, ShadowRow,
    StoredRole,
};
use logpilot_model::EmbeddingModel;

use crate::collaborators::{
    ConversationStore, KnowledgeRetriever, QueryEngine, QueryRows, RetrievedItem, ShadowRecord,
    ShadowSink, SqlValue,
};
use crate::errors::PilotError;
use crate::model_adapter::from_model_error;
use crate::types::{Role, Turn};

// ============================================================================
// Error Conversion
// ============================================================================

/// Convert a logpilot-db error to a logpilot-core error.
pub fn from_db_error(err: DbError) -> PilotError {
    match err {
        DbError::Io(io_err) => PilotError::Io(io_err),
        DbError::Json(json_err) => PilotError::Json(json_err),

        DbError::Query { message } => PilotError::Query { message },
        DbError::TableNotFound(table) => PilotError::query(format!("no such table: {}", table)),
        err @ (DbError::Open { .. } | DbError::Locked { .. }) => PilotError::query(err.to_string()),

        DbError::InvalidRole(role) => PilotError::conversation(format!("invalid role '{}'", role)),

        err @ (DbError::KnowledgeIo { .. } | DbError::DimensionMismatch { .. }) => {
            PilotError::retrieval(err.to_string())
        }

        DbError::Internal { message } => PilotError::Other(anyhow::anyhow!(message)),
    }
}

/// Extension trait to convert `DbResult` to `Result<T, PilotError>`.
pub trait IntoPilotResult<T> {
    fn into_pilot_result(self) -> Result<T, PilotError>;
}

impl<T> IntoPilotResult<T> for DbResult<T> {
    fn into_pilot_result(self) -> Result<T, PilotError> {
        self.map_err(from_db_error)
    }
}

// ============================================================================
// Role Conversion
// ============================================================================

pub fn to_stored_role(role: Role) -> StoredRole {
    match role {
        Role::User => StoredRole::User,
        Role::Assistant => StoredRole::Assistant,
    }
}

pub fn from_stored_role(role: StoredRole) -> Role {
    match role {
        StoredRole::User => Role::User,
        StoredRole::Assistant => Role::Assistant,
    }
}

// ============================================================================
// Trait implementations over logpilot-db stores
// ============================================================================

impl QueryEngine for LogStore {
    fn run_sql(
        &self,
        sql: &str,
        read_only: bool,
        params: &[SqlValue],
    ) -> Result<QueryRows, PilotError> {
        LogStore::run_sql(self, sql, read_only, params).into_pilot_result()
    }

    fn explain_sql(&self, sql: &str) -> Result<(), PilotError> {
        self.explain(sql).into_pilot_result()
    }

    fn describe_table(&self, table: &str) -> Result<Vec<String>, PilotError> {
        LogStore::describe_table(self, table).into_pilot_result()
    }
}

impl ConversationStore for HistoryStore {
    fn append_message(&self, session: &str, role: Role, content: &str) -> Result<(), PilotError> {
        self.append(session, to_stored_role(role), content)
            .into_pilot_result()?;
        Ok(())
    }

    fn recent_messages(&self, session: &str, limit: usize) -> Result<Vec<Turn>, PilotError> {
        let messages = self.recent(session, limit).into_pilot_result()?;
        Ok(messages
            .into_iter()
            .map(|m| Turn {
                role: from_stored_role(m.role),
                content: m.content,
                timestamp: m.timestamp,
            })
            .collect())
    }
}

impl ShadowSink for MetricsStore {
    fn record(&self, record: &ShadowRecord) -> Result<(), PilotError> {
        let row = ShadowRow {
            timestamp: Utc::now(),
            query: record.query.clone(),
            shadow_model: record.shadow_model.clone(),
            answer: record.answer.clone(),
            latency: record.latency,
        };
        self.record_shadow(&row).into_pilot_result()
    }
}

// ============================================================================
// VectorRetriever
// ============================================================================

/// Semantic retrieval: embed the query, then scan the knowledge store.
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    store: Arc<KnowledgeStore>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl VectorRetriever {
    pub fn new(store: Arc<KnowledgeStore>, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self { store, embedder }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }
}

impl KnowledgeRetriever for VectorRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedItem>, PilotError> {
        let embedding = self
            .embedder
            .embed_one(query)
            .map_err(|e| PilotError::retrieval(from_model_error(e).to_string()))?;
        let hits = self.store.query(&embedding, k).into_pilot_result()?;
        debug!("retriever: {} hits for {:?}", hits.len(), query);

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedItem {
                content: hit.content,
                metadata: hit.metadata,
                score: hit.score,
            })
            .collect())
    }
}
