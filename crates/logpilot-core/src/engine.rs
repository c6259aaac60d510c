//! LogPilot Engine: the entry point the CLI drives.
//!
//! [`PilotEngine`] builds every collaborator once from a [`PilotConfig`],
//! owns the shadow worker, and wraps [`Orchestrator::answer`] with the
//! conversation window load and write-back that make a session.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use logpilot_db::{HistoryStore, KnowledgeStore, LogStore, MetricsStore, ShadowRow};
use logpilot_model::{ChatClient, EmbeddingModel, HealthReport, HttpEmbeddingModel};
use logpilot_utils::WebSearchClient;

use crate::collaborators::{ConversationStore, WebSearcher};
use crate::config::PilotConfig;
use crate::db_adapter::{IntoPilotResult, VectorRetriever};
use crate::errors::PilotError;
use crate::knowledge::{self, IngestReport, KnowledgeStats};
use crate::orchestrator::{Collaborators, Orchestrator};
use crate::shadow::ShadowWorker;
use crate::types::{AnswerResponse, AnswerStatus, Role, Turn};

/// Session used when the caller names none.
pub const DEFAULT_SESSION: &str = "default";

// ============================================================================
// Session helper
// ============================================================================

/// Answer `query` inside `session`: load the last `window` turns, run the
/// state machine, then append the user turn and the answer.
///
/// History failures are logged and never fail the request. Failed answers
/// are not written back, so a retry starts from the same history.
pub fn answer_in_session(
    orchestrator: &Orchestrator,
    conversation: &dyn ConversationStore,
    session: &str,
    query: &str,
    window: usize,
) -> AnswerResponse {
    let history = match conversation.recent_messages(session, window) {
        Ok(turns) => turns,
        Err(e) => {
            warn!("session {}: could not load history: {}", session, e);
            Vec::new()
        }
    };
    debug!("session {}: {} prior turns", session, history.len());

    let response = orchestrator.answer(query, history);

    if response.status == AnswerStatus::Ok {
        let written = conversation
            .append_message(session, Role::User, query)
            .and_then(|_| {
                conversation.append_message(session, Role::Assistant, &response.answer)
            });
        if let Err(e) = written {
            warn!("session {}: could not save turn: {}", session, e);
        }
    }
    response
}

// ============================================================================
// PilotEngine
// ============================================================================

/// The main engine for LogPilot operations.
///
/// # Example
///
/// ```ignore
/// use logpilot_core::{PilotConfig, PilotEngine};
///
/// let engine = PilotEngine::with_defaults()?;
/// let response = engine.ask("default", "How many errors in the last hour?");
/// println!("{}", response.answer);
/// engine.shutdown();
/// ```
pub struct PilotEngine {
    config: PilotConfig,
    orchestrator: Orchestrator,
    chat: Arc<ChatClient>,
    logs: Arc<LogStore>,
    history: Arc<HistoryStore>,
    knowledge: Arc<KnowledgeStore>,
    metrics: Arc<MetricsStore>,
    embedder: Arc<dyn EmbeddingModel>,
    shadow: Option<ShadowWorker>,
}

impl std::fmt::Debug for PilotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PilotEngine")
            .field("data_dir", &self.config.storage.data_dir())
            .field("shadow", &self.shadow.is_some())
            .finish_non_exhaustive()
    }
}

impl PilotEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create an engine from a loaded configuration.
    ///
    /// Opens (and creates, when missing) every store under the data directory
    /// and builds the HTTP clients. Nothing is contacted over the network.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, a store cannot be
    /// opened, or a client cannot be built.
    pub fn from_config(config: PilotConfig) -> anyhow::Result<Self> {
        for warning in config.validate()? {
            warn!("Config warning: {}", warning);
        }

        let storage = &config.storage;
        let settings = storage.sqlite_settings();
        fs::create_dir_all(storage.data_dir())?;

        let logs = Arc::new(LogStore::open(storage.logs_db(), settings).into_pilot_result()?);
        let history =
            Arc::new(HistoryStore::open(storage.history_db(), settings).into_pilot_result()?);
        let knowledge =
            Arc::new(KnowledgeStore::open(storage.knowledge_dir()).into_pilot_result()?);
        let metrics =
            Arc::new(MetricsStore::open(storage.metrics_db(), settings).into_pilot_result()?);

        let chat_config = config.chat_config();
        let chat = Arc::new(ChatClient::new(chat_config.clone())?);
        let embedder: Arc<dyn EmbeddingModel> =
            Arc::new(HttpEmbeddingModel::new(config.embedding_config())?);

        let web_searcher: Option<Arc<dyn WebSearcher>> = if config.web_search.enabled {
            let client =
                WebSearchClient::new(Duration::from_secs(config.web_search.timeout_secs))?;
            Some(Arc::new(client))
        } else {
            None
        };

        let collaborators = Collaborators {
            generator: chat.clone(),
            query_engine: logs.clone(),
            retriever: Arc::new(VectorRetriever::new(knowledge.clone(), embedder.clone())),
            web_searcher,
        };
        let mut orchestrator = Orchestrator::new(collaborators, config.orchestrator.clone())
            .with_web_max_results(config.web_search.max_results);

        let shadow = match config.shadow.active_model() {
            Some(model) => {
                let shadow_chat = Arc::new(ChatClient::new(chat_config.pinned_to(model))?);
                let worker = ShadowWorker::spawn(
                    shadow_chat,
                    metrics.clone(),
                    model,
                    config.shadow.queue_capacity,
                )?;
                orchestrator = orchestrator.with_shadow(worker.handle());
                Some(worker)
            }
            None => None,
        };

        info!(
            "Engine ready: data at {}, fast model '{}'",
            storage.data_dir().display(),
            chat.config().fast_model
        );

        Ok(Self {
            config,
            orchestrator,
            chat,
            logs,
            history,
            knowledge,
            metrics,
            embedder,
            shadow,
        })
    }

    /// Create an engine from `~/.logpilot/config.yaml` (or `LOGPILOT_CONFIG`),
    /// falling back to defaults when no file exists.
    pub fn with_defaults() -> anyhow::Result<Self> {
        let config = PilotConfig::load_default()?;
        Self::from_config(config)
    }

    /// Create an engine from a specific configuration file.
    pub fn with_config(path: &Path) -> anyhow::Result<Self> {
        let mut config = PilotConfig::from_path(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Self::from_config(config)
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    // -------------------------------------------------------------------------
    // Conversation
    // -------------------------------------------------------------------------

    /// Answer `query` in `session`, reading and extending its history.
    pub fn ask(&self, session: &str, query: &str) -> AnswerResponse {
        answer_in_session(
            &self.orchestrator,
            self.history.as_ref(),
            session,
            query,
            self.config.orchestrator.history_window,
        )
    }

    /// The last `limit` turns of `session`, oldest first.
    pub fn history(&self, session: &str, limit: usize) -> Result<Vec<Turn>, PilotError> {
        self.history.recent_messages(session, limit)
    }

    /// Probe the generation service.
    pub fn health(&self) -> HealthReport {
        self.chat.check_health()
    }

    // -------------------------------------------------------------------------
    // Knowledge base
    // -------------------------------------------------------------------------

    /// Embed markdown files as runbook cards. Unreadable files are skipped.
    pub fn ingest_cards(&self, paths: &[PathBuf]) -> Result<IngestReport, PilotError> {
        let (cards, skipped) = knowledge::collect_cards(paths);
        if cards.is_empty() {
            return Ok(IngestReport { added: 0, skipped });
        }

        let records = knowledge::card_records(&cards, self.embedder.as_ref())?;
        self.knowledge.upsert(&records).into_pilot_result()?;
        info!("kb: stored {} cards", records.len());
        Ok(IngestReport {
            added: records.len(),
            skipped,
        })
    }

    /// Refresh pattern records from the distinct templates in the log store.
    pub fn sync_patterns(&self, limit: usize) -> Result<usize, PilotError> {
        let patterns = self.logs.template_patterns(limit).into_pilot_result()?;
        if patterns.is_empty() {
            info!("kb: no templated log rows to sync");
            return Ok(0);
        }

        let records = knowledge::pattern_records(&patterns, self.embedder.as_ref())?;
        self.knowledge.upsert(&records).into_pilot_result()?;
        info!("kb: synced {} patterns", records.len());
        Ok(records.len())
    }

    pub fn knowledge_len(&self) -> Result<usize, PilotError> {
        self.knowledge.len().into_pilot_result()
    }

    pub fn knowledge_stats(&self) -> Result<KnowledgeStats, PilotError> {
        let (cards, patterns, other) = self.knowledge.kind_counts().into_pilot_result()?;
        Ok(KnowledgeStats {
            cards,
            patterns,
            other,
        })
    }

    /// Recorded shadow runs, newest first.
    pub fn shadow_runs(&self, limit: usize) -> Result<Vec<ShadowRow>, PilotError> {
        self.metrics.recent_shadow(limit).into_pilot_result()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Drain queued shadow jobs and stop the worker.
    pub fn shutdown(mut self) {
        if let Some(worker) = self.shadow.take() {
            debug!("Draining shadow queue");
            worker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{ShadowRecord, ShadowSink};
    use crate::testing::{FakeEngine, FakeRetriever, ScriptedGenerator};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct MemoryConversation {
        turns: Mutex<Vec<(String, Turn)>>,
        fail_reads: bool,
    }

    impl ConversationStore for MemoryConversation {
        fn append_message(
            &self,
            session: &str,
            role: Role,
            content: &str,
        ) -> Result<(), PilotError> {
            self.turns
                .lock()
                .unwrap()
                .push((session.to_string(), Turn::new(role, content)));
            Ok(())
        }

        fn recent_messages(&self, session: &str, limit: usize) -> Result<Vec<Turn>, PilotError> {
            if self.fail_reads {
                return Err(PilotError::conversation("database is locked"));
            }
            let turns: Vec<Turn> = self
                .turns
                .lock()
                .unwrap()
                .iter()
                .filter(|(s, _)| s == session)
                .map(|(_, t)| t.clone())
                .collect();
            Ok(turns[turns.len().saturating_sub(limit)..].to_vec())
        }
    }

    fn orchestrator(replies: &[&str]) -> Orchestrator {
        Orchestrator::new(
            Collaborators {
                generator: Arc::new(ScriptedGenerator::ok(replies)),
                query_engine: Arc::new(FakeEngine::default()),
                retriever: Arc::new(FakeRetriever::default()),
                web_searcher: None,
            },
            Default::default(),
        )
    }

    #[test]
    fn test_answer_in_session_writes_back() {
        let conversation = MemoryConversation::default();
        let orch = orchestrator(&["ambiguous", "Hi there.", r#"{"valid": true}"#]);

        let response = answer_in_session(&orch, &conversation, "s1", "hello", 10);
        assert!(response.is_ok());

        let turns = conversation.recent_messages("s1", 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "hello");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].content, "Hi there.");
    }

    #[test]
    fn test_failed_answer_is_not_written_back() {
        let conversation = MemoryConversation {
            fail_reads: true,
            ..Default::default()
        };
        // Script ends after classification: synthesis fails every attempt.
        let orch = orchestrator(&["ambiguous"]);

        let response = answer_in_session(&orch, &conversation, "s1", "hello", 10);
        assert_eq!(response.status, AnswerStatus::Failed);
        assert!(conversation.turns.lock().unwrap().is_empty());
    }

    #[test]
    fn test_engine_opens_stores_and_ingests_nothing_offline() {
        let dir = TempDir::new().unwrap();
        let mut config = PilotConfig::for_data_dir(dir.path().join("data"));
        config.web_search.enabled = false;
        let engine = PilotEngine::from_config(config).unwrap();

        assert!(dir.path().join("data").join("logs.db").exists());
        assert_eq!(engine.knowledge_len().unwrap(), 0);
        assert_eq!(engine.knowledge_stats().unwrap().total(), 0);
        assert!(engine.history(DEFAULT_SESSION, 10).unwrap().is_empty());
        // No templated rows, so no embedding call is needed.
        assert_eq!(engine.sync_patterns(100).unwrap(), 0);

        let missing = dir.path().join("missing.md");
        let report = engine.ingest_cards(&[missing]).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped.len(), 1);
        engine.shutdown();
    }

    #[test]
    fn test_shadow_runs_read_back_newest_first() {
        let dir = TempDir::new().unwrap();
        let mut config = PilotConfig::for_data_dir(dir.path().join("data"));
        config.web_search.enabled = false;
        let engine = PilotEngine::from_config(config).unwrap();
        assert!(engine.shadow_runs(10).unwrap().is_empty());

        let sink: &dyn ShadowSink = engine.metrics.as_ref();
        for (query, answer) in [("Count errors", Some("100")), ("Why auth?", None)] {
            sink.record(&ShadowRecord {
                query: query.to_string(),
                shadow_model: "mistral".to_string(),
                answer: answer.map(str::to_string),
                latency: 0.5,
            })
            .unwrap();
        }

        let runs = engine.shadow_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].query, "Why auth?");
        assert_eq!(runs[0].answer, None);
        assert_eq!(engine.shadow_runs(1).unwrap().len(), 1);
        engine.shutdown();
    }
}
