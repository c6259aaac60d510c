//! Shared fakes for orchestrator integration tests.
//!
//! The generator routes each prompt to a per-stage script by recognizing the
//! prompt's opening instruction, so a test only scripts the stages it cares
//! about and the order of unrelated calls does not matter.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use logpilot_core::{
    Collaborators, GenerationService, KnowledgeRetriever, ModelTier, Orchestrator,
    OrchestratorConfig, PilotError, QueryEngine, QueryRows, RetrievedItem, SearchResult,
    ShadowRecord, ShadowSink, SqlValue, WebSearcher,
};
use serde_json::Value;

/// Which generation call a prompt belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rewrite,
    Classify,
    GenerateSql,
    RepairSql,
    VerifyContext,
    Synthesize,
    ValidateAnswer,
}

impl Stage {
    pub fn of(prompt: &str) -> Stage {
        if prompt.starts_with("You rewrite follow-up questions") {
            Stage::Rewrite
        } else if prompt.starts_with("Classify the user's question") {
            Stage::Classify
        } else if prompt.contains("writing SQLite queries") {
            Stage::GenerateSql
        } else if prompt.contains("Fix the SQL query") {
            Stage::RepairSql
        } else if prompt.starts_with("You check whether retrieved context") {
            Stage::VerifyContext
        } else if prompt.starts_with("You are LogPilot") {
            Stage::Synthesize
        } else if prompt.starts_with("You review answers") {
            Stage::ValidateAnswer
        } else {
            panic!("unrecognized prompt: {}", prompt)
        }
    }
}

type Reply = Result<String, String>;

/// Generator with one reply queue per stage.
///
/// A stage can also have a fallback reply used once its queue is empty.
/// With neither, the call fails like a timed-out request.
#[derive(Default)]
pub struct StageGenerator {
    queues: Mutex<HashMap<Stage, VecDeque<Reply>>>,
    fallback: Mutex<HashMap<Stage, Reply>>,
    panics: Mutex<HashSet<Stage>>,
    prompts: Mutex<Vec<(Stage, String)>>,
}

impl StageGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, stage: Stage, replies: &[Result<&str, &str>]) -> Self {
        self.queues.lock().unwrap().entry(stage).or_default().extend(
            replies
                .iter()
                .map(|r| r.map(str::to_string).map_err(str::to_string)),
        );
        self
    }

    pub fn reply(self, stage: Stage, text: &str) -> Self {
        self.script(stage, &[Ok(text)])
    }

    pub fn always(self, stage: Stage, reply: Result<&str, &str>) -> Self {
        self.fallback
            .lock()
            .unwrap()
            .insert(stage, reply.map(str::to_string).map_err(str::to_string));
        self
    }

    pub fn panic_on(self, stage: Stage) -> Self {
        self.panics.lock().unwrap().insert(stage);
        self
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .count()
    }

    pub fn prompts(&self, stage: Stage) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl GenerationService for StageGenerator {
    fn generate(&self, prompt: &str, _tier: ModelTier) -> Result<String, PilotError> {
        let stage = Stage::of(prompt);
        self.prompts
            .lock()
            .unwrap()
            .push((stage, prompt.to_string()));
        if self.panics.lock().unwrap().contains(&stage) {
            panic!("generator blew up at {:?}", stage);
        }

        let queued = self
            .queues
            .lock()
            .unwrap()
            .get_mut(&stage)
            .and_then(|q| q.pop_front());
        let reply = queued.or_else(|| self.fallback.lock().unwrap().get(&stage).cloned());
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(PilotError::generation(e)),
            None => Err(PilotError::generation(format!("no reply scripted for {:?}", stage))),
        }
    }
}

/// Query engine whose `EXPLAIN` rejects any statement containing a marker.
pub struct ScriptedEngine {
    reject_marker: String,
    rows: Mutex<VecDeque<Result<QueryRows, String>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedEngine {
    /// Statements containing `marker` fail validation.
    pub fn rejecting(marker: &str) -> Self {
        Self {
            reject_marker: marker.to_string(),
            rows: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_rows(&self, rows: Result<QueryRows, &str>) -> &Self {
        self.rows
            .lock()
            .unwrap()
            .push_back(rows.map_err(str::to_string));
        self
    }
}

impl Default for ScriptedEngine {
    fn default() -> Self {
        Self::rejecting("SELEC ")
    }
}

impl QueryEngine for ScriptedEngine {
    fn run_sql(
        &self,
        sql: &str,
        _read_only: bool,
        _params: &[SqlValue],
    ) -> Result<QueryRows, PilotError> {
        self.calls.lock().unwrap().push(sql.to_string());
        match self.rows.lock().unwrap().pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(e)) => Err(PilotError::query(e)),
            None => Ok(QueryRows::default()),
        }
    }

    fn explain_sql(&self, sql: &str) -> Result<(), PilotError> {
        if sql.contains(&self.reject_marker) {
            Err(PilotError::query(format!(
                "near \"{}\": syntax error",
                self.reject_marker.trim()
            )))
        } else {
            Ok(())
        }
    }

    fn describe_table(&self, _table: &str) -> Result<Vec<String>, PilotError> {
        Ok(["timestamp", "severity", "service_name", "body", "context"]
            .iter()
            .map(|c| c.to_string())
            .collect())
    }
}

/// Retriever returning one queued batch per call.
#[derive(Default)]
pub struct QueuedRetriever {
    batches: Mutex<VecDeque<Vec<RetrievedItem>>>,
    pub queries: Mutex<Vec<String>>,
}

impl QueuedRetriever {
    pub fn push(&self, items: Vec<RetrievedItem>) -> &Self {
        self.batches.lock().unwrap().push_back(items);
        self
    }
}

impl KnowledgeRetriever for QueuedRetriever {
    fn retrieve(&self, query: &str, _k: usize) -> Result<Vec<RetrievedItem>, PilotError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.batches.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Web searcher returning fixed results.
pub struct StaticSearcher(pub Vec<SearchResult>);

impl WebSearcher for StaticSearcher {
    fn search(&self, _query: &str, max_results: usize) -> Result<Vec<SearchResult>, PilotError> {
        Ok(self.0.iter().take(max_results).cloned().collect())
    }
}

/// Shadow sink keeping records in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<ShadowRecord>>,
}

impl ShadowSink for MemorySink {
    fn record(&self, record: &ShadowRecord) -> Result<(), PilotError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub fn pattern(content: &str, cluster_id: &str) -> RetrievedItem {
    let mut metadata = serde_json::Map::new();
    metadata.insert("cluster_id".into(), Value::from(cluster_id));
    RetrievedItem::new(content, metadata)
}

pub fn card(content: &str, topic: &str) -> RetrievedItem {
    let mut metadata = serde_json::Map::new();
    metadata.insert("type".into(), Value::from("runbook_card"));
    metadata.insert("topic".into(), Value::from(topic));
    RetrievedItem::new(content, metadata)
}

pub fn count_rows(n: i64) -> QueryRows {
    QueryRows::new(vec!["count(*)".into()], vec![vec![SqlValue::Integer(n)]])
}

/// Everything one test needs, with handles kept for assertions.
pub struct Harness {
    pub generator: Arc<StageGenerator>,
    pub engine: Arc<ScriptedEngine>,
    pub retriever: Arc<QueuedRetriever>,
}

impl Harness {
    pub fn new(generator: StageGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
            engine: Arc::new(ScriptedEngine::default()),
            retriever: Arc::new(QueuedRetriever::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            generator: self.generator.clone(),
            query_engine: self.engine.clone(),
            retriever: self.retriever.clone(),
            web_searcher: None,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        self.orchestrator_with(OrchestratorConfig::default())
    }

    pub fn orchestrator_with(&self, config: OrchestratorConfig) -> Orchestrator {
        Orchestrator::new(self.collaborators(), config)
    }
}
