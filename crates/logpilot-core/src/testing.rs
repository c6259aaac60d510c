//! In-process collaborators for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::collaborators::{
    GenerationService, KnowledgeRetriever, Metadata, ModelTier, QueryEngine, QueryRows,
    RetrievedItem, SqlValue,
};
use crate::config::OrchestratorConfig;
use crate::errors::PilotError;
use crate::nodes::NodeContext;

/// Replies with a queued script; `Err` entries become generation failures.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn ok(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(*r)).collect())
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl GenerationService for ScriptedGenerator {
    fn generate(&self, prompt: &str, _tier: ModelTier) -> Result<String, PilotError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(PilotError::generation(e)),
            None => Err(PilotError::generation("script exhausted")),
        }
    }
}

/// Query engine with scripted `EXPLAIN` outcomes and row sets.
#[derive(Default)]
pub struct FakeEngine {
    pub explain: Mutex<VecDeque<Result<(), String>>>,
    pub results: Mutex<VecDeque<Result<QueryRows, String>>>,
    pub columns: Vec<String>,
    pub calls: Mutex<Vec<(String, Vec<SqlValue>)>>,
}

impl FakeEngine {
    pub fn with_columns(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn push_explain(&self, outcome: Result<(), &str>) {
        self.explain
            .lock()
            .unwrap()
            .push_back(outcome.map_err(str::to_string));
    }

    pub fn push_rows(&self, rows: Result<QueryRows, &str>) {
        self.results
            .lock()
            .unwrap()
            .push_back(rows.map_err(str::to_string));
    }

    pub fn sql_calls(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl QueryEngine for FakeEngine {
    fn run_sql(
        &self,
        sql: &str,
        _read_only: bool,
        params: &[SqlValue],
    ) -> Result<QueryRows, PilotError> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(rows)) => Ok(rows),
            Some(Err(e)) => Err(PilotError::query(e)),
            None => Ok(QueryRows::default()),
        }
    }

    fn explain_sql(&self, _sql: &str) -> Result<(), PilotError> {
        match self.explain.lock().unwrap().pop_front() {
            Some(Err(e)) => Err(PilotError::query(e)),
            _ => Ok(()),
        }
    }

    fn describe_table(&self, table: &str) -> Result<Vec<String>, PilotError> {
        if self.columns.is_empty() {
            Err(PilotError::query(format!("no such table: {}", table)))
        } else {
            Ok(self.columns.clone())
        }
    }
}

/// Retriever returning one scripted batch per call.
#[derive(Default)]
pub struct FakeRetriever {
    pub batches: Mutex<VecDeque<Result<Vec<RetrievedItem>, String>>>,
}

impl FakeRetriever {
    pub fn push(&self, batch: Result<Vec<RetrievedItem>, &str>) {
        self.batches
            .lock()
            .unwrap()
            .push_back(batch.map_err(str::to_string));
    }
}

impl KnowledgeRetriever for FakeRetriever {
    fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedItem>, PilotError> {
        match self.batches.lock().unwrap().pop_front() {
            Some(Ok(items)) => Ok(items),
            Some(Err(e)) => Err(PilotError::retrieval(e)),
            None => Ok(Vec::new()),
        }
    }
}

/// Metadata from `(key, value)` string pairs.
pub fn metadata(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

/// Build a context over the given fakes with default settings.
pub fn context<'a>(
    generator: &'a ScriptedGenerator,
    engine: &'a FakeEngine,
    retriever: &'a FakeRetriever,
    config: &'a OrchestratorConfig,
) -> NodeContext<'a> {
    NodeContext {
        generator,
        query_engine: engine,
        retriever,
        web_searcher: None,
        config,
        web_max_results: 5,
        shadow: None,
    }
}
