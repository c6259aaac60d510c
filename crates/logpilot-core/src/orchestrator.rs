//! The query orchestration state machine.
//!
//! ```text
//! rewrite -> classify -+-> generate_sql -> validate_sql -+-> execute_sql ----------+
//!    ^                 |                    ^            |                         |
//!    |                 |                    +-repair_sql-+ (budget left)           |
//!    |                 |                                 +-> (budget spent) -------+
//!    |                 +-> retrieve_context -> verify_context -+-------------------+
//!    +---------------------- (invalid, budget left) -----------+                   |
//!                      +-> web_search ---------------------------------------------+
//!                      +-> (ambiguous / no searcher) ------------------------------+
//!                                                                                  v
//!                              validate_answer <-> synthesize_answer <-------------+
//! ```
//!
//! Every loop is bounded by its retry budget and the whole execution by
//! `maxNodeVisits`. [`Orchestrator::answer`] never panics and never returns an
//! error: anything that escapes a node becomes the generic failure answer.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::collaborators::{GenerationService, KnowledgeRetriever, QueryEngine, WebSearcher};
use crate::config::OrchestratorConfig;
use crate::errors::PilotError;
use crate::nodes::{classify, context, rewrite, sql, synthesis, web, NodeContext};
use crate::shadow::ShadowHandle;
use crate::types::{
    AnswerMetadata, AnswerResponse, AnswerStatus, Intent, RequestState, RetryLoop, Turn,
};

/// Answer returned when an execution fails outright.
pub const FAILURE_ANSWER: &str =
    "Sorry, I couldn't process that request. Please try again or rephrase your question.";

/// Default number of web results handed to synthesis.
pub const DEFAULT_WEB_MAX_RESULTS: usize = 5;

/// External services the state machine drives.
///
/// Built once per process and shared by every execution.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn GenerationService>,
    pub query_engine: Arc<dyn QueryEngine>,
    pub retriever: Arc<dyn KnowledgeRetriever>,
    /// `None` routes `web_search` intents straight to synthesis.
    pub web_searcher: Option<Arc<dyn WebSearcher>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("web_searcher", &self.web_searcher.is_some())
            .finish_non_exhaustive()
    }
}

/// A state of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    RewriteQuery,
    ClassifyIntent,
    GenerateSql,
    ValidateSql,
    RepairSql,
    ExecuteSql,
    RetrieveContext,
    VerifyContext,
    WebSearch,
    SynthesizeAnswer,
    ValidateAnswer,
}

impl Node {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RewriteQuery => "rewrite_query",
            Self::ClassifyIntent => "classify_intent",
            Self::GenerateSql => "generate_sql",
            Self::ValidateSql => "validate_sql",
            Self::RepairSql => "repair_sql",
            Self::ExecuteSql => "execute_sql",
            Self::RetrieveContext => "retrieve_context",
            Self::VerifyContext => "verify_context",
            Self::WebSearch => "web_search",
            Self::SynthesizeAnswer => "synthesize_answer",
            Self::ValidateAnswer => "validate_answer",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Final state of one execution, before it is turned into a response.
#[derive(Debug)]
pub struct Execution {
    pub state: RequestState,
    /// Nodes in visit order.
    pub trace: Vec<Node>,
    /// Set when the machine stopped abnormally.
    pub error: Option<PilotError>,
    /// Wall-clock seconds.
    pub latency: f64,
}

impl Execution {
    /// How many times `node` was visited.
    pub fn visits(&self, node: Node) -> usize {
        self.trace.iter().filter(|n| **n == node).count()
    }
}

/// Drives requests through the node graph.
#[derive(Debug)]
pub struct Orchestrator {
    collaborators: Collaborators,
    config: OrchestratorConfig,
    shadow: Option<ShadowHandle>,
    web_max_results: usize,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: OrchestratorConfig) -> Self {
        Self {
            collaborators,
            config,
            shadow: None,
            web_max_results: DEFAULT_WEB_MAX_RESULTS,
        }
    }

    /// Replay every synthesis prompt against a shadow model.
    pub fn with_shadow(mut self, shadow: ShadowHandle) -> Self {
        self.shadow = Some(shadow);
        self
    }

    pub fn with_web_max_results(mut self, max_results: usize) -> Self {
        self.web_max_results = max_results;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answer `query` given the caller's conversation window.
    pub fn answer(&self, query: &str, history: Vec<Turn>) -> AnswerResponse {
        let execution = self.execute(query, history);
        let response = build_response(execution);
        info!(
            "answer: intent={} status={:?} retries={} latency={:.2}s",
            response.intent,
            response.status,
            response.metadata.retry_count,
            response.metadata.latency
        );
        response
    }

    /// Run the machine to completion and return its final state.
    pub fn execute(&self, query: &str, history: Vec<Turn>) -> Execution {
        let start = Instant::now();
        let mut state = RequestState::new(query, history);
        let mut trace = Vec::new();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.run(&mut state, &mut trace)));
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(PilotError::Panicked(panic_message(payload.as_ref()))),
        };
        if let Some(e) = &error {
            warn!("answer: execution aborted: {}", e);
        }

        Execution {
            state,
            trace,
            error,
            latency: start.elapsed().as_secs_f64(),
        }
    }

    fn node_context(&self) -> NodeContext<'_> {
        NodeContext {
            generator: self.collaborators.generator.as_ref(),
            query_engine: self.collaborators.query_engine.as_ref(),
            retriever: self.collaborators.retriever.as_ref(),
            web_searcher: self.collaborators.web_searcher.as_deref(),
            config: &self.config,
            web_max_results: self.web_max_results,
            shadow: self.shadow.as_ref(),
        }
    }

    fn run(&self, state: &mut RequestState, trace: &mut Vec<Node>) -> Result<(), PilotError> {
        let ctx = self.node_context();
        let mut current = Some(Node::RewriteQuery);

        while let Some(node) = current {
            if trace.len() >= self.config.max_node_visits {
                return Err(PilotError::NodeLimitExceeded {
                    limit: self.config.max_node_visits,
                    last_node: node.name().to_string(),
                });
            }
            trace.push(node);
            debug!("node: {}", node);
            visit(&ctx, node, state);
            current = self.next(node, state);
        }
        Ok(())
    }

    /// Routing after `node` has run. Retry transitions are recorded here,
    /// except SQL repairs which the repair node records itself.
    fn next(&self, node: Node, state: &mut RequestState) -> Option<Node> {
        let policy = self.config.retry_policy;
        let next = match node {
            Node::RewriteQuery => Node::ClassifyIntent,
            Node::ClassifyIntent => match state.intent {
                Intent::Sql => Node::GenerateSql,
                Intent::Rag => Node::RetrieveContext,
                Intent::WebSearch if self.collaborators.web_searcher.is_some() => {
                    Node::WebSearch
                }
                Intent::WebSearch | Intent::Ambiguous => {
                    Node::SynthesizeAnswer
                }
            },
            Node::GenerateSql => Node::ValidateSql,
            Node::ValidateSql => {
                if state.sql_valid == Some(true) {
                    Node::ExecuteSql
                } else if state.retries_for(RetryLoop::SqlRepair, policy)
                    < self.config.sql_repair_budget
                {
                    Node::RepairSql
                } else {
                    info!("router: SQL repair budget spent, synthesizing");
                    Node::SynthesizeAnswer
                }
            }
            Node::RepairSql => Node::ValidateSql,
            Node::ExecuteSql => Node::SynthesizeAnswer,
            Node::RetrieveContext => Node::VerifyContext,
            Node::VerifyContext => {
                if state.context_valid == Some(true) {
                    Node::SynthesizeAnswer
                } else if state.retries_for(RetryLoop::ContextRetry, policy)
                    < self.config.context_retry_budget
                {
                    state.record_retry(RetryLoop::ContextRetry);
                    Node::RewriteQuery
                } else {
                    info!("router: context retry budget spent, synthesizing");
                    Node::SynthesizeAnswer
                }
            }
            Node::WebSearch => Node::SynthesizeAnswer,
            Node::SynthesizeAnswer => Node::ValidateAnswer,
            Node::ValidateAnswer => {
                if state.answer_valid != Some(false) {
                    return None;
                }
                if state.retries_for(RetryLoop::AnswerRetry, policy)
                    < self.config.answer_retry_budget
                {
                    state.record_retry(RetryLoop::AnswerRetry);
                    Node::SynthesizeAnswer
                } else {
                    info!("router: answer retry budget spent, returning best answer");
                    return None;
                }
            }
        };
        Some(next)
    }
}

fn visit(ctx: &NodeContext<'_>, node: Node, state: &mut RequestState) {
    match node {
        Node::RewriteQuery => rewrite::rewrite_query(ctx, state),
        Node::ClassifyIntent => classify::classify_intent(ctx, state),
        Node::GenerateSql => sql::generate_sql(ctx, state),
        Node::ValidateSql => sql::validate_sql(ctx, state),
        Node::RepairSql => sql::repair_sql(ctx, state),
        Node::ExecuteSql => sql::execute_sql(ctx, state),
        Node::RetrieveContext => context::retrieve_context(ctx, state),
        Node::VerifyContext => context::verify_context(ctx, state),
        Node::WebSearch => web::web_search(ctx, state),
        Node::SynthesizeAnswer => synthesis::synthesize_answer(ctx, state),
        Node::ValidateAnswer => synthesis::validate_answer(ctx, state),
    }
}

fn build_response(execution: Execution) -> AnswerResponse {
    let Execution {
        state,
        trace,
        error,
        latency,
    } = execution;

    let (answer, status) = match (&error, &state.final_answer) {
        (None, Some(answer)) => (answer.clone(), AnswerStatus::Ok),
        _ => (FAILURE_ANSWER.to_string(), AnswerStatus::Failed),
    };

    AnswerResponse {
        answer,
        intent: state.intent,
        sql: state.sql_query.clone(),
        sql_result: state.sql_result.clone(),
        context: state.rag_context.clone().or_else(|| state.web_results.clone()),
        status,
        metadata: AnswerMetadata {
            rewritten_query: state.rewritten_query.clone(),
            context_feedback: state.context_feedback.clone(),
            answer_feedback: state.answer_feedback.clone(),
            latency,
            retry_count: state.retry_count,
            retries: state.retries,
            trace: trace.iter().map(|n| n.name().to_string()).collect(),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
