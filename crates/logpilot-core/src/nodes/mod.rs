//! Node logic of the state machine.
//!
//! Each node is a plain function over a [`NodeContext`] and the execution's
//! [`RequestState`](crate::types::RequestState). Nodes never return errors:
//! collaborator failures are recovered inside the node according to its
//! fallback policy and recorded on the state. Routing between nodes lives in
//! [`crate::orchestrator`].
//!
//! | node | on collaborator failure |
//! |---|---|
//! | rewrite | keep the original query |
//! | classify | `ambiguous` |
//! | generate / repair SQL | record `sql_error` |
//! | validate SQL | invalid, with schema appended |
//! | execute SQL | record `sql_error`, no retry |
//! | retrieve | error marker as context |
//! | verify context | invalid (fail-closed) |
//! | web search | error text as results |
//! | synthesize | no answer |
//! | validate answer | valid (fail-open) |

pub mod classify;
pub mod context;
pub mod rewrite;
pub mod sql;
pub mod synthesis;
pub mod web;

use crate::collaborators::{GenerationService, KnowledgeRetriever, QueryEngine, WebSearcher};
use crate::config::OrchestratorConfig;
use crate::shadow::ShadowHandle;

/// Borrowed collaborators and settings for one execution.
#[derive(Clone, Copy)]
pub struct NodeContext<'a> {
    pub generator: &'a dyn GenerationService,
    pub query_engine: &'a dyn QueryEngine,
    pub retriever: &'a dyn KnowledgeRetriever,
    pub web_searcher: Option<&'a dyn WebSearcher>,
    pub config: &'a OrchestratorConfig,
    pub web_max_results: usize,
    pub shadow: Option<&'a ShadowHandle>,
}
