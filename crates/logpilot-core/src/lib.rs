//! # logpilot-core
//!
//! **LogPilot** – query orchestration over operational logs.
//!
//! A question goes through a state machine that rewrites it against the
//! conversation, classifies it, and resolves it either with SQL over the log
//! store or with retrieval over mined log patterns and runbook cards. Each
//! failure-prone stage has a bounded self-correction loop, and the answer is
//! judged before it is returned.
//!
//! ## Main Types
//!
//! - [`PilotEngine`] – builds every collaborator from config and hosts sessions
//! - [`Orchestrator`] – the state machine; `answer(query, history)`
//! - [`RequestState`] – single-execution mutable state
//! - [`PilotError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`collaborators`] – traits for generation, SQL, retrieval, history, web, shadow sink
//! - [`nodes`] – node logic with per-node fallback policies
//! - [`orchestrator`] – routing, retry budgets, termination guard
//! - [`shadow`] – background shadow evaluation worker
//! - [`judge`] – strict parsing of structured judge responses
//! - [`config`] – YAML configuration
//! - [`db_adapter`] / [`model_adapter`] – trait implementations over the infrastructure crates
//!
//! ## Example
//!
//! ```ignore
//! use logpilot_core::PilotEngine;
//!
//! let engine = PilotEngine::with_defaults()?;
//! let response = engine.ask("default", "Count errors by service");
//! println!("{} ({})", response.answer, response.intent);
//! engine.shutdown();
//! ```

// Modules
pub mod collaborators;
pub mod config;
pub mod db_adapter;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod knowledge;
pub mod model_adapter;
pub mod nodes;
pub mod orchestrator;
pub mod prompts;
pub mod shadow;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports for convenience
pub use collaborators::{
    ConversationStore, GenerationService, KnowledgeRetriever, QueryEngine, RetrievedItem,
    ShadowRecord, ShadowSink, WebSearcher,
};
pub use config::{
    OrchestratorConfig, PilotConfig, ShadowConfig, StorageConfig, WebSearchConfig, CONFIG_ENV,
};
pub use engine::{answer_in_session, PilotEngine, DEFAULT_SESSION};
pub use errors::PilotError;
pub use judge::{parse_verdict, JudgeVerdict};
pub use knowledge::{IngestReport, KnowledgeStats};
pub use nodes::context::{CONTEXT_ERROR_MARKER, NO_CONTEXT_MARKER};
pub use orchestrator::{Collaborators, Execution, Node, Orchestrator, FAILURE_ANSWER};
pub use shadow::{ShadowHandle, ShadowJob, ShadowWorker};
pub use types::{
    AnswerMetadata, AnswerResponse, AnswerStatus, Intent, RequestState, RetryLedger, RetryLoop,
    RetryPolicy, Role, Turn,
};

// Infrastructure types callers need alongside the traits.
pub use logpilot_db::{QueryRows, ShadowRow, SqlValue};
pub use logpilot_model::{HealthReport, HealthStatus, ModelTier};
pub use logpilot_utils::SearchResult;
