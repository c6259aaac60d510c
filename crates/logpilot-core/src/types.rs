//! Request-scoped types for the orchestrator.
//!
//! - [`RequestState`] - the single owned mutable context of one execution
//! - [`Turn`] - a conversation message as seen by the orchestrator
//! - [`Intent`] - the classifier's routing decision
//! - [`RetryPolicy`] / [`RetryLedger`] - retry budgets and their counters
//! - [`AnswerResponse`] - what `answer` returns to its caller

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Intent
// ============================================================================

/// Which resolution path a query takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Structured query over the log store.
    Sql,
    /// Retrieval over log patterns and runbook cards.
    Rag,
    /// Public web search.
    WebSearch,
    /// Unclear; answer directly without touching any data source.
    #[default]
    Ambiguous,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Rag => "rag",
            Self::WebSearch => "web_search",
            Self::Ambiguous => "ambiguous",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(Self::Sql),
            "rag" => Ok(Self::Rag),
            "web_search" => Ok(Self::WebSearch),
            "ambiguous" => Ok(Self::Ambiguous),
            other => Err(format!("unknown intent '{}'", other)),
        }
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// Author of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Speaker label used inside prompts.
    pub fn prompt_label(&self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "AI",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ============================================================================
// Retry budgets
// ============================================================================

/// How the three retry loops share their budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    /// Each loop checks its own counter.
    #[default]
    Independent,
    /// Every loop checks the total, so earlier loops shorten later ones.
    Shared,
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Independent => write!(f, "independent"),
            Self::Shared => write!(f, "shared"),
        }
    }
}

impl FromStr for RetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "independent" => Ok(Self::Independent),
            "shared" => Ok(Self::Shared),
            _ => Err(format!(
                "Unknown retry policy: '{}'. Use 'independent' or 'shared'.",
                s
            )),
        }
    }
}

/// Per-loop retry counters for one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryLedger {
    pub sql_repairs: u32,
    pub context_retries: u32,
    pub answer_retries: u32,
}

impl RetryLedger {
    pub fn total(&self) -> u32 {
        self.sql_repairs + self.context_retries + self.answer_retries
    }
}

/// Which loop a retry transition belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryLoop {
    SqlRepair,
    ContextRetry,
    AnswerRetry,
}

// ============================================================================
// RequestState
// ============================================================================

/// Mutable state of a single execution.
///
/// Created at request entry, owned by exactly one execution, and passed by
/// `&mut` to one node at a time. Discarded when the execution returns.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    /// The literal user input. Never modified.
    query: String,
    /// Conversation window supplied by the caller.
    pub history: Vec<Turn>,

    pub rewritten_query: Option<String>,
    pub intent: Intent,

    pub sql_query: Option<String>,
    pub sql_result: Option<String>,
    pub sql_valid: Option<bool>,
    pub sql_error: Option<String>,

    pub rag_context: Option<String>,
    pub web_results: Option<String>,

    pub context_valid: Option<bool>,
    pub context_feedback: Option<String>,

    pub final_answer: Option<String>,
    pub answer_valid: Option<bool>,
    pub answer_feedback: Option<String>,

    /// Total number of repair/retry transitions taken.
    pub retry_count: u32,
    pub retries: RetryLedger,
}

impl RequestState {
    pub fn new(query: impl Into<String>, history: Vec<Turn>) -> Self {
        Self {
            query: query.into(),
            history,
            ..Default::default()
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// The rewritten query, or the original when no rewrite has happened.
    pub fn effective_query(&self) -> &str {
        self.rewritten_query.as_deref().unwrap_or(&self.query)
    }

    /// Record one retry transition on `kind`.
    pub fn record_retry(&mut self, kind: RetryLoop) {
        match kind {
            RetryLoop::SqlRepair => self.retries.sql_repairs += 1,
            RetryLoop::ContextRetry => self.retries.context_retries += 1,
            RetryLoop::AnswerRetry => self.retries.answer_retries += 1,
        }
        self.retry_count += 1;
    }

    /// Counter a loop's budget is checked against under `policy`.
    pub fn retries_for(&self, kind: RetryLoop, policy: RetryPolicy) -> u32 {
        match policy {
            RetryPolicy::Shared => self.retry_count,
            RetryPolicy::Independent => match kind {
                RetryLoop::SqlRepair => self.retries.sql_repairs,
                RetryLoop::ContextRetry => self.retries.context_retries,
                RetryLoop::AnswerRetry => self.retries.answer_retries,
            },
        }
    }
}

// ============================================================================
// AnswerResponse
// ============================================================================

/// Outcome signal for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStatus {
    Ok,
    Failed,
}

/// Diagnostic metadata of one execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerMetadata {
    pub rewritten_query: Option<String>,
    pub context_feedback: Option<String>,
    pub answer_feedback: Option<String>,
    /// Wall-clock seconds spent in the execution.
    pub latency: f64,
    pub retry_count: u32,
    pub retries: RetryLedger,
    /// Node names in visit order.
    pub trace: Vec<String>,
}

/// The result of [`crate::Orchestrator::answer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer: String,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub status: AnswerStatus,
    pub metadata: AnswerMetadata,
}

impl AnswerResponse {
    pub fn is_ok(&self) -> bool {
        self.status == AnswerStatus::Ok
    }
}
