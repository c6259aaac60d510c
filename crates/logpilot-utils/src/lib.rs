//! Utility clients for LogPilot
//!
//! This crate holds network helpers that sit outside the log store and the
//! model provider. Today that is the web search client used when a question is
//! about something the local logs and runbooks cannot answer.

use thiserror::Error;

pub mod search;

pub use search::{format_results, SearchResult, WebSearchClient, DEFAULT_MAX_RESULTS};

#[derive(Debug, Error)]
pub enum UtilsError {
    #[error("Search request failed: {0}")]
    RequestError(String),

    #[error("Search returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Failed to parse search response: {0}")]
    ParseError(String),
}
