//! Web search over the DuckDuckGo Instant Answer API.
//!
//! The API needs no key. It answers with an abstract plus a tree of related
//! topics; both are flattened into [`SearchResult`]s in document order.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use crate::UtilsError;

const API_URL: &str = "https://api.duckduckgo.com/";

/// Results returned when the caller does not ask for a count.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// One web hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default)]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    related_topics: Vec<Topic>,
}

/// Related topics are either leaf entries or named groups of entries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Topic {
    Leaf {
        #[serde(rename = "Text")]
        text: String,
        #[serde(rename = "FirstURL")]
        first_url: String,
    },
    Group {
        #[serde(rename = "Topics", default)]
        topics: Vec<Topic>,
    },
}

/// Blocking search client with a request timeout.
#[derive(Debug, Clone)]
pub struct WebSearchClient {
    http: Client,
    base_url: String,
}

impl WebSearchClient {
    pub fn new(timeout: Duration) -> Result<Self, UtilsError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("logpilot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UtilsError::RequestError(e.to_string()))?;
        Ok(Self {
            http,
            base_url: API_URL.to_string(),
        })
    }

    /// Search for `query`, returning at most `max_results` hits.
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>, UtilsError> {
        debug!("Web search: {}", query);
        let response = self
            .http
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .map_err(|e| UtilsError::RequestError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UtilsError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .map_err(|e| UtilsError::RequestError(e.to_string()))?;
        parse_instant_answer(&body, max_results)
    }
}

fn parse_instant_answer(body: &str, max_results: usize) -> Result<Vec<SearchResult>, UtilsError> {
    let answer: InstantAnswer =
        serde_json::from_str(body).map_err(|e| UtilsError::ParseError(e.to_string()))?;

    let mut results = Vec::new();
    if !answer.abstract_text.is_empty() {
        results.push(SearchResult {
            title: answer.heading.clone(),
            url: answer.abstract_url.clone(),
            snippet: answer.abstract_text.clone(),
        });
    }
    collect_topics(&answer.related_topics, &mut results);
    results.truncate(max_results);
    Ok(results)
}

fn collect_topics(topics: &[Topic], out: &mut Vec<SearchResult>) {
    for topic in topics {
        match topic {
            Topic::Leaf { text, first_url } => {
                // Leaf text reads "Title - description"
                let (title, snippet) = match text.split_once(" - ") {
                    Some((t, s)) => (t.to_string(), s.to_string()),
                    None => (text.clone(), text.clone()),
                };
                out.push(SearchResult {
                    title,
                    url: first_url.clone(),
                    snippet,
                });
            }
            Topic::Group { topics } => collect_topics(topics, out),
        }
    }
}

/// Render hits as a numbered list for a synthesis prompt.
///
/// ```text
/// 1. title
///    Source: url
///    Snippet: text
/// ```
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {}\n   Source: {}\n   Snippet: {}",
                i + 1,
                if r.title.is_empty() { "No Title" } else { &r.title },
                if r.url.is_empty() { "N/A" } else { &r.url },
                r.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
