//! Context retrieval and verification.
//!
//! Retrieval splits knowledge hits into documentation cards and log patterns.
//! Cards go into the context verbatim. Patterns are resolved against the log
//! store: the most recent rows carrying a retrieved `template_id` become
//! anchors, and every row within `logWindowSecs` of an anchor is fetched so
//! the synthesizer sees what happened around it.
//!
//! ```text
//! Found 1 relevant log patterns:
//! - auth token expired for user <*>
//!
//! Log window around 2024-05-01 10:00:00 (auth-service):
//!   [2024-05-01 09:59:58] gateway (WARN): upstream slow
//! >>> [2024-05-01 10:00:00] auth-service (ERROR): auth token expired for user 42
//! ```

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, info, warn};

use logpilot_db::{parse_log_timestamp, CLUSTER_ID_KEY};

use super::NodeContext;
use crate::collaborators::{ModelTier, QueryRows, RetrievedItem, SqlValue};
use crate::judge::parse_verdict;
use crate::prompts;
use crate::types::RequestState;

/// Context when retrieval produced nothing usable.
pub const NO_CONTEXT_MARKER: &str = "[no relevant context found]";

/// Prefix of the context when retrieval itself failed.
pub const CONTEXT_ERROR_MARKER: &str = "[context retrieval failed]";

/// Prefix that marks the anchor row inside a log window.
pub const ANCHOR_PREFIX: &str = ">>> ";

const WINDOW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn retrieve_context(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let query = state.effective_query().to_string();
    let context = match ctx.retriever.retrieve(&query, ctx.config.retrieval_top_k) {
        Ok(items) => build_context(ctx, &items),
        Err(e) => {
            warn!("retrieve: {}", e);
            format!("{} {}", CONTEXT_ERROR_MARKER, e)
        }
    };
    state.rag_context = Some(context);
}

pub fn verify_context(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let context = state.rag_context.clone().unwrap_or_default();
    if context.trim().is_empty() || is_marker(&context) {
        debug!("verify: nothing to judge");
        state.context_valid = Some(false);
        state.context_feedback = Some("No usable context was retrieved.".to_string());
        return;
    }

    let prompt = prompts::verify_context_prompt(state.effective_query(), &context);
    let (valid, feedback) = match ctx.generator.generate(&prompt, ModelTier::Fast) {
        Ok(text) => match parse_verdict(&text) {
            Ok(verdict) => (verdict.valid, verdict.feedback),
            Err(e) => {
                warn!("verify: unusable judge response, rejecting context: {}", e);
                (false, format!("Context could not be verified: {}", e))
            }
        },
        Err(e) => {
            warn!("verify: judge failed, rejecting context: {}", e);
            (false, format!("Context could not be verified: {}", e))
        }
    };
    info!("verify: context {}", if valid { "valid" } else { "invalid" });
    state.context_valid = Some(valid);
    state.context_feedback = Some(feedback);
}

/// Whether `context` is one of the no-context or error markers.
pub fn is_marker(context: &str) -> bool {
    let context = context.trim_start();
    context.starts_with(NO_CONTEXT_MARKER) || context.starts_with(CONTEXT_ERROR_MARKER)
}

struct Pattern {
    template_id: String,
    content: String,
}

fn build_context(ctx: &NodeContext<'_>, items: &[RetrievedItem]) -> String {
    let mut cards = Vec::new();
    let mut patterns: Vec<Pattern> = Vec::new();

    for item in items {
        if item.content.trim().is_empty() {
            continue;
        }
        match item.metadata_str(CLUSTER_ID_KEY) {
            Some(template_id) => {
                if !patterns.iter().any(|p| p.template_id == template_id) {
                    patterns.push(Pattern {
                        template_id,
                        content: item.content.clone(),
                    });
                }
            }
            None => cards.push(item.content.trim().to_string()),
        }
    }
    debug!("retrieve: {} cards, {} patterns", cards.len(), patterns.len());

    let mut sections = Vec::new();
    if !cards.is_empty() {
        sections.push(format!("Documentation:\n{}", cards.join("\n\n")));
    }
    if !patterns.is_empty() {
        sections.push(pattern_section(ctx, &patterns));
    }

    if sections.is_empty() {
        NO_CONTEXT_MARKER.to_string()
    } else {
        sections.join("\n\n---\n\n")
    }
}

fn pattern_section(ctx: &NodeContext<'_>, patterns: &[Pattern]) -> String {
    let mut out = format!("Found {} relevant log patterns:\n", patterns.len());
    for pattern in patterns {
        out.push_str(&format!("- {}\n", pattern.content.trim()));
    }

    let anchors = match fetch_anchors(ctx, patterns) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("retrieve: anchor lookup failed: {}", e);
            out.push_str(&format!("\nRecent log entries could not be loaded: {}\n", e));
            return out.trim_end().to_string();
        }
    };
    if anchors.is_empty() {
        out.push_str("\nNo recent log entries matched these patterns.");
        return out;
    }

    for anchor in &anchors.rows {
        out.push('\n');
        out.push_str(&log_window(ctx, anchor));
    }
    out.trim_end().to_string()
}

fn fetch_anchors(ctx: &NodeContext<'_>, patterns: &[Pattern]) -> Result<QueryRows, String> {
    let placeholders = vec!["?"; patterns.len()].join(",");
    let sql = format!(
        "SELECT timestamp, service_name, severity, body FROM logs \
         WHERE CAST(CASE WHEN json_valid(context) \
                    THEN json_extract(context, '$.template_id') END AS TEXT) IN ({}) \
         ORDER BY timestamp DESC LIMIT ?",
        placeholders
    );
    let mut params: Vec<SqlValue> = patterns
        .iter()
        .map(|p| SqlValue::from(p.template_id.as_str()))
        .collect();
    params.push(SqlValue::Integer(ctx.config.anchor_limit as i64));

    ctx.query_engine
        .run_sql(&sql, true, &params)
        .map_err(|e| e.to_string())
}

/// Render the rows around one anchor, marking the anchor itself.
fn log_window(ctx: &NodeContext<'_>, anchor: &[SqlValue]) -> String {
    let anchor_line = format_row(anchor);
    let timestamp = cell(anchor, 0);
    let service = cell(anchor, 1);
    let header = format!("Log window around {} ({}):\n", timestamp, service);

    let Some(center) = parse_log_timestamp(&timestamp) else {
        debug!("retrieve: unparsable anchor timestamp {:?}", timestamp);
        return format!("{}{}{}\n", header, ANCHOR_PREFIX, anchor_line);
    };

    let (lower, upper) = window_bounds(center, ctx.config.log_window_secs);
    let sql = "SELECT timestamp, service_name, severity, body FROM logs \
               WHERE timestamp >= ? AND timestamp <= ? \
               ORDER BY timestamp ASC LIMIT ?";
    let params = [
        SqlValue::Text(lower),
        SqlValue::Text(upper),
        SqlValue::Integer(ctx.config.window_row_limit as i64),
    ];

    let rows = match ctx.query_engine.run_sql(sql, true, &params) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("retrieve: window lookup failed: {}", e);
            return format!("{}{}{}\n", header, ANCHOR_PREFIX, anchor_line);
        }
    };

    let mut out = header;
    let mut anchor_seen = false;
    for row in &rows.rows {
        let line = format_row(row);
        if !anchor_seen && line == anchor_line {
            anchor_seen = true;
            out.push_str(ANCHOR_PREFIX);
        } else {
            out.push_str("  ");
        }
        out.push_str(&line);
        out.push('\n');
    }
    if !anchor_seen {
        out.push_str(ANCHOR_PREFIX);
        out.push_str(&anchor_line);
        out.push('\n');
    }
    out
}

/// `[center - radius, center + radius]` as text bounds on the `timestamp` column.
///
/// The upper bound carries `.999` so rows with fractional seconds in the last
/// second still compare as inside the window.
pub fn window_bounds(center: NaiveDateTime, radius_secs: i64) -> (String, String) {
    let radius = Duration::seconds(radius_secs);
    let lower = (center - radius).format(WINDOW_TIMESTAMP_FORMAT).to_string();
    let upper = format!("{}.999", (center + radius).format(WINDOW_TIMESTAMP_FORMAT));
    (lower, upper)
}

fn cell(row: &[SqlValue], index: usize) -> String {
    row.get(index).map(SqlValue::to_plain_string).unwrap_or_default()
}

fn format_row(row: &[SqlValue]) -> String {
    format!(
        "[{}] {} ({}): {}",
        cell(row, 0),
        cell(row, 1),
        cell(row, 2),
        cell(row, 3)
    )
}
