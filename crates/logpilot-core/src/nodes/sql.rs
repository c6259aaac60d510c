//! SQL generation, validation, repair and execution.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use super::NodeContext;
use crate::collaborators::ModelTier;
use crate::prompts;
use crate::types::{RequestState, RetryLoop};

/// Table assumed when the statement names none.
const DEFAULT_TABLE: &str = "logs";

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:sql)?").expect("Invalid regex"));
static BY_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bby\b").expect("Invalid regex"));
static AGGREGATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(count|avg|sum|min|max)\s*\(").expect("Invalid regex"));
static GROUP_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bgroup\s+by\b").expect("Invalid regex"));
static FROM_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bfrom\s+["`\[]?(\w+)"#).expect("Invalid regex"));

pub fn generate_sql(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let prompt = prompts::sql_generate_prompt(state.effective_query());
    match ctx.generator.generate(&prompt, ModelTier::Fast) {
        Ok(text) => {
            let sql = strip_sql_fences(&text);
            debug!("sql: generated {}", sql);
            state.sql_query = Some(sql);
            state.sql_error = None;
        }
        Err(e) => {
            warn!("sql: generation failed: {}", e);
            state.sql_error = Some(e.to_string());
        }
    }
}

pub fn validate_sql(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let sql = state.sql_query.clone().unwrap_or_default();
    let failure = if sql.trim().is_empty() {
        Some(
            state
                .sql_error
                .clone()
                .map(|e| format!("No SQL generated: {}", e))
                .unwrap_or_else(|| "No SQL generated".to_string()),
        )
    } else if let Err(e) = ctx.query_engine.explain_sql(&sql) {
        Some(e.to_string())
    } else {
        missing_group_by(state.effective_query(), &sql)
    };

    match failure {
        None => {
            debug!("sql: valid");
            state.sql_valid = Some(true);
            state.sql_error = None;
        }
        Some(error) => {
            let enriched = with_schema(ctx, &sql, &error);
            info!("sql: invalid: {}", error);
            state.sql_valid = Some(false);
            state.sql_error = Some(enriched);
        }
    }
}

pub fn repair_sql(ctx: &NodeContext<'_>, state: &mut RequestState) {
    state.record_retry(RetryLoop::SqlRepair);
    debug!("sql: repair attempt {}", state.retries.sql_repairs);

    let prompt = prompts::sql_fix_prompt(
        state.effective_query(),
        state.sql_query.as_deref().unwrap_or_default(),
        state.sql_error.as_deref().unwrap_or_default(),
    );
    match ctx.generator.generate(&prompt, ModelTier::Fast) {
        Ok(text) => state.sql_query = Some(strip_sql_fences(&text)),
        // The previous statement stays and fails validation again.
        Err(e) => warn!("sql: repair failed: {}", e),
    }
}

pub fn execute_sql(ctx: &NodeContext<'_>, state: &mut RequestState) {
    let Some(sql) = state.sql_query.clone().filter(|s| !s.trim().is_empty()) else {
        state.sql_error = Some("No SQL generated".to_string());
        return;
    };
    match ctx.query_engine.run_sql(&sql, true, &[]) {
        Ok(rows) => {
            debug!("sql: {} rows", rows.len());
            state.sql_result = Some(rows.to_string());
        }
        Err(e) => {
            warn!("sql: execution failed: {}", e);
            state.sql_error = Some(e.to_string());
        }
    }
}

/// Remove markdown code fences around generated SQL.
pub fn strip_sql_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").trim().to_string()
}

/// A question asking for a breakdown "by" something needs `GROUP BY` when
/// the statement aggregates.
pub fn missing_group_by(question: &str, sql: &str) -> Option<String> {
    let needs_grouping =
        BY_WORD_RE.is_match(question) && AGGREGATE_RE.is_match(sql) && !GROUP_BY_RE.is_match(sql);
    needs_grouping.then(|| {
        "Query implies aggregation ('by'), but SQL is missing GROUP BY clause.".to_string()
    })
}

/// Target table of a statement.
pub fn target_table(sql: &str) -> &str {
    FROM_TABLE_RE
        .captures(sql)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(DEFAULT_TABLE)
}

fn with_schema(ctx: &NodeContext<'_>, sql: &str, error: &str) -> String {
    let table = target_table(sql);
    match ctx.query_engine.describe_table(table) {
        Ok(columns) if !columns.is_empty() => format!(
            "{}\nAvailable columns in table '{}': {}",
            error,
            table,
            columns.join(", ")
        ),
        Ok(_) => error.to_string(),
        Err(e) => {
            debug!("sql: cannot describe {}: {}", table, e);
            error.to_string()
        }
    }
}
