//! Table rendering with comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `logpilot history` | `render_history_table()` |
//! | `logpilot kb stats` | `render_knowledge_table()` |
//! | `logpilot metrics` | `render_shadow_table()` |

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use logpilot_core::{KnowledgeStats, ShadowRow, Turn};

use super::format::{format_latency, format_relative_time, single_line, truncate_str};

/// Columns other than MESSAGE take about this many characters.
const HISTORY_FIXED_WIDTH: usize = 26;

fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| usize::from(w.0))
        .unwrap_or(80)
}

/// Render conversation turns, oldest first.
///
/// ```text
/// WHEN        ROLE        MESSAGE
/// 5 mins ago  user        Count errors by service
/// 5 mins ago  assistant   auth has 3 errors, billing has 1.
/// ```
pub fn render_history_table(turns: &[Turn]) -> String {
    if turns.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![Cell::new("WHEN"), Cell::new("ROLE"), Cell::new("MESSAGE")]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // WHEN
        ColumnConstraint::LowerBoundary(Width::Fixed(10)), // ROLE
        ColumnConstraint::LowerBoundary(Width::Fixed(20)), // MESSAGE
    ]);

    let message_width = terminal_width().saturating_sub(HISTORY_FIXED_WIDTH).max(20);
    for turn in turns {
        table.add_row(vec![
            Cell::new(format_relative_time(turn.timestamp)),
            Cell::new(turn.role.as_str()),
            Cell::new(truncate_str(&single_line(&turn.content), message_width)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render knowledge record counts by kind.
///
/// ```text
/// KIND       RECORDS
/// cards           12
/// patterns       340
/// ```
pub fn render_knowledge_table(stats: &KnowledgeStats) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("KIND"),
        Cell::new("RECORDS").set_alignment(CellAlignment::Right),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(10)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
    ]);

    let mut rows = vec![("cards", stats.cards), ("patterns", stats.patterns)];
    if stats.other > 0 {
        rows.push(("other", stats.other));
    }
    for (kind, count) in rows {
        table.add_row(vec![
            Cell::new(kind),
            Cell::new(count).set_alignment(CellAlignment::Right),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render shadow runs in the order given. A failed run shows `(failed)`.
pub fn render_shadow_table(runs: &[ShadowRow]) -> String {
    if runs.is_empty() {
        return String::new();
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec![
        Cell::new("WHEN"),
        Cell::new("MODEL"),
        Cell::new("LATENCY").set_alignment(CellAlignment::Right),
        Cell::new("QUERY"),
        Cell::new("ANSWER"),
    ]);

    // Query and answer split what the fixed columns leave.
    let text_width = (terminal_width().saturating_sub(40) / 2).max(16);
    for run in runs {
        let answer = match &run.answer {
            Some(answer) => truncate_str(&single_line(answer), text_width),
            None => "(failed)".to_string(),
        };
        table.add_row(vec![
            Cell::new(format_relative_time(run.timestamp)),
            Cell::new(&run.shadow_model),
            Cell::new(format_latency(run.latency)).set_alignment(CellAlignment::Right),
            Cell::new(truncate_str(&single_line(&run.query), text_width)),
            Cell::new(answer),
        ]);
    }

    table.trim_fmt().to_string()
}
