//! CLI definition and command dispatch for LogPilot.
//!
//! ## Configuration Precedence
//!
//! 1. CLI flags (`--config`, `--verbose`)
//! 2. Environment variables (`LOGPILOT_CONFIG`, `LLM_BASE_URL`, `LLM_MODEL`, `SHADOW_MODEL`)
//! 3. Config file (`~/.logpilot/config.yaml` or path from `--config`)
//! 4. Built-in defaults

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::ui::{format, table, ColorChoice, MessageType, Progress, ProgressMode, Style};

use logpilot_core::{
    AnswerResponse, HealthStatus, PilotConfig, PilotEngine, Role, CONFIG_ENV, DEFAULT_SESSION,
};

// ============================================================================
// CLI Definition
// ============================================================================

/// Version string including git commit hash
const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

/// Upper bound on distinct templates read by `kb sync-patterns`.
const DEFAULT_SYNC_LIMIT: usize = 10_000;

/// LogPilot – ask questions about your application logs
#[derive(Parser, Debug)]
#[command(name = "logpilot")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, env = "LOGPILOT_VERBOSE")]
    pub verbose: bool,

    /// Suppress progress and informational messages
    #[arg(short, long, global = true, env = "LOGPILOT_QUIET")]
    pub quiet: bool,

    /// Path to configuration file (default: ~/.logpilot/config.yaml)
    #[arg(long, global = true, env = "LOGPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// When to color output
    #[arg(long, global = true, env = "LOGPILOT_COLOR", value_enum, default_value_t = ColorChoice::Auto)]
    pub color: ColorChoice,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ask one question about the logs
    #[command(after_help = r#"EXAMPLES:
    # Aggregations are answered with SQL
    logpilot ask "Count errors by service"

    # Root-cause questions are answered from log patterns and runbooks
    logpilot ask "Why is auth failing?"

    # Follow-ups reuse the session history
    logpilot ask "and yesterday?" --session oncall

    # Full response with diagnostics
    logpilot ask "Count errors" --json
"#)]
    Ask {
        /// The question to ask
        query: String,

        /// Conversation session to read and extend
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,

        /// Output the full response in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Interactive conversation (type `exit` to quit)
    Chat {
        /// Conversation session to read and extend
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,
    },

    /// Show the recent messages of a session
    #[command(after_help = r#"EXAMPLES:
    logpilot history
    logpilot history --session oncall -n 50
    logpilot history --json | jq '.[].content'
"#)]
    History {
        /// Conversation session to show
        #[arg(long, default_value = DEFAULT_SESSION)]
        session: String,

        /// Maximum number of messages
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Check that the generation service is reachable
    Health {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List recent shadow-model evaluation runs
    #[command(after_help = r#"EXAMPLES:
    logpilot metrics
    logpilot metrics -n 100 --json
"#)]
    Metrics {
        /// Maximum number of runs
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Maintain the knowledge base used for root-cause questions
    Kb {
        #[command(subcommand)]
        action: KbAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Knowledge base subcommands
#[derive(Subcommand, Debug)]
pub enum KbAction {
    /// Embed markdown files as runbook cards
    #[command(after_help = r#"EXAMPLES:
    logpilot kb add runbooks/*.md
"#)]
    Add {
        /// Markdown files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Refresh log pattern records from the templates in the log store
    SyncPatterns {
        /// Maximum number of distinct templates to read
        #[arg(long, default_value_t = DEFAULT_SYNC_LIMIT)]
        limit: usize,
    },

    /// Count knowledge records by kind
    Stats {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show resolved configuration (file, environment and defaults)
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the configuration file path in use
    Path,
}

// ============================================================================
// Run function
// ============================================================================

/// Parse arguments, build the engine when the command needs one, and
/// dispatch. Returns `ExitCode::FAILURE` on any error.
pub fn run() -> ExitCode {
    let Cli {
        verbose,
        quiet,
        config,
        color,
        command,
    } = Cli::parse();

    // Warnings always; debug for the logpilot crates with --verbose.
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = [
        "logpilot_core",
        "logpilot_cli",
        "logpilot_db",
        "logpilot_model",
        "logpilot_utils",
    ]
    .iter()
    .map(|target| format!("{}={}", target, log_level))
    .collect::<Vec<_>>()
    .join(",");

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let style = Style::new(color);
    let out = Output { verbose, quiet };

    let config_path = config.as_deref();
    let result = match command {
        Command::Config { action } => handle_config(&style, config_path, action),
        command => {
            let engine = match open_engine(config_path) {
                Ok(engine) => engine,
                Err(e) => {
                    let hint = match config_path {
                        Some(path) => format!("Check your config at {}", path.display()),
                        None => "Check your config at ~/.logpilot/config.yaml".to_string(),
                    };
                    eprintln!(
                        "{}",
                        style.error_with_context(
                            "Failed to initialize LogPilot",
                            Some(&format!("{:#}", e)),
                            Some(&hint),
                        )
                    );
                    return ExitCode::FAILURE;
                }
            };
            let result = dispatch(&style, out, &engine, config_path, command);
            engine.shutdown();
            result
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style.message(MessageType::Err, &format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

/// Global output flags handlers care about.
#[derive(Debug, Clone, Copy)]
struct Output {
    verbose: bool,
    quiet: bool,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PilotConfig> {
    let config = match path {
        Some(path) => {
            let mut config = PilotConfig::from_path(path)?;
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config
        }
        None => PilotConfig::load_default()?,
    };
    Ok(config)
}

fn open_engine(path: Option<&Path>) -> anyhow::Result<PilotEngine> {
    PilotEngine::from_config(load_config(path)?)
}

fn dispatch(
    style: &Style,
    out: Output,
    engine: &PilotEngine,
    config_path: Option<&Path>,
    command: Command,
) -> anyhow::Result<()> {
    match command {
        Command::Ask {
            query,
            session,
            json,
        } => handle_ask(style, out, engine, &session, &query, json),
        Command::Chat { session } => handle_chat(style, out, engine, &session),
        Command::History {
            session,
            limit,
            json,
        } => handle_history(style, engine, &session, limit, json),
        Command::Health { json } => handle_health(style, engine, json),
        Command::Metrics { limit, json } => handle_metrics(style, engine, limit, json),
        Command::Kb { action } => handle_kb(style, out, engine, action),
        Command::Config { action } => handle_config(style, config_path, action),
    }
}

// ============================================================================
// Conversation handlers
// ============================================================================

fn handle_ask(
    style: &Style,
    out: Output,
    engine: &PilotEngine,
    session: &str,
    query: &str,
    json: bool,
) -> anyhow::Result<()> {
    let progress = Progress::spinner("Thinking...", ProgressMode::detect(out.quiet, json));
    let response = engine.ask(session, query);
    progress.finish_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(style, out, &response);
    }

    if !response.is_ok() {
        bail!("The question could not be answered (rerun with --verbose for details)");
    }
    Ok(())
}

fn print_response(style: &Style, out: Output, response: &AnswerResponse) {
    println!("{}", response.answer);
    if out.quiet {
        return;
    }

    println!();
    println!("  {}", style.key_value("Intent", &style.intent(response.intent)));
    if let Some(sql) = &response.sql {
        println!("  {}", style.key_value("SQL", ""));
        println!("{}", style.code(sql));
    }
    if let Some(result) = &response.sql_result {
        println!(
            "  {}",
            style.key_value("Result", &format::truncate_str(result, 200))
        );
    }
    if response.metadata.retry_count > 0 {
        let retries = &response.metadata.retries;
        println!(
            "  {}",
            style.key_value(
                "Retries",
                &format!(
                    "{} (sql {}, context {}, answer {})",
                    response.metadata.retry_count,
                    retries.sql_repairs,
                    retries.context_retries,
                    retries.answer_retries
                )
            )
        );
    }

    if out.verbose {
        if let Some(rewritten) = &response.metadata.rewritten_query {
            println!("  {}", style.key_value("Rewritten", rewritten));
        }
        println!("  {}", style.key_value("Status", &style.status(response.status)));
        println!("  {}", style.key_value("Path", &response.metadata.trace.join(" → ")));
        println!(
            "  {}",
            style.key_value("Latency", &format::format_latency(response.metadata.latency))
        );
    }
}

fn handle_chat(
    style: &Style,
    out: Output,
    engine: &PilotEngine,
    session: &str,
) -> anyhow::Result<()> {
    if !out.quiet {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                &format!("LogPilot chat, session '{}'. Type 'exit' to quit.", session)
            )
        );
    }

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}> ", style.role(Role::User));
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.context("Failed to read from stdin")?;
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if matches!(query, "exit" | "quit" | ":q") {
            break;
        }

        let progress = Progress::spinner("Thinking...", ProgressMode::detect(out.quiet, false));
        let response = engine.ask(session, query);
        progress.finish_clear();

        println!("{}> {}", style.role(Role::Assistant), response.answer);
        if !response.is_ok() {
            eprintln!(
                "{}",
                style.message(
                    MessageType::Warn,
                    "That question failed; it was not saved to history."
                )
            );
        } else if out.verbose {
            println!(
                "  {}",
                style.key_value(
                    "Path",
                    &format!(
                        "{} ({})",
                        response.metadata.trace.join(" → "),
                        format::format_latency(response.metadata.latency)
                    )
                )
            );
        }
    }
    Ok(())
}

fn handle_history(
    style: &Style,
    engine: &PilotEngine,
    session: &str,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let turns = engine.history(session, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&turns)?);
    } else if turns.is_empty() {
        println!(
            "{}",
            style.message(MessageType::Info, &format!("No messages in session '{}'.", session))
        );
    } else {
        println!("{}", style.section("HISTORY"));
        println!();
        println!("{}", table::render_history_table(&turns));
    }
    Ok(())
}

fn handle_metrics(
    style: &Style,
    engine: &PilotEngine,
    limit: usize,
    json: bool,
) -> anyhow::Result<()> {
    let runs = engine.shadow_runs(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
    } else if runs.is_empty() {
        println!(
            "{}",
            style.message(
                MessageType::Info,
                "No shadow runs recorded. Set shadow.enabled and shadow.model to compare a second model."
            )
        );
    } else {
        println!("{}", style.section("SHADOW RUNS"));
        println!();
        println!("{}", table::render_shadow_table(&runs));
    }
    Ok(())
}

fn handle_health(style: &Style, engine: &PilotEngine, json: bool) -> anyhow::Result<()> {
    let report = engine.health();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match report.status {
            HealthStatus::Ready => println!(
                "{}",
                style.message(MessageType::Ok, &format!("Model '{}' is ready", report.model))
            ),
            HealthStatus::Error => println!(
                "{}",
                style.error_with_context(
                    &format!("Model '{}' is not available", report.model),
                    report.details.as_deref(),
                    Some(&format!(
                        "Check llm.apiBase ({})",
                        engine.config().llm.api_base
                    )),
                )
            ),
        }
    }

    if report.status == HealthStatus::Error {
        bail!("Health check failed");
    }
    Ok(())
}

// ============================================================================
// Knowledge base handlers
// ============================================================================

fn handle_kb(
    style: &Style,
    out: Output,
    engine: &PilotEngine,
    action: KbAction,
) -> anyhow::Result<()> {
    match action {
        KbAction::Add { files, json } => {
            let mode = ProgressMode::detect(out.quiet, json);
            let progress = Progress::spinner("Embedding cards...", mode);
            let report = engine.ingest_cards(&files)?;
            progress.finish_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            for skipped in &report.skipped {
                println!(
                    "{}",
                    style.message(
                        MessageType::Warn,
                        &format!("Skipped {}: {}", skipped.path.display(), skipped.reason)
                    )
                );
            }
            println!(
                "{}",
                style.message(MessageType::Ok, &format!("Added {} card(s)", report.added))
            );
            Ok(())
        }
        KbAction::SyncPatterns { limit } => {
            let mode = ProgressMode::detect(out.quiet, false);
            let progress = Progress::spinner("Embedding log patterns...", mode);
            let synced = engine.sync_patterns(limit)?;
            progress.finish_clear();

            if synced == 0 {
                println!(
                    "{}",
                    style.message(MessageType::Info, "No templated log rows found.")
                );
                if !out.quiet {
                    println!(
                        "{}",
                        style.message(
                            MessageType::Hint,
                            "Rows link to a pattern through context.template_id"
                        )
                    );
                }
            } else {
                println!(
                    "{}",
                    style.message(MessageType::Ok, &format!("Synced {} pattern(s)", synced))
                );
            }
            Ok(())
        }
        KbAction::Stats { json } => {
            let stats = engine.knowledge_stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", style.section("KNOWLEDGE"));
                println!();
                println!("{}", table::render_knowledge_table(&stats));
                println!();
                println!("  Total: {} record(s)", stats.total());
            }
            Ok(())
        }
    }
}

// ============================================================================
// Config handlers
// ============================================================================

fn handle_config(style: &Style, path: Option<&Path>, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show { json } => {
            let config = load_config(path)?;
            let warnings = config.validate()?;

            let rendered = serde_json::to_string_pretty(&config)?;
            if json {
                println!("{}", rendered);
                return Ok(());
            }
            println!("{}", style.message(MessageType::Info, "Resolved configuration:"));
            println!();
            println!("{}", rendered);
            for warning in warnings {
                println!("{}", style.message(MessageType::Warn, &warning));
            }
            Ok(())
        }
        ConfigAction::Path => {
            let resolved = path
                .map(Path::to_path_buf)
                .or_else(PilotConfig::default_path)
                .with_context(|| {
                    format!("No home directory; pass --config or set {}", CONFIG_ENV)
                })?;
            println!("{}", resolved.display());
            if !resolved.exists() {
                eprintln!(
                    "{}",
                    style.message(MessageType::Hint, "File does not exist; built-in defaults apply")
                );
            }
            Ok(())
        }
    }
}
