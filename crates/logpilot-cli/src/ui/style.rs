//! Message styling for CLI output.
//!
//! | Prefix | Meaning | Color |
//! |--------|---------|-------|
//! | `[ok]` | Success | Green |
//! | `[err]` | Error | Red |
//! | `[warn]` | Warning | Yellow |
//! | `[info]` | Information | Blue |
//! | `[hint]` | Suggestion | Cyan |

use std::io::IsTerminal;

use clap::ValueEnum;
use owo_colors::OwoColorize;

use logpilot_core::{AnswerStatus, Intent, Role};

/// Value of the global `--color` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Color when stdout is a terminal and `NO_COLOR` is unset or empty.
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    fn resolve(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => {
                let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
                !no_color && std::io::stdout().is_terminal()
            }
        }
    }
}

/// Message severity/type for CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Ok,
    Err,
    Warn,
    Info,
    Hint,
}

impl MessageType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Ok => "[ok]",
            Self::Err => "[err]",
            Self::Warn => "[warn]",
            Self::Info => "[info]",
            Self::Hint => "[hint]",
        }
    }
}

/// Styling interface for CLI output.
///
/// The color decision is made once, when the style is built.
///
/// ```
/// use logpilot_cli::ui::{ColorChoice, MessageType, Style};
///
/// let style = Style::new(ColorChoice::Never);
/// assert_eq!(style.message(MessageType::Ok, "Done"), "[ok] Done");
/// ```
#[derive(Debug, Clone)]
pub struct Style {
    colors: bool,
}

impl Style {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            colors: choice.resolve(),
        }
    }

    pub fn colors_enabled(&self) -> bool {
        self.colors
    }

    /// A message with its type prefix.
    pub fn message(&self, msg_type: MessageType, text: &str) -> String {
        let prefix = msg_type.prefix();
        if self.colors_enabled() {
            let colored_prefix = match msg_type {
                MessageType::Ok => prefix.green().to_string(),
                MessageType::Err => prefix.red().to_string(),
                MessageType::Warn => prefix.yellow().to_string(),
                MessageType::Info => prefix.blue().to_string(),
                MessageType::Hint => prefix.cyan().to_string(),
            };
            format!("{} {}", colored_prefix, text)
        } else {
            format!("{} {}", prefix, text)
        }
    }

    pub fn section(&self, title: &str) -> String {
        if self.colors_enabled() {
            title.bold().to_string()
        } else {
            title.to_string()
        }
    }

    /// An error with optional cause and hint lines.
    pub fn error_with_context(&self, msg: &str, cause: Option<&str>, hint: Option<&str>) -> String {
        let mut output = self.message(MessageType::Err, msg);
        if let Some(cause_text) = cause {
            output.push_str(&format!("\n      Cause: {}", cause_text));
        }
        if let Some(hint_text) = hint {
            output.push_str(&format!("\n      Hint: {}", hint_text));
        }
        output
    }

    pub fn key_value(&self, key: &str, value: &str) -> String {
        if self.colors_enabled() {
            format!("{}: {}", key.dimmed(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    /// Intent label, colored by resolution path.
    pub fn intent(&self, intent: Intent) -> String {
        let label = intent.as_str();
        if !self.colors_enabled() {
            return label.to_string();
        }
        match intent {
            Intent::Sql => label.cyan().to_string(),
            Intent::Rag => label.magenta().to_string(),
            Intent::WebSearch => label.blue().to_string(),
            Intent::Ambiguous => label.dimmed().to_string(),
        }
    }

    pub fn status(&self, status: AnswerStatus) -> String {
        let label = match status {
            AnswerStatus::Ok => "ok",
            AnswerStatus::Failed => "failed",
        };
        if !self.colors_enabled() {
            return label.to_string();
        }
        match status {
            AnswerStatus::Ok => label.green().to_string(),
            AnswerStatus::Failed => label.red().to_string(),
        }
    }

    /// Speaker label in history and chat output.
    pub fn role(&self, role: Role) -> String {
        let label = match role {
            Role::User => "you",
            Role::Assistant => "logpilot",
        };
        if !self.colors_enabled() {
            return label.to_string();
        }
        match role {
            Role::User => label.bold().to_string(),
            Role::Assistant => label.green().bold().to_string(),
        }
    }

    /// SQL or other code, indented and dimmed.
    pub fn code(&self, text: &str) -> String {
        let indented: Vec<String> = text.lines().map(|l| format!("    {}", l)).collect();
        let block = indented.join("\n");
        if self.colors_enabled() {
            block.dimmed().to_string()
        } else {
            block
        }
    }
}
