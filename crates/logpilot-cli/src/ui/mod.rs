//! # CLI UI Module
//!
//! Styling and formatting layer for LogPilot CLI output.
//!
//! - `style`: `--color` handling, message types, prefixes, and styling functions
//! - `format`: truncation and timestamp helpers
//! - `table`: table rendering with comfy-table
//! - `progress`: spinner for requests that wait on the model

pub mod format;
pub mod progress;
pub mod style;
pub mod table;

pub use progress::{Progress, ProgressMode};
pub use style::{ColorChoice, MessageType, Style};
