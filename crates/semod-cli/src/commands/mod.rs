pub mod apply;
pub mod completions;
pub mod doctor;
pub mod facts;
pub mod list;
pub mod man_pages;

use indicatif::{ProgressBar, ProgressStyle};
use semod_core::{CoreError, ManageError};
use std::fmt;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_REQUEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

/// A failed command: the message printed to stderr and the exit code.
#[derive(Debug)]
pub struct CommandError {
    pub message: String,
    pub code: u8,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        let code = if message.starts_with("invalid request") {
            EXIT_REQUEST_ERROR
        } else {
            EXIT_FAILURE
        };
        Self { message, code }
    }
}

impl From<CoreError> for CommandError {
    fn from(err: CoreError) -> Self {
        Self {
            code: exit_code_for(&err),
            message: err.to_string(),
        }
    }
}

impl From<ManageError> for CommandError {
    fn from(err: ManageError) -> Self {
        Self {
            code: exit_code_for(&err.source),
            message: err.to_string(),
        }
    }
}

/// Exit code for a core failure, decided by its kind.
pub fn exit_code_for(err: &CoreError) -> u8 {
    match err {
        CoreError::InvalidRequest(_) | CoreError::Config(_) => EXIT_REQUEST_ERROR,
        CoreError::HandleCreation
        | CoreError::StoreUnmanaged
        | CoreError::InsufficientAccess(_)
        | CoreError::Connection(_)
        | CoreError::Store(_) => EXIT_STORE_ERROR,
        CoreError::CatalogList(_)
        | CoreError::ModuleNotFound(_)
        | CoreError::Operation { .. }
        | CoreError::Commit(_)
        | CoreError::Interrupted(_)
        | CoreError::Io(_) => EXIT_FAILURE,
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(enabled: bool) -> String {
    use console::Style;
    if enabled {
        Style::new().green().apply_to("enabled").to_string()
    } else {
        Style::new().dim().apply_to("disabled").to_string()
    }
}
