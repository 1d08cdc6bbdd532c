//! Terminal-control backends.
//!
//! `Terminal` is the seam between alert delivery and whatever owns the
//! agents' panes. `TmuxTerminal` drives tmux through a `CommandRunner`;
//! `MockTerminal` records calls for tests.

pub mod mock;
pub mod runner;
pub mod tmux;

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("session '{0}' does not exist")]
    NoSession(String),
    #[error("terminal command failed: {0}")]
    Command(String),
}

/// One-shot terminal operations addressed by `<session>:<role>` targets.
pub trait Terminal {
    /// Whether the named session is running.
    fn session_exists(&self, session: &str) -> bool;

    /// Type `text` into the pane literally. Control characters cannot be
    /// sent this way; use `send_key` for those.
    fn send_text(&self, target: &str, text: &str) -> Result<(), TerminalError>;

    /// Press a named key (e.g. `Enter`) in the pane.
    fn send_key(&self, target: &str, key: &str) -> Result<(), TerminalError>;

    /// Show a transient status-line message without touching pane input.
    fn show_status(&self, target: &str, text: &str, duration: Duration)
        -> Result<(), TerminalError>;
}

/// Pane target for a role: the role's window inside the session.
pub fn pane_target(session: &str, role: &str) -> String {
    format!("{}:{}", session, role)
}
