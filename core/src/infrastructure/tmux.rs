//! Tmux command builder and the tmux-backed `Terminal`.
//!
//! Command strings are built by `TmuxCommandBuilder` and executed through a
//! `CommandRunner`, so tests can swap in `MockRunner` and assert on the exact
//! commands without a tmux server.

use std::time::Duration;

use super::runner::CommandRunner;
use super::{Terminal, TerminalError};

// ---------------------------------------------------------------------------
// Command builder
// ---------------------------------------------------------------------------

/// Builds tmux CLI command strings without executing them.
pub struct TmuxCommandBuilder;

impl TmuxCommandBuilder {
    pub fn new() -> Self {
        TmuxCommandBuilder
    }

    /// `tmux has-session -t <session>`
    pub fn has_session(&self, session: &str) -> String {
        format!("tmux has-session -t {}", shell_escape(&format!("={}", session)))
    }

    /// `tmux send-keys -t <target> -l <text>`
    pub fn send_literal(&self, target: &str, text: &str) -> String {
        format!(
            "tmux send-keys -t {} -l {}",
            shell_escape(target),
            shell_escape(text)
        )
    }

    /// `tmux send-keys -t <target> <key>`
    pub fn send_key(&self, target: &str, key: &str) -> String {
        format!("tmux send-keys -t {} {}", shell_escape(target), shell_escape(key))
    }

    /// `tmux display-message -t <target> -d <ms> <text>`
    pub fn display_message(&self, target: &str, text: &str, duration_ms: u128) -> String {
        format!(
            "tmux display-message -t {} -d {} {}",
            shell_escape(target),
            duration_ms,
            shell_escape(text)
        )
    }
}

impl Default for TmuxCommandBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Shell escaping
// ---------------------------------------------------------------------------

/// Escape a string for safe use in a shell command.
///
/// Wraps the value in single quotes and escapes any embedded single quotes
/// using the `'\''` idiom.
pub fn shell_escape(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' || c == '/' || c == '%' || c == ':')
    {
        return s.to_string();
    }
    let escaped = s.replace('\'', "'\\''");
    format!("'{}'", escaped)
}

/// Replace control characters with spaces; literal send-keys must not carry
/// them.
fn strip_controls(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// TmuxTerminal
// ---------------------------------------------------------------------------

/// `Terminal` implementation that shells out to tmux.
pub struct TmuxTerminal<R: CommandRunner> {
    builder: TmuxCommandBuilder,
    runner: R,
}

impl<R: CommandRunner> TmuxTerminal<R> {
    pub fn new(runner: R) -> Self {
        TmuxTerminal {
            builder: TmuxCommandBuilder::new(),
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn exec(&self, cmd: &str) -> Result<(), TerminalError> {
        self.runner
            .run(cmd)
            .map(|_| ())
            .map_err(TerminalError::Command)
    }
}

impl<R: CommandRunner> Terminal for TmuxTerminal<R> {
    fn session_exists(&self, session: &str) -> bool {
        self.runner.run(&self.builder.has_session(session)).is_ok()
    }

    fn send_text(&self, target: &str, text: &str) -> Result<(), TerminalError> {
        self.exec(&self.builder.send_literal(target, &strip_controls(text)))
    }

    fn send_key(&self, target: &str, key: &str) -> Result<(), TerminalError> {
        self.exec(&self.builder.send_key(target, key))
    }

    fn show_status(
        &self,
        target: &str,
        text: &str,
        duration: Duration,
    ) -> Result<(), TerminalError> {
        self.exec(&self.builder.display_message(
            target,
            &strip_controls(text),
            duration.as_millis(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
