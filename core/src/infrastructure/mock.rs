//! Mock terminal for testing.
//!
//! Records every call and can be told to fail, making delivery paths easy
//! to assert on without tmux.

use std::sync::Mutex;
use std::time::Duration;

use super::{Terminal, TerminalError};

/// One recorded terminal operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCall {
    Text { target: String, text: String },
    Key { target: String, key: String },
    Status { target: String, text: String },
}

impl TerminalCall {
    pub fn target(&self) -> &str {
        match self {
            TerminalCall::Text { target, .. }
            | TerminalCall::Key { target, .. }
            | TerminalCall::Status { target, .. } => target,
        }
    }
}

/// A test-double that records calls against a fixed set of sessions.
pub struct MockTerminal {
    sessions: Vec<String>,
    calls: Mutex<Vec<TerminalCall>>,
    fail_sends: bool,
}

impl MockTerminal {
    /// A terminal where every session exists.
    pub fn new() -> Self {
        MockTerminal {
            sessions: Vec::new(),
            calls: Mutex::new(Vec::new()),
            fail_sends: false,
        }
    }

    /// Only the listed sessions exist.
    pub fn with_sessions(sessions: Vec<String>) -> Self {
        MockTerminal {
            sessions,
            ..Self::new()
        }
    }

    /// Every send fails with a command error.
    pub fn failing() -> Self {
        MockTerminal {
            fail_sends: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<TerminalCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Calls aimed at a particular `<session>:<role>` target.
    pub fn calls_for(&self, target: &str) -> Vec<TerminalCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.target() == target)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, call: TerminalCall) -> Result<(), TerminalError> {
        if self.fail_sends {
            return Err(TerminalError::Command(format!(
                "mock: refused {}",
                call.target()
            )));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        Ok(())
    }
}

impl Default for MockTerminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminal for MockTerminal {
    fn session_exists(&self, session: &str) -> bool {
        self.sessions.is_empty() || self.sessions.iter().any(|s| s == session)
    }

    fn send_text(&self, target: &str, text: &str) -> Result<(), TerminalError> {
        self.record(TerminalCall::Text {
            target: target.to_string(),
            text: text.to_string(),
        })
    }

    fn send_key(&self, target: &str, key: &str) -> Result<(), TerminalError> {
        self.record(TerminalCall::Key {
            target: target.to_string(),
            key: key.to_string(),
        })
    }

    fn show_status(
        &self,
        target: &str,
        text: &str,
        _duration: Duration,
    ) -> Result<(), TerminalError> {
        self.record(TerminalCall::Status {
            target: target.to_string(),
            text: text.to_string(),
        })
    }
}
