use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a message asks of its recipient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Request,
    Response,
    Event,
    Notice,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Request => "request",
            MessageKind::Response => "response",
            MessageKind::Event => "event",
            MessageKind::Notice => "notice",
        };
        f.write_str(s)
    }
}

/// One inbox record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    pub kind: MessageKind,
    pub action: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a message with a fresh id, stamped now.
    pub fn new(
        from: &str,
        to: &str,
        kind: MessageKind,
        action: &str,
        payload: Value,
        reply_to: Option<String>,
    ) -> Self {
        Message {
            id: format!("msg-{}", uuid::Uuid::new_v4().simple()),
            from: from.to_string(),
            to: to.to_string(),
            kind,
            action: action.to_string(),
            payload,
            reply_to,
            timestamp: Utc::now(),
        }
    }

    /// Single-line JSON encoding, without the trailing newline.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// Short human-readable description, e.g. `request from test: run_tests`.
    pub fn summary(&self) -> String {
        format!("{} from {}: {}", self.kind, self.from, self.action)
    }
}
