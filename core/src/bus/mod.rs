//! Message bus seam.
//!
//! The trigger components only ever talk to the queue through `Bus`. The
//! shipped implementation, `FileBus`, keeps one append-only JSONL inbox per
//! role; delivery is at-least-once and FIFO per inbox, and an inbox only
//! grows until something outside this crate drains it.

mod file;
mod message;

pub use file::FileBus;
pub use message::{Message, MessageKind};

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("bus unavailable: {0}")]
    Unavailable(String),
}

/// Send/peek primitives over per-role inboxes.
pub trait Bus {
    /// Append `message` to the inbox of `message.to`.
    fn send(&self, session: &str, message: &Message) -> Result<(), BusError>;

    /// All messages currently in a role's inbox, oldest first.
    fn peek(&self, session: &str, role: &str) -> Result<Vec<Message>, BusError>;

    /// Current inbox size in bytes; used as the dedup cursor for alerts.
    fn inbox_size(&self, session: &str, role: &str) -> Result<u64, BusError>;
}
