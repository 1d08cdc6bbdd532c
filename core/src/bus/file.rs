use crate::layout::{file_size, Layout};
use crate::store;

use super::{Bus, BusError, Message};

/// Inbox-per-role bus backed by append-only JSONL files.
#[derive(Debug, Clone)]
pub struct FileBus {
    layout: Layout,
}

impl FileBus {
    pub fn new(layout: Layout) -> Self {
        FileBus { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn inbox_path(&self, session: &str, role: &str) -> std::path::PathBuf {
        self.layout.inbox(session, role)
    }
}

impl Bus for FileBus {
    fn send(&self, session: &str, message: &Message) -> Result<(), BusError> {
        let path = self.inbox_path(session, &message.to);
        store::append_record(&path, message)?;
        Ok(())
    }

    fn peek(&self, session: &str, role: &str) -> Result<Vec<Message>, BusError> {
        Ok(store::load_records(&self.inbox_path(session, role))?)
    }

    fn inbox_size(&self, session: &str, role: &str) -> Result<u64, BusError> {
        Ok(file_size(&self.inbox_path(session, role)))
    }
}
