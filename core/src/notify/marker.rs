//! The "last notified" cursor: a plain decimal inbox size whose file mtime
//! records when it was written.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::store::{self, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifiedMarker {
    pub size: u64,
    pub written_at: SystemTime,
}

impl NotifiedMarker {
    /// Time since the marker was written; a marker from the future counts
    /// as brand new.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.written_at).unwrap_or(Duration::ZERO)
    }
}

/// Read the marker. Missing or unparsable markers read as `None`.
pub fn read_marker(path: &Path) -> Option<NotifiedMarker> {
    let content = fs::read_to_string(path).ok()?;
    let size = content.trim().parse::<u64>().ok()?;
    let written_at = fs::metadata(path).and_then(|m| m.modified()).ok()?;
    Some(NotifiedMarker { size, written_at })
}

pub fn write_marker(path: &Path, size: u64) -> Result<(), StoreError> {
    store::write_atomic(path, size.to_string().as_bytes())
}
