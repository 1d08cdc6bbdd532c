//! Per-(session, role) metadata: when the role started and when its memory
//! was last compacted.

use std::fs;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::layout::Layout;
use crate::store::{self, StoreError};

/// Timestamps are unix seconds; zero means "not recorded".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(default)]
    pub started_at: i64,
    #[serde(default)]
    pub last_compaction_at: i64,
    #[serde(default)]
    pub compaction_count: u32,
}

impl SessionMeta {
    /// The instant the staleness clock runs from: the last compaction, or
    /// the session start when the role was never compacted. `None` when
    /// neither is recorded.
    pub fn clock_origin(&self) -> Option<i64> {
        if self.last_compaction_at > 0 {
            Some(self.last_compaction_at)
        } else if self.started_at > 0 {
            Some(self.started_at)
        } else {
            None
        }
    }

    pub fn has_compacted(&self) -> bool {
        self.compaction_count > 0 || self.last_compaction_at > 0
    }
}

/// Read/update access to session metadata.
pub trait SessionMetaStore {
    /// Metadata for a role, or `None` if nothing was ever recorded.
    fn load(&self, session: &str, role: &str) -> Result<Option<SessionMeta>, StoreError>;

    /// Record the start time once; later calls leave it untouched.
    fn ensure_started(
        &self,
        session: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionMeta, StoreError>;

    /// Note that the role's memory was compacted at `now`.
    fn record_compaction(
        &self,
        session: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionMeta, StoreError>;
}

/// One JSON file per (session, role) under `meta/`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    layout: Layout,
}

impl FileSessionStore {
    pub fn new(layout: Layout) -> Self {
        FileSessionStore { layout }
    }

    fn save(&self, session: &str, role: &str, meta: &SessionMeta) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(meta)?;
        store::write_atomic(&self.layout.session_meta(session, role), &json)
    }
}

impl SessionMetaStore for FileSessionStore {
    fn load(&self, session: &str, role: &str) -> Result<Option<SessionMeta>, StoreError> {
        let path = self.layout.session_meta(session, role);
        let data = match fs::read_to_string(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        // A corrupt file is treated like a missing one.
        Ok(serde_json::from_str(&data).ok())
    }

    fn ensure_started(
        &self,
        session: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionMeta, StoreError> {
        let mut meta = self.load(session, role)?.unwrap_or_default();
        if meta.started_at == 0 {
            meta.started_at = now.timestamp();
            self.save(session, role, &meta)?;
        }
        Ok(meta)
    }

    fn record_compaction(
        &self,
        session: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionMeta, StoreError> {
        let mut meta = self.load(session, role)?.unwrap_or_default();
        if meta.started_at == 0 {
            meta.started_at = now.timestamp();
        }
        meta.last_compaction_at = now.timestamp();
        meta.compaction_count += 1;
        self.save(session, role, &meta)?;
        Ok(meta)
    }
}
