//! On-disk layout of a session's state directory.
//!
//! ```text
//! <root>/<session>/
//!   inbox/<role>.jsonl
//!   cron.jsonl
//!   cron_history.jsonl
//!   subscriptions.jsonl
//!   markers/<role>.notified
//!   markers/<role>.harness.pid
//!   markers/<role>.lock
//!   meta/<role>.json
//!   memory/<role>/active.md
//!   memory/<role>/history.jsonl
//!   memory/<role>/archive/<YYYY-MM-DD>.jsonl
//!   session.log
//! ```

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

/// Maps (session, role) pairs to file paths under a single root.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Layout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session: &str) -> PathBuf {
        self.root.join(session)
    }

    pub fn inbox(&self, session: &str, role: &str) -> PathBuf {
        self.session_dir(session)
            .join("inbox")
            .join(format!("{}.jsonl", role))
    }

    pub fn cron_store(&self, session: &str) -> PathBuf {
        self.session_dir(session).join("cron.jsonl")
    }

    pub fn cron_history(&self, session: &str) -> PathBuf {
        self.session_dir(session).join("cron_history.jsonl")
    }

    pub fn subscriptions(&self, session: &str) -> PathBuf {
        self.session_dir(session).join("subscriptions.jsonl")
    }

    fn markers_dir(&self, session: &str) -> PathBuf {
        self.session_dir(session).join("markers")
    }

    pub fn notified_marker(&self, session: &str, role: &str) -> PathBuf {
        self.markers_dir(session).join(format!("{}.notified", role))
    }

    pub fn harness_marker(&self, session: &str, role: &str) -> PathBuf {
        self.markers_dir(session).join(format!("{}.harness.pid", role))
    }

    pub fn notify_lock(&self, session: &str, role: &str) -> PathBuf {
        self.markers_dir(session).join(format!("{}.lock", role))
    }

    pub fn session_meta(&self, session: &str, role: &str) -> PathBuf {
        self.session_dir(session)
            .join("meta")
            .join(format!("{}.json", role))
    }

    pub fn memory_dir(&self, session: &str, role: &str) -> PathBuf {
        self.session_dir(session).join("memory").join(role)
    }

    pub fn active_memory(&self, session: &str, role: &str) -> PathBuf {
        self.memory_dir(session, role).join("active.md")
    }

    pub fn role_history(&self, session: &str, role: &str) -> PathBuf {
        self.memory_dir(session, role).join("history.jsonl")
    }

    pub fn archive_dir(&self, session: &str, role: &str) -> PathBuf {
        self.memory_dir(session, role).join("archive")
    }

    pub fn archive_file(&self, session: &str, role: &str, date: NaiveDate) -> PathBuf {
        self.archive_dir(session, role)
            .join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    pub fn session_log(&self, session: &str) -> PathBuf {
        self.session_dir(session).join("session.log")
    }
}

/// Size of a file in bytes; a missing or unreadable file counts as empty.
pub fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_scoped_by_session_and_role() {
        let layout = Layout::new("/state");
        assert_eq!(
            layout.inbox("s1", "build"),
            PathBuf::from("/state/s1/inbox/build.jsonl")
        );
        assert_eq!(
            layout.notified_marker("s1", "build"),
            PathBuf::from("/state/s1/markers/build.notified")
        );
        assert_eq!(
            layout.harness_marker("s2", "test"),
            PathBuf::from("/state/s2/markers/test.harness.pid")
        );
        assert_eq!(
            layout.session_meta("s1", "pm"),
            PathBuf::from("/state/s1/meta/pm.json")
        );
    }

    #[test]
    fn archive_file_is_dated() {
        let layout = Layout::new("/state");
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(
            layout.archive_file("s", "review", date),
            PathBuf::from("/state/s/memory/review/archive/2026-03-07.jsonl")
        );
    }

    #[test]
    fn file_size_of_missing_file_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(file_size(&dir.path().join("missing")), 0);
        let path = dir.path().join("five");
        std::fs::write(&path, "12345").unwrap();
        assert_eq!(file_size(&path), 5);
    }
}
