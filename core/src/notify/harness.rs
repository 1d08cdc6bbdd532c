//! Attachment markers for autonomous harnesses.
//!
//! A harness polls its inbox on its own, so its role must never receive
//! terminal alerts. Attachment is advertised by a PID marker file; markers
//! pointing at dead or nonsense PIDs are removed on sight.

use std::fs;

use tracing::warn;

use crate::layout::Layout;
use crate::lock::is_pid_alive;
use crate::store::{self, StoreError};

#[derive(Debug, Clone)]
pub struct HarnessRegistry {
    layout: Layout,
}

impl HarnessRegistry {
    pub fn new(layout: Layout) -> Self {
        HarnessRegistry { layout }
    }

    /// Whether a live harness owns the role. Stale markers are deleted.
    pub fn is_attached(&self, session: &str, role: &str) -> bool {
        let path = self.layout.harness_marker(session, role);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return false,
        };
        match content.trim().parse::<u32>() {
            Ok(pid) if is_pid_alive(pid) => true,
            Ok(pid) => {
                warn!(session, role, pid, "harness process is gone; removing marker");
                let _ = fs::remove_file(&path);
                false
            }
            Err(_) => {
                warn!(session, role, content = content.trim(), "unparsable harness marker; removing");
                let _ = fs::remove_file(&path);
                false
            }
        }
    }

    /// Advertise `pid` as the role's harness.
    pub fn attach(&self, session: &str, role: &str, pid: u32) -> Result<(), StoreError> {
        store::write_atomic(
            &self.layout.harness_marker(session, role),
            pid.to_string().as_bytes(),
        )
    }

    /// Remove the marker. Returns whether one existed.
    pub fn detach(&self, session: &str, role: &str) -> Result<bool, StoreError> {
        let path = self.layout.harness_marker(session, role);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, Layout, HarnessRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let registry = HarnessRegistry::new(layout.clone());
        (dir, layout, registry)
    }

    #[test]
    fn no_marker_means_detached() {
        let (_dir, _layout, registry) = fixture();
        assert!(!registry.is_attached("s", "build"));
    }

    #[test]
    fn live_pid_is_attached() {
        let (_dir, layout, registry) = fixture();
        registry.attach("s", "build", std::process::id()).unwrap();
        assert!(registry.is_attached("s", "build"));
        assert!(layout.harness_marker("s", "build").exists());
    }

    #[test]
    fn dead_pid_marker_is_removed() {
        let (_dir, layout, registry) = fixture();
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        registry.attach("s", "build", pid).unwrap();
        assert!(!registry.is_attached("s", "build"));
        assert!(!layout.harness_marker("s", "build").exists());
    }

    #[test]
    fn garbage_marker_is_removed() {
        let (_dir, layout, registry) = fixture();
        let path = layout.harness_marker("s", "build");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not-a-pid").unwrap();

        assert!(!registry.is_attached("s", "build"));
        assert!(!path.exists());
    }

    #[test]
    fn detach_reports_presence() {
        let (_dir, _layout, registry) = fixture();
        assert!(!registry.detach("s", "build").unwrap());
        registry.attach("s", "build", std::process::id()).unwrap();
        assert!(registry.detach("s", "build").unwrap());
        assert!(!registry.is_attached("s", "build"));
    }
}
