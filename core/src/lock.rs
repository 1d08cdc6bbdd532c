//! Advisory file locks and process liveness.

use std::fs::{self, File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Exclusive `flock` held for the lifetime of the guard.
///
/// The lock file itself is left in place: unlinking it would let a waiter
/// lock an orphaned inode while a newcomer locks a fresh one.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Acquire an exclusive lock, polling until `timeout` elapses.
pub fn acquire_lock(lock_path: &Path, timeout: Duration) -> Result<LockGuard, String> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create {}: {}", parent.display(), e))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| format!("cannot open lock file {}: {}", lock_path.display(), e))?;

    let fd = file.as_raw_fd();
    let deadline = Instant::now() + timeout;

    loop {
        let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if ret == 0 {
            return Ok(LockGuard {
                file,
                path: lock_path.to_path_buf(),
            });
        }

        if Instant::now() >= deadline {
            return Err(format!(
                "timed out acquiring lock {} after {}ms",
                lock_path.display(),
                timeout.as_millis()
            ));
        }

        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Check whether a process with the given PID exists.
pub fn is_pid_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // kill(pid, 0) checks existence without delivering a signal. EPERM means the
    // process exists but belongs to someone else.
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/role.lock");

        let guard = acquire_lock(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(guard.path(), path.as_path());

        // flock is per open file description, so a second open in the same
        // process contends with the first.
        let second = acquire_lock(&path, Duration::from_millis(60));
        assert!(second.is_err());

        drop(guard);
        assert!(acquire_lock(&path, Duration::from_millis(100)).is_ok());
        assert!(path.exists());
    }

    #[test]
    fn current_process_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_and_out_of_range_are_dead() {
        assert!(!is_pid_alive(0));
        assert!(!is_pid_alive(u32::MAX));
    }

    #[test]
    fn reaped_child_is_dead() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(!is_pid_alive(pid));
    }
}
