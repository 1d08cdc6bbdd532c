//! JSON Lines persistence helpers.
//!
//! Records are stored one JSON object per line. Readers skip blank and
//! malformed lines so a single bad record never hides the rest of the file.
//! Whole-file rewrites go through a temporary file and `rename`, so a
//! concurrent reader sees either the old or the new contents, never a mix.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Load every well-formed record from a JSONL file. A missing file is an
/// empty store.
pub fn load_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let mut records = Vec::new();
    for (i, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!(path = %path.display(), line = i + 1, error = %e, "skipping malformed record");
            }
        }
    }
    Ok(records)
}

/// Append one record as a line, creating parent directories as needed.
pub fn append_record<T: Serialize>(path: &Path, record: &T) -> Result<(), StoreError> {
    let line = serde_json::to_string(record)?;
    ensure_parent(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    // One write call per record keeps concurrent appenders line-aligned.
    file.write_all(format!("{}\n", line).as_bytes())
        .map_err(|e| StoreError::io(path, e))?;
    Ok(())
}

/// Replace the file with exactly `records`, serialized fully in memory and
/// written with a single rename.
pub fn save_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let mut buf = String::new();
    for record in records {
        buf.push_str(&serde_json::to_string(record)?);
        buf.push('\n');
    }
    write_atomic(path, buf.as_bytes())
}

/// Write `contents` to a sibling temp file then rename over `path`.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let parent = ensure_parent(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "record".into());
    // Unique per call: threads in one process may rewrite the same file.
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let tmp_path = parent.join(format!(".{}.{}.{}.tmp", name, std::process::id(), &suffix[..8]));
    fs::write(&tmp_path, contents).map_err(|e| StoreError::io(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

/// Short random id such as `cron-1a2b3c4d`.
pub fn generate_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &hex[..8])
}

/// Record ids end up in CLI arguments and log lines; keep them plain.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn ensure_parent(path: &Path) -> Result<PathBuf, StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| StoreError::io(&parent, e))?;
    Ok(parent)
}
