//! Runtime configuration.
//!
//! `SwitchboardConfig` is built once (from YAML or directly in code) and
//! handed to each component at construction. Every field has a default, so a
//! partial or missing file is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Notification dispatcher tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NotifyConfig {
    /// A marker younger than this suppresses a new alert even when the inbox
    /// size differs.
    pub cooldown_ms: u64,
    /// How long to poll for the per-role lock before going unsynchronized.
    pub lock_timeout_ms: u64,
    /// Pause between literal text and the Enter key.
    pub key_delay_ms: u64,
    /// Display time for passive status alerts.
    pub status_duration_ms: u64,
    /// Roles whose panes may hold human input; they only ever get a status
    /// line, never injected keystrokes.
    pub passive_roles: Vec<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            cooldown_ms: 3_000,
            lock_timeout_ms: 2_000,
            key_delay_ms: 150,
            status_duration_ms: 5_000,
            passive_roles: vec!["pm".into()],
        }
    }
}

/// Compaction monitor thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompactConfig {
    pub size_threshold_bytes: u64,
    pub min_age_hours: f64,
    pub alert_cooldown_minutes: u64,
}

impl Default for CompactConfig {
    fn default() -> Self {
        CompactConfig {
            size_threshold_bytes: 512 * 1024,
            min_age_hours: 4.0,
            alert_cooldown_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SwitchboardConfig {
    /// Root directory holding one subdirectory per session.
    pub state_dir: PathBuf,
    /// Known role names. Cron targets and subscription recipients must be
    /// one of these.
    pub roles: Vec<String>,
    /// Known event names that subscriptions may match on.
    pub events: Vec<String>,
    pub notify: NotifyConfig,
    pub compact: CompactConfig,
}

impl Default for SwitchboardConfig {
    fn default() -> Self {
        SwitchboardConfig {
            state_dir: PathBuf::from(".switchboard"),
            roles: ["pm", "build", "test", "review", "docs"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            events: ["build", "test", "lint", "deploy", "review", "commit"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            notify: NotifyConfig::default(),
            compact: CompactConfig::default(),
        }
    }
}

impl SwitchboardConfig {
    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: SwitchboardConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the components cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.roles.is_empty() {
            return Err(ConfigError::Invalid("at least one role is required".into()));
        }
        if let Some(bad) = self.roles.iter().find(|r| !is_valid_name(r)) {
            return Err(ConfigError::Invalid(format!("bad role name '{}'", bad)));
        }
        if let Some(bad) = self.events.iter().find(|e| e.as_str() == "*") {
            return Err(ConfigError::Invalid(format!(
                "'{}' is reserved and cannot be declared as an event",
                bad
            )));
        }
        if self.compact.min_age_hours < 0.0 {
            return Err(ConfigError::Invalid("compact.min_age_hours must be >= 0".into()));
        }
        Ok(())
    }

    pub fn is_known_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_known_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    pub fn is_passive_role(&self, role: &str) -> bool {
        self.notify.passive_roles.iter().any(|r| r == role)
    }

    pub fn notify_cooldown(&self) -> Duration {
        Duration::from_millis(self.notify.cooldown_ms)
    }

    pub fn compact_alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.compact.alert_cooldown_minutes * 60)
    }
}

/// Role names become file names and tmux window names.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SwitchboardConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_known_role("build"));
        assert!(config.is_passive_role("pm"));
        assert!(!config.is_passive_role("build"));
        assert_eq!(config.compact.size_threshold_bytes, 524_288);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = "roles: [alpha, beta]\nnotify:\n  cooldown_ms: 10\n";
        let config: SwitchboardConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.roles, vec!["alpha", "beta"]);
        assert_eq!(config.notify.cooldown_ms, 10);
        assert_eq!(config.notify.key_delay_ms, 150);
        assert_eq!(config.notify.passive_roles, vec!["pm"]);
        assert_eq!(config.compact, CompactConfig::default());
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwitchboardConfig::load(&dir.path().join("nope.yaml")).unwrap();
        assert_eq!(config, SwitchboardConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "state_dir: /tmp/sb\ncompact:\n  min_age_hours: 1.5\n").unwrap();
        let config = SwitchboardConfig::load(&path).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/tmp/sb"));
        assert_eq!(config.compact.min_age_hours, 1.5);
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "roles: {not: [a list").unwrap();
        let err = SwitchboardConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validate_rejects_bad_role_names() {
        let mut config = SwitchboardConfig::default();
        config.roles.push("has space".into());
        assert!(config.validate().is_err());

        config.roles.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_wildcard_event() {
        let mut config = SwitchboardConfig::default();
        config.events.push("*".into());
        assert!(config.validate().is_err());
    }
}
