//! Cron entry persistence.
//!
//! Entries live in one JSONL file per session and every mutation rewrites
//! the whole file (read, modify in memory, atomic replace). There is no
//! cross-process lock: two concurrent mutations can lose one of them, but
//! the file is never left half-written.

use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SwitchboardConfig;
use crate::layout::Layout;
use crate::store;

use super::schedule::CronSchedule;
use super::CronError;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronEntry {
    pub id: String,
    pub schedule: String,
    pub target: String,
    pub action: String,
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    /// Unix seconds of the last firing; 0 means never.
    #[serde(default)]
    pub last_run: i64,
    #[serde(default)]
    pub run_count: u64,
}

impl CronEntry {
    /// The parsed schedule, or `None` when the stored string is invalid.
    pub fn parsed_schedule(&self) -> Option<CronSchedule> {
        CronSchedule::parse(&self.schedule).ok()
    }

    /// Enabled, parseable, and either never run or at least one full
    /// interval (in whole seconds) since the last run.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let interval = match self.parsed_schedule().map(|s| i64::try_from(s.interval_secs())) {
            Some(Ok(secs)) if secs > 0 => secs,
            _ => return false,
        };
        if self.last_run == 0 {
            return true;
        }
        // A hand-edited `last_run` can sit anywhere in i64.
        match now.timestamp().checked_sub(self.last_run) {
            Some(elapsed) => elapsed >= interval,
            None => false,
        }
    }

    /// When the entry next becomes due; `None` if it never will or the
    /// instant is out of range.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        if !self.enabled {
            return None;
        }
        let schedule = self.parsed_schedule()?;
        if self.last_run == 0 {
            return Some(self.created_at);
        }
        let last = Utc.timestamp_opt(self.last_run, 0).single()?;
        let interval = TimeDelta::try_seconds(i64::try_from(schedule.interval_secs()).ok()?)?;
        last.checked_add_signed(interval)
    }
}

/// Input to `CronStore::add`.
#[derive(Debug, Clone, Default)]
pub struct NewCronEntry {
    /// Generated when absent.
    pub id: Option<String>,
    pub schedule: String,
    pub target: String,
    pub action: String,
    pub message: String,
    pub disabled: bool,
}

/// One line of the firing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronRun {
    pub entry_id: String,
    pub target: String,
    pub action: String,
    pub fired_at: DateTime<Utc>,
    pub message_id: String,
}

pub struct CronStore {
    path: PathBuf,
    history_path: PathBuf,
    roles: Vec<String>,
}

impl CronStore {
    pub fn new(path: PathBuf, history_path: PathBuf, roles: Vec<String>) -> Self {
        CronStore {
            path,
            history_path,
            roles,
        }
    }

    pub fn for_session(config: &SwitchboardConfig, layout: &Layout, session: &str) -> Self {
        Self::new(
            layout.cron_store(session),
            layout.cron_history(session),
            config.roles.clone(),
        )
    }

    pub fn list(&self) -> Result<Vec<CronEntry>, CronError> {
        Ok(store::load_records(&self.path)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<CronEntry>, CronError> {
        Ok(self.list()?.into_iter().find(|e| e.id == id))
    }

    /// Entries due at `now`, in store order.
    pub fn due(&self, now: DateTime<Utc>) -> Result<Vec<CronEntry>, CronError> {
        Ok(self.list()?.into_iter().filter(|e| e.is_due(now)).collect())
    }

    /// Validate and append a new entry.
    pub fn add(&self, new: NewCronEntry, now: DateTime<Utc>) -> Result<CronEntry, CronError> {
        CronSchedule::parse(&new.schedule)?;
        if !self.roles.iter().any(|r| *r == new.target) {
            return Err(CronError::UnknownRole(new.target));
        }
        if new.action.trim().is_empty() {
            return Err(CronError::MissingAction);
        }
        let id = match new.id {
            Some(id) if store::is_valid_id(&id) => id,
            Some(id) => return Err(CronError::InvalidId(id)),
            None => store::generate_id("cron"),
        };

        let mut entries = self.list()?;
        if entries.iter().any(|e| e.id == id) {
            return Err(CronError::Duplicate(id));
        }
        let entry = CronEntry {
            id,
            schedule: new.schedule.trim().to_string(),
            target: new.target,
            action: new.action.trim().to_string(),
            message: new.message,
            enabled: !new.disabled,
            created_at: now,
            last_run: 0,
            run_count: 0,
        };
        entries.push(entry.clone());
        store::save_records(&self.path, &entries)?;
        Ok(entry)
    }

    pub fn remove(&self, id: &str) -> Result<CronEntry, CronError> {
        let mut entries = self.list()?;
        let index = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CronError::NotFound(id.to_string()))?;
        let removed = entries.remove(index);
        store::save_records(&self.path, &entries)?;
        Ok(removed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<CronEntry, CronError> {
        self.update(id, |e| e.enabled = enabled)
    }

    /// Record a firing: stamp the last run and bump the counter.
    pub fn update_last_run(&self, id: &str, at: DateTime<Utc>) -> Result<CronEntry, CronError> {
        self.update(id, |e| {
            e.last_run = at.timestamp();
            e.run_count += 1;
        })
    }

    pub fn append_history(&self, run: &CronRun) -> Result<(), CronError> {
        Ok(store::append_record(&self.history_path, run)?)
    }

    /// The most recent `limit` history records, oldest first.
    pub fn history(&self, limit: usize) -> Result<Vec<CronRun>, CronError> {
        let mut runs: Vec<CronRun> = store::load_records(&self.history_path)?;
        if runs.len() > limit {
            runs.drain(..runs.len() - limit);
        }
        Ok(runs)
    }

    fn update<F: FnOnce(&mut CronEntry)>(&self, id: &str, f: F) -> Result<CronEntry, CronError> {
        let mut entries = self.list()?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| CronError::NotFound(id.to_string()))?;
        f(entry);
        let updated = entry.clone();
        store::save_records(&self.path, &entries)?;
        Ok(updated)
    }
}
