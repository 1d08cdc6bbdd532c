//! Compaction alerts for roles whose working memory has grown large and
//! stale.
//!
//! The monitor itself is stateless. Callers that poll it keep a
//! `last_seen` map across calls so a role is not re-alerted inside the
//! cooldown window.

pub mod format;

pub use format::{format_bytes, format_elapsed};

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::CompactConfig;
use crate::layout::{file_size, Layout};
use crate::session::{SessionMeta, SessionMetaStore};

/// Hours reported for a role with no usable session metadata.
pub const NEVER_COMPACTED_HOURS: f64 = 10_000.0;

/// Byte counts that make up a role's memory footprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeBreakdown {
    pub active: u64,
    pub archive: u64,
    pub history: u64,
    /// Shared by every role in the session.
    pub session_log: u64,
}

impl SizeBreakdown {
    pub fn total(&self) -> u64 {
        self.active + self.archive + self.history + self.session_log
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompactAlert {
    pub role: String,
    pub sizes: SizeBreakdown,
    pub hours_since_compaction: f64,
    pub message: String,
}

pub struct CompactionMonitor<'a> {
    config: CompactConfig,
    layout: Layout,
    meta: &'a dyn SessionMetaStore,
}

impl<'a> CompactionMonitor<'a> {
    pub fn new(config: CompactConfig, layout: Layout, meta: &'a dyn SessionMetaStore) -> Self {
        CompactionMonitor {
            config,
            layout,
            meta,
        }
    }

    /// Current memory footprint of `role`. Missing files count as zero.
    pub fn sizes(&self, session: &str, role: &str) -> SizeBreakdown {
        SizeBreakdown {
            active: file_size(&self.layout.active_memory(session, role)),
            archive: archive_bytes(&self.layout.archive_dir(session, role)),
            history: file_size(&self.layout.role_history(session, role)),
            session_log: file_size(&self.layout.session_log(session)),
        }
    }

    /// Hours since the role was last compacted (or started, if never
    /// compacted). Missing metadata yields `NEVER_COMPACTED_HOURS`.
    pub fn hours_since_compaction(&self, session: &str, role: &str, now: DateTime<Utc>) -> f64 {
        let meta = match self.meta.load(session, role) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(session, role, error = %e, "cannot read session metadata");
                None
            }
        };
        match meta.as_ref().and_then(SessionMeta::clock_origin) {
            Some(origin) => ((now.timestamp() - origin) as f64 / 3600.0).max(0.0),
            None => NEVER_COMPACTED_HOURS,
        }
    }

    /// Alerts for every role over both thresholds, minus those already
    /// alerted within `cooldown`. Passing alerts are stamped into
    /// `last_seen`.
    pub fn evaluate(
        &self,
        session: &str,
        roles: &[String],
        now: DateTime<Utc>,
        last_seen: &mut HashMap<String, DateTime<Utc>>,
        cooldown: Duration,
    ) -> Vec<CompactAlert> {
        let mut alerts = Vec::new();
        for role in roles {
            let sizes = self.sizes(session, role);
            if sizes.total() <= self.config.size_threshold_bytes {
                continue;
            }
            let hours = self.hours_since_compaction(session, role, now);
            if hours <= self.config.min_age_hours {
                continue;
            }
            if let Some(seen) = last_seen.get(role) {
                let since = now.signed_duration_since(*seen).to_std().unwrap_or_default();
                if since < cooldown {
                    debug!(session, role = %role, "compaction alert within cooldown");
                    continue;
                }
            }
            last_seen.insert(role.clone(), now);
            alerts.push(CompactAlert {
                role: role.clone(),
                sizes,
                hours_since_compaction: hours,
                message: alert_message(role, &sizes, hours),
            });
        }
        alerts
    }
}

fn alert_message(role: &str, sizes: &SizeBreakdown, hours: f64) -> String {
    let last = if hours >= NEVER_COMPACTED_HOURS {
        "never compacted".to_string()
    } else {
        format!("last compacted {} ago", format_elapsed(hours))
    };
    format!(
        "[switchboard] {} memory is {} (active {}, archive {}, history {}, session log {}); {}. Consider compacting.",
        role,
        format_bytes(sizes.total()),
        format_bytes(sizes.active),
        format_bytes(sizes.archive),
        format_bytes(sizes.history),
        format_bytes(sizes.session_log),
        last
    )
}

/// Sum of `*.jsonl` files directly under the archive directory.
fn archive_bytes(dir: &Path) -> u64 {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|x| x == "jsonl").unwrap_or(false))
        .map(|p| file_size(&p))
        .sum()
}
