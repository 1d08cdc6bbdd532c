//! Interval triggers that inject messages into role inboxes.
//!
//! A tick is two-phase: fire (send the bus message), then record the run
//! (stamp `last_run`, append history). A crash between the phases means the
//! entry fires again on the next tick; it is never silently skipped.

pub mod schedule;
pub mod store;

pub use schedule::{CronSchedule, ScheduleError, MAX_INTERVAL, MIN_INTERVAL};
pub use store::{CronEntry, CronRun, CronStore, NewCronEntry};

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::bus::{Bus, BusError, Message, MessageKind};
use crate::notify::NotificationDispatcher;
use crate::store::StoreError;

/// Sender name stamped on cron messages.
pub const CRON_SENDER: &str = "cron";

#[derive(Debug, Error)]
pub enum CronError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("invalid id '{0}' (use letters, digits, '-', '_' or '.')")]
    InvalidId(String),
    #[error("action must not be empty")]
    MissingAction,
    #[error("cron entry '{0}' already exists")]
    Duplicate(String),
    #[error("cron entry '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Outcome of one `tick`.
#[derive(Debug, Default)]
pub struct TickReport {
    pub fired: Vec<CronRun>,
    pub failed: Vec<(String, CronError)>,
}

pub struct CronScheduler<'a> {
    session: String,
    store: CronStore,
    bus: &'a dyn Bus,
    dispatcher: Option<&'a NotificationDispatcher<'a>>,
}

impl<'a> CronScheduler<'a> {
    pub fn new(session: &str, store: CronStore, bus: &'a dyn Bus) -> Self {
        CronScheduler {
            session: session.to_string(),
            store,
            bus,
            dispatcher: None,
        }
    }

    /// Alert target panes after each firing.
    pub fn with_dispatcher(mut self, dispatcher: &'a NotificationDispatcher<'a>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn store(&self) -> &CronStore {
        &self.store
    }

    /// Send the entry's request to its target. Returns the message id.
    pub fn fire(&self, entry: &CronEntry) -> Result<String, CronError> {
        let message = Message::new(
            CRON_SENDER,
            &entry.target,
            MessageKind::Request,
            &entry.action,
            json!({
                "message": entry.message,
                "cron_id": entry.id,
            }),
            None,
        );
        self.bus.send(&self.session, &message)?;
        info!(session = %self.session, id = %entry.id, target = %entry.target, message_id = %message.id, "cron fired");
        Ok(message.id)
    }

    /// Fire every due entry, then record each run.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, CronError> {
        let mut report = TickReport::default();
        for entry in self.store.due(now)? {
            let message_id = match self.fire(&entry) {
                Ok(id) => id,
                Err(e) => {
                    warn!(session = %self.session, id = %entry.id, error = %e, "cron fire failed");
                    report.failed.push((entry.id.clone(), e));
                    continue;
                }
            };

            if let Err(e) = self.store.update_last_run(&entry.id, now) {
                warn!(session = %self.session, id = %entry.id, error = %e, "fired but last run not recorded; may fire again");
            }
            let run = CronRun {
                entry_id: entry.id.clone(),
                target: entry.target.clone(),
                action: entry.action.clone(),
                fired_at: now,
                message_id,
            };
            if let Err(e) = self.store.append_history(&run) {
                warn!(session = %self.session, id = %entry.id, error = %e, "cron history not recorded");
            }

            if let Some(dispatcher) = self.dispatcher {
                if let Err(e) = dispatcher.notify(&self.session, &entry.target) {
                    warn!(session = %self.session, role = %entry.target, error = %e, "cron alert failed");
                }
            }
            report.fired.push(run);
        }
        Ok(report)
    }
}
