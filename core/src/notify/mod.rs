//! Deduplicated terminal alerts for inbox growth.
//!
//! Several independent callers (the direct-send path, the periodic watcher,
//! subscription fan-out) may ask to alert the same role at the same moment.
//! `NotificationDispatcher::notify` makes that decision once per growth of
//! the inbox:
//!
//! 1. roles with a live harness are skipped;
//! 2. the check-then-act sequence runs under a per-role `flock`, falling
//!    back to unsynchronized operation if the lock cannot be taken;
//! 3. the inbox size is compared with the "last notified" marker, and a
//!    marker younger than the cooldown suppresses the alert even when sizes
//!    differ;
//! 4. the marker is committed before delivery, so a failed delivery loses
//!    the alert rather than repeating it on every poll.

pub mod harness;
pub mod marker;

use std::time::{Duration, SystemTime};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusError};
use crate::config::SwitchboardConfig;
use crate::infrastructure::{pane_target, Terminal, TerminalError};
use crate::layout::Layout;
use crate::lock::acquire_lock;
use crate::store::StoreError;

use self::harness::HarnessRegistry;
use self::marker::{read_marker, write_marker, NotifiedMarker};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("cannot record notified marker: {0}")]
    Marker(#[from] StoreError),
    #[error("alert delivery to {role} failed: {source}")]
    Delivery {
        role: String,
        #[source]
        source: TerminalError,
    },
}

/// Why no alert was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    EmptyInbox,
    /// The inbox has not grown past the last notified size.
    NoGrowth,
    /// Another caller notified within the cooldown window.
    Cooldown,
}

/// How an alert reached the pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Literal text followed by Enter.
    Injected,
    /// Transient status line only.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    HarnessAttached,
    Suppressed(SuppressReason),
    Delivered(Delivery),
}

/// Decide whether an inbox of `size` bytes warrants an alert given the
/// stored marker.
pub fn suppression(
    size: u64,
    marker: Option<NotifiedMarker>,
    now: SystemTime,
    cooldown: Duration,
) -> Option<SuppressReason> {
    if size == 0 {
        return Some(SuppressReason::EmptyInbox);
    }
    let marker = marker?;
    if size <= marker.size {
        return Some(SuppressReason::NoGrowth);
    }
    if marker.age(now) < cooldown {
        return Some(SuppressReason::Cooldown);
    }
    None
}

pub struct NotificationDispatcher<'a> {
    config: &'a SwitchboardConfig,
    layout: Layout,
    bus: &'a dyn Bus,
    terminal: &'a dyn Terminal,
    harness: HarnessRegistry,
}

impl<'a> NotificationDispatcher<'a> {
    pub fn new(
        config: &'a SwitchboardConfig,
        layout: Layout,
        bus: &'a dyn Bus,
        terminal: &'a dyn Terminal,
    ) -> Self {
        NotificationDispatcher {
            config,
            harness: HarnessRegistry::new(layout.clone()),
            layout,
            bus,
            terminal,
        }
    }

    pub fn harness(&self) -> &HarnessRegistry {
        &self.harness
    }

    /// Alert `role` about its inbox if, and only if, it grew since the last
    /// alert.
    pub fn notify(&self, session: &str, role: &str) -> Result<NotifyOutcome, NotifyError> {
        if self.harness.is_attached(session, role) {
            debug!(session, role, "harness attached; skipping alert");
            return Ok(NotifyOutcome::HarnessAttached);
        }

        let lock_path = self.layout.notify_lock(session, role);
        let timeout = Duration::from_millis(self.config.notify.lock_timeout_ms);
        let _guard = match acquire_lock(&lock_path, timeout) {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(session, role, error = %e, "notify lock unavailable; proceeding unsynchronized");
                None
            }
        };

        let size = self.bus.inbox_size(session, role)?;
        let marker_path = self.layout.notified_marker(session, role);
        let marker = read_marker(&marker_path);
        if let Some(reason) = suppression(
            size,
            marker,
            SystemTime::now(),
            self.config.notify_cooldown(),
        ) {
            debug!(session, role, size, ?reason, "alert suppressed");
            return Ok(NotifyOutcome::Suppressed(reason));
        }

        write_marker(&marker_path, size)?;

        let text = self.alert_text(session, role);
        match self.deliver(session, role, &text) {
            Ok(delivery) => {
                info!(session, role, size, ?delivery, "alert delivered");
                Ok(NotifyOutcome::Delivered(delivery))
            }
            Err(source) => {
                warn!(session, role, error = %source, "alert delivery failed; marker kept");
                Err(NotifyError::Delivery {
                    role: role.to_string(),
                    source,
                })
            }
        }
    }

    /// Run `notify` for each role, collecting per-role results.
    pub fn notify_all(
        &self,
        session: &str,
        roles: &[String],
    ) -> Vec<(String, Result<NotifyOutcome, NotifyError>)> {
        roles
            .iter()
            .map(|role| (role.clone(), self.notify(session, role)))
            .collect()
    }

    /// Flash `text` on the role's status line, bypassing inbox dedup.
    pub fn show_status(&self, session: &str, role: &str, text: &str) -> Result<(), TerminalError> {
        if !self.terminal.session_exists(session) {
            return Err(TerminalError::NoSession(session.to_string()));
        }
        let duration = Duration::from_millis(self.config.notify.status_duration_ms);
        self.terminal
            .show_status(&pane_target(session, role), text, duration)
    }

    fn alert_text(&self, session: &str, role: &str) -> String {
        let messages = match self.bus.peek(session, role) {
            Ok(m) => m,
            Err(e) => {
                debug!(session, role, error = %e, "cannot peek inbox for alert text");
                Vec::new()
            }
        };
        match messages.last() {
            Some(latest) => format!(
                "[switchboard] {} message(s) in the {} inbox; latest is {}. Please check your inbox.",
                messages.len(),
                role,
                latest.summary()
            ),
            None => format!(
                "[switchboard] New messages in the {} inbox. Please check your inbox.",
                role
            ),
        }
    }

    fn deliver(&self, session: &str, role: &str, text: &str) -> Result<Delivery, TerminalError> {
        if !self.terminal.session_exists(session) {
            return Err(TerminalError::NoSession(session.to_string()));
        }
        let target = pane_target(session, role);
        if self.config.is_passive_role(role) {
            let duration = Duration::from_millis(self.config.notify.status_duration_ms);
            self.terminal.show_status(&target, text, duration)?;
            return Ok(Delivery::Status);
        }
        self.terminal.send_text(&target, text)?;
        std::thread::sleep(Duration::from_millis(self.config.notify.key_delay_ms));
        self.terminal.send_key(&target, "Enter")?;
        Ok(Delivery::Injected)
    }
}
