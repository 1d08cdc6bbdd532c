//! Publish/subscribe fan-out over role inboxes.
//!
//! A publisher reports `(event, outcome)`; every enabled subscription that
//! matches gets one event message in its notify role's inbox. Terminal
//! alerts are sent once per destination role per publish, and fire counters
//! are bumped afterwards in a single rewrite. Counters are observational:
//! losing an increment never un-sends a message.

pub mod store;
pub mod template;

pub use store::{matching, NewSubscription, Subscription, SubscriptionStore, OUTCOMES, WILDCARD};
pub use template::{expand_template, TemplateVars};

use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bus::{Bus, BusError, Message, MessageKind};
use crate::notify::{NotificationDispatcher, NotifyError, NotifyOutcome};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("unknown event '{0}'")]
    UnknownEvent(String),
    #[error("unknown outcome '{0}' (expected success, failure or *)")]
    UnknownOutcome(String),
    #[error("unknown role '{0}'")]
    UnknownRole(String),
    #[error("invalid id '{0}' (use letters, digits, '-', '_' or '.')")]
    InvalidId(String),
    #[error("action must not be empty")]
    MissingAction,
    #[error("subscription '{0}' already exists")]
    Duplicate(String),
    #[error("subscription '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A completed command being announced to subscribers.
#[derive(Debug, Clone)]
pub struct PublishEvent {
    pub session: String,
    /// Sender recorded on the fanned-out messages.
    pub publisher: String,
    pub event: String,
    pub outcome: String,
    pub exit_code: Option<i32>,
    pub command: String,
}

/// One message that made it onto the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Sent {
    pub subscription_id: String,
    pub role: String,
    pub message_id: String,
}

#[derive(Debug, Default)]
pub struct PublishReport {
    pub sent: Vec<Sent>,
    /// Matches whose bus send failed: `(subscription id, error)`.
    pub send_failures: Vec<(String, BusError)>,
    /// Per-role alert results, in first-seen role order.
    pub notified: Vec<(String, Result<NotifyOutcome, NotifyError>)>,
    /// Set when the fire counter rewrite failed.
    pub counter_error: Option<SubscriptionError>,
}

impl PublishReport {
    pub fn matched(&self) -> usize {
        self.sent.len() + self.send_failures.len()
    }
}

pub struct FanOut<'a> {
    store: SubscriptionStore,
    bus: &'a dyn Bus,
    dispatcher: Option<&'a NotificationDispatcher<'a>>,
}

impl<'a> FanOut<'a> {
    pub fn new(store: SubscriptionStore, bus: &'a dyn Bus) -> Self {
        FanOut {
            store,
            bus,
            dispatcher: None,
        }
    }

    /// Alert each destination role after sending.
    pub fn with_dispatcher(mut self, dispatcher: &'a NotificationDispatcher<'a>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Deliver `event` to every matching subscription.
    ///
    /// Only a failure to read the store aborts; per-match send failures,
    /// alert failures and counter failures are collected in the report.
    pub fn publish(&self, event: &PublishEvent) -> Result<PublishReport, SubscriptionError> {
        let subs = self.store.list()?;
        let matched = matching(&subs, &event.event, &event.outcome);
        debug!(session = %event.session, event = %event.event, outcome = %event.outcome, matched = matched.len(), "publish");

        let vars = TemplateVars {
            event: &event.event,
            outcome: &event.outcome,
            exit_code: event.exit_code,
            command: &event.command,
        };

        let mut report = PublishReport::default();
        let mut roles: Vec<String> = Vec::new();
        for sub in matched {
            let text = expand_template(&sub.message, &vars);
            let message = Message::new(
                &event.publisher,
                &sub.notify,
                MessageKind::Event,
                &sub.action,
                json!({
                    "message": text,
                    "event": event.event,
                    "outcome": event.outcome,
                    "exit_code": event.exit_code,
                    "command": event.command,
                    "subscription_id": sub.id,
                }),
                None,
            );
            match self.bus.send(&event.session, &message) {
                Ok(()) => {
                    if !roles.contains(&sub.notify) {
                        roles.push(sub.notify.clone());
                    }
                    report.sent.push(Sent {
                        subscription_id: sub.id.clone(),
                        role: sub.notify.clone(),
                        message_id: message.id,
                    });
                }
                Err(e) => {
                    warn!(session = %event.session, id = %sub.id, role = %sub.notify, error = %e, "subscription send failed");
                    report.send_failures.push((sub.id.clone(), e));
                }
            }
        }

        if let Some(dispatcher) = self.dispatcher {
            report.notified = dispatcher.notify_all(&event.session, &roles);
            for (role, result) in &report.notified {
                if let Err(e) = result {
                    warn!(session = %event.session, role = %role, error = %e, "subscription alert failed");
                }
            }
        }

        let ids: Vec<String> = report.sent.iter().map(|s| s.subscription_id.clone()).collect();
        if let Err(e) = self.store.increment_fire_counts(&ids) {
            warn!(session = %event.session, error = %e, "fire counters not updated");
            report.counter_error = Some(e);
        }

        info!(
            session = %event.session,
            event = %event.event,
            outcome = %event.outcome,
            sent = report.sent.len(),
            failed = report.send_failures.len(),
            "published"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::FileBus;
    use crate::config::SwitchboardConfig;
    use crate::infrastructure::mock::MockTerminal;
    use crate::layout::Layout;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        layout: Layout,
        config: SwitchboardConfig,
        bus: FileBus,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let mut config = SwitchboardConfig::default();
        config.notify.cooldown_ms = 0;
        config.notify.key_delay_ms = 0;
        let bus = FileBus::new(layout.clone());
        Fixture {
            _dir: dir,
            layout,
            config,
            bus,
        }
    }

    fn subscribe(store: &SubscriptionStore, id: &str, event: &str, outcome: &str, notify: &str) {
        store
            .add(
                NewSubscription {
                    id: Some(id.into()),
                    event: event.into(),
                    outcome: outcome.into(),
                    notify: notify.into(),
                    action: format!("on_{}", id),
                    message: "{event} {outcome} exit={exit_code} cmd={command} {other}".into(),
                    disabled: false,
                },
                at(0),
            )
            .unwrap();
    }

    fn build_failure() -> PublishEvent {
        PublishEvent {
            session: "s".into(),
            publisher: "build".into(),
            event: "build".into(),
            outcome: "failure".into(),
            exit_code: Some(101),
            command: "cargo build".into(),
        }
    }

    /// Records sends and fails those addressed to one role.
    struct FlakyBus {
        fail_role: String,
        sent: Mutex<Vec<Message>>,
    }

    impl Bus for FlakyBus {
        fn send(&self, _: &str, message: &Message) -> Result<(), BusError> {
            if message.to == self.fail_role {
                return Err(BusError::Unavailable("inbox offline".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
        fn peek(&self, _: &str, _: &str) -> Result<Vec<Message>, BusError> {
            Ok(Vec::new())
        }
        fn inbox_size(&self, _: &str, _: &str) -> Result<u64, BusError> {
            Ok(0)
        }
    }

    /// Records sends, replacing the file at `path` with a directory on each.
    struct ClobberingBus {
        path: std::path::PathBuf,
        sent: Mutex<Vec<Message>>,
    }

    impl Bus for ClobberingBus {
        fn send(&self, _: &str, message: &Message) -> Result<(), BusError> {
            if self.path.is_file() {
                std::fs::remove_file(&self.path).unwrap();
                std::fs::create_dir(&self.path).unwrap();
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
        fn peek(&self, _: &str, _: &str) -> Result<Vec<Message>, BusError> {
            Ok(Vec::new())
        }
        fn inbox_size(&self, _: &str, _: &str) -> Result<u64, BusError> {
            Ok(0)
        }
    }

    #[test]
    fn publish_sends_expanded_event_messages() {
        let f = fixture();
        let store = SubscriptionStore::for_session(&f.config, &f.layout, "s");
        subscribe(&store, "fail-any", "*", "failure", "review");

        let fanout = FanOut::new(store, &f.bus);
        let report = fanout.publish(&build_failure()).unwrap();
        assert_eq!(report.sent.len(), 1);
        assert!(report.counter_error.is_none());

        let inbox = f.bus.peek("s", "review").unwrap();
        assert_eq!(inbox.len(), 1);
        let msg = &inbox[0];
        assert_eq!(msg.id, report.sent[0].message_id);
        assert_eq!(msg.from, "build");
        assert_eq!(msg.kind, MessageKind::Event);
        assert_eq!(msg.action, "on_fail-any");
        assert_eq!(
            msg.payload["message"],
            "build failure exit=101 cmd=cargo build {other}"
        );
        assert_eq!(msg.payload["event"], "build");
        assert_eq!(msg.payload["outcome"], "failure");
        assert_eq!(msg.payload["exit_code"], 101);
        assert_eq!(msg.payload["command"], "cargo build");
        assert_eq!(msg.payload["subscription_id"], "fail-any");
    }

    #[test]
    fn every_match_fires_and_alerts_dedupe_per_role() {
        let f = fixture();
        let store = SubscriptionStore::for_session(&f.config, &f.layout, "s");
        subscribe(&store, "a", "build", "*", "test");
        subscribe(&store, "b", "*", "failure", "test");
        subscribe(&store, "c", "build", "failure", "test");
        subscribe(&store, "d", "*", "*", "review");
        subscribe(&store, "e", "test", "*", "review");
        let term = MockTerminal::new();
        let dispatcher = NotificationDispatcher::new(&f.config, f.layout.clone(), &f.bus, &term);

        let fanout = FanOut::new(store, &f.bus).with_dispatcher(&dispatcher);
        let report = fanout.publish(&build_failure()).unwrap();

        let ids: Vec<&str> = report.sent.iter().map(|s| s.subscription_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(report.matched(), 4);
        assert_eq!(f.bus.peek("s", "test").unwrap().len(), 3);
        assert_eq!(f.bus.peek("s", "review").unwrap().len(), 1);

        let roles: Vec<&str> = report.notified.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(roles, vec!["test", "review"]);
        // One text + Enter per distinct role.
        assert_eq!(term.calls_for("s:test").len(), 2);
        assert_eq!(term.calls_for("s:review").len(), 2);

        let counts: Vec<(String, u64)> = fanout
            .store()
            .list()
            .unwrap()
            .into_iter()
            .map(|s| (s.id, s.fire_count))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("c".to_string(), 1),
                ("d".to_string(), 1),
                ("e".to_string(), 0),
            ]
        );
    }

    #[test]
    fn no_match_sends_nothing() {
        let f = fixture();
        let store = SubscriptionStore::for_session(&f.config, &f.layout, "s");
        subscribe(&store, "a", "*", "failure", "test");
        subscribe(&store, "b", "build", "*", "test");
        let term = MockTerminal::new();
        let dispatcher = NotificationDispatcher::new(&f.config, f.layout.clone(), &f.bus, &term);

        let fanout = FanOut::new(store, &f.bus).with_dispatcher(&dispatcher);
        let mut event = build_failure();
        event.event = "test".into();
        event.outcome = "success".into();
        let report = fanout.publish(&event).unwrap();

        assert_eq!(report.matched(), 0);
        assert!(report.notified.is_empty());
        assert!(term.calls().is_empty());
        assert!(f.bus.peek("s", "test").unwrap().is_empty());
    }

    #[test]
    fn failed_send_is_reported_and_not_counted() {
        let f = fixture();
        let store = SubscriptionStore::for_session(&f.config, &f.layout, "s");
        subscribe(&store, "a", "build", "*", "test");
        subscribe(&store, "b", "build", "*", "review");
        subscribe(&store, "c", "build", "*", "docs");

        let bus = FlakyBus {
            fail_role: "review".into(),
            sent: Mutex::new(Vec::new()),
        };
        let fanout = FanOut::new(store, &bus);
        let report = fanout.publish(&build_failure()).unwrap();

        let sent: Vec<&str> = report.sent.iter().map(|s| s.subscription_id.as_str()).collect();
        assert_eq!(sent, vec!["a", "c"]);
        assert_eq!(report.send_failures.len(), 1);
        assert_eq!(report.send_failures[0].0, "b");
        assert_eq!(bus.sent.lock().unwrap().len(), 2);

        let b = fanout.store().get("b").unwrap().unwrap();
        assert_eq!(b.fire_count, 0);
        assert_eq!(fanout.store().get("c").unwrap().unwrap().fire_count, 1);
    }

    #[test]
    fn counter_failure_keeps_sent_messages() {
        let f = fixture();
        let store = SubscriptionStore::for_session(&f.config, &f.layout, "s");
        subscribe(&store, "a", "build", "*", "test");

        // The store file becomes unreadable between the send and the
        // counter update.
        let bus = ClobberingBus {
            path: f.layout.subscriptions("s"),
            sent: Mutex::new(Vec::new()),
        };
        let fanout = FanOut::new(store, &bus);
        let report = fanout.publish(&build_failure()).unwrap();

        assert_eq!(report.sent.len(), 1);
        assert!(matches!(report.counter_error, Some(SubscriptionError::Store(_))));
        let sent = bus.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, report.sent[0].message_id);
    }
}
