//! Subscription persistence.
//!
//! Same model as the cron store: one JSONL file per session, whole-file
//! rewrite on every mutation, no cross-process lock.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SwitchboardConfig;
use crate::layout::Layout;
use crate::store;

use super::SubscriptionError;

/// Matches any event name or outcome.
pub const WILDCARD: &str = "*";

/// Outcomes a publisher may report.
pub const OUTCOMES: &[&str] = &["success", "failure"];

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    /// Event name or `*`.
    pub event: String,
    /// `success`, `failure` or `*`.
    pub outcome: String,
    /// Role whose inbox receives the message.
    pub notify: String,
    pub action: String,
    /// Message template; see `expand_template`.
    #[serde(default)]
    pub message: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub fire_count: u64,
}

impl Subscription {
    pub fn matches(&self, event: &str, outcome: &str) -> bool {
        self.enabled
            && (self.event == WILDCARD || self.event == event)
            && (self.outcome == WILDCARD || self.outcome == outcome)
    }
}

/// Input to `SubscriptionStore::add`.
#[derive(Debug, Clone, Default)]
pub struct NewSubscription {
    /// Generated when absent.
    pub id: Option<String>,
    pub event: String,
    pub outcome: String,
    pub notify: String,
    pub action: String,
    pub message: String,
    pub disabled: bool,
}

/// Enabled subscriptions matching `(event, outcome)`, in store order.
pub fn matching<'s>(subs: &'s [Subscription], event: &str, outcome: &str) -> Vec<&'s Subscription> {
    subs.iter().filter(|s| s.matches(event, outcome)).collect()
}

pub struct SubscriptionStore {
    path: PathBuf,
    roles: Vec<String>,
    events: Vec<String>,
}

impl SubscriptionStore {
    pub fn new(path: PathBuf, roles: Vec<String>, events: Vec<String>) -> Self {
        SubscriptionStore {
            path,
            roles,
            events,
        }
    }

    pub fn for_session(config: &SwitchboardConfig, layout: &Layout, session: &str) -> Self {
        Self::new(
            layout.subscriptions(session),
            config.roles.clone(),
            config.events.clone(),
        )
    }

    pub fn list(&self) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(store::load_records(&self.path)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<Subscription>, SubscriptionError> {
        Ok(self.list()?.into_iter().find(|s| s.id == id))
    }

    /// Validate and append a new subscription.
    pub fn add(
        &self,
        new: NewSubscription,
        now: DateTime<Utc>,
    ) -> Result<Subscription, SubscriptionError> {
        let event = new.event.trim().to_string();
        if event != WILDCARD && !self.events.iter().any(|e| *e == event) {
            return Err(SubscriptionError::UnknownEvent(event));
        }
        let outcome = new.outcome.trim().to_string();
        if outcome != WILDCARD && !OUTCOMES.contains(&outcome.as_str()) {
            return Err(SubscriptionError::UnknownOutcome(outcome));
        }
        if !self.roles.iter().any(|r| *r == new.notify) {
            return Err(SubscriptionError::UnknownRole(new.notify));
        }
        if new.action.trim().is_empty() {
            return Err(SubscriptionError::MissingAction);
        }
        let id = match new.id {
            Some(id) if store::is_valid_id(&id) => id,
            Some(id) => return Err(SubscriptionError::InvalidId(id)),
            None => store::generate_id("sub"),
        };

        let mut subs = self.list()?;
        if subs.iter().any(|s| s.id == id) {
            return Err(SubscriptionError::Duplicate(id));
        }
        let sub = Subscription {
            id,
            event,
            outcome,
            notify: new.notify,
            action: new.action.trim().to_string(),
            message: new.message,
            enabled: !new.disabled,
            created_at: now,
            fire_count: 0,
        };
        subs.push(sub.clone());
        store::save_records(&self.path, &subs)?;
        Ok(sub)
    }

    pub fn remove(&self, id: &str) -> Result<Subscription, SubscriptionError> {
        let mut subs = self.list()?;
        let index = subs
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| SubscriptionError::NotFound(id.to_string()))?;
        let removed = subs.remove(index);
        store::save_records(&self.path, &subs)?;
        Ok(removed)
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Subscription, SubscriptionError> {
        let mut subs = self.list()?;
        let sub = subs
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SubscriptionError::NotFound(id.to_string()))?;
        sub.enabled = enabled;
        let updated = sub.clone();
        store::save_records(&self.path, &subs)?;
        Ok(updated)
    }

    /// Bump `fire_count` for each id in one rewrite. Ids no longer in the
    /// store are ignored. Returns how many records changed.
    pub fn increment_fire_counts(&self, ids: &[String]) -> Result<usize, SubscriptionError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut subs = self.list()?;
        let mut changed = 0;
        for sub in subs.iter_mut().filter(|s| wanted.contains(s.id.as_str())) {
            sub.fire_count += 1;
            changed += 1;
        }
        if changed > 0 {
            store::save_records(&self.path, &subs)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn store() -> (tempfile::TempDir, SubscriptionStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = SwitchboardConfig::default();
        let store = SubscriptionStore::for_session(&config, &Layout::new(dir.path()), "s");
        (dir, store)
    }

    fn new_sub(id: &str, event: &str, outcome: &str, notify: &str) -> NewSubscription {
        NewSubscription {
            id: Some(id.into()),
            event: event.into(),
            outcome: outcome.into(),
            notify: notify.into(),
            action: "handle_event".into(),
            message: "{event} finished with {outcome}".into(),
            disabled: false,
        }
    }

    fn sub(event: &str, outcome: &str, enabled: bool) -> Subscription {
        Subscription {
            id: format!("{}-{}", event, outcome),
            event: event.into(),
            outcome: outcome.into(),
            notify: "build".into(),
            action: "a".into(),
            message: String::new(),
            enabled,
            created_at: at(0),
            fire_count: 0,
        }
    }

    #[test]
    fn add_list_round_trip_preserves_order() {
        let (_dir, store) = store();
        let a = store.add(new_sub("a", "build", "failure", "build"), at(10)).unwrap();
        let b = store.add(new_sub("b", "*", "*", "review"), at(20)).unwrap();
        let c = store.add(new_sub("c", "test", "success", "pm"), at(30)).unwrap();

        assert_eq!(store.list().unwrap(), vec![a, b, c]);
        assert_eq!(store.get("b").unwrap().unwrap().notify, "review");
        assert!(store.get("zzz").unwrap().is_none());
    }

    #[test]
    fn add_generates_id() {
        let (_dir, store) = store();
        let mut new = new_sub("x", "build", "*", "build");
        new.id = None;
        let sub = store.add(new, at(0)).unwrap();
        assert!(sub.id.starts_with("sub-"));
        assert_eq!(sub.id.len(), "sub-".len() + 8);
        assert!(sub.enabled);
    }

    #[test]
    fn add_validates_before_writing() {
        let (dir, store) = store();
        let cases = [
            new_sub("a", "nope", "*", "build"),
            new_sub("a", "build", "maybe", "build"),
            new_sub("a", "build", "*", "nobody"),
            new_sub("bad id", "build", "*", "build"),
        ];
        let errs: Vec<SubscriptionError> = cases
            .into_iter()
            .map(|c| store.add(c, at(0)).unwrap_err())
            .collect();
        assert!(matches!(errs[0], SubscriptionError::UnknownEvent(_)));
        assert!(matches!(errs[1], SubscriptionError::UnknownOutcome(_)));
        assert!(matches!(errs[2], SubscriptionError::UnknownRole(_)));
        assert!(matches!(errs[3], SubscriptionError::InvalidId(_)));

        let mut blank = new_sub("a", "build", "*", "build");
        blank.action = "  ".into();
        assert!(matches!(
            store.add(blank, at(0)),
            Err(SubscriptionError::MissingAction)
        ));
        assert!(!Layout::new(dir.path()).subscriptions("s").exists());
    }

    #[test]
    fn duplicate_id_rejected() {
        let (_dir, store) = store();
        store.add(new_sub("a", "build", "*", "build"), at(0)).unwrap();
        let err = store.add(new_sub("a", "test", "*", "test"), at(1)).unwrap_err();
        assert!(matches!(err, SubscriptionError::Duplicate(ref id) if id == "a"));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn remove_and_toggle() {
        let (_dir, store) = store();
        store.add(new_sub("a", "build", "*", "build"), at(0)).unwrap();
        store.add(new_sub("b", "test", "*", "test"), at(0)).unwrap();

        assert!(!store.set_enabled("a", false).unwrap().enabled);
        assert!(!store.get("a").unwrap().unwrap().enabled);
        assert!(store.set_enabled("a", true).unwrap().enabled);

        assert_eq!(store.remove("a").unwrap().id, "a");
        let ids: Vec<String> = store.list().unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["b"]);

        assert!(matches!(store.remove("a"), Err(SubscriptionError::NotFound(_))));
        assert!(matches!(
            store.set_enabled("a", true),
            Err(SubscriptionError::NotFound(_))
        ));
    }

    #[test]
    fn increment_fire_counts_once_per_id() {
        let (_dir, store) = store();
        store.add(new_sub("a", "build", "*", "build"), at(0)).unwrap();
        store.add(new_sub("b", "test", "*", "test"), at(0)).unwrap();
        store.add(new_sub("c", "lint", "*", "test"), at(0)).unwrap();

        let changed = store
            .increment_fire_counts(&["a".into(), "c".into(), "gone".into()])
            .unwrap();
        assert_eq!(changed, 2);
        store.increment_fire_counts(&["a".into()]).unwrap();

        let counts: Vec<u64> = store.list().unwrap().iter().map(|s| s.fire_count).collect();
        assert_eq!(counts, vec![2, 0, 1]);
        assert_eq!(store.increment_fire_counts(&[]).unwrap(), 0);
    }

    #[test]
    fn wildcards_match_independently() {
        let subs = vec![sub("*", "failure", true), sub("build", "*", true)];

        let both = matching(&subs, "build", "failure");
        assert_eq!(both.len(), 2);
        assert_eq!(both[0].id, "*-failure");
        assert_eq!(both[1].id, "build-*");

        assert!(matching(&subs, "test", "success").is_empty());
        assert_eq!(matching(&subs, "test", "failure").len(), 1);
        assert_eq!(matching(&subs, "build", "success").len(), 1);
    }

    #[test]
    fn disabled_subscriptions_never_match() {
        let subs = vec![sub("*", "*", false), sub("build", "success", true)];
        let matched = matching(&subs, "build", "success");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "build-success");
    }
}
