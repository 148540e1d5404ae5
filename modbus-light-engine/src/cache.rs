//! Last-known actuator state.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cached state of one actuator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorState {
    /// `None` until the first restore, read or write.
    pub is_on: Option<bool>,
    /// Time of the last live read or write.
    pub last_updated: Option<DateTime<Utc>>,
    /// A commanded write is in flight.
    pub pending_write: bool,
    /// Whether a live read or write has ever landed.
    #[serde(skip)]
    live: bool,
}

impl ActuatorState {
    pub fn is_unknown(&self) -> bool {
        self.is_on.is_none()
    }

    /// Whether the value came from the device rather than a restore.
    pub fn is_live(&self) -> bool {
        self.live
    }
}

/// A boolean transition worth reporting to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub id: String,
    pub is_on: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-actuator state shared by the scheduler and the dispatcher.
///
/// The lock is only held for in-memory updates, never across I/O.
#[derive(Debug, Default)]
pub struct StateCache {
    entries: RwLock<HashMap<String, ActuatorState>>,
}

impl StateCache {
    /// Create a cache with an Unknown entry for every id.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = ids
            .into_iter()
            .map(|id| (id.into(), ActuatorState::default()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ActuatorState> {
        self.read().get(id).cloned()
    }

    /// Record a live value.
    ///
    /// Always refreshes `last_updated`. Returns a change only when the boolean
    /// flipped or the entry left Unknown.
    pub fn set(&self, id: &str, is_on: bool, timestamp: DateTime<Utc>) -> Option<StateChange> {
        let mut entries = self.write();
        let state = entries.get_mut(id)?;

        let changed = state.is_on != Some(is_on);
        state.is_on = Some(is_on);
        state.last_updated = Some(timestamp);
        state.live = true;

        changed.then(|| StateChange {
            id: id.to_string(),
            is_on,
            timestamp,
        })
    }

    /// Apply a restored value, unless a live read or write already landed.
    ///
    /// Returns whether the seed took effect.
    pub fn seed(&self, id: &str, is_on: bool) -> bool {
        let mut entries = self.write();
        match entries.get_mut(id) {
            Some(state) if !state.live => {
                state.is_on = Some(is_on);
                true
            }
            _ => false,
        }
    }

    pub fn begin_write(&self, id: &str) {
        if let Some(state) = self.write().get_mut(id) {
            state.pending_write = true;
        }
    }

    pub fn end_write(&self, id: &str) {
        if let Some(state) = self.write().get_mut(id) {
            state.pending_write = false;
        }
    }

    /// Forget everything known about an actuator.
    pub fn reset(&self, id: &str) {
        if let Some(state) = self.write().get_mut(id) {
            *state = ActuatorState::default();
        }
    }

    /// Copy of all entries.
    pub fn snapshot(&self) -> HashMap<String, ActuatorState> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ActuatorState>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ActuatorState>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_initially_unknown() {
        let cache = StateCache::new(["hall"]);
        let state = cache.get("hall").unwrap();
        assert!(state.is_unknown());
        assert!(!state.is_live());
        assert!(cache.get("attic").is_none());
    }

    #[test]
    fn test_set_reports_changes_only() {
        let cache = StateCache::new(["hall"]);
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);

        // Leaving Unknown is a change, even to OFF.
        let change = cache.set("hall", false, t0).unwrap();
        assert!(!change.is_on);

        // Same value again: timestamp moves, no change.
        assert!(cache.set("hall", false, t1).is_none());
        assert_eq!(cache.get("hall").unwrap().last_updated, Some(t1));

        let change = cache.set("hall", true, t1).unwrap();
        assert_eq!(change.id, "hall");
        assert!(change.is_on);
        assert_eq!(change.timestamp, t1);
    }

    #[test]
    fn test_set_unknown_id() {
        let cache = StateCache::new(["hall"]);
        assert!(cache.set("attic", true, Utc::now()).is_none());
        assert!(!cache.contains("attic"));
    }

    #[test]
    fn test_seed_then_live() {
        let cache = StateCache::new(["hall"]);
        assert!(cache.seed("hall", true));
        assert_eq!(cache.get("hall").unwrap().is_on, Some(true));

        cache.set("hall", false, Utc::now());
        assert_eq!(cache.get("hall").unwrap().is_on, Some(false));
    }

    #[test]
    fn test_seed_never_overwrites_live() {
        let cache = StateCache::new(["hall"]);
        cache.set("hall", false, Utc::now());

        assert!(!cache.seed("hall", true));
        assert_eq!(cache.get("hall").unwrap().is_on, Some(false));
    }

    #[test]
    fn test_seed_order_independent() {
        let now = Utc::now();

        let a = StateCache::new(["hall"]);
        a.seed("hall", true);
        a.set("hall", false, now);

        let b = StateCache::new(["hall"]);
        b.set("hall", false, now);
        b.seed("hall", true);

        assert_eq!(a.get("hall"), b.get("hall"));
    }

    #[test]
    fn test_seeded_value_equal_to_live_is_not_a_change() {
        let cache = StateCache::new(["hall"]);
        cache.seed("hall", true);
        assert!(cache.set("hall", true, Utc::now()).is_none());
        assert!(cache.get("hall").unwrap().is_live());
    }

    #[test]
    fn test_pending_write_flag() {
        let cache = StateCache::new(["hall"]);
        cache.begin_write("hall");
        assert!(cache.get("hall").unwrap().pending_write);
        cache.end_write("hall");
        assert!(!cache.get("hall").unwrap().pending_write);
    }

    #[test]
    fn test_reset() {
        let cache = StateCache::new(["hall"]);
        cache.set("hall", true, Utc::now());
        cache.reset("hall");
        assert_eq!(cache.get("hall").unwrap(), ActuatorState::default());
        // A fresh seed is accepted again.
        assert!(cache.seed("hall", false));
    }
}
