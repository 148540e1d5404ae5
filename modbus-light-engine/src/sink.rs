//! Boundary to the host framework.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::ReadError;

/// Callbacks the engine uses to talk to its host.
///
/// Methods are synchronous and called from engine tasks; implementations that
/// need async I/O should hand events off (see [`ChannelSink`]).
pub trait EventSink: Send + Sync {
    /// An actuator's boolean state changed (or became known).
    fn on_state_changed(&self, id: &str, is_on: bool, timestamp: DateTime<Utc>);

    /// A poll read failed; the cached value was left untouched.
    fn on_read_failed(&self, _id: &str, _error: &ReadError) {}

    /// Last state the host remembers for an actuator, asked once at startup.
    fn restore_last_state(&self, _id: &str) -> Option<bool> {
        None
    }
}

/// Event forwarded by a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StateChanged {
        id: String,
        is_on: bool,
        timestamp: DateTime<Utc>,
    },
    ReadFailed {
        id: String,
        error: String,
    },
}

/// Sink that forwards events to an unbounded tokio channel.
///
/// Restored states are looked up in a fixed map supplied at construction.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
    restored: std::collections::HashMap<String, bool>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                restored: Default::default(),
            },
            rx,
        )
    }

    /// Answer `restore_last_state` from the given map.
    pub fn with_restored(mut self, restored: impl IntoIterator<Item = (String, bool)>) -> Self {
        self.restored = restored.into_iter().collect();
        self
    }

    fn send(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped, discarding event");
        }
    }
}

impl EventSink for ChannelSink {
    fn on_state_changed(&self, id: &str, is_on: bool, timestamp: DateTime<Utc>) {
        self.send(EngineEvent::StateChanged {
            id: id.to_string(),
            is_on,
            timestamp,
        });
    }

    fn on_read_failed(&self, id: &str, error: &ReadError) {
        self.send(EngineEvent::ReadFailed {
            id: id.to_string(),
            error: error.to_string(),
        });
    }

    fn restore_last_state(&self, id: &str) -> Option<bool> {
        self.restored.get(id).copied()
    }
}
