//! On-demand actuator writes.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::cache::StateCache;
use crate::codec;
use crate::descriptor::ActuatorDescriptor;
use crate::error::WriteError;
use crate::sink::EventSink;
use crate::transport::{Link, Response};

/// Acknowledgement of a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub id: String,
    pub is_on: bool,
    pub timestamp: DateTime<Utc>,
}

struct Target {
    descriptor: ActuatorDescriptor,
    link: Arc<Link>,
    /// Serializes writes to this actuator.
    lock: tokio::sync::Mutex<()>,
}

/// Turns "set ON/OFF" requests into Modbus writes.
///
/// Successful writes update the cache immediately (optimistic update); the
/// next poll corrects it if the device disagrees. Writes are never retried.
pub struct CommandDispatcher {
    targets: HashMap<String, Target>,
    cache: Arc<StateCache>,
    sink: Arc<dyn EventSink>,
}

impl CommandDispatcher {
    pub fn new(cache: Arc<StateCache>, sink: Arc<dyn EventSink>) -> Self {
        Self {
            targets: HashMap::new(),
            cache,
            sink,
        }
    }

    /// Make an actuator writable through the given link.
    pub fn register(&mut self, descriptor: ActuatorDescriptor, link: Arc<Link>) {
        self.targets.insert(
            descriptor.id.clone(),
            Target {
                descriptor,
                link,
                lock: tokio::sync::Mutex::new(()),
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.targets.contains_key(id)
    }

    /// Drive an actuator to the requested state.
    pub async fn request_write(&self, id: &str, desired_on: bool) -> Result<Ack, WriteError> {
        let target = self
            .targets
            .get(id)
            .ok_or_else(|| WriteError::UnknownActuator(id.to_string()))?;

        // A second writer to the same actuator waits for the first to finish.
        let _serial = target.lock.lock().await;

        self.cache.begin_write(id);
        let request = codec::encode_write(&target.descriptor, desired_on);
        debug!(actuator = %id, desired_on, ?request, "Writing actuator");

        let result = target.link.exchange(&request).await;

        let outcome = match result {
            Ok(Response::Written) => {
                let timestamp = Utc::now();
                if let Some(change) = self.cache.set(id, desired_on, timestamp) {
                    self.sink
                        .on_state_changed(&change.id, change.is_on, change.timestamp);
                }
                info!(actuator = %id, is_on = desired_on, "Actuator written");
                Ok(Ack {
                    id: id.to_string(),
                    is_on: desired_on,
                    timestamp,
                })
            }
            Ok(other) => {
                warn!(actuator = %id, response = other.kind(), "Unexpected write response");
                Err(WriteError::UnexpectedResponse {
                    id: id.to_string(),
                    actual: other.kind(),
                })
            }
            Err(source) => {
                warn!(actuator = %id, error = %source, "Actuator write failed");
                Err(WriteError::Exchange {
                    id: id.to_string(),
                    source,
                })
            }
        };

        self.cache.end_write(id);
        outcome
    }
}
