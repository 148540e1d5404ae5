//! Bridge status reporting.

use serde::{Deserialize, Serialize};

use modbus_light_engine::Engine;

use crate::error::Result;
use crate::keyexpr;
use crate::publisher::Publisher;

/// Bridge status information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub bridge: String,
    pub version: String,
    /// Current status ("running" or "offline").
    pub status: String,
    /// Lights and hub health.
    #[serde(flatten)]
    pub metadata: serde_json::Value,
}

impl BridgeStatus {
    pub fn running(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "running".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn offline(bridge: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            bridge: bridge.into(),
            version: version.into(),
            status: "offline".to_string(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Publish this status to `{key_prefix}/@/status`.
    pub async fn publish(&self, publisher: &Publisher) -> Result<()> {
        let key = keyexpr::status_key(publisher.key_prefix());
        publisher.publish_json(&key, self).await
    }
}

/// Lights and per-hub health, for the status payload.
pub fn engine_metadata(engine: &Engine) -> serde_json::Value {
    let lights: Vec<_> = engine
        .descriptors()
        .iter()
        .map(|d| {
            serde_json::json!({
                "name": d.id,
                "hub": d.link,
                "kind": d.kind.as_str(),
                "slave": d.slave,
                "address": d.address,
                "scan_interval": d.scan_interval.as_secs(),
            })
        })
        .collect();

    let hubs: serde_json::Map<String, serde_json::Value> = engine
        .links()
        .map(|link| {
            (
                link.name().to_string(),
                serde_json::to_value(link.health()).unwrap_or(serde_json::Value::Null),
            )
        })
        .collect();

    serde_json::json!({ "lights": lights, "hubs": hubs })
}
