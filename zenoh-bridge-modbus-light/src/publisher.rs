//! Publishing light states and bridge messages to Zenoh.

use serde::Serialize;
use zenoh::Session;
use zenoh::bytes::Encoding;

use crate::error::{BridgeError, Result};
use crate::keyexpr;
use crate::payload::{CommandResult, Format, LightState, encode};

/// Wraps a Zenoh session with the bridge's key prefix and payload format.
#[derive(Clone, Debug)]
pub struct Publisher {
    session: Session,
    key_prefix: String,
    format: Format,
}

impl Publisher {
    pub fn new(session: Session, key_prefix: impl Into<String>, format: Format) -> Self {
        Self {
            session,
            key_prefix: key_prefix.into(),
            format,
        }
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Publish a light state on `{prefix}/{light}/state` in the configured format.
    pub async fn publish_state(&self, state: &LightState) -> Result<()> {
        let key = keyexpr::state_key(&self.key_prefix, &state.light);
        let payload = encode(state, self.format)?;
        let encoding = match self.format {
            Format::Json => Encoding::APPLICATION_JSON,
            Format::Cbor => Encoding::APPLICATION_CBOR,
        };
        self.put(&key, payload, encoding).await
    }

    /// Publish a command outcome on `{prefix}/@/commands/result`.
    pub async fn publish_result(&self, result: &CommandResult) -> Result<()> {
        let key = keyexpr::command_result_key(&self.key_prefix);
        self.publish_json(&key, result).await
    }

    /// Publish a JSON value to a key.
    pub async fn publish_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.put(key, payload, Encoding::APPLICATION_JSON).await
    }

    async fn put(&self, key: &str, payload: Vec<u8>, encoding: Encoding) -> Result<()> {
        self.session
            .put(key, payload)
            .encoding(encoding)
            .await
            .map_err(|e| BridgeError::Publish {
                key: key.to_string(),
                message: e.to_string(),
            })
    }
}
