//! Payload types exchanged over Zenoh and their encodings.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Serialization format for published payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON format (human-readable, good for debugging).
    #[default]
    Json,

    /// CBOR format (compact binary).
    Cbor,
}

impl Format {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Cbor => "application/cbor",
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => Ok(serde_json::to_vec(value)?),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf)?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    match format {
        Format::Json => Ok(serde_json::from_slice(data)?),
        Format::Cbor => Ok(ciborium::from_reader(data)?),
    }
}

/// Published state of one light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightState {
    pub light: String,
    pub on: bool,
    pub timestamp: DateTime<Utc>,
}

/// Command addressed to a light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LightCommand {
    TurnOn {
        #[serde(default)]
        light: String,
    },
    TurnOff {
        #[serde(default)]
        light: String,
    },
    /// Read the light now instead of waiting for the next poll.
    Refresh {
        #[serde(default)]
        light: String,
    },
}

impl LightCommand {
    pub fn light(&self) -> &str {
        match self {
            LightCommand::TurnOn { light }
            | LightCommand::TurnOff { light }
            | LightCommand::Refresh { light } => light,
        }
    }

    /// Name used in command results.
    pub fn name(&self) -> &'static str {
        match self {
            LightCommand::TurnOn { .. } => "turn_on",
            LightCommand::TurnOff { .. } => "turn_off",
            LightCommand::Refresh { .. } => "refresh",
        }
    }

    /// Parse the payload of a `{prefix}/{light}/set` sample.
    ///
    /// Accepts `ON`/`OFF`, `true`/`false`, `1`/`0` (bare or JSON-quoted, any
    /// case) or a JSON command object. The light always comes from the key.
    pub fn from_set_payload(light: &str, payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| BridgeError::Serialization(format!("Payload is not UTF-8: {}", e)))?
            .trim();

        let word = text.trim_matches('"').to_ascii_lowercase();
        match word.as_str() {
            "on" | "true" | "1" => {
                return Ok(LightCommand::TurnOn {
                    light: light.to_string(),
                });
            }
            "off" | "false" | "0" => {
                return Ok(LightCommand::TurnOff {
                    light: light.to_string(),
                });
            }
            _ => {}
        }

        let command: LightCommand = serde_json::from_str(text)?;
        if !command.light().is_empty() && command.light() != light {
            return Err(BridgeError::Serialization(format!(
                "Command names light '{}' but was sent to '{}'",
                command.light(),
                light
            )));
        }
        Ok(command.with_light(light))
    }

    fn with_light(self, light: &str) -> Self {
        let light = light.to_string();
        match self {
            LightCommand::TurnOn { .. } => LightCommand::TurnOn { light },
            LightCommand::TurnOff { .. } => LightCommand::TurnOff { light },
            LightCommand::Refresh { .. } => LightCommand::Refresh { light },
        }
    }
}

/// Outcome of a [`LightCommand`], published on the command result key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub light: String,
    pub command: String,
    pub success: bool,
    /// Light state after the command, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CommandResult {
    pub fn ok(command: &LightCommand, on: bool) -> Self {
        Self {
            light: command.light().to_string(),
            command: command.name().to_string(),
            success: true,
            on: Some(on),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(command: &LightCommand, error: impl ToString) -> Self {
        Self {
            light: command.light().to_string(),
            command: command.name().to_string(),
            success: false,
            on: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(payload: &str) -> Result<LightCommand> {
        LightCommand::from_set_payload("hall", payload.as_bytes())
    }

    #[test]
    fn test_set_payload_words() {
        let on = LightCommand::TurnOn {
            light: "hall".into(),
        };
        let off = LightCommand::TurnOff {
            light: "hall".into(),
        };

        for payload in ["ON", "on", " On\n", "\"ON\"", "true", "1"] {
            assert_eq!(set(payload).unwrap(), on, "payload {:?}", payload);
        }
        for payload in ["OFF", "off", "\"off\"", "false", "0"] {
            assert_eq!(set(payload).unwrap(), off, "payload {:?}", payload);
        }
    }

    #[test]
    fn test_set_payload_json_command() {
        assert_eq!(
            set(r#"{"type": "refresh"}"#).unwrap(),
            LightCommand::Refresh {
                light: "hall".into()
            }
        );
        assert_eq!(
            set(r#"{"type": "turn_on", "light": "hall"}"#).unwrap(),
            LightCommand::TurnOn {
                light: "hall".into()
            }
        );
        assert!(set(r#"{"type": "turn_on", "light": "porch"}"#).is_err());
    }

    #[test]
    fn test_set_payload_garbage() {
        assert!(set("dim").is_err());
        assert!(LightCommand::from_set_payload("hall", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_deserialize_commands() {
        let json = r#"{"type": "turn_off", "light": "porch"}"#;
        let cmd: LightCommand = serde_json::from_str(json).unwrap();
        assert_eq!(cmd.light(), "porch");
        assert_eq!(cmd.name(), "turn_off");
    }

    #[test]
    fn test_light_state_formats() {
        let state = LightState {
            light: "hall".into(),
            on: true,
            timestamp: Utc::now(),
        };

        let json = encode(&state, Format::Json).unwrap();
        assert!(String::from_utf8_lossy(&json).contains("\"on\":true"));

        let cbor = encode(&state, Format::Cbor).unwrap();
        assert!(cbor.len() < json.len());
        assert_eq!(decode::<LightState>(&cbor, Format::Cbor).unwrap(), state);
    }

    #[test]
    fn test_command_result_serialization() {
        let cmd = LightCommand::TurnOn {
            light: "hall".into(),
        };
        let json = serde_json::to_string(&CommandResult::failed(&cmd, "timeout")).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"error\":\"timeout\""));
        assert!(!json.contains("\"on\""));

        let json = serde_json::to_string(&CommandResult::ok(&cmd, true)).unwrap();
        assert!(json.contains("\"on\":true"));
        assert!(!json.contains("error"));
    }

    #[test]
    fn test_mime_type() {
        assert_eq!(Format::Json.mime_type(), "application/json");
        assert_eq!(Format::Cbor.mime_type(), "application/cbor");
    }
}
