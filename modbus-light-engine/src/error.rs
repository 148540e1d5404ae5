//! Error types for the actuator engine.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single request/response exchange on a link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// No response arrived before the link deadline.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// Transport-level failure (connection reset, serial error, ...).
    #[error("Link failure: {0}")]
    Link(String),

    /// The device answered with a Modbus exception.
    #[error("Modbus exception: {0}")]
    Exception(String),

    /// The link exceeded its consecutive-failure threshold and fails fast.
    #[error("Link '{0}' is degraded")]
    Degraded(String),
}

impl ExchangeError {
    /// Create a link error from anything printable.
    pub fn link(msg: impl Into<String>) -> Self {
        Self::Link(msg.into())
    }

    /// Whether this failure counts against the link's health.
    ///
    /// Exception replies prove the device is reachable, so they do not.
    pub fn is_link_failure(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Link(_))
    }
}

/// A well-formed response that cannot be interpreted for the actuator kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Expected {expected} value(s), got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("Raw coil value 0x{0:04X} is out of range")]
    OutOfRange(u16),

    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: &'static str,
        actual: &'static str,
    },
}

/// Failure of a poll read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unknown actuator '{0}'")]
    UnknownActuator(String),
}

/// Failure of a commanded write, surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    #[error("Unknown actuator '{0}'")]
    UnknownActuator(String),

    #[error("Write to '{id}' failed: {source}")]
    Exchange {
        id: String,
        #[source]
        source: ExchangeError,
    },

    #[error("Write to '{id}' got an unexpected response: {actual}")]
    UnexpectedResponse { id: String, actual: &'static str },
}

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Actuator id cannot be empty")]
    EmptyId,

    #[error("Duplicate actuator id '{0}'")]
    DuplicateId(String),

    #[error("Duplicate link name '{0}'")]
    DuplicateLink(String),

    #[error("Actuator '{id}': unknown link '{link}'")]
    UnknownLink { id: String, link: String },

    #[error("Actuator '{0}': scan interval must be greater than zero")]
    ZeroInterval(String),

    #[error("Actuator '{id}': slave id {slave} is outside 1-247")]
    InvalidSlave { id: String, slave: u8 },

    #[error("Unknown actuator '{0}'")]
    UnknownActuator(String),
}

/// Result type alias for engine construction.
pub type Result<T> = std::result::Result<T, EngineError>;
