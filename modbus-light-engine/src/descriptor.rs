//! Immutable actuator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Default raw value written to turn a register actuator on.
pub const DEFAULT_COMMAND_ON: u16 = 0x01;

/// Default raw value written to turn a register actuator off.
pub const DEFAULT_COMMAND_OFF: u16 = 0x00;

/// How an actuator is backed on the Modbus device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActuatorKind {
    /// A single coil (FC 01 read, FC 05 write).
    Coil,
    /// A holding register driven with two sentinel values (FC 03 read, FC 06 write).
    HoldingRegister {
        command_on: u16,
        command_off: u16,
        /// Register to read state from, when it differs from the written one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        verify_address: Option<u16>,
    },
}

impl ActuatorKind {
    /// Holding register kind with the default 0x01/0x00 commands.
    pub fn holding_register() -> Self {
        Self::HoldingRegister {
            command_on: DEFAULT_COMMAND_ON,
            command_off: DEFAULT_COMMAND_OFF,
            verify_address: None,
        }
    }

    /// Return the string name for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorKind::Coil => "coil",
            ActuatorKind::HoldingRegister { .. } => "holding",
        }
    }
}

/// Configuration of one boolean actuator. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorDescriptor {
    /// Unique actuator id (the light name on the host side).
    pub id: String,
    pub kind: ActuatorKind,
    /// Coil or register address (0-based).
    pub address: u16,
    /// Name of the link the actuator lives on.
    pub link: String,
    /// Modbus unit/slave id (1-247).
    pub slave: u8,
    pub scan_interval: Duration,
}

impl ActuatorDescriptor {
    /// Descriptor for a coil actuator.
    pub fn coil(
        id: impl Into<String>,
        link: impl Into<String>,
        slave: u8,
        address: u16,
        scan_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ActuatorKind::Coil,
            address,
            link: link.into(),
            slave,
            scan_interval,
        }
    }

    /// Descriptor for a holding register actuator with explicit commands.
    pub fn holding_register(
        id: impl Into<String>,
        link: impl Into<String>,
        slave: u8,
        address: u16,
        command_on: u16,
        command_off: u16,
        scan_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            kind: ActuatorKind::HoldingRegister {
                command_on,
                command_off,
                verify_address: None,
            },
            address,
            link: link.into(),
            slave,
            scan_interval,
        }
    }

    /// Read state from a different register than the one written.
    ///
    /// Has no effect on coil actuators.
    pub fn with_verify_address(mut self, address: u16) -> Self {
        if let ActuatorKind::HoldingRegister { verify_address, .. } = &mut self.kind {
            *verify_address = Some(address);
        }
        self
    }

    /// Address polled to learn the actuator state.
    pub fn read_address(&self) -> u16 {
        match self.kind {
            ActuatorKind::HoldingRegister {
                verify_address: Some(addr),
                ..
            } => addr,
            _ => self.address,
        }
    }

    /// Check the descriptor on its own (link existence is checked by the engine).
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EngineError::EmptyId);
        }
        if self.scan_interval.is_zero() {
            return Err(EngineError::ZeroInterval(self.id.clone()));
        }
        if self.slave == 0 || self.slave > 247 {
            return Err(EngineError::InvalidSlave {
                id: self.id.clone(),
                slave: self.slave,
            });
        }
        Ok(())
    }
}
