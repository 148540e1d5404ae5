//! Zenoh bridge for Modbus lights.
//!
//! Exposes coil- and holding-register-backed lights (TCP or RTU/serial) on
//! Zenoh: states are polled by [`modbus_light_engine`] and published, ON/OFF
//! commands are subscribed and written back.
//!
//! # Key Expressions
//!
//! ```text
//! zensight/modbus_light/<light>/state
//! zensight/modbus_light/<light>/set
//! zensight/modbus_light/@/status
//! zensight/modbus_light/@/commands
//! zensight/modbus_light/@/commands/result
//! ```

pub mod bridge;
pub mod commands;
pub mod config;
pub mod error;
pub mod keyexpr;
pub mod logging;
pub mod payload;
pub mod publisher;
pub mod recovery;
pub mod session;
pub mod state_store;
pub mod status;

pub use bridge::{BRIDGE_NAME, LightBridge};
pub use config::LightBridgeConfig;
pub use error::{BridgeError, Result};
pub use payload::{CommandResult, Format, LightCommand, LightState};
