//! Modbus light engine.
//!
//! Polls and drives boolean actuators (lights, relays) backed by Modbus coils
//! or holding registers:
//!
//! - [`transport`] - serialized links with timeouts and degradation tracking
//! - [`codec`] - request building and ON/OFF decoding rules
//! - [`cache`] - last-known state per actuator
//! - [`scheduler`] - one timer per (link, interval) group, skipping overlapping ticks
//! - [`dispatcher`] - commanded writes with optimistic cache updates
//! - [`sink`] - the host boundary (state events, restored state)
//! - [`engine`] - wires everything together
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use modbus_light_engine::{ActuatorDescriptor, ChannelSink, Engine, Link, LinkOptions};
//! use modbus_light_engine::transport::{ModbusTransport, TransportEndpoint};
//!
//! let link = Arc::new(Link::new(
//!     "hub1",
//!     ModbusTransport::new(TransportEndpoint::Tcp("192.168.1.10:502".parse()?)),
//!     LinkOptions::default(),
//! ));
//! let (sink, mut events) = ChannelSink::new();
//! let engine = Engine::new(
//!     vec![ActuatorDescriptor::coil("hall", "hub1", 1, 1234, Duration::from_secs(5))],
//!     [link],
//!     Arc::new(sink),
//! )?;
//! engine.start();
//! engine.request_write("hall", true).await?;
//! ```

pub mod cache;
pub mod codec;
pub mod descriptor;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod sink;
pub mod transport;

pub use cache::{ActuatorState, StateCache, StateChange};
pub use descriptor::{ActuatorDescriptor, ActuatorKind, DEFAULT_COMMAND_OFF, DEFAULT_COMMAND_ON};
pub use dispatcher::{Ack, CommandDispatcher};
pub use engine::Engine;
pub use error::{DecodeError, EngineError, ExchangeError, ReadError, WriteError};
pub use scheduler::{PollGroup, PollScheduler, PollSummary, TickOutcome};
pub use sink::{ChannelSink, EngineEvent, EventSink};
pub use transport::{Link, LinkHealth, LinkOptions, LinkStatus, Request, Response, Transport};
