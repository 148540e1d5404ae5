//! tokio-modbus backend for TCP and RTU links.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio_modbus::client::{Context, Reader, Writer};
use tokio_modbus::prelude::*;
use tracing::{debug, info};

use super::{Request, Response, Transport};
use crate::error::ExchangeError;

/// Serial line parameters for RTU links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub parity: tokio_serial::Parity,
    pub stop_bits: tokio_serial::StopBits,
}

impl SerialSettings {
    /// 8N1 settings at the given baud rate.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            parity: tokio_serial::Parity::None,
            stop_bits: tokio_serial::StopBits::One,
        }
    }
}

/// Where a [`ModbusTransport`] connects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEndpoint {
    Tcp(SocketAddr),
    Rtu(SerialSettings),
}

impl std::fmt::Display for TransportEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportEndpoint::Tcp(addr) => write!(f, "tcp://{}", addr),
            TransportEndpoint::Rtu(serial) => {
                write!(f, "rtu://{}@{}", serial.port, serial.baud_rate)
            }
        }
    }
}

/// Modbus TCP/RTU transport backed by a tokio-modbus client context.
///
/// The context is opened lazily on the first request. It is dropped after any
/// transport-level error or timeout, so a late reply can never be read as the
/// answer to the next request.
pub struct ModbusTransport {
    endpoint: TransportEndpoint,
    ctx: Option<Context>,
}

impl ModbusTransport {
    pub fn new(endpoint: TransportEndpoint) -> Self {
        Self { endpoint, ctx: None }
    }

    pub fn endpoint(&self) -> &TransportEndpoint {
        &self.endpoint
    }

    async fn connect(endpoint: &TransportEndpoint) -> Result<Context, ExchangeError> {
        // The unit id is set per request; this is only the initial one.
        let slave = Slave(1);

        match endpoint {
            TransportEndpoint::Tcp(addr) => {
                let ctx = tcp::connect_slave(*addr, slave).await.map_err(|e| {
                    ExchangeError::link(format!("TCP connect to {} failed: {}", addr, e))
                })?;
                Ok(ctx)
            }
            TransportEndpoint::Rtu(serial) => {
                let builder = tokio_serial::new(&serial.port, serial.baud_rate)
                    .parity(serial.parity)
                    .stop_bits(serial.stop_bits)
                    .data_bits(serial.data_bits);

                let stream = tokio_serial::SerialStream::open(&builder)
                    .map_err(|e| ExchangeError::link(format!("Serial open failed: {}", e)))?;

                Ok(rtu::attach_slave(stream, slave))
            }
        }
    }

    async fn context(&mut self) -> Result<&mut Context, ExchangeError> {
        if self.ctx.is_none() {
            let ctx = Self::connect(&self.endpoint).await?;
            info!(endpoint = %self.endpoint, "Modbus connection established");
            self.ctx = Some(ctx);
        }
        self.ctx
            .as_mut()
            .ok_or_else(|| ExchangeError::link("Not connected"))
    }

    async fn call(ctx: &mut Context, request: &Request) -> Result<Response, CallError> {
        ctx.set_slave(Slave(request.slave()));

        match *request {
            Request::ReadCoils { address, count, .. } => {
                let bits = ctx.read_coils(address, count).await??;
                Ok(Response::Coils(bits.into_iter().map(u16::from).collect()))
            }
            Request::ReadHoldingRegisters { address, count, .. } => {
                let words = ctx.read_holding_registers(address, count).await??;
                Ok(Response::Registers(words))
            }
            Request::WriteSingleCoil { address, value, .. } => {
                ctx.write_single_coil(address, value).await??;
                Ok(Response::Written)
            }
            Request::WriteSingleRegister { address, value, .. } => {
                ctx.write_single_register(address, value).await??;
                Ok(Response::Written)
            }
        }
    }
}

/// Outcome of a tokio-modbus call before mapping.
enum CallError {
    Transport(tokio_modbus::Error),
    Exception(tokio_modbus::ExceptionCode),
}

impl From<tokio_modbus::Error> for CallError {
    fn from(e: tokio_modbus::Error) -> Self {
        CallError::Transport(e)
    }
}

impl From<tokio_modbus::ExceptionCode> for CallError {
    fn from(code: tokio_modbus::ExceptionCode) -> Self {
        CallError::Exception(code)
    }
}

#[async_trait]
impl Transport for ModbusTransport {
    async fn exchange(&mut self, request: &Request) -> Result<Response, ExchangeError> {
        let ctx = self.context().await?;

        match Self::call(ctx, request).await {
            Ok(response) => Ok(response),
            Err(CallError::Exception(code)) => {
                Err(ExchangeError::Exception(format!("{:?}", code)))
            }
            Err(CallError::Transport(e)) => {
                debug!(endpoint = %self.endpoint, error = %e, "Dropping Modbus connection");
                self.ctx = None;
                Err(ExchangeError::link(e.to_string()))
            }
        }
    }

    fn reset(&mut self) {
        if self.ctx.take().is_some() {
            debug!(endpoint = %self.endpoint, "Dropping Modbus connection after timeout");
        }
    }

    async fn reconnect(&mut self) -> Result<(), ExchangeError> {
        self.ctx = None;
        let ctx = Self::connect(&self.endpoint).await?;
        info!(endpoint = %self.endpoint, "Modbus connection re-established");
        self.ctx = Some(ctx);
        Ok(())
    }
}
