//! Serialized Modbus links.
//!
//! A [`Link`] wraps one [`Transport`] backend (a TCP socket or a serial line)
//! and guarantees that at most one request is in flight on it at any time.
//! It also tracks consecutive failures: once a configurable threshold is hit
//! the link becomes [`LinkStatus::Degraded`] and fails every request fast until
//! [`Link::reconnect`] succeeds.

mod modbus;

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ExchangeError;

pub use modbus::{ModbusTransport, SerialSettings, TransportEndpoint};

/// A single Modbus request for one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// FC 01
    ReadCoils { slave: u8, address: u16, count: u16 },
    /// FC 03
    ReadHoldingRegisters { slave: u8, address: u16, count: u16 },
    /// FC 05
    WriteSingleCoil { slave: u8, address: u16, value: bool },
    /// FC 06
    WriteSingleRegister { slave: u8, address: u16, value: u16 },
}

impl Request {
    /// Target unit id.
    pub fn slave(&self) -> u8 {
        match *self {
            Request::ReadCoils { slave, .. }
            | Request::ReadHoldingRegisters { slave, .. }
            | Request::WriteSingleCoil { slave, .. }
            | Request::WriteSingleRegister { slave, .. } => slave,
        }
    }

    /// Target address.
    pub fn address(&self) -> u16 {
        match *self {
            Request::ReadCoils { address, .. }
            | Request::ReadHoldingRegisters { address, .. }
            | Request::WriteSingleCoil { address, .. }
            | Request::WriteSingleRegister { address, .. } => address,
        }
    }

    /// Modbus function code.
    pub fn function_code(&self) -> u8 {
        match self {
            Request::ReadCoils { .. } => 0x01,
            Request::ReadHoldingRegisters { .. } => 0x03,
            Request::WriteSingleCoil { .. } => 0x05,
            Request::WriteSingleRegister { .. } => 0x06,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Request::WriteSingleCoil { .. } | Request::WriteSingleRegister { .. }
        )
    }
}

/// Raw reply to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Raw coil status values, one per requested coil.
    ///
    /// Backends that unpack the status byte into bits report `0` or `1`;
    /// the codec only looks at the least significant bit.
    Coils(Vec<u16>),
    /// Raw holding register values.
    Registers(Vec<u16>),
    /// A write was acknowledged.
    Written,
}

impl Response {
    /// Short name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Coils(_) => "coils",
            Response::Registers(_) => "registers",
            Response::Written => "write acknowledgement",
        }
    }
}

/// Black-box request/response backend behind a [`Link`].
///
/// Implementations need not serialize access themselves; the owning link
/// holds an exclusive lock for the duration of each call.
#[async_trait]
pub trait Transport: Send {
    /// Send one request and wait for its response.
    async fn exchange(&mut self, request: &Request) -> Result<Response, ExchangeError>;

    /// Discard any connection state after an abandoned exchange.
    ///
    /// Called by the owning link when an exchange hits its deadline, so a
    /// late reply cannot be taken as the answer to the next request.
    fn reset(&mut self) {}

    /// Drop and re-establish the underlying connection.
    async fn reconnect(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }
}

/// Tunables for a [`Link`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Deadline for a single exchange.
    pub timeout: Duration,
    /// Consecutive failures before the link is marked degraded.
    pub failure_threshold: u32,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            failure_threshold: 5,
        }
    }
}

/// Health state of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    #[default]
    Healthy,
    Degraded,
}

impl std::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkStatus::Healthy => write!(f, "healthy"),
            LinkStatus::Degraded => write!(f, "degraded"),
        }
    }
}

/// Snapshot of a link's health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkHealth {
    pub status: LinkStatus,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// One serialized Modbus channel shared by many actuators.
pub struct Link {
    name: String,
    options: LinkOptions,
    transport: tokio::sync::Mutex<Box<dyn Transport>>,
    health: Mutex<LinkHealth>,
}

impl Link {
    /// Create a link over the given backend.
    pub fn new(
        name: impl Into<String>,
        transport: impl Transport + 'static,
        options: LinkOptions,
    ) -> Self {
        Self {
            name: name.into(),
            options,
            transport: tokio::sync::Mutex::new(Box::new(transport)),
            health: Mutex::new(LinkHealth::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> LinkOptions {
        self.options
    }

    /// Current health snapshot.
    pub fn health(&self) -> LinkHealth {
        self.health
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_degraded(&self) -> bool {
        self.health().status == LinkStatus::Degraded
    }

    /// Perform one exchange, waiting for any in-flight request to finish first.
    pub async fn exchange(&self, request: &Request) -> Result<Response, ExchangeError> {
        if self.is_degraded() {
            return Err(ExchangeError::Degraded(self.name.clone()));
        }

        let mut transport = self.transport.lock().await;

        // The link may have degraded while this request was queued.
        if self.is_degraded() {
            return Err(ExchangeError::Degraded(self.name.clone()));
        }

        debug!(
            link = %self.name,
            function = request.function_code(),
            slave = request.slave(),
            address = request.address(),
            "Modbus exchange"
        );

        let deadline = self.options.timeout;
        let outcome = tokio::time::timeout(deadline, transport.exchange(request)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                transport.reset();
                Err(ExchangeError::Timeout(deadline))
            }
        };

        self.record(&result);
        result
    }

    /// Re-establish the transport and clear the degraded state on success.
    pub async fn reconnect(&self) -> Result<(), ExchangeError> {
        let mut transport = self.transport.lock().await;

        let deadline = self.options.timeout;
        let outcome = tokio::time::timeout(deadline, transport.reconnect()).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                transport.reset();
                Err(ExchangeError::Timeout(deadline))
            }
        };

        match &result {
            Ok(()) => {
                let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
                if health.status == LinkStatus::Degraded {
                    info!(link = %self.name, "Link recovered after reconnect");
                }
                *health = LinkHealth::default();
            }
            Err(e) => {
                warn!(link = %self.name, error = %e, "Reconnect failed");
                let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);
                health.last_error = Some(e.to_string());
            }
        }

        result
    }

    fn record(&self, result: &Result<Response, ExchangeError>) {
        let mut health = self.health.lock().unwrap_or_else(PoisonError::into_inner);

        match result {
            Ok(_) => {
                if health.status == LinkStatus::Degraded {
                    info!(link = %self.name, "Link recovered");
                }
                *health = LinkHealth::default();
            }
            Err(e) if e.is_link_failure() => {
                health.consecutive_failures = health.consecutive_failures.saturating_add(1);
                health.last_error = Some(e.to_string());

                if health.status == LinkStatus::Healthy
                    && health.consecutive_failures >= self.options.failure_threshold
                {
                    health.status = LinkStatus::Degraded;
                    warn!(
                        link = %self.name,
                        failures = health.consecutive_failures,
                        error = %e,
                        "Link degraded, failing requests until reconnect"
                    );
                }
            }
            Err(e) => {
                // The device answered, so the channel itself works.
                health.consecutive_failures = 0;
                health.last_error = Some(e.to_string());
            }
        }
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("health", &self.health())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays scripted results and counts concurrent callers.
    struct Scripted {
        replies: VecDeque<Result<Response, ExchangeError>>,
        delay: Duration,
        active: Arc<AtomicUsize>,
        max_active: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<Response, ExchangeError>>) -> Self {
            Self {
                replies: replies.into(),
                delay: Duration::ZERO,
                active: Arc::new(AtomicUsize::new(0)),
                max_active: Arc::new(AtomicUsize::new(0)),
                resets: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn exchange(&mut self, _request: &Request) -> Result<Response, ExchangeError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.replies
                .pop_front()
                .unwrap_or(Ok(Response::Registers(vec![0])))
        }

        fn reset(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn read() -> Request {
        Request::ReadCoils {
            slave: 1,
            address: 0,
            count: 1,
        }
    }

    #[test]
    fn test_request_accessors() {
        let req = Request::WriteSingleRegister {
            slave: 3,
            address: 40,
            value: 1,
        };
        assert_eq!(req.slave(), 3);
        assert_eq!(req.address(), 40);
        assert_eq!(req.function_code(), 0x06);
        assert!(req.is_write());
        assert!(!read().is_write());
    }

    #[tokio::test]
    async fn test_link_degrades_after_threshold() {
        let transport = Scripted::new(vec![
            Err(ExchangeError::link("reset")),
            Err(ExchangeError::link("reset")),
            Err(ExchangeError::link("reset")),
        ]);
        let link = Link::new(
            "hub1",
            transport,
            LinkOptions {
                timeout: Duration::from_secs(1),
                failure_threshold: 3,
            },
        );

        for _ in 0..2 {
            assert!(link.exchange(&read()).await.is_err());
            assert_eq!(link.health().status, LinkStatus::Healthy);
        }
        assert!(link.exchange(&read()).await.is_err());
        assert_eq!(link.health().status, LinkStatus::Degraded);
        assert_eq!(link.health().consecutive_failures, 3);

        // Fails fast, even though the script would now succeed.
        assert_eq!(
            link.exchange(&read()).await,
            Err(ExchangeError::Degraded("hub1".into()))
        );

        link.reconnect().await.unwrap();
        assert_eq!(link.health(), LinkHealth::default());
        assert!(link.exchange(&read()).await.is_ok());
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let transport = Scripted::new(vec![
            Err(ExchangeError::link("reset")),
            Ok(Response::Coils(vec![1])),
        ]);
        let link = Link::new("hub1", transport, LinkOptions::default());

        assert!(link.exchange(&read()).await.is_err());
        assert_eq!(link.health().consecutive_failures, 1);
        assert_eq!(link.exchange(&read()).await, Ok(Response::Coils(vec![1])));
        assert_eq!(link.health().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_exception_does_not_degrade() {
        let transport = Scripted::new(vec![
            Err(ExchangeError::Exception("IllegalDataAddress".into())),
            Err(ExchangeError::Exception("IllegalDataAddress".into())),
        ]);
        let link = Link::new(
            "hub1",
            transport,
            LinkOptions {
                timeout: Duration::from_secs(1),
                failure_threshold: 1,
            },
        );

        assert!(link.exchange(&read()).await.is_err());
        assert!(link.exchange(&read()).await.is_err());
        assert_eq!(link.health().status, LinkStatus::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let mut transport = Scripted::new(vec![]);
        transport.delay = Duration::from_secs(5);
        let resets = transport.resets.clone();
        let link = Link::new(
            "slow",
            transport,
            LinkOptions {
                timeout: Duration::from_millis(200),
                failure_threshold: 10,
            },
        );

        assert_eq!(
            link.exchange(&read()).await,
            Err(ExchangeError::Timeout(Duration::from_millis(200)))
        );
        assert_eq!(link.health().consecutive_failures, 1);
        assert_eq!(resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_completed_exchanges_do_not_reset() {
        let transport = Scripted::new(vec![
            Ok(Response::Coils(vec![1])),
            Err(ExchangeError::link("reset")),
        ]);
        let resets = transport.resets.clone();
        let link = Link::new("hub1", transport, LinkOptions::default());

        assert!(link.exchange(&read()).await.is_ok());
        assert!(link.exchange(&read()).await.is_err());
        assert_eq!(resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchanges_are_serialized() {
        let mut transport = Scripted::new(vec![]);
        transport.delay = Duration::from_millis(50);
        let max_active = transport.max_active.clone();
        let link = Arc::new(Link::new("hub1", transport, LinkOptions::default()));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let link = link.clone();
            tasks.push(tokio::spawn(async move { link.exchange(&read()).await }));
        }
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }
}
