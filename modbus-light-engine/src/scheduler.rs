//! Periodic polling of actuator groups.
//!
//! Actuators sharing a link and a scan interval form a [`PollGroup`]. Each
//! group gets its own timer task; every tick reads the group's actuators one
//! after another through the link. A tick that comes due while the previous
//! one is still in flight is skipped, so a slow or degraded link never builds
//! up a backlog of reads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::cache::StateCache;
use crate::codec;
use crate::descriptor::ActuatorDescriptor;
use crate::error::ReadError;
use crate::sink::EventSink;
use crate::transport::Link;

/// Result of asking a group to poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(PollSummary),
    /// The previous tick was still in flight.
    Skipped,
}

/// Counters for one completed tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub read: usize,
    pub failed: usize,
    pub changed: usize,
}

/// Actuators on one link polled on one interval.
#[derive(Debug)]
pub struct PollGroup {
    link: Arc<Link>,
    interval: Duration,
    actuators: Vec<ActuatorDescriptor>,
    polling: AtomicBool,
    ticks: AtomicU64,
    skipped: AtomicU64,
}

/// Clears the in-flight flag when a tick ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PollGroup {
    pub fn new(link: Arc<Link>, interval: Duration, actuators: Vec<ActuatorDescriptor>) -> Self {
        Self {
            link,
            interval,
            actuators,
            polling: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn link(&self) -> &Arc<Link> {
        &self.link
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn actuators(&self) -> &[ActuatorDescriptor] {
        &self.actuators
    }

    /// Whether a tick is currently in flight.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    /// Completed ticks so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Ticks dropped because the previous one was still running.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Poll every actuator of the group once, unless a tick is already running.
    pub async fn tick(&self, cache: &StateCache, sink: &dyn EventSink) -> TickOutcome {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(
                link = %self.link.name(),
                interval = ?self.interval,
                "Previous poll still in flight, skipping tick"
            );
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.polling);

        let mut summary = PollSummary::default();
        for descriptor in &self.actuators {
            match poll_actuator(&self.link, descriptor, cache, sink).await {
                Ok(changed) => {
                    summary.read += 1;
                    if changed {
                        summary.changed += 1;
                    }
                }
                Err(_) => summary.failed += 1,
            }
        }

        self.ticks.fetch_add(1, Ordering::Relaxed);
        debug!(
            link = %self.link.name(),
            read = summary.read,
            failed = summary.failed,
            changed = summary.changed,
            "Poll tick complete"
        );

        TickOutcome::Completed(summary)
    }
}

/// Read one actuator and fold the result into the cache.
///
/// Returns whether the cached boolean changed. Failures leave the cache
/// untouched and are reported to the sink.
pub(crate) async fn poll_actuator(
    link: &Link,
    descriptor: &ActuatorDescriptor,
    cache: &StateCache,
    sink: &dyn EventSink,
) -> Result<bool, ReadError> {
    let result = match link.exchange(&codec::encode_read(descriptor)).await {
        Ok(response) => codec::decode_read(descriptor, &response).map_err(ReadError::from),
        Err(e) => Err(ReadError::from(e)),
    };

    match result {
        Ok(is_on) => match cache.set(&descriptor.id, is_on, Utc::now()) {
            Some(change) => {
                debug!(actuator = %change.id, is_on = change.is_on, "State changed");
                sink.on_state_changed(&change.id, change.is_on, change.timestamp);
                Ok(true)
            }
            None => Ok(false),
        },
        Err(e) => {
            warn!(
                actuator = %descriptor.id,
                link = %link.name(),
                address = descriptor.read_address(),
                error = %e,
                "Poll read failed, keeping last known state"
            );
            sink.on_read_failed(&descriptor.id, &e);
            Err(e)
        }
    }
}

/// Owns one timer per [`PollGroup`].
pub struct PollScheduler {
    groups: Vec<Arc<PollGroup>>,
    cache: Arc<StateCache>,
    sink: Arc<dyn EventSink>,
}

impl PollScheduler {
    pub fn new(
        groups: Vec<Arc<PollGroup>>,
        cache: Arc<StateCache>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self { groups, cache, sink }
    }

    pub fn groups(&self) -> &[Arc<PollGroup>] {
        &self.groups
    }

    /// Start one timer task per group. The first tick is one interval from now.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        self.groups
            .iter()
            .map(|group| {
                info!(
                    link = %group.link().name(),
                    interval = ?group.interval(),
                    actuators = group.actuators().len(),
                    "Starting poll group"
                );
                tokio::spawn(run_timer(group.clone(), self.cache.clone(), self.sink.clone()))
            })
            .collect()
    }
}

async fn run_timer(group: Arc<PollGroup>, cache: Arc<StateCache>, sink: Arc<dyn EventSink>) {
    let mut ticker = tokio::time::interval_at(Instant::now() + group.interval, group.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        // Ticks run detached so an in-flight exchange is never cancelled by the
        // timer; an overlapping tick sees the flag and returns immediately.
        let group = group.clone();
        let cache = cache.clone();
        let sink = sink.clone();
        tokio::spawn(async move {
            group.tick(&cache, sink.as_ref()).await;
        });
    }
}
