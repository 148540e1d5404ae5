//! Composition root tying links, cache, scheduler and dispatcher together.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{ActuatorState, StateCache};
use crate::descriptor::ActuatorDescriptor;
use crate::dispatcher::{Ack, CommandDispatcher};
use crate::error::{EngineError, ReadError, Result, WriteError};
use crate::scheduler::{PollGroup, PollScheduler, poll_actuator};
use crate::sink::EventSink;
use crate::transport::Link;

/// A configured set of actuators over a set of links.
///
/// All collaborators are injected: links are built by the caller, the sink is
/// the host boundary, and nothing is looked up globally.
pub struct Engine {
    descriptors: Vec<ActuatorDescriptor>,
    index: HashMap<String, usize>,
    links: HashMap<String, Arc<Link>>,
    cache: Arc<StateCache>,
    sink: Arc<dyn EventSink>,
    scheduler: PollScheduler,
    dispatcher: CommandDispatcher,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Validate descriptors against the links and build poll groups.
    pub fn new(
        descriptors: Vec<ActuatorDescriptor>,
        links: impl IntoIterator<Item = Arc<Link>>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let mut by_name: HashMap<String, Arc<Link>> = HashMap::new();
        for link in links {
            let name = link.name().to_string();
            if by_name.insert(name.clone(), link).is_some() {
                return Err(EngineError::DuplicateLink(name));
            }
        }
        let links = by_name;

        let mut index = HashMap::new();
        for (i, descriptor) in descriptors.iter().enumerate() {
            descriptor.validate()?;
            if !links.contains_key(&descriptor.link) {
                return Err(EngineError::UnknownLink {
                    id: descriptor.id.clone(),
                    link: descriptor.link.clone(),
                });
            }
            if index.insert(descriptor.id.clone(), i).is_some() {
                return Err(EngineError::DuplicateId(descriptor.id.clone()));
            }
        }

        let cache = Arc::new(StateCache::new(descriptors.iter().map(|d| d.id.clone())));

        // Group by (link, interval); BTreeMap keeps group order stable.
        let mut grouped: BTreeMap<(String, Duration), Vec<ActuatorDescriptor>> = BTreeMap::new();
        for descriptor in &descriptors {
            grouped
                .entry((descriptor.link.clone(), descriptor.scan_interval))
                .or_default()
                .push(descriptor.clone());
        }
        let groups = grouped
            .into_iter()
            .map(|((link, interval), actuators)| {
                Arc::new(PollGroup::new(links[&link].clone(), interval, actuators))
            })
            .collect();

        let mut dispatcher = CommandDispatcher::new(cache.clone(), sink.clone());
        for descriptor in &descriptors {
            dispatcher.register(descriptor.clone(), links[&descriptor.link].clone());
        }

        let scheduler = PollScheduler::new(groups, cache.clone(), sink.clone());

        Ok(Self {
            descriptors,
            index,
            links,
            cache,
            sink,
            scheduler,
            dispatcher,
            timers: Mutex::new(Vec::new()),
        })
    }

    /// Seed every actuator from the host's remembered state.
    ///
    /// Returns how many seeds took effect. Entries already set by a live
    /// read or write are left alone.
    pub fn restore(&self) -> usize {
        let mut seeded = 0;
        for descriptor in &self.descriptors {
            if let Some(is_on) = self.sink.restore_last_state(&descriptor.id) {
                if self.cache.seed(&descriptor.id, is_on) {
                    debug!(actuator = %descriptor.id, is_on, "Restored last state");
                    seeded += 1;
                }
            }
        }
        seeded
    }

    /// Restore last states, then arm one timer per poll group.
    ///
    /// Calling `start` on a running engine does nothing.
    pub fn start(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if !timers.is_empty() {
            return;
        }

        let seeded = self.restore();
        *timers = self.scheduler.spawn();

        info!(
            actuators = self.descriptors.len(),
            links = self.links.len(),
            groups = self.scheduler.groups().len(),
            seeded,
            "Engine started"
        );
    }

    /// Stop all poll timers.
    ///
    /// Ticks already in flight are not cancelled. They finish their exchange
    /// and may still report a state change to the sink after this returns.
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        for timer in timers.drain(..) {
            timer.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        !self.timers.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }

    /// Drive an actuator ON or OFF.
    pub async fn request_write(
        &self,
        id: &str,
        desired_on: bool,
    ) -> std::result::Result<Ack, WriteError> {
        self.dispatcher.request_write(id, desired_on).await
    }

    /// Read one actuator right now, outside its poll group's schedule.
    pub async fn refresh(&self, id: &str) -> std::result::Result<bool, ReadError> {
        let descriptor = self
            .descriptor(id)
            .ok_or_else(|| ReadError::UnknownActuator(id.to_string()))?;
        let link = &self.links[&descriptor.link];

        poll_actuator(link, descriptor, &self.cache, self.sink.as_ref()).await?;

        self.cache
            .get(id)
            .and_then(|state| state.is_on)
            .ok_or_else(|| ReadError::UnknownActuator(id.to_string()))
    }

    pub fn state(&self, id: &str) -> Option<ActuatorState> {
        self.cache.get(id)
    }

    pub fn states(&self) -> HashMap<String, ActuatorState> {
        self.cache.snapshot()
    }

    pub fn descriptor(&self, id: &str) -> Option<&ActuatorDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    pub fn descriptors(&self) -> &[ActuatorDescriptor] {
        &self.descriptors
    }

    pub fn link(&self, name: &str) -> Option<&Arc<Link>> {
        self.links.get(name)
    }

    pub fn links(&self) -> impl Iterator<Item = &Arc<Link>> {
        self.links.values()
    }

    pub fn groups(&self) -> &[Arc<PollGroup>] {
        self.scheduler.groups()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
