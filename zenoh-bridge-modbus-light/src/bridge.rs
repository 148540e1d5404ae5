//! Wires the engine, the state store and Zenoh together.

use std::sync::Arc;

use modbus_light_engine::{ChannelSink, Engine, EngineEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::commands::CommandListener;
use crate::config::LightBridgeConfig;
use crate::error::Result;
use crate::payload::LightState;
use crate::publisher::Publisher;
use crate::recovery::run_recovery;
use crate::state_store::StateStore;
use crate::status::{BridgeStatus, engine_metadata};

/// Bridge name reported in status messages.
pub const BRIDGE_NAME: &str = "modbus_light";

/// A configured bridge, ready to run against a Zenoh session.
pub struct LightBridge {
    config: LightBridgeConfig,
    engine: Arc<Engine>,
    store: Arc<StateStore>,
    events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl LightBridge {
    /// Build links and the engine from a validated configuration.
    ///
    /// The state store is loaded here so restored states are available when
    /// the engine starts.
    pub fn new(config: LightBridgeConfig) -> Result<Self> {
        let store = match &config.modbus.state_file {
            Some(path) => StateStore::load(path)?,
            None => StateStore::in_memory(),
        };
        Self::with_store(config, store)
    }

    /// Like [`LightBridge::new`] with an already loaded store.
    pub fn with_store(config: LightBridgeConfig, store: StateStore) -> Result<Self> {
        let descriptors = config.to_descriptors()?;
        let links = config.build_links()?;

        let (sink, events) = ChannelSink::new();
        let sink = sink.with_restored(store.snapshot());
        let engine = Engine::new(descriptors, links, Arc::new(sink))?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
            store: Arc::new(store),
            events,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Run until `shutdown` flips to `true`.
    pub async fn run(
        self,
        session: zenoh::Session,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let Self {
            config,
            engine,
            store,
            events,
        } = self;
        let version = env!("CARGO_PKG_VERSION");
        let publisher = Publisher::new(session, &config.modbus.key_prefix, config.serialization);

        engine.start();

        // Restored states are published so subscribers see them before the first poll.
        for (light, state) in engine.states() {
            if let Some(on) = state.is_on {
                let timestamp = state.last_updated.unwrap_or_else(chrono::Utc::now);
                let state = LightState { light, on, timestamp };
                if let Err(e) = publisher.publish_state(&state).await {
                    warn!(light = %state.light, error = %e, "Failed to publish restored state");
                }
            }
        }

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        tasks.push(tokio::spawn(forward_events(
            events,
            publisher.clone(),
            store.clone(),
        )));

        let listener = CommandListener::new(engine.clone(), publisher.clone());
        let listener_shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = listener.run(listener_shutdown).await {
                error!(error = %e, "Command listener failed");
            }
        }));

        for hub in &config.modbus.hubs {
            if let Some(link) = engine.link(&hub.name) {
                tasks.push(tokio::spawn(run_recovery(
                    link.clone(),
                    hub.reconnect_interval(),
                    shutdown.clone(),
                )));
            }
        }

        let status =
            BridgeStatus::running(BRIDGE_NAME, version).with_metadata(engine_metadata(&engine));
        if let Err(e) = status.publish(&publisher).await {
            error!(error = %e, "Failed to publish bridge status");
        }

        info!(
            lights = engine.descriptors().len(),
            hubs = config.modbus.hubs.len(),
            "Modbus light bridge running"
        );

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Stopping Modbus light bridge");
        engine.shutdown();

        // The event forwarder only ends when the engine's sink is dropped.
        for task in tasks {
            task.abort();
        }

        if let Err(e) = store.save().await {
            warn!(error = %e, "Failed to save light states");
        }

        if let Err(e) = BridgeStatus::offline(BRIDGE_NAME, version).publish(&publisher).await {
            warn!(error = %e, "Failed to publish offline status");
        }

        Ok(())
    }
}

/// Publish state changes and keep the store in sync.
async fn forward_events(
    mut events: mpsc::UnboundedReceiver<EngineEvent>,
    publisher: Publisher,
    store: Arc<StateStore>,
) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::StateChanged {
                id,
                is_on,
                timestamp,
            } => {
                if store.update(&id, is_on) {
                    if let Err(e) = store.save().await {
                        warn!(light = %id, error = %e, "Failed to save light state");
                    }
                }

                let state = LightState {
                    light: id,
                    on: is_on,
                    timestamp,
                };
                if let Err(e) = publisher.publish_state(&state).await {
                    warn!(light = %state.light, error = %e, "Failed to publish light state");
                }
            }
            EngineEvent::ReadFailed { id, error } => {
                debug!(light = %id, error = %error, "Read failed, state not published");
            }
        }
    }
}
