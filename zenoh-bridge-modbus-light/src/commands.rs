//! Light commands received over Zenoh.
//!
//! Commands arrive either as a bare ON/OFF payload on `{prefix}/{light}/set`
//! or as a tagged JSON [`LightCommand`] on `{prefix}/@/commands`. Every
//! command produces a [`CommandResult`] on `{prefix}/@/commands/result`.

use std::sync::Arc;

use modbus_light_engine::Engine;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};
use zenoh::sample::{Sample, SampleKind};

use crate::error::Result;
use crate::keyexpr;
use crate::payload::{CommandResult, LightCommand};
use crate::publisher::Publisher;

/// Run a command against the engine.
pub async fn execute(engine: &Engine, command: &LightCommand) -> CommandResult {
    let outcome = match command {
        LightCommand::TurnOn { light } => engine
            .request_write(light, true)
            .await
            .map(|ack| ack.is_on)
            .map_err(|e| e.to_string()),
        LightCommand::TurnOff { light } => engine
            .request_write(light, false)
            .await
            .map(|ack| ack.is_on)
            .map_err(|e| e.to_string()),
        LightCommand::Refresh { light } => engine.refresh(light).await.map_err(|e| e.to_string()),
    };

    match outcome {
        Ok(on) => {
            info!(light = %command.light(), command = command.name(), on, "Command executed");
            CommandResult::ok(command, on)
        }
        Err(e) => {
            warn!(light = %command.light(), command = command.name(), error = %e, "Command failed");
            CommandResult::failed(command, e)
        }
    }
}

/// Decode a sample received on either command key.
pub fn parse_sample(prefix: &str, key: &str, payload: &[u8]) -> Result<Option<LightCommand>> {
    if let Some(light) = keyexpr::light_from_set_key(prefix, key) {
        return LightCommand::from_set_payload(light, payload).map(Some);
    }
    if key == keyexpr::command_key(prefix) {
        return Ok(Some(serde_json::from_slice(payload)?));
    }
    Ok(None)
}

/// Listens for commands until shutdown.
pub struct CommandListener {
    engine: Arc<Engine>,
    publisher: Publisher,
}

impl CommandListener {
    pub fn new(engine: Arc<Engine>, publisher: Publisher) -> Self {
        Self { engine, publisher }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let prefix = self.publisher.key_prefix().to_string();
        let session = self.publisher.session();

        let set_key = keyexpr::set_wildcard(&prefix);
        let command_key = keyexpr::command_key(&prefix);

        info!(key_expr = %set_key, "Subscribing to light commands");
        let set_subscriber = session.declare_subscriber(&set_key).await?;
        info!(key_expr = %command_key, "Subscribing to bridge commands");
        let command_subscriber = session.declare_subscriber(&command_key).await?;

        loop {
            let sample = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Shutdown signal received, stopping command listener");
                        break;
                    }
                    continue;
                }
                sample = set_subscriber.recv_async() => sample,
                sample = command_subscriber.recv_async() => sample,
            };

            match sample {
                Ok(sample) => self.handle(&prefix, sample).await,
                Err(e) => {
                    warn!(error = %e, "Command subscriber closed");
                    break;
                }
            }
        }

        set_subscriber.undeclare().await?;
        command_subscriber.undeclare().await?;
        Ok(())
    }

    async fn handle(&self, prefix: &str, sample: Sample) {
        if sample.kind() == SampleKind::Delete {
            trace!(key = %sample.key_expr(), "Ignoring delete sample");
            return;
        }

        let key = sample.key_expr().as_str();
        let payload = sample.payload().to_bytes();

        let command = match parse_sample(prefix, key, &payload) {
            Ok(Some(command)) => command,
            Ok(None) => return,
            Err(e) => {
                warn!(key = %key, error = %e, "Invalid command payload");
                return;
            }
        };

        debug!(light = %command.light(), command = command.name(), "Received command");
        let result = execute(&self.engine, &command).await;

        if let Err(e) = self.publisher.publish_result(&result).await {
            warn!(error = %e, "Failed to publish command result");
        }
    }
}
