//! Last-known light states persisted across restarts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{debug, info};

use crate::error::{BridgeError, Result};

/// JSON file mapping light name to its last state.
///
/// Without a path the store only lives in memory.
#[derive(Debug, Default)]
pub struct StateStore {
    path: Option<PathBuf>,
    states: Mutex<BTreeMap<String, bool>>,
}

impl StateStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let states = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                BridgeError::State(format!("Invalid state file '{}': {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file yet");
                BTreeMap::new()
            }
            Err(e) => {
                return Err(BridgeError::State(format!(
                    "Failed to read state file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        info!(path = %path.display(), lights = states.len(), "Loaded light states");

        Ok(Self {
            path: Some(path),
            states: Mutex::new(states),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, light: &str) -> Option<bool> {
        self.lock().get(light).copied()
    }

    /// Record a state. Returns whether the stored value changed.
    pub fn update(&self, light: &str, on: bool) -> bool {
        self.lock().insert(light.to_string(), on) != Some(on)
    }

    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.lock().clone()
    }

    /// Write the current states to disk, replacing the file atomically.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_vec_pretty(&self.snapshot())?;
        let tmp = path.with_extension("tmp");

        tokio::fs::write(&tmp, content).await.map_err(|e| {
            BridgeError::State(format!("Failed to write '{}': {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            BridgeError::State(format!("Failed to replace '{}': {}", path.display(), e))
        })?;

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, bool>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
