//! Persistent resource defaults
//!
//! Defaults survive restarts in a small JSON file. At startup each stored
//! default is restored into the hub (creating Placeholders for resources no
//! client has created yet); at shutdown the hub's current defaults are
//! written back.

use datahub_core::{Hub, SampleValue};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum DefaultsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// One stored default
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDefault {
    /// Absolute resource path
    pub path: String,
    pub timestamp: f64,
    pub value: SampleValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultsFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub defaults: Vec<StoredDefault>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl DefaultsFile {
    /// Load from a file, or start empty if it does not exist
    pub fn load_or_create(path: &Path) -> Result<Self, DefaultsError> {
        if !path.exists() {
            return Ok(Self {
                version: default_version(),
                defaults: Vec::new(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), DefaultsError> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Capture every default the hub currently holds
    pub fn from_hub(hub: &Hub) -> Self {
        Self {
            version: default_version(),
            defaults: hub
                .defaults_snapshot()
                .into_iter()
                .map(|(path, sample)| StoredDefault {
                    path,
                    timestamp: sample.timestamp(),
                    value: sample.value().clone(),
                })
                .collect(),
        }
    }

    /// Seed the hub; returns how many defaults were restored
    pub fn restore_into(&self, hub: &mut Hub) -> usize {
        let mut restored = 0;
        for entry in &self.defaults {
            match hub.restore_default(&entry.path, entry.timestamp, entry.value.clone()) {
                Ok(()) => restored += 1,
                Err(e) => warn!(path = %entry.path, error = %e, "Skipping stored default"),
            }
        }
        info!(restored, total = self.defaults.len(), "Defaults restored");
        restored
    }
}
