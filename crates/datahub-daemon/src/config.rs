//! Configuration loading and validation

use anyhow::Result;
use datahub_core::{DataType, HubConfig, ObservationConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub sensor: SensorConfig,
    /// App namespaces created before any client connects
    #[serde(default, rename = "app")]
    pub apps: Vec<AppConfig>,
    #[serde(default, rename = "observation")]
    pub observations: Vec<ObservationEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Where resource defaults are restored from and saved to
    #[serde(default = "default_defaults_path")]
    pub defaults_path: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            defaults_path: default_defaults_path(),
        }
    }
}

fn default_defaults_path() -> String {
    "./datahub-defaults.json".to_string()
}

/// Built-in sensor client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// App name the sensor runs as
    #[serde(default = "default_sensor_app")]
    pub app: String,
    /// Period pushed to the sensor's `period` setting when no default exists
    #[serde(default = "default_period")]
    pub period_secs: f64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            app: default_sensor_app(),
            period_secs: default_period(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sensor_app() -> String {
    "sensor".to_string()
}

fn default_period() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
}

/// An observation to create at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationEntry {
    /// Absolute path of the observation
    pub path: String,
    pub data_type: DataType,
    #[serde(default)]
    pub units: String,
    /// Absolute path of the resource feeding it
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub filter: ObservationConfig,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datahub_core::ExhaustionPolicy;

    #[test]
    fn test_full_config() {
        let toml = r#"
[daemon]
defaults_path = "/var/lib/datahub/defaults.json"

[hub]
max_push_depth = 8

[hub.pools]
max_entries = 128
exhaustion = "recoverable"

[sensor]
app = "thermo"
period_secs = 0.5

[[app]]
name = "thermo"

[[app]]
name = "logger"

[[observation]]
path = "/obs/counter"
data_type = "numeric"
source = "/app/thermo/counter"
change_by = 2.0
max_count = 10
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.daemon.defaults_path, "/var/lib/datahub/defaults.json");
        assert_eq!(config.hub.max_push_depth, 8);
        assert_eq!(config.hub.pools.exhaustion, ExhaustionPolicy::Recoverable);
        assert_eq!(config.sensor.app, "thermo");
        assert!(config.sensor.enabled);
        assert_eq!(config.apps.len(), 2);

        let obs = &config.observations[0];
        assert_eq!(obs.data_type, DataType::Numeric);
        assert_eq!(obs.source.as_deref(), Some("/app/thermo/counter"));
        assert_eq!(obs.filter.change_by, Some(2.0));
        assert_eq!(obs.filter.max_count, 10);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_config(Path::new("/nonexistent/datahub.toml")).unwrap();
        assert_eq!(config.sensor.app, "sensor");
        assert!(config.observations.is_empty());
    }
}
