//! Hub configuration

use serde::{Deserialize, Serialize};

use crate::pool::ExhaustionPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub pools: PoolConfig,
    /// Deepest allowed chain of pushes triggered from inside push handlers
    #[serde(default = "default_max_push_depth")]
    pub max_push_depth: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            pools: PoolConfig::default(),
            max_push_depth: default_max_push_depth(),
        }
    }
}

fn default_max_push_depth() -> usize {
    32
}

/// Pool sizes, fixed at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Tree entries, the root excluded
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Live data samples, buffered history included
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    #[serde(default)]
    pub exhaustion: ExhaustionPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            max_samples: default_max_samples(),
            exhaustion: ExhaustionPolicy::default(),
        }
    }
}

fn default_max_entries() -> usize {
    512
}

fn default_max_samples() -> usize {
    8192
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
[pools]
max_entries = 16
exhaustion = "recoverable"
"#,
        )
        .unwrap();
        assert_eq!(config.pools.max_entries, 16);
        assert_eq!(config.pools.max_samples, 8192);
        assert_eq!(config.pools.exhaustion, ExhaustionPolicy::Recoverable);
        assert_eq!(config.max_push_depth, 32);
    }
}
