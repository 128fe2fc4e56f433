//! Container configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use sim_ecs::SimError;

fn default_scan_directory() -> PathBuf {
    PathBuf::from("modules")
}

fn default_max_entities() -> usize {
    10_000
}

fn default_max_components() -> usize {
    64
}

fn default_max_commands_per_tick() -> usize {
    10_000
}

/// Recognised container options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Human-readable container name. Required.
    pub name: String,

    /// Directory scanned for module archives.
    #[serde(default = "default_scan_directory")]
    pub module_scan_directory: PathBuf,

    /// Archives copied into the scan directory before the initial scan.
    #[serde(default)]
    pub module_archive_paths: Vec<PathBuf>,

    /// ECS entity capacity. Must be positive.
    #[serde(default = "default_max_entities")]
    pub max_entities: usize,

    /// ECS component-column capacity. Must be positive.
    #[serde(default = "default_max_components")]
    pub max_components: usize,

    /// Bound on the per-tick command drain. Must be positive.
    #[serde(default = "default_max_commands_per_tick")]
    pub max_commands_per_tick: usize,

    /// Advisory ECS memory ceiling in MiB; 0 means unlimited.
    #[serde(default)]
    pub max_memory_mb: u64,
}

impl ContainerConfig {
    /// A config with defaults for everything but the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_scan_directory: default_scan_directory(),
            module_archive_paths: Vec::new(),
            max_entities: default_max_entities(),
            max_components: default_max_components(),
            max_commands_per_tick: default_max_commands_per_tick(),
            max_memory_mb: 0,
        }
    }

    /// Validate option ranges.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.name.is_empty() {
            return Err(SimError::InvalidRequest("container name is required".to_string()));
        }
        if self.max_entities == 0 {
            return Err(SimError::InvalidRequest("max_entities must be > 0".to_string()));
        }
        if self.max_components == 0 {
            return Err(SimError::InvalidRequest("max_components must be > 0".to_string()));
        }
        if self.max_commands_per_tick == 0 {
            return Err(SimError::InvalidRequest(
                "max_commands_per_tick must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::new("c1");
        assert_eq!(config.module_scan_directory, PathBuf::from("modules"));
        assert_eq!(config.max_commands_per_tick, 10_000);
        assert_eq!(config.max_memory_mb, 0);
        config.validate().unwrap();
    }

    #[test]
    fn test_deserialization_applies_defaults() {
        let config: ContainerConfig = serde_json::from_str(r#"{ "name": "c1" }"#).unwrap();
        assert_eq!(config, ContainerConfig::new("c1"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = ContainerConfig::new("");
        assert!(matches!(config.validate(), Err(SimError::InvalidRequest(_))));

        config = ContainerConfig::new("c1");
        config.max_entities = 0;
        assert!(matches!(config.validate(), Err(SimError::InvalidRequest(_))));

        config = ContainerConfig::new("c1");
        config.max_commands_per_tick = 0;
        assert!(matches!(config.validate(), Err(SimError::InvalidRequest(_))));
    }
}
