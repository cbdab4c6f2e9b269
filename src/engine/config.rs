//! Runtime configuration.
//!
//! ```toml
//! seed = 42
//!
//! [groups]
//! sampler_capacity = 256
//! ```

use serde::{Deserialize, Serialize};

use crate::engine::error::ConfigError;
use crate::engine::types::DEFAULT_SAMPLER_CAPACITY;


/// Settings of one group store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupsConfig {
    /// Initial length of the weighted sampler's scratch buffers.
    pub sampler_capacity: usize,
}

impl Default for GroupsConfig {
    fn default() -> Self {
        Self { sampler_capacity: DEFAULT_SAMPLER_CAPACITY }
    }
}

impl GroupsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "groups.sampler_capacity",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

/// Settings of a simulation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Seed of every random stream.
    pub seed: u64,
    pub groups: GroupsConfig,
}

impl SimulationConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self { seed, ..Self::default() }
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = toml::from_str(source)?;
        config.groups.validate()?;
        Ok(config)
    }
}
