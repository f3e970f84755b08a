//! Tuning parameters for a simulation instance.
//!
//! Every subsystem receives a [`SimulationConfig`] by reference at
//! construction time. The structure deserialises from TOML with every section
//! optional, so a configuration file only needs to name the values it changes.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse TOML content.
    #[error("failed to parse config TOML: {source}")]
    Toml {
        /// The underlying TOML parse error.
        #[from]
        source: toml::de::Error,
    },

    /// A value parsed correctly but is unusable.
    #[error("invalid config value `{key}`: {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        key: &'static str,
        /// Human readable explanation.
        reason: &'static str,
    },
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Grid resolution.
    #[serde(default)]
    pub grid: GridConfig,

    /// Navigator and pathfinder tuning.
    #[serde(default)]
    pub navigation: NavigationConfig,

    /// Decision-core combat timings.
    #[serde(default)]
    pub combat: CombatConfig,

    /// Field-of-view parameters.
    #[serde(default)]
    pub perception: PerceptionConfig,

    /// Population limits and seeding.
    #[serde(default)]
    pub population: PopulationConfig,
}

impl SimulationConfig {
    /// Load and validate configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Toml`] if the content is not valid TOML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the string is not valid TOML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the simulation relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.tile_size == 0 {
            return Err(ConfigError::Invalid {
                key: "grid.tile_size",
                reason: "must be positive",
            });
        }
        let rotation = self.navigation.avoidance_rotation;
        if !(rotation > 0.0 && rotation <= std::f64::consts::PI) {
            return Err(ConfigError::Invalid {
                key: "navigation.avoidance_rotation",
                reason: "must lie in (0, π]",
            });
        }
        let bonus = self.navigation.straight_path_bonus;
        if !(0.0..1.0).contains(&bonus) {
            return Err(ConfigError::Invalid {
                key: "navigation.straight_path_bonus",
                reason: "must lie in [0, 1)",
            });
        }
        if self.navigation.travel_time_overestimation <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "navigation.travel_time_overestimation",
                reason: "must be positive",
            });
        }
        if self.combat.forced_target_recalc_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "combat.forced_target_recalc_interval",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Number of angular offsets tried on each side during collision avoidance.
    #[must_use]
    pub fn avoidance_attempts(&self) -> usize {
        (std::f64::consts::PI / self.navigation.avoidance_rotation + 1e-9) as usize
    }
}

/// Grid resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct GridConfig {
    /// Edge length of a tile in pixels.
    #[serde(default = "default_tile_size")]
    pub tile_size: u16,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            tile_size: default_tile_size(),
        }
    }
}

fn default_tile_size() -> u16 {
    32
}

/// Navigator and pathfinder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct NavigationConfig {
    /// Angular increment between avoidance attempts, in radians.
    #[serde(default = "default_avoidance_rotation")]
    pub avoidance_rotation: f64,

    /// Cost discount for continuing in the incoming direction.
    #[serde(default)]
    pub straight_path_bonus: f64,

    /// Multiplier applied to straight-line travel time estimates.
    #[serde(default = "default_travel_time_overestimation")]
    pub travel_time_overestimation: f64,

    /// Ticks spent waiting with every avoidance offset blocked before giving up.
    #[serde(default = "default_avoidance_wait_threshold")]
    pub avoidance_wait_threshold: u32,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            avoidance_rotation: default_avoidance_rotation(),
            straight_path_bonus: 0.0,
            travel_time_overestimation: default_travel_time_overestimation(),
            avoidance_wait_threshold: default_avoidance_wait_threshold(),
        }
    }
}

fn default_avoidance_rotation() -> f64 {
    std::f64::consts::PI / 6.0
}

fn default_travel_time_overestimation() -> f64 {
    2.0
}

fn default_avoidance_wait_threshold() -> u32 {
    50
}

/// Decision-core combat timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct CombatConfig {
    /// Ticks between pursuit route recomputations for a forced target.
    #[serde(default = "default_forced_target_recalc_interval")]
    pub forced_target_recalc_interval: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            forced_target_recalc_interval: default_forced_target_recalc_interval(),
        }
    }
}

fn default_forced_target_recalc_interval() -> u32 {
    100
}

/// Field-of-view parameters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PerceptionConfig {
    /// Tiles whose visibility coefficient falls below this value block sight.
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

fn default_visibility_threshold() -> f32 {
    0.1
}

/// Population limits and seeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PopulationConfig {
    /// Upper bound on agent identifiers issued by a world.
    #[serde(default = "default_max_agents")]
    pub max_agents: u32,

    /// Seed for behaviour randomness.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            seed: default_seed(),
        }
    }
}

fn default_max_agents() -> u32 {
    256
}

fn default_seed() -> u64 {
    0x5eed_0f_c0ffee
}
