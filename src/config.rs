//! Engine configuration loaded from TOML.
//!
//! ```
//! use roster_engine::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(r#"
//!     population_size = 60
//!     random_seed = 7
//! "#).unwrap();
//!
//! assert_eq!(config.population_size, 60);
//! assert_eq!(config.batch_size, 50);
//! assert_eq!(config.random_seed, Some(7));
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "ROSTER_ENGINE_CONFIG";

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Tuning for the genetic search and the interactive session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineConfig {
    /// Individuals per generation.
    pub population_size: usize,
    /// Generations evolved per batch.
    pub batch_size: usize,
    /// Best individuals copied unchanged into the next generation.
    pub elite_count: usize,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    /// Per-cell mutation probability.
    pub mutation_rate: f64,
    /// Undo depth.
    pub history_capacity: usize,
    /// Bounded capacity of the session's command and event channels.
    pub channel_capacity: usize,
    /// Seed for reproducible runs.
    pub random_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            population_size: 100,
            batch_size: 50,
            elite_count: 2,
            tournament_size: 3,
            crossover_rate: 0.9,
            mutation_rate: 0.02,
            history_capacity: 50,
            channel_capacity: 4,
            random_seed: None,
        }
    }
}

impl EngineConfig {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `ROSTER_ENGINE_CONFIG` when set, otherwise defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::Invalid("population_size must be at least 1".into()));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be at least 1".into()));
        }
        if self.elite_count > self.population_size {
            return Err(ConfigError::Invalid(format!(
                "elite_count {} exceeds population_size {}",
                self.elite_count, self.population_size
            )));
        }
        if self.tournament_size == 0 {
            return Err(ConfigError::Invalid("tournament_size must be at least 1".into()));
        }
        for (name, rate) in [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::Invalid(format!("{} {} is outside 0..=1", name, rate)));
            }
        }
        if self.history_capacity == 0 || self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity and channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
