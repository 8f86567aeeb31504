//! Configuration types for the population manager and runner.

use crate::{Error, Result};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Startup configuration consumed once before the first update
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Name used to prefix signal names
    pub name: String,
    /// Seed for the main random number generator (0 = seed from entropy)
    pub random_seed: u64,
    /// Initial population size for each organism type
    pub init_size: usize,
    /// Number of slots in the active population
    pub world_size: usize,
    /// Optional (width, height); overrides `world_size` when present
    pub grid: Option<(usize, usize)>,
    /// Cache fitness values per active slot
    pub cache_fitness: bool,
    /// Hand the next generation over to the active one on every update
    pub synchronous: bool,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            random_seed: 0,
            init_size: 1,
            world_size: 100,
            grid: None,
            cache_fitness: false,
            synchronous: false,
        }
    }
}

impl PopulationConfig {
    /// Load from a JSON file; missing fields fall back to defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.as_ref().display(), "Loaded population config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let total_size = self.total_size()?;
        if total_size == 0 {
            return Err(Error::Config("world size must be non-zero".to_string()));
        }
        if self.init_size > total_size {
            return Err(Error::Config(format!(
                "init_size {} exceeds world size {}",
                self.init_size, total_size
            )));
        }
        Ok(())
    }

    /// Number of active slots implied by the grid or flat size
    pub fn total_size(&self) -> Result<usize> {
        match self.grid {
            Some((width, height)) => width.checked_mul(height).ok_or_else(|| {
                Error::Config(format!("grid {}x{} is too large", width, height))
            }),
            None => Ok(self.world_size),
        }
    }

    /// Build the main random number generator
    pub fn build_rng(&self) -> ChaCha8Rng {
        if self.random_seed == 0 {
            ChaCha8Rng::from_entropy()
        } else {
            ChaCha8Rng::seed_from_u64(self.random_seed)
        }
    }
}

/// Configuration for the demonstration runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Population settings
    pub population: PopulationConfig,
    /// Number of updates to run
    pub num_updates: u64,
    /// Length of the bit-string genome
    pub genome_length: usize,
    /// Per-bit flip probability applied to offspring
    pub mutation_rate: f64,
    /// Births attempted per update
    pub births_per_update: usize,
    /// Emit population metrics every N updates
    pub report_interval: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            population: PopulationConfig {
                random_seed: 1,
                init_size: 50,
                ..Default::default()
            },
            num_updates: 200,
            genome_length: 64,
            mutation_rate: 0.01,
            births_per_update: 50,
            report_interval: 20,
        }
    }
}

impl RunnerConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.population.validate()?;
        if !(0.0..=1.0).contains(&config.mutation_rate) {
            return Err(Error::Config(format!(
                "mutation_rate {} outside [0, 1]",
                config.mutation_rate
            )));
        }
        Ok(config)
    }
}
