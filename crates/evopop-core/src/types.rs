//! Core type definitions for addressing organisms in a population.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which of the two generational buffers a position refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PopulationId {
    /// The generation currently live for selection, death and counting
    Active,
    /// Staging generation for synchronous-generation schemes
    Next,
}

impl PopulationId {
    pub fn all() -> [PopulationId; 2] {
        [PopulationId::Active, PopulationId::Next]
    }
}

/// Address of a slot: a buffer selector plus an index.
///
/// The default value is the invalid sentinel meaning "no placement". A valid
/// position is not necessarily in bounds; only `make_valid` on the store
/// guarantees that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorldPosition {
    index: usize,
    population: PopulationId,
}

impl WorldPosition {
    const INVALID_INDEX: usize = usize::MAX;

    pub fn new(index: usize, population: PopulationId) -> Self {
        Self { index, population }
    }

    /// Position in the active population
    pub fn active(index: usize) -> Self {
        Self::new(index, PopulationId::Active)
    }

    /// Position in the next population
    pub fn next(index: usize) -> Self {
        Self::new(index, PopulationId::Next)
    }

    pub fn invalid() -> Self {
        Self {
            index: Self::INVALID_INDEX,
            population: PopulationId::Active,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.index != Self::INVALID_INDEX
    }

    /// True if this is a valid position in the active population
    pub fn is_active(&self) -> bool {
        self.is_valid() && self.population == PopulationId::Active
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn population(&self) -> PopulationId {
        self.population
    }

    /// Same index, other buffer
    pub fn with_population(&self, population: PopulationId) -> Self {
        Self::new(self.index, population)
    }
}

impl Default for WorldPosition {
    fn default() -> Self {
        Self::invalid()
    }
}

impl From<usize> for WorldPosition {
    fn from(index: usize) -> Self {
        Self::active(index)
    }
}

impl fmt::Display for WorldPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "invalid");
        }
        match self.population {
            PopulationId::Active => write!(f, "active[{}]", self.index),
            PopulationId::Next => write!(f, "next[{}]", self.index),
        }
    }
}
