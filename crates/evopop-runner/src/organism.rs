//! Bit-string organisms used by the demonstration runner.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an organism instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganismId(pub Uuid);

impl OrganismId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrganismId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrganismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An organism whose genome is a fixed-length bit string.
///
/// Cloning copies the id; offspring receive a fresh one through
/// [`BitOrganism::become_offspring`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitOrganism {
    pub id: OrganismId,
    pub parent_id: Option<OrganismId>,
    pub generation: u32,
    pub genome: Vec<bool>,
}

impl BitOrganism {
    pub fn random(length: usize, rng: &mut ChaCha8Rng) -> Self {
        Self {
            id: OrganismId::new(),
            parent_id: None,
            generation: 0,
            genome: (0..length).map(|_| rng.gen::<bool>()).collect(),
        }
    }

    /// Number of set bits
    pub fn ones(&self) -> usize {
        self.genome.iter().filter(|&&bit| bit).count()
    }

    /// Turn a fresh clone of a parent into its child
    pub fn become_offspring(&mut self) {
        self.parent_id = Some(self.id);
        self.id = OrganismId::new();
        self.generation += 1;
    }
}

/// Per-bit flip mutation
#[derive(Debug, Clone)]
pub struct BitMutator {
    rate: f64,
}

impl BitMutator {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }

    /// Flip each bit with probability `rate`; returns the number flipped
    pub fn mutate(&self, org: &mut BitOrganism, rng: &mut ChaCha8Rng) -> usize {
        let mut flips = 0;
        for bit in &mut org.genome {
            if rng.gen::<f64>() < self.rate {
                *bit = !*bit;
                flips += 1;
            }
        }
        flips
    }
}
