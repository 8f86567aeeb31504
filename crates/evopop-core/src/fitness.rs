//! Per-slot fitness caching for the active population.

use serde::{Deserialize, Serialize};

/// Fitness values aligned with the active buffer.
///
/// Disabled caches have zero length. Each entry is either a computed value or
/// `None` for "not yet computed", so a real fitness of 0.0 is cacheable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitnessCache {
    enabled: bool,
    values: Vec<Option<f64>>,
}

impl FitnessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn caching on or off; enabling starts every entry uncomputed
    pub fn set_enabled(&mut self, enabled: bool, active_len: usize) {
        self.enabled = enabled;
        self.values.clear();
        if enabled {
            self.values.resize(active_len, None);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Track a change of active buffer length
    pub fn resize(&mut self, active_len: usize) {
        if self.enabled {
            self.values.resize(active_len, None);
        }
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn set(&mut self, index: usize, fitness: f64) {
        if let Some(entry) = self.values.get_mut(index) {
            *entry = Some(fitness);
        }
    }

    /// Mark an entry as uncomputed
    pub fn invalidate(&mut self, index: usize) {
        if let Some(entry) = self.values.get_mut(index) {
            *entry = None;
        }
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        if a < self.values.len() && b < self.values.len() {
            self.values.swap(a, b);
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Number of entries holding a computed value
    pub fn computed_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}
