//! Population storage and lifecycle orchestration.
//!
//! This crate owns every organism slot, runs the placement, removal, injection
//! and birth protocols, and fires ordered lifecycle signals for external
//! modules to observe.

pub mod manager;
pub mod policy;
pub mod population;
pub mod signal;

pub use manager::LifecycleManager;
pub use policy::{PolicyContext, PolicySet};
pub use population::PopulationStore;
pub use signal::{Signal, SignalBus};
