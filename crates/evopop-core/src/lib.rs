//! Core types and utilities for the evopop population lifecycle manager.

pub mod types;
pub mod config;
pub mod error;
pub mod fitness;

pub use error::{Error, PolicyKind, Result};
pub use types::*;
pub use config::*;
pub use fitness::*;
