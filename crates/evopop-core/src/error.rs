//! Error types for the population manager.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Names each externally supplied policy, for reporting a missing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    FindInjectPosition,
    FindBirthPosition,
    FindKillTarget,
    FindNeighbor,
    CalcFitness,
    DoMutations,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PolicyKind::FindInjectPosition => "find-inject-position",
            PolicyKind::FindBirthPosition => "find-birth-position",
            PolicyKind::FindKillTarget => "find-kill-target",
            PolicyKind::FindNeighbor => "find-neighbor",
            PolicyKind::CalcFitness => "calc-fitness",
            PolicyKind::DoMutations => "do-mutations",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("Policy not configured: {0}")]
    PolicyMissing(PolicyKind),

    #[error("No organisms in the active population")]
    EmptyPopulation,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
