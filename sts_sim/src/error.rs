//! Error types for the simulation harness.

use std::path::PathBuf;
use sts_env::EnvError;
use thiserror::Error;

/// Errors raised while bootstrapping or driving a simulation.
///
/// Bootstrap errors leave the simulation half-built; the only recovery is
/// `Simulation::clean_up()` followed by another `bootstrap()`.
#[derive(Debug, Error)]
pub enum SimError {
    /// A controller process could not be launched
    #[error("Failed to launch controller {label}: {reason}")]
    SpawnFailed { label: String, reason: String },

    /// No constructor is registered for the requested topology kind
    #[error("Unknown topology kind '{0}'")]
    UnknownTopology(String),

    /// The topology parameters are unusable for the requested kind
    #[error("Invalid topology parameters: {0}")]
    InvalidTopology(String),

    /// The dataplane trace could not be read or does not match the topology
    #[error("Dataplane trace {path}:{line}: {reason}")]
    DataplaneTrace {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// A packet was forwarded out of a port with no link attached
    #[error("No link attached to {0}")]
    Unlinked(String),

    /// The configuration file is missing or malformed
    #[error("Config error: {0}")]
    Config(String),

    /// An operation needs a bootstrapped simulation
    #[error("Simulation is not bootstrapped")]
    NotBootstrapped,

    /// Socket or scheduling context failure
    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Creates a spawn failure for the given controller.
    pub fn spawn(label: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::SpawnFailed {
            label: label.into(),
            reason: reason.to_string(),
        }
    }

    /// Creates a dataplane trace error.
    pub fn trace(path: impl Into<PathBuf>, line: usize, reason: impl std::fmt::Display) -> Self {
        Self::DataplaneTrace {
            path: path.into(),
            line,
            reason: reason.to_string(),
        }
    }
}
