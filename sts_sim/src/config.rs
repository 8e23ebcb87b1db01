//! Configuration for a simulation run.

use crate::controller::ControllerConfig;
use crate::error::SimError;
use crate::topology::TopologyRecipe;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sts_env::ControllerId;

/// Settings for the IO scheduling context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Logical time that passes per dispatch pass while delaying (ms)
    pub tick_ms: u64,

    /// Seed for permuting worker dispatch order. `None` dispatches in
    /// creation order.
    pub dispatch_seed: Option<u64>,
}

impl IoConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            dispatch_seed: None,
        }
    }
}

/// Bounded wait used when reaping controller processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReapConfig {
    /// Total time to wait for one controller to exit (ms)
    pub timeout_ms: u64,

    /// Delay between liveness checks (ms)
    pub poll_interval_ms: u64,
}

impl ReapConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ReapConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            poll_interval_ms: 20,
        }
    }
}

/// Everything needed to (re)build a simulation from scratch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Controllers to launch, in launch order
    pub controllers: Vec<ControllerConfig>,

    /// Recipe used to rebuild the topology on every bootstrap
    pub topology: TopologyRecipe,

    /// Optional dataplane trace replayed against the topology
    pub dataplane_trace: Option<PathBuf>,

    pub io: IoConfig,

    pub reap: ReapConfig,
}

impl SimulationConfig {
    /// Loads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SimError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| SimError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parses a JSON configuration string.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Gives every controller without an identity one derived from its
    /// position, so repeated runs of the same config see the same IDs.
    pub fn assign_controller_ids(&mut self) {
        for (index, controller) in self.controllers.iter_mut().enumerate() {
            controller
                .id
                .get_or_insert_with(|| ControllerId::from_seed(index as u64));
        }
    }
}
