//! STS deterministic controller test harness
//!
//! Drives external network controllers against a simulated topology and
//! dataplane, with every control connection routed through a gate that the
//! harness can close and reopen to impose event delivery order.
//!
//! # Core Principle: One Clock Per Run
//!
//! All waiting goes through the run's [`IoMaster`]:
//! - **Time**: logical, advanced only by the IoMaster's own event loop
//! - **Sockets**: pumped cooperatively on one thread, gated per connection
//! - **Ordering**: decided by dispatch order, steered with `block()`/`unblock()`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Simulation                           │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ IoMaster (logical clock + cooperative dispatch)      │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────────┐        ┌────▼──────────┐                 │
//! │  │ DeferredIo    │  ...   │ DeferredIo    │   one per       │
//! │  │ Worker (s1↔c1)│        │ Worker (s2↔c1)│   switch×ctrl   │
//! │  └───────────────┘        └───────────────┘                 │
//! │       ▲                        ▲                            │
//! │  ┌────┴────────────────────────┴────┐   ┌───────────────┐   │
//! │  │ Topology + PatchPanel            │   │ Controller    │   │
//! │  │ (rebuilt on every bootstrap)     │   │ Manager       │   │
//! │  └──────────────────────────────────┘   └───────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use sts_sim::{Simulation, SimulationConfig};
//!
//! let config = SimulationConfig::from_file("sim.json")?;
//! let mut sim = Simulation::new(config);
//! sim.bootstrap()?;
//! sim.run_for(std::time::Duration::from_secs(5))?;
//! sim.clean_up();
//! ```

mod config;
mod controller;
mod controller_manager;
mod dataplane_trace;
mod deferred_io;
mod error;
mod io_master;
mod io_worker;
mod patch_panel;
mod simulation;
pub mod topology;

pub use config::{IoConfig, ReapConfig, SimulationConfig};
pub use controller::{Controller, ControllerConfig, ControllerState};
pub use controller_manager::{ControllerManager, KillReport};
pub use dataplane_trace::{DataplaneTrace, TracedPacket};
pub use deferred_io::{DeferredIoWorker, GateState, ReceiveHandler};
pub use error::SimError;
pub use io_master::{IoMaster, WorkerHandle};
pub use io_worker::{IoWorker, ReceiveBuffer};
pub use patch_panel::{DataplaneEvent, PanelMode, PatchPanel};
pub use simulation::{Simulation, SimulationState};
pub use topology::{Topology, TopologyParams, TopologyRecipe, TopologyRegistry};

pub use sts_env::{ControllerId, SimClock, SwitchId};
