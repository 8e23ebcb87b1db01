//! Simulation - the orchestrator that owns one harness run.
//!
//! ```text
//! bootstrap():  clean_up ─► IoMaster ─► controllers ─► topology
//!                          ─► patch panel ─► dataplane trace ─► connections
//! clean_up():   kill controllers ─► close switch connections ─► close IoMaster
//! ```
//!
//! `bootstrap()` may be called any number of times; each call starts from
//! a full teardown, so a failed or finished run is recovered by simply
//! bootstrapping again.

use crate::config::SimulationConfig;
use crate::controller::Controller;
use crate::controller_manager::ControllerManager;
use crate::dataplane_trace::DataplaneTrace;
use crate::error::SimError;
use crate::io_master::IoMaster;
use crate::patch_panel::{PanelMode, PatchPanel};
use crate::topology::{Topology, TopologyRegistry};

use std::rc::Rc;
use sts_env::{Connector, SimClock, TcpConnector};
use tracing::{debug, info};

/// Lifecycle state of a [`Simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Uninitialized,
    Bootstrapped,
}

/// Composes controllers, topology, patch panel and IO scheduling into one
/// bootstrap/clean_up lifecycle.
pub struct Simulation {
    /// Configuration every bootstrap starts from
    config: SimulationConfig,

    registry: TopologyRegistry,

    connector: Box<dyn Connector>,

    panel_mode: PanelMode,

    state: SimulationState,

    io_master: Option<Rc<IoMaster>>,

    controller_manager: Option<ControllerManager>,

    topology: Option<Topology>,

    patch_panel: Option<PatchPanel>,

    dataplane_trace: Option<DataplaneTrace>,

    bootstrap_count: u64,
}

impl Simulation {
    /// Creates an uninitialized simulation that connects over TCP.
    pub fn new(mut config: SimulationConfig) -> Self {
        config.assign_controller_ids();
        Self {
            config,
            registry: TopologyRegistry::with_defaults(),
            connector: Box::new(TcpConnector),
            panel_mode: PanelMode::default(),
            state: SimulationState::Uninitialized,
            io_master: None,
            controller_manager: None,
            topology: None,
            patch_panel: None,
            dataplane_trace: None,
            bootstrap_count: 0,
        }
    }

    /// Replaces the connector used for switch-to-controller connections.
    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Box::new(connector);
        self
    }

    /// Replaces the topology registry.
    pub fn with_registry(mut self, registry: TopologyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the patch panel mode used on the next bootstrap.
    pub fn with_panel_mode(mut self, mode: PanelMode) -> Self {
        self.panel_mode = mode;
        self
    }

    /// Tears down whatever exists and builds a fresh run.
    ///
    /// On error the simulation is left partially built; call
    /// [`Simulation::clean_up`] (or `bootstrap` again) to recover.
    pub fn bootstrap(&mut self) -> Result<(), SimError> {
        self.clean_up();
        self.bootstrap_count += 1;
        info!("Bootstrapping simulation (run #{})", self.bootstrap_count);

        // Sole clock for everything created during this run
        let io_master = IoMaster::shared(self.config.io.clone());
        self.io_master = Some(Rc::clone(&io_master));
        let clock: Rc<dyn SimClock> = io_master.clone();

        // Registered as launched, so clean_up can reach them if a later step fails
        let manager = self
            .controller_manager
            .insert(ControllerManager::new(clock, self.config.reap.clone()));
        for controller_config in &self.config.controllers {
            let mut controller = Controller::new(controller_config.clone());
            controller.start()?;
            manager.register(controller);
        }

        let topology = self.topology.insert(self.registry.build(&self.config.topology)?);

        self.patch_panel = Some(PatchPanel::new(
            &topology.switches,
            &topology.hosts,
            |endpoint| topology.get_connected_port(endpoint),
            self.panel_mode,
        ));

        if let Some(path) = &self.config.dataplane_trace {
            self.dataplane_trace = Some(DataplaneTrace::open(path, topology)?);
        }

        topology.connect_to_controllers(
            &self.config.controllers,
            self.connector.as_mut(),
            |socket| io_master.create_worker(socket),
        )?;

        self.state = SimulationState::Bootstrapped;
        info!(
            "Simulation bootstrapped: {} controllers, {} switches, {} control connections",
            self.config.controllers.len(),
            topology.switches.len(),
            topology.connection_count()
        );
        Ok(())
    }

    /// Releases every resource of the current run. Never fails.
    ///
    /// Kills tracked controllers (already-dead ones are ignored), closes
    /// every switch connection, shuts down the IO scheduling context, and
    /// drops all references.
    pub fn clean_up(&mut self) {
        if let Some(mut manager) = self.controller_manager.take() {
            manager.kill_all();
        }

        if let Some(mut topology) = self.topology.take() {
            let closed = topology.close_connections();
            debug!("Closed {} switch connections", closed);
        }

        if let Some(io_master) = self.io_master.take() {
            io_master.close_all();
        }

        self.patch_panel = None;
        self.dataplane_trace = None;
        self.state = SimulationState::Uninitialized;
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of times `bootstrap` has been called.
    pub fn bootstrap_count(&self) -> u64 {
        self.bootstrap_count
    }

    /// The IO scheduling context of the current run.
    pub fn io_master(&self) -> Option<&Rc<IoMaster>> {
        self.io_master.as_ref()
    }

    /// The clock every component of the current run waits on.
    pub fn clock(&self) -> Option<Rc<dyn SimClock>> {
        self.io_master
            .as_ref()
            .map(|io| Rc::clone(io) as Rc<dyn SimClock>)
    }

    pub fn controller_manager(&self) -> Option<&ControllerManager> {
        self.controller_manager.as_ref()
    }

    pub fn controller_manager_mut(&mut self) -> Option<&mut ControllerManager> {
        self.controller_manager.as_mut()
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn topology_mut(&mut self) -> Option<&mut Topology> {
        self.topology.as_mut()
    }

    pub fn patch_panel_mut(&mut self) -> Option<&mut PatchPanel> {
        self.patch_panel.as_mut()
    }

    pub fn patch_panel(&self) -> Option<&PatchPanel> {
        self.patch_panel.as_ref()
    }

    pub fn dataplane_trace(&self) -> Option<&DataplaneTrace> {
        self.dataplane_trace.as_ref()
    }

    /// Injects the next dataplane trace packet into the patch panel.
    ///
    /// Returns false when there is no trace or it is exhausted.
    pub fn inject_next_dataplane_event(&mut self) -> Result<bool, SimError> {
        let (Some(trace), Some(panel)) = (self.dataplane_trace.as_mut(), self.patch_panel.as_mut()) else {
            return Ok(false);
        };
        Ok(trace.inject_next(panel)?.is_some())
    }

    /// Pumps the IO loop for `duration` of logical time.
    pub fn run_for(&self, duration: std::time::Duration) -> Result<(), SimError> {
        let io_master = self.io_master.as_ref().ok_or(SimError::NotBootstrapped)?;
        io_master.run_for(duration);
        Ok(())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.clean_up();
    }
}
