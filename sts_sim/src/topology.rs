//! Simulated network topology and the registry that builds it.
//!
//! A topology is never reused across runs: switches own live control
//! connections, so every bootstrap rebuilds one from a stored
//! [`TopologyRecipe`] through a [`TopologyRegistry`].

use crate::controller::ControllerConfig;
use crate::error::SimError;
use crate::io_master::WorkerHandle;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use sts_env::{Connector, EnvError, Socket, SwitchId};
use tracing::{debug, info};

/// OpenFlow 1.0 wire version.
const OFP_VERSION: u8 = 0x01;

/// OFPT_HELLO message type.
const OFPT_HELLO: u8 = 0;

/// Builds the 8-byte OpenFlow HELLO a switch sends when it connects.
pub fn hello_message(xid: u32) -> [u8; 8] {
    let mut msg = [0u8; 8];
    msg[0] = OFP_VERSION;
    msg[1] = OFPT_HELLO;
    msg[2..4].copy_from_slice(&8u16.to_be_bytes());
    msg[4..8].copy_from_slice(&xid.to_be_bytes());
    msg
}

/// Strongly typed parameters shared by all topology constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyParams {
    pub num_switches: usize,

    /// Hosts attached to each switch
    pub hosts_per_switch: usize,
}

impl Default for TopologyParams {
    fn default() -> Self {
        Self {
            num_switches: 2,
            hosts_per_switch: 1,
        }
    }
}

/// Stored (kind, parameters) pair a topology is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyRecipe {
    pub kind: String,

    #[serde(default)]
    pub params: TopologyParams,
}

impl TopologyRecipe {
    pub fn new(kind: impl Into<String>, params: TopologyParams) -> Self {
        Self {
            kind: kind.into(),
            params,
        }
    }
}

impl Default for TopologyRecipe {
    fn default() -> Self {
        Self::new("mesh", TopologyParams::default())
    }
}

/// Constructor registered for one topology kind.
pub type TopologyConstructor = fn(&TopologyParams) -> Result<Topology, SimError>;

/// Mapping from topology-kind identifiers to constructors.
#[derive(Clone)]
pub struct TopologyRegistry {
    constructors: BTreeMap<String, TopologyConstructor>,
}

impl TopologyRegistry {
    /// Creates an empty registry.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Creates a registry with the built-in `mesh` and `line` kinds.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("mesh", Topology::mesh);
        registry.register("line", Topology::line);
        registry
    }

    /// Registers (or replaces) the constructor for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, constructor: TopologyConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    /// Registered kinds in sorted order.
    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Builds a fresh topology from a recipe.
    pub fn build(&self, recipe: &TopologyRecipe) -> Result<Topology, SimError> {
        let constructor = self
            .constructors
            .get(&recipe.kind)
            .ok_or_else(|| SimError::UnknownTopology(recipe.kind.clone()))?;
        let topology = constructor(&recipe.params)?;
        info!(
            "Built {} topology: {} switches, {} hosts, {} links",
            recipe.kind,
            topology.switches.len(),
            topology.hosts.len(),
            topology.links.len()
        );
        Ok(topology)
    }
}

impl Default for TopologyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// One end of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Endpoint {
    SwitchPort { switch: SwitchId, port: u16 },
    HostInterface { host: u32, interface: usize },
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::SwitchPort { switch, port } => write!(f, "{}:{}", switch, port),
            Endpoint::HostInterface { host, interface } => write!(f, "h{}-eth{}", host, interface),
        }
    }
}

/// A host network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInterface {
    pub name: String,
    pub hw_addr: [u8; 6],
    pub ip: Ipv4Addr,
}

/// A simulated end host.
#[derive(Debug, Clone)]
pub struct Host {
    pub id: u32,
    pub name: String,
    pub interfaces: Vec<HostInterface>,
}

/// A simulated switch and its control connections.
#[derive(Debug)]
pub struct Switch {
    pub dpid: SwitchId,

    /// Port numbers in ascending order
    pub ports: Vec<u16>,

    /// One gated worker per controller, in controller config order
    pub connections: Vec<WorkerHandle>,
}

impl Switch {
    fn new(dpid: SwitchId) -> Self {
        Self {
            dpid,
            ports: Vec::new(),
            connections: Vec::new(),
        }
    }

    fn add_port(&mut self) -> u16 {
        let port = self.ports.last().map_or(1, |p| p + 1);
        self.ports.push(port);
        port
    }

    /// Closes every control connection.
    pub fn close_connections(&mut self) -> usize {
        let count = self.connections.len();
        for connection in self.connections.drain(..) {
            connection.borrow_mut().close();
        }
        count
    }
}

/// A bidirectional link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub a: Endpoint,
    pub b: Endpoint,
}

/// Switches, hosts, links and the port mapping between them.
#[derive(Debug, Default)]
pub struct Topology {
    pub switches: Vec<Switch>,
    pub hosts: Vec<Host>,
    pub links: Vec<Link>,
    port_map: HashMap<Endpoint, Endpoint>,
}

impl Topology {
    /// Full mesh of `num_switches` switches, `hosts_per_switch` hosts each.
    pub fn mesh(params: &TopologyParams) -> Result<Topology, SimError> {
        let mut topology = Self::with_hosts(params)?;
        let n = topology.switches.len();
        for i in 0..n {
            for j in (i + 1)..n {
                topology.link_switches(i, j);
            }
        }
        Ok(topology)
    }

    /// Chain of `num_switches` switches, `hosts_per_switch` hosts each.
    pub fn line(params: &TopologyParams) -> Result<Topology, SimError> {
        let mut topology = Self::with_hosts(params)?;
        for i in 1..topology.switches.len() {
            topology.link_switches(i - 1, i);
        }
        Ok(topology)
    }

    fn with_hosts(params: &TopologyParams) -> Result<Topology, SimError> {
        if params.num_switches == 0 {
            return Err(SimError::InvalidTopology("num_switches must be > 0".to_string()));
        }
        let total_hosts = params
            .num_switches
            .checked_mul(params.hosts_per_switch)
            .filter(|&hosts| hosts <= u16::MAX as usize);
        if total_hosts.is_none() {
            return Err(SimError::InvalidTopology("too many hosts".to_string()));
        }

        let mut topology = Topology::default();
        let mut next_host = 1u32;
        for s in 0..params.num_switches {
            let mut switch = Switch::new(SwitchId(s as u64 + 1));
            for _ in 0..params.hosts_per_switch {
                let id = next_host;
                next_host += 1;
                let [hi, lo] = (id as u16).to_be_bytes();
                let host = Host {
                    id,
                    name: format!("h{}", id),
                    interfaces: vec![HostInterface {
                        name: format!("h{}-eth0", id),
                        hw_addr: [0x12, 0x34, 0x56, 0x78, hi, lo],
                        ip: Ipv4Addr::new(10, 0, hi, lo),
                    }],
                };
                let port = switch.add_port();
                topology.add_link(
                    Endpoint::SwitchPort {
                        switch: switch.dpid,
                        port,
                    },
                    Endpoint::HostInterface {
                        host: id,
                        interface: 0,
                    },
                );
                topology.hosts.push(host);
            }
            topology.switches.push(switch);
        }
        Ok(topology)
    }

    fn link_switches(&mut self, i: usize, j: usize) {
        let port_i = self.switches[i].add_port();
        let port_j = self.switches[j].add_port();
        let a = Endpoint::SwitchPort {
            switch: self.switches[i].dpid,
            port: port_i,
        };
        let b = Endpoint::SwitchPort {
            switch: self.switches[j].dpid,
            port: port_j,
        };
        self.add_link(a, b);
    }

    fn add_link(&mut self, a: Endpoint, b: Endpoint) {
        self.links.push(Link { a, b });
        self.port_map.insert(a, b);
        self.port_map.insert(b, a);
    }

    /// The endpoint on the far side of the link attached to `endpoint`.
    pub fn get_connected_port(&self, endpoint: &Endpoint) -> Option<Endpoint> {
        self.port_map.get(endpoint).copied()
    }

    pub fn switch(&self, dpid: SwitchId) -> Option<&Switch> {
        self.switches.iter().find(|s| s.dpid == dpid)
    }

    /// Finds a host interface by name (e.g. "h1-eth0").
    pub fn find_interface(&self, name: &str) -> Option<Endpoint> {
        self.hosts.iter().find_map(|host| {
            host.interfaces
                .iter()
                .position(|iface| iface.name == name)
                .map(|interface| Endpoint::HostInterface {
                    host: host.id,
                    interface,
                })
        })
    }

    /// Opens a control connection from every switch to every controller.
    ///
    /// Each socket is wrapped by a worker from `create_worker`, and the
    /// switch greets the controller with an OpenFlow HELLO.
    pub fn connect_to_controllers<F>(
        &mut self,
        controllers: &[ControllerConfig],
        connector: &mut dyn Connector,
        mut create_worker: F,
    ) -> Result<(), SimError>
    where
        F: FnMut(Box<dyn Socket>) -> Result<WorkerHandle, EnvError>,
    {
        for switch in &mut self.switches {
            for controller in controllers {
                let socket = connector.connect(&controller.address)?;
                let worker = create_worker(socket)?;
                worker
                    .borrow_mut()
                    .send(&hello_message(switch.dpid.0 as u32));
                debug!("{} connected to controller {}", switch.dpid, controller.label);
                switch.connections.push(worker);
            }
        }
        Ok(())
    }

    /// Closes every switch's control connections.
    pub fn close_connections(&mut self) -> usize {
        self.switches
            .iter_mut()
            .map(Switch::close_connections)
            .sum()
    }

    /// Total open control connections across all switches.
    pub fn connection_count(&self) -> usize {
        self.switches.iter().map(|s| s.connections.len()).sum()
    }
}
