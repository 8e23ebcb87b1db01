//! Dataplane forwarding between switch ports and host interfaces.
//!
//! The patch panel is built against one topology instance and dies with
//! it. In buffered mode every forwarded packet waits in a queue until the
//! harness explicitly permits or drops it, which is how dataplane faults
//! are injected.

use crate::error::SimError;
use crate::topology::{Endpoint, Host, Switch};

use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Forwarding behaviour of the patch panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelMode {
    /// Packets are delivered as soon as they are forwarded
    #[default]
    PassThrough,
    /// Packets queue until permitted or dropped
    Buffered,
}

/// A packet crossing one link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataplaneEvent {
    pub from: Endpoint,
    pub to: Endpoint,
    pub packet: Vec<u8>,
}

/// Dataplane forwarding fabric bound to one topology.
#[derive(Debug)]
pub struct PatchPanel {
    mode: PanelMode,

    /// Snapshot of the topology's port mapping
    port_map: HashMap<Endpoint, Endpoint>,

    /// Events waiting for a permit/drop decision (buffered mode)
    queued: VecDeque<DataplaneEvent>,

    /// Delivered events in delivery order
    delivered: Vec<DataplaneEvent>,

    dropped: usize,
}

impl PatchPanel {
    /// Wires a patch panel to the given switches and hosts.
    ///
    /// `get_connected_port` is asked once for every switch port and host
    /// interface; unattached endpoints are left out.
    pub fn new<F>(switches: &[Switch], hosts: &[Host], get_connected_port: F, mode: PanelMode) -> Self
    where
        F: Fn(&Endpoint) -> Option<Endpoint>,
    {
        let switch_ports = switches.iter().flat_map(|switch| {
            switch.ports.iter().map(move |&port| Endpoint::SwitchPort {
                switch: switch.dpid,
                port,
            })
        });
        let host_interfaces = hosts.iter().flat_map(|host| {
            (0..host.interfaces.len()).map(move |interface| Endpoint::HostInterface {
                host: host.id,
                interface,
            })
        });

        let port_map = switch_ports
            .chain(host_interfaces)
            .filter_map(|endpoint| get_connected_port(&endpoint).map(|peer| (endpoint, peer)))
            .collect();

        Self {
            mode,
            port_map,
            queued: VecDeque::new(),
            delivered: Vec::new(),
            dropped: 0,
        }
    }

    pub fn mode(&self) -> PanelMode {
        self.mode
    }

    /// Sends `packet` out of `from` towards whatever is linked to it.
    ///
    /// Returns the delivered event in pass-through mode, `None` when the
    /// event was queued.
    pub fn forward(&mut self, from: Endpoint, packet: Vec<u8>) -> Result<Option<DataplaneEvent>, SimError> {
        let to = *self
            .port_map
            .get(&from)
            .ok_or_else(|| SimError::Unlinked(from.to_string()))?;
        let event = DataplaneEvent { from, to, packet };

        match self.mode {
            PanelMode::PassThrough => {
                self.delivered.push(event.clone());
                Ok(Some(event))
            }
            PanelMode::Buffered => {
                debug!("Queued dataplane event {} -> {}", from, to);
                self.queued.push_back(event);
                Ok(None)
            }
        }
    }

    /// Events waiting for a decision, oldest first.
    pub fn queued_events(&self) -> impl Iterator<Item = &DataplaneEvent> {
        self.queued.iter()
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Delivers the queued event at `index`.
    pub fn permit(&mut self, index: usize) -> Option<DataplaneEvent> {
        let event = self.queued.remove(index)?;
        debug!("Permitted dataplane event {} -> {}", event.from, event.to);
        self.delivered.push(event.clone());
        Some(event)
    }

    /// Discards the queued event at `index`.
    pub fn drop_event(&mut self, index: usize) -> Option<DataplaneEvent> {
        let event = self.queued.remove(index)?;
        debug!("Dropped dataplane event {} -> {}", event.from, event.to);
        self.dropped += 1;
        Some(event)
    }

    /// Delivered events in delivery order.
    pub fn delivered(&self) -> &[DataplaneEvent] {
        &self.delivered
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Topology, TopologyParams};
    use sts_env::SwitchId;

    fn panel(mode: PanelMode) -> (Topology, PatchPanel) {
        let topology = Topology::line(&TopologyParams {
            num_switches: 2,
            hosts_per_switch: 1,
        })
        .unwrap();
        let panel = PatchPanel::new(
            &topology.switches,
            &topology.hosts,
            |e| topology.get_connected_port(e),
            mode,
        );
        (topology, panel)
    }

    #[test]
    fn test_pass_through_delivers_to_link_peer() {
        let (topology, mut panel) = panel(PanelMode::PassThrough);
        let h1 = topology.find_interface("h1-eth0").unwrap();

        let event = panel.forward(h1, b"ping".to_vec()).unwrap().unwrap();
        assert_eq!(
            event.to,
            Endpoint::SwitchPort {
                switch: SwitchId(1),
                port: 1
            }
        );
        assert_eq!(panel.delivered().len(), 1);
    }

    #[test]
    fn test_buffered_mode_waits_for_decision() {
        let (topology, mut panel) = panel(PanelMode::Buffered);
        let h1 = topology.find_interface("h1-eth0").unwrap();
        let h2 = topology.find_interface("h2-eth0").unwrap();

        assert!(panel.forward(h1, b"a".to_vec()).unwrap().is_none());
        assert!(panel.forward(h2, b"b".to_vec()).unwrap().is_none());
        assert_eq!(panel.queued_len(), 2);
        assert!(panel.delivered().is_empty());

        let dropped = panel.drop_event(0).unwrap();
        assert_eq!(dropped.packet, b"a");
        let permitted = panel.permit(0).unwrap();
        assert_eq!(permitted.packet, b"b");

        assert_eq!(panel.queued_len(), 0);
        assert_eq!(panel.dropped(), 1);
        assert_eq!(panel.delivered(), &[permitted]);
        assert!(panel.permit(0).is_none());
    }

    #[test]
    fn test_forward_on_unlinked_port_fails() {
        let (_, mut panel) = panel(PanelMode::PassThrough);
        let nowhere = Endpoint::SwitchPort {
            switch: SwitchId(1),
            port: 99,
        };
        assert!(matches!(
            panel.forward(nowhere, vec![]),
            Err(SimError::Unlinked(_))
        ));
    }
}
