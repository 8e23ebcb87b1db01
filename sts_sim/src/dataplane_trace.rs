//! Dataplane traces: recorded host packets replayed into the patch panel.

use crate::error::SimError;
use crate::patch_panel::{DataplaneEvent, PatchPanel};
use crate::topology::{Endpoint, Topology};

use serde::Deserialize;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::info;

/// One line of a dataplane trace file.
#[derive(Debug, Deserialize)]
struct TraceEntry {
    /// Host interface the packet leaves from
    interface: String,
    payload: Vec<u8>,
}

/// A packet waiting to be injected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedPacket {
    pub interface: Endpoint,
    pub payload: Vec<u8>,
}

/// Packets parsed against one topology, consumed in file order.
#[derive(Debug)]
pub struct DataplaneTrace {
    path: PathBuf,
    pending: VecDeque<TracedPacket>,
    injected: usize,
}

impl DataplaneTrace {
    /// Opens and parses a JSON-lines trace file against `topology`.
    pub fn open(path: impl AsRef<Path>, topology: &Topology) -> Result<Self, SimError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| SimError::trace(path, 0, e))?;
        let trace = Self::parse(std::io::BufReader::new(file), path, topology)?;
        info!(
            "Loaded dataplane trace {} ({} packets)",
            path.display(),
            trace.remaining()
        );
        Ok(trace)
    }

    /// Parses trace lines; blank lines are skipped.
    ///
    /// Every referenced interface must exist in `topology`.
    pub fn parse<R: BufRead>(reader: R, path: &Path, topology: &Topology) -> Result<Self, SimError> {
        let mut pending = VecDeque::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| SimError::trace(path, line_no, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TraceEntry =
                serde_json::from_str(&line).map_err(|e| SimError::trace(path, line_no, e))?;
            let interface = topology.find_interface(&entry.interface).ok_or_else(|| {
                SimError::trace(
                    path,
                    line_no,
                    format!("unknown interface '{}'", entry.interface),
                )
            })?;
            pending.push_back(TracedPacket {
                interface,
                payload: entry.payload,
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            pending,
            injected: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Packets not yet injected.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn injected(&self) -> usize {
        self.injected
    }

    pub fn peek_next(&self) -> Option<&TracedPacket> {
        self.pending.front()
    }

    /// Hands the next packet to the patch panel.
    ///
    /// Returns `Ok(None)` when the trace is exhausted. In buffered mode the
    /// inner option is `None` because the event was queued.
    pub fn inject_next(
        &mut self,
        panel: &mut PatchPanel,
    ) -> Result<Option<Option<DataplaneEvent>>, SimError> {
        let Some(packet) = self.pending.pop_front() else {
            return Ok(None);
        };
        let outcome = panel.forward(packet.interface, packet.payload)?;
        self.injected += 1;
        Ok(Some(outcome))
    }
}
