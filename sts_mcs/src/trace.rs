//! Event traces recorded by replay runs.
//!
//! A trace file is JSON lines, one recorded event per line:
//!
//! ```text
//! {"class": "SwitchFailure", "label": "e3", "time": [1380000000, 120]}
//! {"class": "ControlMessageReceive", "label": "i4", "time": [1380000000, 450]}
//! ```
//!
//! Only events whose class is an input event (something the harness
//! injected) become [`InputEvent`]s; internal events observed from the
//! controllers are skipped.

use crate::error::McsError;

use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;

/// Event classes the harness injects. Everything else is internal.
pub const INPUT_EVENT_CLASSES: &[&str] = &[
    "SwitchFailure",
    "SwitchRecovery",
    "LinkFailure",
    "LinkRecovery",
    "ControllerFailure",
    "ControllerRecovery",
    "HostMigration",
    "PolicyChange",
    "TrafficInjection",
    "WaitTime",
    "CheckInvariants",
    "ControlChannelBlock",
    "ControlChannelUnblock",
    "DataplaneDrop",
    "BlockControllerPair",
    "UnblockControllerPair",
    "LinkDiscovery",
    "ConnectToControllers",
    "NOPInput",
];

/// Returns true if `class` names an injected input event.
pub fn is_input_class(class: &str) -> bool {
    INPUT_EVENT_CLASSES.contains(&class)
}

/// One injected event.
///
/// `index` is the position among the trace's input events. Events are
/// matched across traces by `label`; the index of the same event differs
/// between a full trace and a subsequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputEvent {
    pub label: String,
    pub index: usize,
}

/// Ordered input events of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventTrace {
    pub input_events: Vec<InputEvent>,
}

impl EventTrace {
    /// Builds a trace from labels in order.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let input_events = labels
            .into_iter()
            .enumerate()
            .map(|(index, label)| InputEvent {
                label: label.into(),
                index,
            })
            .collect();
        Self { input_events }
    }

    pub fn len(&self) -> usize {
        self.input_events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_events.is_empty()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.input_events.iter().map(|e| e.label.as_str())
    }
}

/// Source of event traces.
pub trait TraceParser {
    fn parse_trace(&self, path: &Path) -> Result<EventTrace, McsError>;
}

#[derive(Debug, Deserialize)]
struct TraceLine {
    class: String,
    label: String,
}

/// Parser for JSON-lines trace files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTraceParser;

impl JsonTraceParser {
    /// Parses trace lines from any reader; blank lines are skipped.
    pub fn parse_reader<R: BufRead>(reader: R, path: &Path) -> Result<EventTrace, McsError> {
        let mut input_events = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| McsError::trace(path, line_no, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: TraceLine =
                serde_json::from_str(&line).map_err(|e| McsError::trace(path, line_no, e))?;
            if is_input_class(&entry.class) {
                input_events.push(InputEvent {
                    label: entry.label,
                    index: input_events.len(),
                });
            }
        }
        Ok(EventTrace { input_events })
    }
}

impl TraceParser for JsonTraceParser {
    fn parse_trace(&self, path: &Path) -> Result<EventTrace, McsError> {
        let file = std::fs::File::open(path).map_err(|e| McsError::io(path, e))?;
        Self::parse_reader(std::io::BufReader::new(file), path)
    }
}
