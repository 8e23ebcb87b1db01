//! Per-subsequence rows and the running MCS size.

use crate::trace::EventTrace;

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Label of the row for the final minimal subsequence.
pub const FINAL_MCS_LABEL: &str = "MCS";

/// Event label → label of the round that first eliminated it.
///
/// Append-only: once an event has a round it keeps it, even if a later
/// subsequence includes the event again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EliminationRecord {
    rounds: BTreeMap<String, String>,
}

impl EliminationRecord {
    /// Records `round` for `event` unless it already has one.
    ///
    /// Returns true if this call recorded it.
    pub fn record(&mut self, event: &str, round: &str) -> bool {
        if self.rounds.contains_key(event) {
            return false;
        }
        self.rounds.insert(event.to_string(), round.to_string());
        true
    }

    pub fn round_for(&self, event: &str) -> Option<&str> {
        self.rounds.get(event).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }
}

/// One rendered subsequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub label: String,

    /// Input events in the subsequence's own trace
    pub inputs: usize,

    /// Distinct events not yet eliminated, after this row
    pub mcs_size: usize,

    /// Per full-trace event, in full-trace order: present in this subsequence
    pub included: Vec<bool>,
}

/// Turns subsequence traces into rows relative to the full trace.
///
/// Rows must be formatted in ascending subsequence order, and only for
/// subsequences that reproduced the violation (or the final MCS).
#[derive(Debug, Clone)]
pub struct TraceFormatter {
    full_trace: EventTrace,
    distinct: HashSet<String>,
    eliminated: EliminationRecord,
}

impl TraceFormatter {
    pub fn new(full_trace: EventTrace) -> Self {
        let distinct = full_trace.labels().map(str::to_string).collect();
        Self {
            full_trace,
            distinct,
            eliminated: EliminationRecord::default(),
        }
    }

    pub fn full_trace(&self) -> &EventTrace {
        &self.full_trace
    }

    pub fn eliminated(&self) -> &EliminationRecord {
        &self.eliminated
    }

    /// Distinct events minus distinct events eliminated so far.
    pub fn mcs_size(&self) -> usize {
        self.distinct.len().saturating_sub(self.eliminated.len())
    }

    /// Formats one subsequence and records any newly eliminated events.
    pub fn format_trace(&mut self, label: &str, trace: &EventTrace) -> ReportRow {
        let present: HashSet<&str> = trace
            .labels()
            .filter(|l| self.distinct.contains(*l))
            .collect();

        let mut included = Vec::with_capacity(self.full_trace.len());
        for event in &self.full_trace.input_events {
            let is_present = present.contains(event.label.as_str());
            if !is_present {
                self.eliminated.record(&event.label, label);
            }
            included.push(is_present);
        }

        ReportRow {
            label: label.to_string(),
            inputs: trace.len(),
            mcs_size: self.mcs_size(),
            included,
        }
    }
}
