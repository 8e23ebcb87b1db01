//! Minimal Causal Sequence reducer
//!
//! Given the results directory of a delta debugging session, reports for
//! every subsequence that reproduced the violation which input events it
//! kept, and how small the causal sequence had become by that round.
//!
//! # Usage
//!
//! ```ignore
//! use sts_mcs::{depict, JsonTraceParser, ResultsLayout, ViolationMap};
//!
//! let violations = ViolationMap::load("violations.json")?;
//! let layout = ResultsLayout::discover("experiments/run_1")?;
//! let report = depict(&layout, &violations, &JsonTraceParser)?;
//! print!("{}", report.render_table());
//! ```

mod error;
mod formatter;
mod report;
mod results_dir;
mod trace;
mod violations;

pub use error::McsError;
pub use formatter::{EliminationRecord, ReportRow, TraceFormatter, FINAL_MCS_LABEL};
pub use report::Report;
pub use results_dir::{
    InterReplayDirectory, ResultsLayout, BASELINE_NAME, FINAL_MCS_MARKER, TRACE_FILE,
};
pub use trace::{is_input_class, EventTrace, InputEvent, JsonTraceParser, TraceParser, INPUT_EVENT_CLASSES};
pub use violations::ViolationMap;

use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Builds the reduction report for one results directory.
///
/// The baseline supplies event order and is never a row. A subsequence
/// becomes a row if it is the final MCS or its violation flag is true.
/// Subsequences known to only one of `layout` and `violations`, or whose
/// trace file is missing, are skipped with a warning.
pub fn depict(
    layout: &ResultsLayout,
    violations: &ViolationMap,
    parser: &dyn TraceParser,
) -> Result<Report, McsError> {
    let full_trace = parser.parse_trace(&layout.baseline.trace_path())?;
    debug!(
        "Full trace {}: {} input events",
        layout.baseline,
        full_trace.len()
    );

    let mut report = Report::new(&full_trace);
    let mut formatter = TraceFormatter::new(full_trace);

    for dir in &layout.subsequences {
        let label = if dir.is_final_mcs() {
            FINAL_MCS_LABEL.to_string()
        } else {
            match violations.get(dir.index) {
                Some(true) => dir.index.to_string(),
                Some(false) => continue,
                None => {
                    warn!("No such subsequence: {}", dir.index);
                    continue;
                }
            }
        };

        let trace_path = dir.trace_path();
        let trace = match parser.parse_trace(&trace_path) {
            Ok(trace) => trace,
            Err(McsError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                warn!("No trace for subsequence {}: {}", dir.index, trace_path.display());
                continue;
            }
            Err(e) => return Err(e),
        };
        let row = formatter.format_trace(&label, &trace);
        debug!("Subsequence {}: MCS size {}", label, row.mcs_size);
        report.push(row);
    }

    let on_disk: BTreeSet<u64> = layout.subsequences.iter().map(|d| d.index).collect();
    for index in violations.indices() {
        if index != layout.baseline.index && !on_disk.contains(&index) {
            warn!("No such subsequence: {} (in violation map, not on disk)", index);
        }
    }

    Ok(report)
}
