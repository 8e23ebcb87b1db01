//! Layout of a delta debugging results directory.
//!
//! ```text
//! results/
//!   interreplay_0_reproducibility/events.trace   full unreduced run
//!   interreplay_1_r_1/events.trace               one replayed subsequence
//!   interreplay_7_final_mcs/events.trace         the final minimal subsequence
//! ```

use crate::error::McsError;

use std::path::{Path, PathBuf};

/// Name prefix of every replay directory.
pub const INTERREPLAY_PREFIX: &str = "interreplay_";

/// Exact name of the unreduced baseline run.
pub const BASELINE_NAME: &str = "interreplay_0_reproducibility";

/// Marker in the name of the final minimal subsequence.
pub const FINAL_MCS_MARKER: &str = "_final_mcs";

/// Trace file inside each replay directory.
pub const TRACE_FILE: &str = "events.trace";

/// One `interreplay_<index>_<suffix>` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterReplayDirectory {
    pub path: PathBuf,
    pub index: u64,
}

impl InterReplayDirectory {
    /// Parses the index out of the directory name.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, McsError> {
        let path = path.into();
        let name = dir_name(&path);
        let index = name
            .strip_prefix(INTERREPLAY_PREFIX)
            .and_then(|rest| rest.split('_').next())
            .and_then(|index| index.parse().ok())
            .ok_or_else(|| McsError::BadDirectoryName(name.clone()))?;
        Ok(Self { path, index })
    }

    pub fn name(&self) -> String {
        dir_name(&self.path)
    }

    /// True for the final minimal subsequence.
    pub fn is_final_mcs(&self) -> bool {
        self.name().contains(FINAL_MCS_MARKER)
    }

    pub fn trace_path(&self) -> PathBuf {
        self.path.join(TRACE_FILE)
    }
}

impl std::fmt::Display for InterReplayDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Baseline plus subsequences in ascending index order.
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    pub baseline: InterReplayDirectory,
    pub subsequences: Vec<InterReplayDirectory>,
}

impl ResultsLayout {
    /// Scans `root` for replay directories.
    ///
    /// Fails if there are none, or if the lowest-indexed one is not the
    /// reproducibility baseline.
    pub fn discover(root: impl AsRef<Path>) -> Result<Self, McsError> {
        let root = root.as_ref();
        let entries = std::fs::read_dir(root).map_err(|e| McsError::io(root, e))?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| McsError::io(root, e))?;
            let is_replay = entry
                .file_name()
                .to_string_lossy()
                .starts_with(INTERREPLAY_PREFIX);
            if is_replay && entry.path().is_dir() {
                dirs.push(InterReplayDirectory::new(entry.path())?);
            }
        }
        if dirs.is_empty() {
            return Err(McsError::NoSubsequences(root.to_path_buf()));
        }

        dirs.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.path.cmp(&b.path)));
        let baseline = dirs.remove(0);
        if baseline.name() != BASELINE_NAME {
            return Err(McsError::MissingBaseline(baseline.path));
        }

        Ok(Self {
            baseline,
            subsequences: dirs,
        })
    }
}
