//! Error types for the causal sequence reducer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a reduction report.
///
/// Missing per-subsequence data is not an error; it is logged and the
/// subsequence is skipped.
#[derive(Debug, Error)]
pub enum McsError {
    /// The results directory holds no `interreplay_*` entries at all
    #[error("No subsequence directories found under {0}")]
    NoSubsequences(PathBuf),

    /// The lowest-indexed entry is not the reproducibility baseline
    #[error("Expected reproducibility baseline, found {0}")]
    MissingBaseline(PathBuf),

    /// A directory name does not carry a numeric index
    #[error("Malformed subsequence directory name: {0}")]
    BadDirectoryName(String),

    /// A trace line could not be decoded
    #[error("Trace {path}:{line}: {reason}")]
    TraceParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// The violation map could not be decoded
    #[error("Violation map {path}: {reason}")]
    Violations { path: PathBuf, reason: String },

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl McsError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        McsError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn trace(path: impl Into<PathBuf>, line: usize, reason: impl std::fmt::Display) -> Self {
        McsError::TraceParse {
            path: path.into(),
            line,
            reason: reason.to_string(),
        }
    }

    pub fn violations(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        McsError::Violations {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
