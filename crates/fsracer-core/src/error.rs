//! Error taxonomy for the analysis core.
//!
//! Mirrors `original_source/lib/Utils.h`'s `utils::err::ErrType` split between
//! a trace-ingestion error and an analyzer invariant violation. `RUNTIME` is
//! deliberately absent here: it belongs to the CLI crate's I/O boundary,
//! since the core never opens a file or spawns a process of its own.
//!
//! Per spec, an absent lookup (unknown fd, unknown task, unknown inode) is
//! *not* an error condition inside an analyzer — it is a silent no-op,
//! matching `original_source`'s pervasive `if (!x.has_value()) return;`
//! style. `AnalyzerError` is reserved for states that should be unreachable
//! given a well-formed trace (e.g. a `sysop` `end` with no matching begin).

use thiserror::Error;

/// Errors produced while ingesting or analyzing a trace.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A trace record was malformed or referred to a line that could not be
    /// parsed into a valid [`crate::trace::TraceRecord`]. Bound to the
    /// 1-indexed source line per spec §7; ingestion aborts on the first one.
    #[error("TRACE_ERROR: {message} (location: line {line})")]
    Trace { message: String, line: usize },

    /// An analyzer observed a state that a well-formed trace should never
    /// produce (as opposed to an ordinary absent-lookup no-op).
    #[error("ANALYZER_ERROR: {message}")]
    Analyzer { message: String },
}

impl AnalysisError {
    #[must_use]
    pub fn trace(message: impl Into<String>, line: usize) -> Self {
        Self::Trace {
            message: message.into(),
            line,
        }
    }

    #[must_use]
    pub fn analyzer(message: impl Into<String>) -> Self {
        Self::Analyzer {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
