//! Offline file-system data-race analysis core.
//!
//! Replays a trace of task declarations, dependency edges and per-process
//! syscall effects and reports task pairs that touch the same path with
//! conflicting accesses and no happens-before ordering between them. This
//! crate has no knowledge of how a trace is produced, parsed from text, or
//! how results are rendered — see `fsracer-cli` for that.

pub mod analyzer;
pub mod detector;
pub mod driver;
pub mod error;
pub mod graph;
pub mod tables;
pub mod trace;

pub use detector::Fault;
pub use driver::Driver;
pub use error::{AnalysisError, Result};
pub use trace::TraceRecord;
