//! Analyzers: independent consumers of the [`crate::trace::TraceRecord`]
//! stream, fed in registration order by [`crate::driver::Driver`].

use crate::error::Result;
use crate::trace::TraceRecord;

pub mod dependency;
pub mod fs;

/// A single registered analyzer. Each analyzer owns its own state; none
/// reads another's, matching spec's "no global mutable state" design note.
pub trait Analyzer {
    /// A short name used in diagnostics (`original_source`'s `GetName`).
    fn name(&self) -> &'static str;

    /// Observes one trace record. Absent-lookup conditions are silent
    /// no-ops; only genuine invariant violations return `Err`.
    fn observe(&mut self, record: &TraceRecord) -> Result<()>;
}
