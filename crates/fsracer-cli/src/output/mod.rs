//! Concrete output formats: everything `fsracer-core` deliberately stays
//! agnostic about.

pub mod dep_graph;
pub mod fs_access;
pub mod race_report;
