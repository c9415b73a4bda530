//! The analysis driver: feeds each [`TraceRecord`] to every registered
//! analyzer in registration order, then runs the race detector once the
//! stream is exhausted. Grounded on
//! `original_source/lib/TraceProcessor.cpp`'s `InitAnalyzers` + per-record
//! fan-out. Single-threaded and sequential, per spec §5 — there is no
//! concurrency here to race on in the first place.

use tracing::debug;

use crate::analyzer::dependency::DependencyAnalyzer;
use crate::analyzer::fs::FsAnalyzer;
use crate::analyzer::Analyzer;
use crate::detector::{self, Fault};
use crate::error::Result;
use crate::trace::TraceRecord;

/// Owns the two built-in analyzers plus any additional ones registered by
/// a caller (mirroring `DumpAnalyzer` as an optional extra pass in the
/// original `TraceProcessor`), and runs the detector against the first two.
pub struct Driver {
    dependency: DependencyAnalyzer,
    fs: FsAnalyzer,
    extra: Vec<Box<dyn Analyzer>>,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl Driver {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dependency: DependencyAnalyzer::new(),
            fs: FsAnalyzer::new(),
            extra: Vec::new(),
        }
    }

    /// Registers an additional analyzer, observed after the built-in two.
    pub fn register(&mut self, analyzer: Box<dyn Analyzer>) {
        self.extra.push(analyzer);
    }

    /// Feeds one record to every registered analyzer, in registration
    /// order (dependency, then fs, then any extras).
    pub fn observe(&mut self, record: &TraceRecord) -> Result<()> {
        debug!(?record, "dispatching trace record");
        self.dependency.observe(record)?;
        self.fs.observe(record)?;
        for analyzer in &mut self.extra {
            analyzer.observe(record)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn dependency(&self) -> &DependencyAnalyzer {
        &self.dependency
    }

    #[must_use]
    pub fn fs(&self) -> &FsAnalyzer {
        &self.fs
    }

    /// Runs the race detector over the accumulated state. Intended to be
    /// called once, after the trace stream is exhausted.
    #[must_use]
    pub fn detect(&self) -> Vec<Fault> {
        detector::detect(self.dependency.graph(), self.fs.task_accesses())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{AccessType, DirFd, FsOp, FsOpKind, Task, TaskKind};
    use std::path::PathBuf;

    #[test]
    fn end_to_end_two_unordered_tasks_race_on_same_file() {
        let mut driver = Driver::new();
        for (name, pid) in [("a", 1u64), ("b", 2u64)] {
            driver
                .observe(&TraceRecord::NewTask {
                    name: name.to_string(),
                    task: Task {
                        kind: TaskKind::W,
                        value: None,
                    },
                })
                .unwrap();
            driver
                .observe(&TraceRecord::ExecTaskBeg {
                    name: name.to_string(),
                })
                .unwrap();
            driver
                .observe(&TraceRecord::Op(FsOp {
                    pid,
                    debug: None,
                    kind: FsOpKind::Hpath {
                        dirfd: DirFd::AtCwd,
                        path: PathBuf::from("/tmp/shared"),
                        access: AccessType::Produced,
                    },
                }))
                .unwrap();
            driver.observe(&TraceRecord::End).unwrap();
        }
        let faults = driver.detect();
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn end_to_end_dependson_prevents_race() {
        let mut driver = Driver::new();
        for name in ["a", "b"] {
            driver
                .observe(&TraceRecord::NewTask {
                    name: name.to_string(),
                    task: Task {
                        kind: TaskKind::W,
                        value: None,
                    },
                })
                .unwrap();
        }
        driver
            .observe(&TraceRecord::DependsOn {
                source: "a".to_string(),
                target: "b".to_string(),
            })
            .unwrap();
        for (name, pid) in [("a", 1u64), ("b", 2u64)] {
            driver
                .observe(&TraceRecord::ExecTaskBeg {
                    name: name.to_string(),
                })
                .unwrap();
            driver
                .observe(&TraceRecord::Op(FsOp {
                    pid,
                    debug: None,
                    kind: FsOpKind::Hpath {
                        dirfd: DirFd::AtCwd,
                        path: PathBuf::from("/tmp/shared"),
                        access: AccessType::Produced,
                    },
                }))
                .unwrap();
            driver.observe(&TraceRecord::End).unwrap();
        }
        assert!(driver.detect().is_empty());
    }
}
