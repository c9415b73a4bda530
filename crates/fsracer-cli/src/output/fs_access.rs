//! JSON/CSV rendering of the per-(path, task) FS access table.
//!
//! Grounded on `original_source/lib/FSAnalyzer.cpp`'s `DumpJSON`/`DumpCSV`:
//! JSON is an object mapping path to an array of `{block, effect}`
//! (`FSAnalyzer.cpp:462-487`); CSV is three columns, `path,task,effect`
//! (`FSAnalyzer.cpp:490-499`).

use std::collections::BTreeMap;
use std::fmt::Write as _;

use fsracer_core::analyzer::fs::FsAnalyzer;
use fsracer_core::trace::AccessType;
use serde::Serialize;

fn access_str(access: AccessType) -> &'static str {
    match access {
        AccessType::Consumed => "consumed",
        AccessType::Produced => "produced",
        AccessType::Touched => "touched",
        AccessType::Expunged => "expunged",
    }
}

#[derive(Debug, Serialize)]
struct BlockEffect {
    block: String,
    effect: &'static str,
}

fn grouped_by_path(fs: &FsAnalyzer) -> BTreeMap<String, Vec<BlockEffect>> {
    let mut grouped: BTreeMap<String, Vec<BlockEffect>> = BTreeMap::new();
    for ((path, task), access) in fs.task_accesses() {
        grouped
            .entry(path.to_string_lossy().to_string())
            .or_default()
            .push(BlockEffect {
                block: task.clone(),
                effect: access_str(access.access),
            });
    }
    for entries in grouped.values_mut() {
        entries.sort_by(|a, b| a.block.cmp(&b.block));
    }
    grouped
}

/// Renders the access table as `{ "<path>": [ {"block": ..., "effect":
/// ...}, ... ], ... }`, one array entry per task that touched the path.
///
/// # Errors
/// Returns an error only if serialization itself fails (it does not, for
/// this record shape, but the signature stays honest about `serde_json`).
pub fn to_json(fs: &FsAnalyzer) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&grouped_by_path(fs))
}

/// Renders the access table as `path,task,effect` CSV rows.
#[must_use]
pub fn to_csv(fs: &FsAnalyzer) -> String {
    let mut rows: Vec<(String, String, &'static str)> = fs
        .task_accesses()
        .iter()
        .map(|((path, task), access)| {
            (
                path.to_string_lossy().to_string(),
                task.clone(),
                access_str(access.access),
            )
        })
        .collect();
    rows.sort();
    let mut out = String::new();
    for (path, task, effect) in rows {
        let _ = writeln!(out, "{path},{task},{effect}");
    }
    out
}
