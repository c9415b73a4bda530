//! The race detector.
//!
//! For every path touched by more than one task, reports task pairs whose
//! accesses conflict and between which the dependency graph establishes no
//! happens-before ordering in either direction. Grounded on
//! `original_source/lib/RaceDetector.{h,cpp}`.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::analyzer::dependency::NodeKind;
use crate::analyzer::fs::TaskAccess;
use crate::graph::Graph;
use crate::trace::AccessType;

/// A detected conflicting pair of accesses to the same path by two tasks
/// with no ordering between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub path: PathBuf,
    pub task1: String,
    pub access1: AccessType,
    pub debug1: Option<String>,
    pub task2: String,
    pub access2: AccessType,
    pub debug2: Option<String>,
}

/// Two accesses are read-like (and so never conflict with each other) iff
/// both are `Consumed` or `Touched`; `Produced`/`Expunged` always conflict
/// with anything, including each other. `original_source`'s `HasConflict`
/// only spells this out for `acc1 == CONSUMED`/`PRODUCED`/`EXPUNGED`; we
/// extend the same read/write split to `Touched` for a total, symmetric
/// relation (see DESIGN.md).
fn conflicts(a: AccessType, b: AccessType) -> bool {
    fn read_like(x: AccessType) -> bool {
        matches!(x, AccessType::Consumed | AccessType::Touched)
    }
    !(read_like(a) && read_like(b))
}

/// Per spec §4.4: look up both nodes; if either is absent from the graph
/// entirely, they are unordered (`false`) — an undeclared task (e.g. the
/// implicit `"main"` default, or an async `sysop` owner that was never
/// `newTask`-declared) must still be able to race. Only a *file* node is
/// always ordered, since it has no task identity to test reachability on.
fn happens_before(
    graph: &Graph<NodeKind>,
    cache: &mut HashMap<String, HashSet<String>>,
    source: &str,
    target: &str,
) -> bool {
    let (Some(source_node), Some(target_node)) = (graph.node(source), graph.node(target)) else {
        return false;
    };
    if !source_node.obj.is_task() || !target_node.obj.is_task() {
        return true;
    }
    let reach = cache
        .entry(source.to_string())
        .or_insert_with(|| graph.dfs(source));
    reach.contains(target)
}

/// Runs the detector once over the full per-(path, task) access table.
/// Pairs are enumerated strictly (each unordered pair of distinct tasks
/// considered exactly once), which is behaviorally identical to
/// `original_source`'s `Get2Combinations` + `event_id` self-pair filter
/// without generating the redundant pairs in the first place.
#[must_use]
pub fn detect(
    dep_graph: &Graph<NodeKind>,
    fs_accesses: &HashMap<(PathBuf, String), TaskAccess>,
) -> Vec<Fault> {
    let mut grouped: HashMap<&PathBuf, Vec<(&String, &TaskAccess)>> = HashMap::new();
    for ((path, task), access) in fs_accesses {
        grouped.entry(path).or_default().push((task, access));
    }

    let mut cache: HashMap<String, HashSet<String>> = HashMap::new();
    let mut faults = Vec::new();
    for (path, accesses) in grouped {
        for i in 0..accesses.len() {
            for j in (i + 1)..accesses.len() {
                let (t1, a1) = accesses[i];
                let (t2, a2) = accesses[j];
                if t1 == t2 || !conflicts(a1.access, a2.access) {
                    continue;
                }
                if happens_before(dep_graph, &mut cache, t1, t2)
                    || happens_before(dep_graph, &mut cache, t2, t1)
                {
                    continue;
                }
                faults.push(Fault {
                    path: path.clone(),
                    task1: t1.clone(),
                    access1: a1.access,
                    debug1: a1.debug.clone(),
                    task2: t2.clone(),
                    access2: a2.access,
                    debug2: a2.debug.clone(),
                });
            }
        }
    }
    faults
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Task, TaskKind};

    fn task_graph(tasks: &[&str]) -> Graph<NodeKind> {
        let mut g = Graph::new();
        for t in tasks {
            g.add_node(
                (*t).to_string(),
                NodeKind::Task(Task {
                    kind: TaskKind::W,
                    value: None,
                }),
            );
        }
        g
    }

    fn access(access: AccessType) -> TaskAccess {
        TaskAccess {
            access,
            debug: None,
        }
    }

    #[test]
    fn unordered_conflicting_writers_race() {
        let graph = task_graph(&["a", "b"]);
        let mut accesses = HashMap::new();
        accesses.insert(
            (PathBuf::from("/f"), "a".to_string()),
            access(AccessType::Produced),
        );
        accesses.insert(
            (PathBuf::from("/f"), "b".to_string()),
            access(AccessType::Produced),
        );
        let faults = detect(&graph, &accesses);
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn ordered_tasks_do_not_race() {
        let mut graph = task_graph(&["a", "b"]);
        graph.add_edge("a", "b", crate::graph::EdgeLabel::HappensBefore);
        let mut accesses = HashMap::new();
        accesses.insert(
            (PathBuf::from("/f"), "a".to_string()),
            access(AccessType::Produced),
        );
        accesses.insert(
            (PathBuf::from("/f"), "b".to_string()),
            access(AccessType::Produced),
        );
        assert!(detect(&graph, &accesses).is_empty());
    }

    #[test]
    fn two_readers_never_conflict() {
        let graph = task_graph(&["a", "b"]);
        let mut accesses = HashMap::new();
        accesses.insert(
            (PathBuf::from("/f"), "a".to_string()),
            access(AccessType::Consumed),
        );
        accesses.insert(
            (PathBuf::from("/f"), "b".to_string()),
            access(AccessType::Consumed),
        );
        assert!(detect(&graph, &accesses).is_empty());
    }

    #[test]
    fn no_duplicate_faults_for_same_pair() {
        let graph = task_graph(&["a", "b"]);
        let mut accesses = HashMap::new();
        accesses.insert(
            (PathBuf::from("/f"), "a".to_string()),
            access(AccessType::Produced),
        );
        accesses.insert(
            (PathBuf::from("/f"), "b".to_string()),
            access(AccessType::Consumed),
        );
        let faults = detect(&graph, &accesses);
        assert_eq!(faults.len(), 1);
    }

    #[test]
    fn undeclared_tasks_absent_from_graph_still_race() {
        let graph: Graph<NodeKind> = Graph::new();
        let mut accesses = HashMap::new();
        accesses.insert(
            (PathBuf::from("/f"), "main".to_string()),
            access(AccessType::Produced),
        );
        accesses.insert(
            (PathBuf::from("/f"), "worker".to_string()),
            access(AccessType::Produced),
        );
        let faults = detect(&graph, &accesses);
        assert_eq!(faults.len(), 1);
    }
}
