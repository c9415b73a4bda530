//! Concrete DOT/CSV rendering of the dependency graph.
//!
//! Implements [`fsracer_core::graph::Printer`] for `NodeKind`, taking the
//! place of `original_source/lib/DependencyInferenceExpAnalyzer.h`'s
//! `GraphPrinter<TaskDir, EdgeLabel>` template specialization. A task node
//! that never executed (no `EXECUTED` attribute) is suppressed, along with
//! any edge touching it; file nodes have no execution concept of their own
//! and are always rendered.

use fsracer_core::analyzer::dependency::{NodeKind, EXECUTED_ATTR};
use fsracer_core::graph::{EdgeLabel, Node, Printer};
use fsracer_core::trace::{Task, TaskKind};

pub struct DependencyGraphPrinter;

fn task_label(task: &Task) -> String {
    match task.kind {
        TaskKind::S => format!("S {}", task.value.unwrap_or_default()),
        TaskKind::M => format!("M {}", task.value.unwrap_or_default()),
        TaskKind::W => format!("W {}", task.value.unwrap_or_default()),
        TaskKind::Ext => "EXTERNAL".to_string(),
    }
}

fn node_label(node: &Node<NodeKind>) -> String {
    match &node.obj {
        NodeKind::Task(task) => format!("task:{}[{}]", node.id, task_label(task)),
        NodeKind::File => format!("file:{}", node.id),
    }
}

fn is_renderable(node: &Node<NodeKind>) -> bool {
    match &node.obj {
        NodeKind::Task(_) => node.has_attribute(EXECUTED_ATTR),
        NodeKind::File => true,
    }
}

impl Printer<NodeKind> for DependencyGraphPrinter {
    fn node_dot(&self, node: &Node<NodeKind>) -> Option<String> {
        is_renderable(node).then(|| format!("\"{}\" [label=\"{}\"]", node.id, node_label(node)))
    }

    fn node_csv(&self, node: &Node<NodeKind>) -> Option<String> {
        is_renderable(node).then(|| format!("{},{}", node.id, node_label(node)))
    }

    fn edge_dot(&self, source: &Node<NodeKind>, target: &Node<NodeKind>) -> Option<String> {
        (is_renderable(source) && is_renderable(target))
            .then(|| format!("\"{}\"->\"{}\"", source.id, target.id))
    }

    fn edge_csv(&self, source: &Node<NodeKind>, target: &Node<NodeKind>) -> Option<String> {
        (is_renderable(source) && is_renderable(target))
            .then(|| format!("{},{}", source.id, target.id))
    }

    fn edge_label(&self, label: EdgeLabel) -> String {
        label.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsracer_core::graph::{Graph, GraphFormat};

    #[test]
    fn unexecuted_task_is_omitted() {
        let mut g: Graph<NodeKind> = Graph::new();
        g.add_node(
            "t1",
            NodeKind::Task(Task {
                kind: TaskKind::W,
                value: Some(1),
            }),
        );
        let dot = g.print(GraphFormat::Dot, &DependencyGraphPrinter);
        assert!(!dot.contains("t1"));
    }

    #[test]
    fn executed_task_and_file_are_rendered() {
        let mut g: Graph<NodeKind> = Graph::new();
        g.add_node(
            "t1",
            NodeKind::Task(Task {
                kind: TaskKind::W,
                value: Some(1),
            }),
        );
        g.add_node_attr("t1", EXECUTED_ATTR);
        g.add_node("/tmp/x", NodeKind::File);
        g.add_edge("t1", "/tmp/x", EdgeLabel::Produces);
        let dot = g.print(GraphFormat::Dot, &DependencyGraphPrinter);
        assert!(dot.contains("t1"));
        assert!(dot.contains("/tmp/x"));
        assert!(dot.contains("PRODUCES"));
    }
}
