//! An arena-indexed, labelled multigraph.
//!
//! Grounded on `original_source/lib/Graph.h`'s `Node`/`Graph` templates.
//! The C++ version indexes nodes by an opaque `size_t`; both users of this
//! graph (the dependency analyzer) mint node ids directly from task names
//! and canonical paths, so we use `String` as the id type rather than
//! introducing an extra arena-index layer the callers would have to
//! maintain themselves. `GraphPrinter<T, L>` template specialization becomes
//! the [`Printer`] trait, implemented per output format in the CLI crate.

use std::collections::HashSet;
use std::fmt::Write as _;

/// A node in the graph: an id, a caller-supplied payload, the edges leaving
/// it, and two reachability sets used by [`Graph::add_edge`] to keep direct
/// before/after neighborhoods available without a DFS.
#[derive(Debug, Clone)]
pub struct Node<T> {
    pub id: String,
    pub obj: T,
    pub dependents: HashSet<(String, EdgeLabel)>,
    pub before: HashSet<String>,
    pub after: HashSet<String>,
    pub attributes: HashSet<String>,
}

impl<T> Node<T> {
    fn new(id: String, obj: T) -> Self {
        Self {
            id,
            obj,
            dependents: HashSet::new(),
            before: HashSet::new(),
            after: HashSet::new(),
            attributes: HashSet::new(),
        }
    }

    #[must_use]
    pub fn has_attribute(&self, attr: &str) -> bool {
        self.attributes.contains(attr)
    }
}

/// Edge labels used by the dependency graph (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    HappensBefore,
    Consumes,
    Produces,
}

impl EdgeLabel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HappensBefore => "HAPPENS_BEFORE",
            Self::Consumes => "CONSUMES",
            Self::Produces => "PRODUCES",
        }
    }
}

/// Output format selector for [`Graph::print`], matching spec §6's
/// `--dep-graph-format {dot,csv}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Dot,
    Csv,
}

/// Customizes how nodes and edges are rendered, taking the place of the
/// `GraphPrinter<T, L>` template specialization point in
/// `original_source/lib/Graph.h`. Returning `None` from a node/edge method
/// suppresses that node/edge from the output entirely (the C++ empty-string
/// sentinel), matching the `EXECUTED`-attribute gating spec §4.2 describes.
pub trait Printer<T> {
    /// Renders a node for DOT output, or `None` to omit it.
    fn node_dot(&self, node: &Node<T>) -> Option<String>;
    /// Renders a node for CSV output, or `None` to omit it.
    fn node_csv(&self, node: &Node<T>) -> Option<String>;
    /// Renders an edge between two nodes for DOT output, or `None` to omit it.
    fn edge_dot(&self, source: &Node<T>, target: &Node<T>) -> Option<String>;
    /// Renders an edge between two nodes for CSV output, or `None` to omit it.
    fn edge_csv(&self, source: &Node<T>, target: &Node<T>) -> Option<String>;
    /// Renders an edge label.
    fn edge_label(&self, label: EdgeLabel) -> String {
        label.as_str().to_string()
    }
}

/// A labelled multigraph over nodes carrying a caller-chosen payload `T`.
#[derive(Debug, Clone, Default)]
pub struct Graph<T> {
    nodes: std::collections::HashMap<String, Node<T>>,
}

impl<T> Graph<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: std::collections::HashMap::new(),
        }
    }

    /// Adds a node, mirroring `original_source/lib/Graph.h::AddNode`'s use
    /// of `unordered_map::emplace`: a no-op if `id` is already present, so
    /// re-declaring a node never clobbers its existing edges or attributes.
    pub fn add_node(&mut self, id: impl Into<String>, obj: T) {
        let id = id.into();
        self.nodes.entry(id.clone()).or_insert_with(|| Node::new(id, obj));
    }

    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node<T>> {
        self.nodes.get(id)
    }

    pub fn add_node_attr(&mut self, id: &str, attr: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.attributes.insert(attr.into());
        }
    }

    #[must_use]
    pub fn has_node_attr(&self, id: &str, attr: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.has_attribute(attr))
    }

    pub fn remove_node_attr(&mut self, id: &str, attr: &str) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.attributes.remove(attr);
        }
    }

    /// Adds an edge `source -> target`. Self-loops are dropped silently.
    /// `before`/`after` are only updated when both endpoints already exist,
    /// matching `original_source/lib/Graph.h::AddEdge`.
    pub fn add_edge(&mut self, source: &str, target: &str, label: EdgeLabel) {
        if source == target {
            return;
        }
        let target_exists = self.nodes.contains_key(target);
        if let Some(node) = self.nodes.get_mut(source) {
            node.dependents.insert((target.to_string(), label));
        } else {
            return;
        }
        if !target_exists {
            return;
        }
        if let Some(node) = self.nodes.get_mut(source) {
            node.before.insert(target.to_string());
        }
        if let Some(node) = self.nodes.get_mut(target) {
            node.after.insert(source.to_string());
        }
    }

    pub fn remove_edge(&mut self, source: &str, target: &str, label: EdgeLabel) {
        if let Some(node) = self.nodes.get_mut(source) {
            node.dependents.remove(&(target.to_string(), label));
        }
    }

    /// Returns the set of node ids reachable from `source`, including
    /// `source` itself, via an iterative stack-based DFS (no recursion, no
    /// risk of stack overflow on deep dependency chains).
    #[must_use]
    pub fn dfs(&self, source: &str) -> HashSet<String> {
        let mut visited = HashSet::new();
        let mut pool = vec![source.to_string()];
        while let Some(node_id) = pool.pop() {
            if visited.contains(&node_id) {
                continue;
            }
            visited.insert(node_id.clone());
            if let Some(node) = self.nodes.get(&node_id) {
                for (dep, _label) in &node.dependents {
                    if !visited.contains(dep) {
                        pool.push(dep.clone());
                    }
                }
            }
        }
        visited
    }

    #[must_use]
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.dfs(source).contains(target)
    }

    #[must_use]
    pub fn empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes with no outgoing edges.
    #[must_use]
    pub fn sinks(&self) -> HashSet<String> {
        self.nodes
            .values()
            .filter(|n| n.dependents.is_empty())
            .map(|n| n.id.clone())
            .collect()
    }

    #[must_use]
    pub fn nodes(&self) -> impl Iterator<Item = &Node<T>> {
        self.nodes.values()
    }

    /// Renders the graph in the requested format using the given printer.
    pub fn print(&self, format: GraphFormat, printer: &dyn Printer<T>) -> String {
        match format {
            GraphFormat::Dot => self.print_dot(printer),
            GraphFormat::Csv => self.print_csv(printer),
        }
    }

    fn print_dot(&self, printer: &dyn Printer<T>) -> String {
        let mut out = String::from("digraph {\n");
        for node in self.nodes.values() {
            if let Some(node_str) = printer.node_dot(node) {
                let _ = writeln!(out, "  {node_str};");
            }
        }
        for node in self.nodes.values() {
            for (target_id, label) in &node.dependents {
                let Some(target) = self.nodes.get(target_id) else {
                    continue;
                };
                let Some(edge_str) = printer.edge_dot(node, target) else {
                    continue;
                };
                let _ = writeln!(
                    out,
                    "  {edge_str} [label=\"{}\"];",
                    printer.edge_label(*label)
                );
            }
        }
        out.push_str("}\n");
        out
    }

    fn print_csv(&self, printer: &dyn Printer<T>) -> String {
        let mut edges: HashSet<(String, EdgeLabel)> = HashSet::new();
        let mut out = String::new();
        for node in self.nodes.values() {
            if let Some(node_str) = printer.node_csv(node) {
                let _ = writeln!(out, "{node_str}");
            }
        }
        for node in self.nodes.values() {
            for (target_id, label) in &node.dependents {
                let Some(target) = self.nodes.get(target_id) else {
                    continue;
                };
                let Some(edge_str) = printer.edge_csv(node, target) else {
                    continue;
                };
                if edges.insert((edge_str.clone(), *label)) {
                    let _ = writeln!(out, "{edge_str},{}", printer.edge_label(*label));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UnitPrinter;
    impl Printer<()> for UnitPrinter {
        fn node_dot(&self, node: &Node<()>) -> Option<String> {
            Some(node.id.clone())
        }
        fn node_csv(&self, node: &Node<()>) -> Option<String> {
            Some(node.id.clone())
        }
        fn edge_dot(&self, source: &Node<()>, target: &Node<()>) -> Option<String> {
            Some(format!("{}->{}", source.id, target.id))
        }
        fn edge_csv(&self, source: &Node<()>, target: &Node<()>) -> Option<String> {
            Some(format!("{},{}", source.id, target.id))
        }
    }

    #[test]
    fn self_loop_is_dropped() {
        let mut g: Graph<()> = Graph::new();
        g.add_node("a", ());
        g.add_edge("a", "a", EdgeLabel::HappensBefore);
        assert!(g.node("a").unwrap().dependents.is_empty());
    }

    #[test]
    fn edge_to_missing_target_skips_before_after() {
        let mut g: Graph<()> = Graph::new();
        g.add_node("a", ());
        g.add_edge("a", "b", EdgeLabel::HappensBefore);
        assert_eq!(g.node("a").unwrap().dependents.len(), 1);
        assert!(g.node("a").unwrap().before.is_empty());
    }

    #[test]
    fn dfs_reaches_transitive_dependents() {
        let mut g: Graph<()> = Graph::new();
        for id in ["a", "b", "c"] {
            g.add_node(id, ());
        }
        g.add_edge("a", "b", EdgeLabel::HappensBefore);
        g.add_edge("b", "c", EdgeLabel::HappensBefore);
        assert!(g.has_path("a", "c"));
        assert!(!g.has_path("c", "a"));
    }

    #[test]
    fn sinks_have_no_outgoing_edges() {
        let mut g: Graph<()> = Graph::new();
        g.add_node("a", ());
        g.add_node("b", ());
        g.add_edge("a", "b", EdgeLabel::HappensBefore);
        let sinks = g.sinks();
        assert!(sinks.contains("b"));
        assert!(!sinks.contains("a"));
    }

    #[test]
    fn node_attributes_round_trip() {
        let mut g: Graph<()> = Graph::new();
        g.add_node("a", ());
        assert!(!g.has_node_attr("a", "EXECUTED"));
        g.add_node_attr("a", "EXECUTED");
        assert!(g.has_node_attr("a", "EXECUTED"));
        g.remove_node_attr("a", "EXECUTED");
        assert!(!g.has_node_attr("a", "EXECUTED"));
    }
}
