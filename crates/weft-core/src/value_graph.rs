//! ValueGraph: the uniform node/edge container behind every composite value.
//!
//! Lists, maps and user-defined graphs are all the same structure: a
//! `StableGraph` arena whose root node is the container itself. Membership is
//! expressed by edges out of the root (`Element` for lists, `Entry(key)` for
//! maps, `Contains` for user graphs); user graphs add `Link` edges between
//! members.
//!
//! # Ordering
//!
//! petgraph reuses vacant slots after removals, so index order is not
//! insertion order. Every edge carries a sequence number and
//! [`ValueGraph::edges_from`] sorts by it, which is what gives lists stable
//! positional semantics.
//!
//! # Mutation
//!
//! The primitives here enforce only `UnknownNode`/`UnknownEdge`/`Frozen`.
//! Rule pipelines live in [`crate::rules`]; evaluator-driven mutations always
//! go through the engine, never straight to these methods.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};

use crate::edge::Label;
use crate::error::GraphError;
use crate::id::{EdgeId, NodeId};
use crate::rules::Rule;
use crate::value::{GraphRef, MapKey, Value};

/// Which container semantics a graph carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphKind {
    List,
    Map,
    /// A user-defined graph type, tagged by name.
    User(String),
}

/// Free-form per-node metadata (timing, debug info).
pub type Metadata = IndexMap<String, String>;

/// A node: its payload and optional metadata.
#[derive(Debug, Clone)]
pub struct ValueNode {
    pub value: Value,
    pub metadata: Option<Metadata>,
}

/// An edge: semantic label, optional attached data, insertion sequence.
#[derive(Debug, Clone)]
pub struct ValueEdge {
    pub label: Label,
    pub data: Option<Value>,
    seq: u64,
}

impl ValueEdge {
    /// Insertion sequence number; strictly increasing per graph.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// A read-only view of one edge, as returned by [`ValueGraph::edges_from`].
#[derive(Debug, Clone, Copy)]
pub struct EdgeView<'a> {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    pub edge: &'a ValueEdge,
}

/// The uniform composite-value container.
#[derive(Debug, Clone)]
pub struct ValueGraph {
    kind: GraphKind,
    graph: StableGraph<ValueNode, ValueEdge, Directed, u32>,
    root: NodeId,
    rules: Vec<Rule>,
    frozen: bool,
    next_seq: u64,
}

impl ValueGraph {
    /// Creates an empty container of the given kind.
    pub fn new(kind: GraphKind) -> Self {
        let mut graph = StableGraph::new();
        let root = graph.add_node(ValueNode {
            value: Value::None,
            metadata: None,
        });
        ValueGraph {
            kind,
            graph,
            root: NodeId::from(root),
            rules: Vec::new(),
            frozen: false,
            next_seq: 0,
        }
    }

    pub fn list() -> Self {
        Self::new(GraphKind::List)
    }

    pub fn map() -> Self {
        Self::new(GraphKind::Map)
    }

    pub fn user(name: &str) -> Self {
        Self::new(GraphKind::User(name.to_string()))
    }

    /// Builds a list from a literal. Literal construction is not a
    /// mutation: a fresh graph has no rules to run.
    pub fn from_elements(elements: impl IntoIterator<Item = Value>) -> Self {
        let mut graph = Self::list();
        for value in elements {
            graph.attach(Label::Element, value);
        }
        graph
    }

    /// Builds a map from a literal; later duplicates overwrite earlier keys.
    pub fn from_entries(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        let mut graph = Self::map();
        for (key, value) in entries {
            match graph.entry_node(&key) {
                Some(node) => {
                    if let Some(weight) = graph.graph.node_weight_mut(node.into()) {
                        weight.value = value;
                    }
                }
                None => {
                    graph.attach(Label::Entry(key), value);
                }
            }
        }
        graph
    }

    fn attach(&mut self, label: Label, value: Value) -> NodeId {
        let node = self.graph.add_node(ValueNode {
            value,
            metadata: None,
        });
        let seq = self.bump_seq();
        self.graph.add_edge(
            self.root.into(),
            node,
            ValueEdge {
                label,
                data: None,
                seq,
            },
        );
        NodeId::from(node)
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn kind(&self) -> &GraphKind {
        &self.kind
    }

    /// The container node. Membership edges originate here.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The attached rules, in attachment order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Number of nodes, including the container root.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of members (list elements, map entries, user-graph nodes).
    pub fn len(&self) -> usize {
        self.members().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.graph.contains_node(id.into())
    }

    pub fn node(&self, id: NodeId) -> Option<&ValueNode> {
        self.graph.node_weight(id.into())
    }

    pub fn value(&self, id: NodeId) -> Option<&Value> {
        self.node(id).map(|n| &n.value)
    }

    pub fn edge(&self, id: EdgeId) -> Option<&ValueEdge> {
        self.graph.edge_weight(id.into())
    }

    /// Outgoing edges of `node`, in insertion order, optionally filtered by
    /// label.
    pub fn edges_from(&self, node: NodeId, filter: Option<&Label>) -> Vec<EdgeView<'_>> {
        self.edges_directed(node, Direction::Outgoing, filter)
    }

    /// Incoming edges of `node`, in insertion order.
    pub fn edges_to(&self, node: NodeId, filter: Option<&Label>) -> Vec<EdgeView<'_>> {
        self.edges_directed(node, Direction::Incoming, filter)
    }

    fn edges_directed(
        &self,
        node: NodeId,
        direction: Direction,
        filter: Option<&Label>,
    ) -> Vec<EdgeView<'_>> {
        let idx: NodeIndex<u32> = node.into();
        if !self.graph.contains_node(idx) {
            return Vec::new();
        }
        let mut edges: Vec<EdgeView<'_>> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| filter.map_or(true, |label| &e.weight().label == label))
            .map(|e| EdgeView {
                id: EdgeId::from(e.id()),
                from: NodeId::from(e.source()),
                to: NodeId::from(e.target()),
                edge: e.weight(),
            })
            .collect();
        edges.sort_by_key(|view| view.edge.seq);
        edges
    }

    /// Member nodes in insertion order, whatever the container kind.
    pub fn members(&self) -> Vec<NodeId> {
        self.edges_from(self.root, None)
            .into_iter()
            .filter(|view| !view.edge.label.is_link())
            .map(|view| view.to)
            .collect()
    }

    /// Values of all members, in insertion order.
    pub fn member_values(&self) -> Vec<Value> {
        self.members()
            .into_iter()
            .filter_map(|n| self.value(n).cloned())
            .collect()
    }

    /// List elements in order (empty for non-list graphs).
    pub fn elements(&self) -> Vec<Value> {
        self.element_nodes()
            .into_iter()
            .filter_map(|n| self.value(n).cloned())
            .collect()
    }

    pub fn element_nodes(&self) -> Vec<NodeId> {
        self.edges_from(self.root, Some(&Label::Element))
            .into_iter()
            .map(|view| view.to)
            .collect()
    }

    /// Node holding list element `index`.
    pub fn element_node(&self, index: usize) -> Option<NodeId> {
        self.element_nodes().get(index).copied()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.element_node(index).and_then(|n| self.value(n).cloned())
    }

    pub fn entry_node(&self, key: &MapKey) -> Option<NodeId> {
        let label = Label::Entry(key.clone());
        self.edges_from(self.root, Some(&label))
            .first()
            .map(|view| view.to)
    }

    pub fn get_key(&self, key: &MapKey) -> Option<Value> {
        self.entry_node(key).and_then(|n| self.value(n).cloned())
    }

    /// Map entries in insertion order.
    pub fn entries(&self) -> Vec<(MapKey, Value)> {
        self.edges_from(self.root, None)
            .into_iter()
            .filter_map(|view| match &view.edge.label {
                Label::Entry(key) => self
                    .value(view.to)
                    .map(|value| (key.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<MapKey> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    /// All `Link` edges between members, in insertion order.
    pub fn links(&self) -> Vec<(NodeId, NodeId, String)> {
        let mut links: Vec<(u64, NodeId, NodeId, String)> = self
            .graph
            .edge_indices()
            .filter_map(|idx| {
                let weight = self.graph.edge_weight(idx)?;
                let (from, to) = self.graph.edge_endpoints(idx)?;
                match &weight.label {
                    Label::Link(name) => Some((
                        weight.seq,
                        NodeId::from(from),
                        NodeId::from(to),
                        name.clone(),
                    )),
                    _ => None,
                }
            })
            .collect();
        links.sort_by_key(|(seq, ..)| *seq);
        links.into_iter().map(|(_, a, b, name)| (a, b, name)).collect()
    }

    /// Members with no incoming `Link` edge.
    pub fn link_roots(&self) -> Vec<NodeId> {
        self.members()
            .into_iter()
            .filter(|&m| {
                self.graph
                    .edges_directed(m.into(), Direction::Incoming)
                    .all(|e| !e.weight().label.is_link())
            })
            .collect()
    }

    /// Returns `true` if a path of `Link` edges leads from `from` to `to`.
    pub fn link_path_exists(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            for e in self.graph.edges_directed(node.into(), Direction::Outgoing) {
                if e.weight().label.is_link() {
                    stack.push(NodeId::from(e.target()));
                }
            }
        }
        false
    }

    /// Returns `true` if the `Link` edges contain a cycle.
    pub fn has_link_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Active,
            Done,
        }
        let mut marks: HashMap<NodeId, Mark> = HashMap::new();
        for start in self.members() {
            if marks.contains_key(&start) {
                continue;
            }
            // Iterative DFS: (node, expanded?)
            let mut stack = vec![(start, false)];
            while let Some((node, expanded)) = stack.pop() {
                if expanded {
                    marks.insert(node, Mark::Done);
                    continue;
                }
                match marks.get(&node) {
                    Some(Mark::Done) => continue,
                    Some(Mark::Active) => continue,
                    None => {}
                }
                marks.insert(node, Mark::Active);
                stack.push((node, true));
                for e in self.graph.edges_directed(node.into(), Direction::Outgoing) {
                    if !e.weight().label.is_link() {
                        continue;
                    }
                    let next = NodeId::from(e.target());
                    match marks.get(&next) {
                        Some(Mark::Active) => return true,
                        Some(Mark::Done) => {}
                        None => stack.push((next, false)),
                    }
                }
            }
        }
        false
    }

    pub fn metadata(&self, id: NodeId) -> Option<&Metadata> {
        self.node(id).and_then(|n| n.metadata.as_ref())
    }

    // -----------------------------------------------------------------------
    // Primitive mutations
    // -----------------------------------------------------------------------

    fn ensure_mutable(&self) -> Result<(), GraphError> {
        if self.frozen {
            Err(GraphError::Frozen)
        } else {
            Ok(())
        }
    }

    fn ensure_node(&self, id: NodeId) -> Result<(), GraphError> {
        if self.graph.contains_node(id.into()) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode { id })
        }
    }

    /// Adds a detached node.
    pub fn add_node(&mut self, value: Value) -> Result<NodeId, GraphError> {
        self.ensure_mutable()?;
        let idx = self.graph.add_node(ValueNode {
            value,
            metadata: None,
        });
        Ok(NodeId::from(idx))
    }

    /// Adds a labelled edge between two existing nodes.
    pub fn add_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: Label,
        data: Option<Value>,
    ) -> Result<EdgeId, GraphError> {
        self.ensure_mutable()?;
        self.ensure_node(from)?;
        self.ensure_node(to)?;
        let seq = self.bump_seq();
        let idx = self
            .graph
            .add_edge(from.into(), to.into(), ValueEdge { label, data, seq });
        Ok(EdgeId::from(idx))
    }

    /// Removes a node and every edge touching it. The root cannot be removed.
    pub fn remove_node(&mut self, id: NodeId) -> Result<ValueNode, GraphError> {
        self.ensure_mutable()?;
        if id == self.root {
            return Err(GraphError::ProtectedRoot);
        }
        self.graph
            .remove_node(id.into())
            .ok_or(GraphError::UnknownNode { id })
    }

    pub fn remove_edge(&mut self, id: EdgeId) -> Result<ValueEdge, GraphError> {
        self.ensure_mutable()?;
        let idx: EdgeIndex<u32> = id.into();
        self.graph
            .remove_edge(idx)
            .ok_or(GraphError::UnknownEdge { id })
    }

    /// Replaces a node's payload in place, returning the old value.
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<Value, GraphError> {
        self.ensure_mutable()?;
        let node = self
            .graph
            .node_weight_mut(id.into())
            .ok_or(GraphError::UnknownNode { id })?;
        Ok(std::mem::replace(&mut node.value, value))
    }

    pub fn set_metadata(&mut self, id: NodeId, key: &str, value: &str) -> Result<(), GraphError> {
        self.ensure_mutable()?;
        let node = self
            .graph
            .node_weight_mut(id.into())
            .ok_or(GraphError::UnknownNode { id })?;
        node.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Adds a member under the root with the given membership label.
    pub fn add_member(&mut self, label: Label, value: Value) -> Result<NodeId, GraphError> {
        self.ensure_mutable()?;
        Ok(self.attach(label, value))
    }

    /// Freezes this graph (shallow: nested graphs keep their own flag).
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn push_rule(&mut self, rule: Rule) -> Result<(), GraphError> {
        self.ensure_mutable()?;
        self.rules.push(rule);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Copies
    // -----------------------------------------------------------------------

    /// Recursive copy: nested graphs are copied too, and every copy is
    /// unfrozen. Shared nested graphs stay shared within the copy.
    pub fn deep_copy(&self) -> ValueGraph {
        let mut memo: HashMap<usize, GraphRef> = HashMap::new();
        self.deep_copy_with(&mut memo)
    }

    fn deep_copy_with(&self, memo: &mut HashMap<usize, GraphRef>) -> ValueGraph {
        let mut copy = self.clone();
        copy.frozen = false;
        let ids: Vec<NodeIndex<u32>> = copy.graph.node_indices().collect();
        for idx in ids {
            let nested = match copy.graph.node_weight(idx).map(|n| &n.value) {
                Some(Value::Graph(g)) => g.clone(),
                _ => continue,
            };
            let replacement = copy_nested(&nested, memo);
            if let Some(node) = copy.graph.node_weight_mut(idx) {
                node.value = Value::Graph(replacement);
            }
        }
        copy
    }
}

fn copy_nested(graph: &GraphRef, memo: &mut HashMap<usize, GraphRef>) -> GraphRef {
    if let Some(done) = memo.get(&graph.identity()) {
        return done.clone();
    }
    // Placeholder first so cycles resolve to the copy under construction.
    let placeholder = GraphRef::new(ValueGraph::new(graph.borrow().kind().clone()));
    memo.insert(graph.identity(), placeholder.clone());
    let copied = graph.borrow().deep_copy_with(memo);
    *placeholder.borrow_mut() = copied;
    placeholder
}

impl Default for ValueGraph {
    fn default() -> Self {
        Self::list()
    }
}
