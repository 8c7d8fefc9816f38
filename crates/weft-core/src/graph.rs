//! ExecutionGraph: the executable form of one compilation unit.
//!
//! A unit is a flat `StableGraph` of [`ExecNode`]s connected by
//! [`Role`]-labelled edges from parent to child, plus a table of
//! [`FunctionDef`]s. The unit body is the function [`FunctionId::MAIN`].
//!
//! The graph is built in full before evaluation and the evaluator never
//! mutates it. Optimization passes and [`rebuild_function`] rewrite it in
//! between runs.
//!
//! [`rebuild_function`]: ExecutionGraph::rebuild_function

use std::collections::{BTreeMap, HashSet};

use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::edge::Role;
use crate::error::ConstructionError;
use crate::function::{FunctionDef, MAIN_NAME};
use crate::id::{ExecNodeId, FunctionId};
use crate::node::ExecNode;
use crate::ops::ExecOp;
use crate::types::SourceLocation;

/// Children of one node; most nodes have at most three.
pub type Children = SmallVec<[(Role, ExecNodeId); 4]>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionGraph {
    name: String,
    graph: StableGraph<ExecNode, Role, Directed, u32>,
    functions: BTreeMap<FunctionId, FunctionDef>,
    next_function_id: u32,
}

impl ExecutionGraph {
    /// Creates an empty unit with a body-less main function.
    pub fn new(name: &str) -> Self {
        let mut functions = BTreeMap::new();
        functions.insert(
            FunctionId::MAIN,
            FunctionDef::new(FunctionId::MAIN, MAIN_NAME, Vec::new(), None),
        );
        ExecutionGraph {
            name: name.to_string(),
            graph: StableGraph::new(),
            functions,
            next_function_id: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    /// Registers a function nested in `parent`. Its body is set later with
    /// [`set_body`](Self::set_body).
    pub fn add_function(
        &mut self,
        name: &str,
        params: Vec<String>,
        parent: FunctionId,
    ) -> Result<FunctionId, ConstructionError> {
        if !self.functions.contains_key(&parent) {
            return Err(ConstructionError::UnknownFunction { id: parent });
        }
        Ok(self.push_function(name, params, parent))
    }

    pub fn set_body(&mut self, function: FunctionId, body: ExecNodeId) -> Result<(), ConstructionError> {
        if !self.graph.contains_node(body.into()) {
            return Err(ConstructionError::UnknownNode { id: body });
        }
        let def = self
            .functions
            .get_mut(&function)
            .ok_or(ConstructionError::UnknownFunction { id: function })?;
        def.body = Some(body);
        Ok(())
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(&id)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.functions.values()
    }

    pub fn main(&self) -> Option<&FunctionDef> {
        self.functions.get(&FunctionId::MAIN)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Deletes a function together with every node it owns. The main
    /// function cannot be removed.
    pub fn remove_function(&mut self, id: FunctionId) -> Option<FunctionDef> {
        if id == FunctionId::MAIN {
            return None;
        }
        for node in self.function_nodes(id) {
            self.graph.remove_node(node.into());
        }
        self.functions.remove(&id)
    }

    /// Replaces one function's body without touching the rest of the unit.
    ///
    /// Every node owned by `function` is removed, then `build` constructs the
    /// new body in the same function and returns its root. Functions nested
    /// in the old body stay registered until dead-code elimination drops
    /// them.
    pub fn rebuild_function<F>(&mut self, function: FunctionId, build: F) -> Result<(), ConstructionError>
    where
        F: FnOnce(&mut ExecutionGraph, FunctionId) -> Result<ExecNodeId, ConstructionError>,
    {
        if !self.functions.contains_key(&function) {
            return Err(ConstructionError::UnknownFunction { id: function });
        }
        let old = self.function_nodes(function);
        for node in &old {
            self.graph.remove_node((*node).into());
        }
        if let Some(def) = self.functions.get_mut(&function) {
            def.body = None;
        }
        let body = build(self, function)?;
        self.set_body(function, body)?;
        tracing::debug!(%function, removed = old.len(), "function rebuilt");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Nodes and edges
    // -----------------------------------------------------------------------

    pub fn add_node(
        &mut self,
        op: ExecOp,
        owner: FunctionId,
        location: Option<SourceLocation>,
    ) -> Result<ExecNodeId, ConstructionError> {
        if !self.functions.contains_key(&owner) {
            return Err(ConstructionError::UnknownFunction { id: owner });
        }
        let idx = self.graph.add_node(ExecNode { op, owner, location });
        Ok(ExecNodeId::from(idx))
    }

    /// Adds a `role` edge from `parent` to `child`.
    pub fn connect(&mut self, parent: ExecNodeId, child: ExecNodeId, role: Role) -> Result<(), ConstructionError> {
        for id in [parent, child] {
            if !self.graph.contains_node(id.into()) {
                return Err(ConstructionError::UnknownNode { id });
            }
        }
        self.graph.add_edge(parent.into(), child.into(), role);
        Ok(())
    }

    /// Removes the `role` edge out of `parent`, returning the child it led to.
    pub fn disconnect(&mut self, parent: ExecNodeId, role: Role) -> Option<ExecNodeId> {
        let edge = self
            .graph
            .edges_directed(parent.into(), Direction::Outgoing)
            .find(|e| *e.weight() == role)
            .map(|e| (e.id(), e.target()))?;
        self.graph.remove_edge(edge.0);
        Some(ExecNodeId::from(edge.1))
    }

    pub fn remove_node(&mut self, id: ExecNodeId) -> Option<ExecNode> {
        self.graph.remove_node(id.into())
    }

    /// Swaps a node's op in place, returning the old one.
    pub fn replace_op(&mut self, id: ExecNodeId, op: ExecOp) -> Result<ExecOp, ConstructionError> {
        let node = self
            .graph
            .node_weight_mut(id.into())
            .ok_or(ConstructionError::UnknownNode { id })?;
        Ok(std::mem::replace(&mut node.op, op))
    }

    pub fn node(&self, id: ExecNodeId) -> Option<&ExecNode> {
        self.graph.node_weight(id.into())
    }

    pub fn op(&self, id: ExecNodeId) -> Option<&ExecOp> {
        self.node(id).map(|n| &n.op)
    }

    pub fn contains_node(&self, id: ExecNodeId) -> bool {
        self.graph.contains_node(id.into())
    }

    pub fn node_ids(&self) -> impl Iterator<Item = ExecNodeId> + '_ {
        self.graph.node_indices().map(ExecNodeId::from)
    }

    /// The child in `role`, if present.
    pub fn child(&self, node: ExecNodeId, role: Role) -> Option<ExecNodeId> {
        self.graph
            .edges_directed(node.into(), Direction::Outgoing)
            .find(|e| *e.weight() == role)
            .map(|e| ExecNodeId::from(e.target()))
    }

    /// All children, sorted by role (indexed roles by index).
    pub fn children(&self, node: ExecNodeId) -> Children {
        let mut children: Children = self
            .graph
            .edges_directed(node.into(), Direction::Outgoing)
            .map(|e| (*e.weight(), ExecNodeId::from(e.target())))
            .collect();
        children.sort_by_key(|(role, _)| *role);
        children
    }

    /// Children in the indexed family of `family` (e.g. `Role::Argument(0)`),
    /// in index order.
    pub fn indexed(&self, node: ExecNodeId, family: Role) -> Children {
        self.children(node)
            .into_iter()
            .filter(|(role, _)| role.same_family(&family))
            .collect()
    }

    /// Parents of `node` with the role it occupies under each.
    pub fn parents(&self, node: ExecNodeId) -> Vec<(ExecNodeId, Role)> {
        self.graph
            .edges_directed(node.into(), Direction::Incoming)
            .map(|e| (ExecNodeId::from(e.source()), *e.weight()))
            .collect()
    }

    /// Every edge as `(parent, child, role)`.
    pub fn edges(&self) -> Vec<(ExecNodeId, ExecNodeId, Role)> {
        self.graph
            .edge_indices()
            .filter_map(|idx| {
                let (from, to) = self.graph.edge_endpoints(idx)?;
                let role = *self.graph.edge_weight(idx)?;
                Some((ExecNodeId::from(from), ExecNodeId::from(to), role))
            })
            .collect()
    }

    /// All node ids owned by a function.
    pub fn function_nodes(&self, id: FunctionId) -> Vec<ExecNodeId> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.node_weight(idx).is_some_and(|n| n.owner == id))
            .map(ExecNodeId::from)
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes reachable from `root` through child edges, in pre-order.
    pub fn subtree(&self, root: ExecNodeId) -> Vec<ExecNodeId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if !self.contains_node(node) || !seen.insert(node) {
                continue;
            }
            order.push(node);
            // Reverse so the lowest role is visited first.
            for (_, child) in self.children(node).into_iter().rev() {
                stack.push(child);
            }
        }
        order
    }

    /// Functions referenced by a `function` node in `function`'s body.
    pub fn nested_functions(&self, function: FunctionId) -> Vec<FunctionId> {
        let Some(body) = self.functions.get(&function).and_then(|f| f.body) else {
            return Vec::new();
        };
        self.subtree(body)
            .into_iter()
            .filter_map(|n| match self.op(n) {
                Some(ExecOp::Function { function }) => Some(*function),
                _ => None,
            })
            .collect()
    }

    /// Names a function reads or assigns but does not bind itself,
    /// including those needed by functions nested in it. These are what a
    /// closure over the function captures.
    pub fn free_variables(&self, function: FunctionId) -> Vec<String> {
        let mut free = Vec::new();
        let mut visiting = HashSet::new();
        self.collect_free(function, &mut free, &mut visiting);
        free
    }

    fn collect_free(&self, function: FunctionId, free: &mut Vec<String>, visiting: &mut HashSet<FunctionId>) {
        if !visiting.insert(function) {
            return;
        }
        let Some(def) = self.functions.get(&function) else {
            return;
        };
        let Some(body) = def.body else {
            return;
        };
        let nodes = self.subtree(body);
        let mut bound: HashSet<&str> = def.params.iter().map(String::as_str).collect();
        for &node in &nodes {
            match self.op(node) {
                Some(ExecOp::Define { name, .. }) | Some(ExecOp::For { var: name }) => {
                    bound.insert(name);
                }
                Some(ExecOp::Try { catch_var: Some(name) }) => {
                    bound.insert(name);
                }
                _ => {}
            }
        }
        let push = |name: &str, free: &mut Vec<String>| {
            if !bound.contains(name) && !free.iter().any(|f| f == name) {
                free.push(name.to_string());
            }
        };
        for &node in &nodes {
            match self.op(node) {
                Some(ExecOp::Var { name }) | Some(ExecOp::Assign { name }) => push(name, free),
                Some(ExecOp::Function { function: nested }) => {
                    let mut inner = Vec::new();
                    self.collect_free(*nested, &mut inner, visiting);
                    for name in inner {
                        push(&name, free);
                    }
                }
                _ => {}
            }
        }
    }

    /// Adds a node without checking its owner; for builders that already
    /// hold a valid function id.
    pub(crate) fn push_node(&mut self, node: ExecNode) -> ExecNodeId {
        ExecNodeId::from(self.graph.add_node(node))
    }

    /// Adds an edge if both endpoints exist. A skipped edge shows up as a
    /// missing role in [`validate`](Self::validate).
    pub(crate) fn push_edge(&mut self, parent: ExecNodeId, child: ExecNodeId, role: Role) -> bool {
        if self.graph.contains_node(parent.into()) && self.graph.contains_node(child.into()) {
            self.graph.add_edge(parent.into(), child.into(), role);
            true
        } else {
            false
        }
    }

    pub(crate) fn push_function(&mut self, name: &str, params: Vec<String>, parent: FunctionId) -> FunctionId {
        let id = FunctionId(self.next_function_id);
        self.next_function_id += 1;
        self.functions
            .insert(id, FunctionDef::new(id, name, params, Some(parent)));
        id
    }

    pub(crate) fn raw(&self) -> &StableGraph<ExecNode, Role, Directed, u32> {
        &self.graph
    }
}
