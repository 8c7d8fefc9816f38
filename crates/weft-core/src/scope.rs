//! ScopeGraph: lexical namespaces as a graph.
//!
//! Scopes, variables, bound values and closures all live as nodes of one
//! `StableGraph` arena, addressed by stable handles:
//!
//! ```text
//!   Scope --parent--> Scope            (static nesting, a forest)
//!   Scope --contains--> Variable       (declarations)
//!   Variable --binds_to--> Binding     (exactly one at any instant)
//!   Closure --captures--> Scope        (defining environment)
//!   Closure --captures--> Variable     (captured names)
//!   Scope --captures--> Variable       (imports from another unit)
//! ```
//!
//! Reassignment swaps the target of the `binds_to` edge and never creates a
//! second Variable node, so every closure holding a capture edge to a
//! variable sees every write to it.
//!
//! Scopes are never destroyed on exit, only detached from the active path.
//! [`ScopeGraph::collect`] removes what is no longer reachable.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};

use crate::edge::ScopeEdge;
use crate::error::BindingError;
use crate::id::{ClosureId, ScopeId, VarId};
use crate::value::Value;

/// What introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Host-provided bindings shared by every unit.
    Prelude,
    /// Root scope of one compilation unit.
    Module,
    /// One function invocation.
    Function,
    Block,
    /// One iteration of a `for` loop.
    Loop,
    /// A `catch` handler.
    Catch,
}

/// Whether a variable binding can be reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mutability {
    Mutable,
    Immutable,
}

/// A node of the scope graph.
#[derive(Debug, Clone)]
pub enum ScopeNode {
    Scope { kind: ScopeKind, active: bool },
    Variable { name: String, mutability: Mutability },
    /// Target of a `binds_to` edge.
    Binding(Value),
    Closure { name: String },
}

/// The lexical scope graph.
#[derive(Debug, Clone, Default)]
pub struct ScopeGraph {
    graph: StableGraph<ScopeNode, ScopeEdge, Directed, u32>,
    /// Mirrors the `contains` edges for O(1) per-scope name checks.
    declared: HashMap<(ScopeId, String), VarId>,
}

impl ScopeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Scopes
    // -----------------------------------------------------------------------

    /// Creates a scope with no parent (a prelude or unit root).
    pub fn push_root(&mut self, kind: ScopeKind) -> ScopeId {
        let idx = self.graph.add_node(ScopeNode::Scope { kind, active: true });
        ScopeId::from(idx)
    }

    /// Creates a scope nested in `parent`.
    pub fn push_scope(&mut self, parent: ScopeId, kind: ScopeKind) -> Result<ScopeId, BindingError> {
        self.ensure_scope(parent)?;
        let idx = self.graph.add_node(ScopeNode::Scope { kind, active: true });
        self.graph.add_edge(idx, parent.into(), ScopeEdge::Parent);
        Ok(ScopeId::from(idx))
    }

    /// Detaches a scope from the active call path. Nothing is deleted: the
    /// scope stays alive while captures reach it.
    pub fn pop_scope(&mut self, scope: ScopeId) -> Result<(), BindingError> {
        match self.graph.node_weight_mut(scope.into()) {
            Some(ScopeNode::Scope { active, .. }) => {
                *active = false;
                Ok(())
            }
            _ => Err(BindingError::UnknownScope { id: scope }),
        }
    }

    fn ensure_scope(&self, scope: ScopeId) -> Result<(), BindingError> {
        match self.graph.node_weight(scope.into()) {
            Some(ScopeNode::Scope { .. }) => Ok(()),
            _ => Err(BindingError::UnknownScope { id: scope }),
        }
    }

    pub fn is_active(&self, scope: ScopeId) -> bool {
        matches!(
            self.graph.node_weight(scope.into()),
            Some(ScopeNode::Scope { active: true, .. })
        )
    }

    pub fn scope_kind(&self, scope: ScopeId) -> Option<ScopeKind> {
        match self.graph.node_weight(scope.into()) {
            Some(ScopeNode::Scope { kind, .. }) => Some(*kind),
            _ => None,
        }
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.first_target(scope.into(), ScopeEdge::Parent)
            .map(ScopeId::from)
    }

    /// Number of `parent` hops from `scope` to its root.
    pub fn depth(&self, scope: ScopeId) -> usize {
        let mut depth = 0;
        let mut current = scope;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        depth
    }

    fn first_target(&self, from: NodeIndex<u32>, kind: ScopeEdge) -> Option<NodeIndex<u32>> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .find(|e| *e.weight() == kind)
            .map(|e| e.target())
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Defines `name` in `scope` as a mutable binding.
    pub fn define(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<VarId, BindingError> {
        self.define_with(scope, name, value, Mutability::Mutable)
    }

    /// Defines `name` in `scope`. Redefinition in the same scope reuses the
    /// existing Variable node and swaps only its `binds_to` target.
    pub fn define_with(
        &mut self,
        scope: ScopeId,
        name: &str,
        value: Value,
        mutability: Mutability,
    ) -> Result<VarId, BindingError> {
        self.ensure_scope(scope)?;
        if let Some(&var) = self.declared.get(&(scope, name.to_string())) {
            if self.mutability(var) == Some(Mutability::Immutable) {
                return Err(BindingError::ImmutableBinding { name: name.to_string() });
            }
            if let Some(ScopeNode::Variable { mutability: m, .. }) =
                self.graph.node_weight_mut(var.into())
            {
                *m = mutability;
            }
            self.rebind(var, value)?;
            return Ok(var);
        }

        let var_idx = self.graph.add_node(ScopeNode::Variable {
            name: name.to_string(),
            mutability,
        });
        self.graph.add_edge(scope.into(), var_idx, ScopeEdge::Contains);
        let binding = self.graph.add_node(ScopeNode::Binding(value));
        self.graph.add_edge(var_idx, binding, ScopeEdge::BindsTo);

        let var = VarId::from(var_idx);
        self.declared.insert((scope, name.to_string()), var);
        Ok(var)
    }

    /// Replaces the target of `var`'s `binds_to` edge.
    pub fn rebind(&mut self, var: VarId, value: Value) -> Result<(), BindingError> {
        let var_idx: NodeIndex<u32> = var.into();
        if !matches!(self.graph.node_weight(var_idx), Some(ScopeNode::Variable { .. })) {
            return Err(BindingError::UnknownVariable { id: var });
        }
        let old = self
            .graph
            .edges_directed(var_idx, Direction::Outgoing)
            .find(|e| *e.weight() == ScopeEdge::BindsTo)
            .map(|e| (e.id(), e.target()));
        if let Some((edge, target)) = old {
            self.graph.remove_edge(edge);
            self.graph.remove_node(target);
        }
        let binding = self.graph.add_node(ScopeNode::Binding(value));
        self.graph.add_edge(var_idx, binding, ScopeEdge::BindsTo);
        Ok(())
    }

    /// Finds the variable `name` visible from `scope`, walking `parent`
    /// edges outward. Each scope's own declarations are checked before its
    /// imports. Forward references are not hoisted.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Result<Option<VarId>, BindingError> {
        self.ensure_scope(scope)?;
        let mut current = Some(scope);
        while let Some(s) = current {
            if let Some(&var) = self.declared.get(&(s, name.to_string())) {
                return Ok(Some(var));
            }
            if let Some(var) = self.imported(s, name) {
                return Ok(Some(var));
            }
            current = self.parent(s);
        }
        Ok(None)
    }

    fn imported(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        self.graph
            .edges_directed(scope.into(), Direction::Outgoing)
            .filter(|e| *e.weight() == ScopeEdge::Captures)
            .map(|e| e.target())
            .find(|&target| {
                matches!(
                    self.graph.node_weight(target),
                    Some(ScopeNode::Variable { name: n, .. }) if n == name
                )
            })
            .map(VarId::from)
    }

    /// Reads the value bound to `name` as seen from `scope`.
    pub fn get(&self, scope: ScopeId, name: &str) -> Result<Value, BindingError> {
        let var = self
            .resolve(scope, name)?
            .ok_or_else(|| BindingError::UnboundVariable { name: name.to_string() })?;
        self.value_of(var)
            .ok_or(BindingError::UnknownVariable { id: var })
    }

    /// Rebinds an existing, visible variable. Never creates one.
    pub fn assign(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<VarId, BindingError> {
        let var = self
            .resolve(scope, name)?
            .ok_or_else(|| BindingError::UnboundVariable { name: name.to_string() })?;
        if self.mutability(var) == Some(Mutability::Immutable) {
            return Err(BindingError::ImmutableBinding { name: name.to_string() });
        }
        self.rebind(var, value)?;
        Ok(var)
    }

    /// The value currently bound to `var`.
    pub fn value_of(&self, var: VarId) -> Option<Value> {
        let binding = self.first_target(var.into(), ScopeEdge::BindsTo)?;
        match self.graph.node_weight(binding) {
            Some(ScopeNode::Binding(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn variable_name(&self, var: VarId) -> Option<&str> {
        match self.graph.node_weight(var.into()) {
            Some(ScopeNode::Variable { name, .. }) => Some(name),
            _ => None,
        }
    }

    pub fn mutability(&self, var: VarId) -> Option<Mutability> {
        match self.graph.node_weight(var.into()) {
            Some(ScopeNode::Variable { mutability, .. }) => Some(*mutability),
            _ => None,
        }
    }

    /// Variables declared directly in `scope`, sorted by name.
    pub fn variables(&self, scope: ScopeId) -> Vec<(String, VarId)> {
        let mut vars: Vec<(String, VarId)> = self
            .graph
            .edges_directed(scope.into(), Direction::Outgoing)
            .filter(|e| *e.weight() == ScopeEdge::Contains)
            .filter_map(|e| {
                let var = VarId::from(e.target());
                self.variable_name(var).map(|name| (name.to_string(), var))
            })
            .collect();
        vars.sort();
        vars
    }

    /// Number of `binds_to` edges out of `var` (always 1 for a live variable).
    pub fn binding_count(&self, var: VarId) -> usize {
        self.graph
            .edges_directed(var.into(), Direction::Outgoing)
            .filter(|e| *e.weight() == ScopeEdge::BindsTo)
            .count()
    }

    // -----------------------------------------------------------------------
    // Closures and imports
    // -----------------------------------------------------------------------

    /// Creates a closure node capturing `defining_scope` and each variable in
    /// `names` that resolves from it. Names that do not resolve yet (later
    /// globals, recursive self-references) are found through the defining
    /// scope's parent chain at call time.
    pub fn create_closure(
        &mut self,
        defining_scope: ScopeId,
        name: &str,
        names: &[String],
    ) -> Result<ClosureId, BindingError> {
        self.ensure_scope(defining_scope)?;
        let mut captured = Vec::with_capacity(names.len());
        for n in names {
            if let Some(var) = self.resolve(defining_scope, n)? {
                captured.push(var);
            }
        }
        let idx = self.graph.add_node(ScopeNode::Closure {
            name: name.to_string(),
        });
        self.graph
            .add_edge(idx, defining_scope.into(), ScopeEdge::Captures);
        for var in captured {
            self.graph.add_edge(idx, var.into(), ScopeEdge::Captures);
        }
        Ok(ClosureId::from(idx))
    }

    /// The scope a closure was created in; calls nest their scope under it.
    pub fn closure_scope(&self, closure: ClosureId) -> Result<ScopeId, BindingError> {
        if !matches!(
            self.graph.node_weight(closure.into()),
            Some(ScopeNode::Closure { .. })
        ) {
            return Err(BindingError::UnknownClosure { id: closure });
        }
        self.graph
            .edges_directed(closure.into(), Direction::Outgoing)
            .map(|e| e.target())
            .find(|&t| matches!(self.graph.node_weight(t), Some(ScopeNode::Scope { .. })))
            .map(ScopeId::from)
            .ok_or(BindingError::UnknownClosure { id: closure })
    }

    /// Variables a closure captured, sorted by name.
    pub fn captured(&self, closure: ClosureId) -> Vec<(String, VarId)> {
        let mut vars: Vec<(String, VarId)> = self
            .graph
            .edges_directed(closure.into(), Direction::Outgoing)
            .filter_map(|e| {
                let var = VarId::from(e.target());
                self.variable_name(var).map(|name| (name.to_string(), var))
            })
            .collect();
        vars.sort();
        vars
    }

    /// Exposes a variable of another unit in `scope` under its own name.
    pub fn import(&mut self, scope: ScopeId, var: VarId) -> Result<(), BindingError> {
        self.ensure_scope(scope)?;
        if self.variable_name(var).is_none() {
            return Err(BindingError::UnknownVariable { id: var });
        }
        self.graph.add_edge(scope.into(), var.into(), ScopeEdge::Captures);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn scope_count(&self) -> usize {
        self.graph
            .node_weights()
            .filter(|n| matches!(n, ScopeNode::Scope { .. }))
            .count()
    }

    /// Every node with its raw index.
    pub fn nodes(&self) -> Vec<(u32, &ScopeNode)> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|n| (idx.index() as u32, n)))
            .collect()
    }

    /// Every edge as `(from, to, kind)`.
    pub fn edges(&self) -> Vec<(u32, u32, ScopeEdge)> {
        self.graph
            .edge_indices()
            .filter_map(|idx| {
                let (from, to) = self.graph.edge_endpoints(idx)?;
                let kind = *self.graph.edge_weight(idx)?;
                Some((from.index() as u32, to.index() as u32, kind))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Removes every node unreachable from the active scopes and `roots`.
    ///
    /// Reachability follows all scope edges plus the closures referenced by
    /// bound values (including values nested in graphs). Callers must pass
    /// every scope or closure they still hold outside the graph. Returns the
    /// number of nodes removed.
    pub fn collect(&mut self, roots: &[ScopeId], closures: &[ClosureId]) -> usize {
        let mut marked: HashSet<NodeIndex<u32>> = HashSet::new();
        let mut stack: Vec<NodeIndex<u32>> = roots.iter().map(|&s| s.into()).collect();
        stack.extend(closures.iter().map(|&c| NodeIndex::<u32>::from(c)));
        stack.extend(self.graph.node_indices().filter(|&idx| {
            matches!(
                self.graph.node_weight(idx),
                Some(ScopeNode::Scope { active: true, .. })
            )
        }));

        let mut seen_graphs: HashSet<usize> = HashSet::new();
        while let Some(idx) = stack.pop() {
            if !self.graph.contains_node(idx) || !marked.insert(idx) {
                continue;
            }
            for e in self.graph.edges_directed(idx, Direction::Outgoing) {
                stack.push(e.target());
            }
            if let Some(ScopeNode::Binding(value)) = self.graph.node_weight(idx) {
                let mut found = Vec::new();
                closures_in(value, &mut seen_graphs, &mut found);
                stack.extend(found.into_iter().map(NodeIndex::<u32>::from));
            }
        }

        let dead: Vec<NodeIndex<u32>> = self
            .graph
            .node_indices()
            .filter(|idx| !marked.contains(idx))
            .collect();
        for &idx in &dead {
            self.graph.remove_node(idx);
        }
        let graph = &self.graph;
        self.declared
            .retain(|(scope, _), var| graph.contains_node((*scope).into()) && graph.contains_node((*var).into()));
        tracing::debug!(removed = dead.len(), remaining = self.graph.node_count(), "scope graph collected");
        dead.len()
    }
}

/// Collects the closures reachable from `value`, descending into graphs.
fn closures_in(value: &Value, seen: &mut HashSet<usize>, out: &mut Vec<ClosureId>) {
    match value {
        Value::Function(func) => out.push(func.closure),
        Value::Exception(e) => closures_in(&e.payload, seen, out),
        Value::Graph(g) => {
            if !seen.insert(g.identity()) {
                return;
            }
            // A graph mutably borrowed mid-collection is being written by the
            // caller; its values are still reachable through that caller.
            let Ok(graph) = g.try_borrow() else {
                return;
            };
            let mut values = graph.member_values();
            for member in graph.members() {
                for view in graph.edges_from(member, None) {
                    if let Some(data) = &view.edge.data {
                        values.push(data.clone());
                    }
                }
            }
            for rule in graph.rules() {
                values.extend(rule.callbacks());
            }
            drop(graph);
            for v in &values {
                closures_in(v, seen, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{FunctionId, UnitId};
    use crate::value::FunctionValue;
    use std::rc::Rc;

    fn graph_with_root() -> (ScopeGraph, ScopeId) {
        let mut graph = ScopeGraph::new();
        let root = graph.push_root(ScopeKind::Module);
        (graph, root)
    }

    #[test]
    fn define_then_get() {
        let (mut g, root) = graph_with_root();
        g.define(root, "x", Value::Int(1)).unwrap();
        assert_eq!(g.get(root, "x").unwrap(), Value::Int(1));
    }

    #[test]
    fn redefinition_reuses_variable_node() {
        let (mut g, root) = graph_with_root();
        let first = g.define(root, "x", Value::Int(1)).unwrap();
        let nodes_before = g.node_count();
        let second = g.define(root, "x", Value::Int(2)).unwrap();
        assert_eq!(first, second);
        assert_eq!(g.node_count(), nodes_before);
        assert_eq!(g.binding_count(first), 1);
        assert_eq!(g.get(root, "x").unwrap(), Value::Int(2));
    }

    #[test]
    fn immutable_bindings_reject_assignment_and_redefinition() {
        let (mut g, root) = graph_with_root();
        g.define_with(root, "k", Value::Int(1), Mutability::Immutable).unwrap();
        assert_eq!(
            g.assign(root, "k", Value::Int(2)),
            Err(BindingError::ImmutableBinding { name: "k".into() })
        );
        assert!(g.define(root, "k", Value::Int(3)).is_err());
        assert_eq!(g.get(root, "k").unwrap(), Value::Int(1));
    }

    #[test]
    fn assign_requires_existing_binding() {
        let (mut g, root) = graph_with_root();
        let inner = g.push_scope(root, ScopeKind::Block).unwrap();
        assert_eq!(
            g.assign(inner, "missing", Value::None),
            Err(BindingError::UnboundVariable { name: "missing".into() })
        );
    }

    #[test]
    fn assign_updates_outer_variable() {
        let (mut g, root) = graph_with_root();
        let var = g.define(root, "n", Value::Int(0)).unwrap();
        let inner = g.push_scope(root, ScopeKind::Block).unwrap();
        let assigned = g.assign(inner, "n", Value::Int(5)).unwrap();
        assert_eq!(assigned, var);
        assert_eq!(g.get(root, "n").unwrap(), Value::Int(5));
        assert_eq!(g.binding_count(var), 1);
    }

    #[test]
    fn shadowing_is_restored_after_exit() {
        let (mut g, root) = graph_with_root();
        g.define(root, "x", Value::Int(1)).unwrap();
        let inner = g.push_scope(root, ScopeKind::Block).unwrap();
        g.define(inner, "x", Value::Int(2)).unwrap();
        assert_eq!(g.get(inner, "x").unwrap(), Value::Int(2));
        g.pop_scope(inner).unwrap();
        assert!(!g.is_active(inner));
        assert_eq!(g.get(root, "x").unwrap(), Value::Int(1));
    }

    #[test]
    fn no_hoisting_of_inner_definitions() {
        let (mut g, root) = graph_with_root();
        let inner = g.push_scope(root, ScopeKind::Block).unwrap();
        g.define(inner, "y", Value::Int(1)).unwrap();
        assert!(g.get(root, "y").is_err());
    }

    #[test]
    fn closures_capture_variables_not_values() {
        let (mut g, root) = graph_with_root();
        let func = g.push_scope(root, ScopeKind::Function).unwrap();
        let count = g.define(func, "count", Value::Int(0)).unwrap();
        let inc = g.create_closure(func, "inc", &["count".into()]).unwrap();
        let dec = g.create_closure(func, "dec", &["count".into()]).unwrap();
        g.pop_scope(func).unwrap();

        assert_eq!(g.captured(inc), vec![("count".to_string(), count)]);
        assert_eq!(g.captured(dec), vec![("count".to_string(), count)]);
        assert_eq!(g.closure_scope(inc).unwrap(), func);

        // A call scope nested under the (exited) defining scope sees writes.
        let call = g.push_scope(g.closure_scope(inc).unwrap(), ScopeKind::Function).unwrap();
        g.assign(call, "count", Value::Int(1)).unwrap();
        g.pop_scope(call).unwrap();
        assert_eq!(g.value_of(count), Some(Value::Int(1)));
    }

    #[test]
    fn imports_resolve_after_own_declarations() {
        let mut g = ScopeGraph::new();
        let lib = g.push_root(ScopeKind::Module);
        let exported = g.define(lib, "answer", Value::Int(42)).unwrap();
        let app = g.push_root(ScopeKind::Module);
        g.import(app, exported).unwrap();
        assert_eq!(g.get(app, "answer").unwrap(), Value::Int(42));

        // Writes through the defining unit are visible through the import.
        g.assign(lib, "answer", Value::Int(7)).unwrap();
        assert_eq!(g.get(app, "answer").unwrap(), Value::Int(7));

        g.define(app, "answer", Value::Int(0)).unwrap();
        assert_eq!(g.get(app, "answer").unwrap(), Value::Int(0));
    }

    #[test]
    fn collect_keeps_captured_scopes_alive() {
        let (mut g, root) = graph_with_root();
        let func = g.push_scope(root, ScopeKind::Function).unwrap();
        g.define(func, "kept", Value::Int(1)).unwrap();
        let closure = g.create_closure(func, "f", &["kept".into()]).unwrap();
        g.define(
            root,
            "f",
            Value::Function(FunctionValue {
                unit: UnitId(0),
                function: FunctionId(1),
                closure,
                name: Rc::from("f"),
                arity: 0,
            }),
        )
        .unwrap();
        g.pop_scope(func).unwrap();

        let dropped = g.push_scope(root, ScopeKind::Block).unwrap();
        g.define(dropped, "gone", Value::Int(2)).unwrap();
        g.pop_scope(dropped).unwrap();

        // dropped scope + its variable + binding
        assert_eq!(g.collect(&[], &[]), 3);
        assert!(g.scope_kind(dropped).is_none());
        assert_eq!(g.get(func, "kept").unwrap(), Value::Int(1));
        assert!(g.closure_scope(closure).is_ok());
    }

    #[test]
    fn unknown_scope_is_reported() {
        let mut g = ScopeGraph::new();
        assert_eq!(
            g.define(ScopeId(9), "x", Value::None),
            Err(BindingError::UnknownScope { id: ScopeId(9) })
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn lookup_walks_arbitrary_nesting(depth in 1usize..1000, shadow_at in 0usize..1000) {
                let (mut g, root) = graph_with_root();
                g.define(root, "x", Value::Int(-1)).unwrap();
                let shadow_at = shadow_at % depth;
                let mut scopes = vec![root];
                for level in 0..depth {
                    let parent = *scopes.last().unwrap();
                    let scope = g.push_scope(parent, ScopeKind::Block).unwrap();
                    if level == shadow_at {
                        g.define(scope, "x", Value::Int(level as i64)).unwrap();
                    }
                    scopes.push(scope);
                }
                let innermost = *scopes.last().unwrap();
                prop_assert_eq!(g.depth(innermost), depth);
                prop_assert_eq!(g.get(innermost, "x").unwrap(), Value::Int(shadow_at as i64));
                prop_assert_eq!(g.get(root, "x").unwrap(), Value::Int(-1));
            }

            #[test]
            fn assign_reaches_the_root_from_any_depth(depth in 1usize..=1000) {
                let (mut g, root) = graph_with_root();
                g.define(root, "x", Value::Int(0)).unwrap();
                let mut innermost = root;
                for _ in 0..depth {
                    innermost = g.push_scope(innermost, ScopeKind::Block).unwrap();
                }
                g.assign(innermost, "x", Value::Int(depth as i64)).unwrap();
                prop_assert_eq!(g.get(root, "x").unwrap(), Value::Int(depth as i64));
                prop_assert_eq!(g.variables(root).len(), 1);
            }
        }
    }
}
