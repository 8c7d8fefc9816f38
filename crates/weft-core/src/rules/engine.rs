//! The rule engine: governed mutations of shared ValueGraphs.
//!
//! Every mutation runs the same pipeline:
//!
//! 1. frozen check (before any rule runs),
//! 2. validations in attachment order; the first failure aborts,
//! 3. transformations in attachment order, each fed the previous output,
//! 4. commit.
//!
//! No graph borrow is held while a user callback runs, so callbacks may read
//! or even mutate the graph that is being governed. The commit step
//! re-checks its preconditions for that reason.

use crate::edge::Label;
use crate::error::{GraphError, MutationError};
use crate::id::{EdgeId, NodeId};
use crate::rules::{builtin, FreezeRule, Invoke, InvokeError, Rule, Ruleset, Transform, Validation};
use crate::value::{GraphRef, MapKey, Value};
use crate::value_graph::{GraphKind, ValueGraph};

/// Which member a removal addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// A list position.
    Index(usize),
    /// A map key.
    Key(MapKey),
    /// A user-graph member.
    Node(NodeId),
}

/// A proposed structural change, as seen by validations.
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Appends to a list.
    Insert(Value),
    Set { index: usize, value: Value },
    Put { key: MapKey, value: Value },
    Remove(Target),
    /// Adds a user-graph member, optionally linked from `parent`.
    AddMember {
        value: Value,
        parent: Option<(NodeId, String)>,
    },
    Link {
        from: NodeId,
        to: NodeId,
        name: String,
        data: Option<Value>,
    },
}

impl Mutation {
    /// The value that becomes a member, if any.
    pub fn incoming_member(&self) -> Option<&Value> {
        match self {
            Mutation::Insert(value)
            | Mutation::Set { value, .. }
            | Mutation::Put { value, .. }
            | Mutation::AddMember { value, .. } => Some(value),
            Mutation::Remove(_) | Mutation::Link { .. } => None,
        }
    }

    /// The value transformations and predicates see: the new member, or the
    /// data attached to a new link.
    pub fn incoming(&self) -> Option<&Value> {
        match self {
            Mutation::Link { data, .. } => data.as_ref(),
            other => other.incoming_member(),
        }
    }

    fn incoming_mut(&mut self) -> Option<&mut Value> {
        match self {
            Mutation::Insert(value)
            | Mutation::Set { value, .. }
            | Mutation::Put { value, .. }
            | Mutation::AddMember { value, .. } => Some(value),
            Mutation::Link { data, .. } => data.as_mut(),
            Mutation::Remove(_) => None,
        }
    }

    /// Whether the mutation adds a member.
    pub fn grows(&self, graph: &ValueGraph) -> bool {
        match self {
            Mutation::Insert(_) | Mutation::AddMember { .. } => true,
            Mutation::Put { key, .. } => graph.entry_node(key).is_none(),
            _ => false,
        }
    }

    /// The member whose value the mutation overwrites.
    pub fn replaced(&self, graph: &ValueGraph) -> Option<NodeId> {
        match self {
            Mutation::Set { index, .. } => graph.element_node(*index),
            Mutation::Put { key, .. } => graph.entry_node(key),
            _ => None,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Mutation::Insert(_) => "insert",
            Mutation::Set { .. } => "set",
            Mutation::Put { .. } => "put",
            Mutation::Remove(_) => "remove",
            Mutation::AddMember { .. } => "add_member",
            Mutation::Link { .. } => "link",
        }
    }
}

/// What a committed mutation produced.
#[derive(Debug, Clone)]
pub enum Applied {
    Node(NodeId),
    Edge(EdgeId),
    /// The value a `set` overwrote.
    Replaced(Value),
    Removed(Value),
}

/// Applies mutations and rules to graphs, calling user rules back through
/// an [`Invoke`].
pub struct RuleEngine<'a> {
    invoke: &'a mut dyn Invoke,
}

impl<'a> RuleEngine<'a> {
    pub fn new(invoke: &'a mut dyn Invoke) -> Self {
        RuleEngine { invoke }
    }

    pub fn insert(&mut self, graph: &GraphRef, value: Value) -> Result<NodeId, MutationError> {
        match self.apply(graph, Mutation::Insert(value))? {
            Applied::Node(node) => Ok(node),
            other => Err(unexpected(other)),
        }
    }

    /// Overwrites list element `index`, returning the old value.
    pub fn set(&mut self, graph: &GraphRef, index: usize, value: Value) -> Result<Value, MutationError> {
        match self.apply(graph, Mutation::Set { index, value })? {
            Applied::Replaced(old) => Ok(old),
            other => Err(unexpected(other)),
        }
    }

    pub fn put(&mut self, graph: &GraphRef, key: MapKey, value: Value) -> Result<NodeId, MutationError> {
        match self.apply(graph, Mutation::Put { key, value })? {
            Applied::Node(node) => Ok(node),
            other => Err(unexpected(other)),
        }
    }

    /// Removes a member, returning its value. Runs validations only.
    pub fn remove(&mut self, graph: &GraphRef, target: Target) -> Result<Value, MutationError> {
        match self.apply(graph, Mutation::Remove(target))? {
            Applied::Removed(value) => Ok(value),
            other => Err(unexpected(other)),
        }
    }

    pub fn add_member(
        &mut self,
        graph: &GraphRef,
        value: Value,
        parent: Option<(NodeId, &str)>,
    ) -> Result<NodeId, MutationError> {
        let parent = parent.map(|(node, name)| (node, name.to_string()));
        match self.apply(graph, Mutation::AddMember { value, parent })? {
            Applied::Node(node) => Ok(node),
            other => Err(unexpected(other)),
        }
    }

    pub fn link(
        &mut self,
        graph: &GraphRef,
        from: NodeId,
        to: NodeId,
        name: &str,
        data: Option<Value>,
    ) -> Result<EdgeId, MutationError> {
        let mutation = Mutation::Link {
            from,
            to,
            name: name.to_string(),
            data,
        };
        match self.apply(graph, mutation)? {
            Applied::Edge(edge) => Ok(edge),
            other => Err(unexpected(other)),
        }
    }

    /// Runs the full pipeline for one mutation. On error the graph is left
    /// exactly as it was.
    pub fn apply(&mut self, graph: &GraphRef, mut mutation: Mutation) -> Result<Applied, MutationError> {
        let rules = {
            let g = graph.borrow();
            if g.is_frozen() {
                tracing::debug!(op = mutation.describe(), "mutation rejected: graph is frozen");
                return Err(MutationError::Frozen);
            }
            preflight(&g, &mutation)?;
            g.rules().to_vec()
        };

        for rule in &rules {
            match rule {
                Rule::Validate(validation) => self.validate(graph, validation, &mutation)?,
                Rule::Freeze(FreezeRule::RejectMixed) => {
                    if let Some(value) = mutation.incoming() {
                        reject_mixed(graph, rule, value)?;
                    }
                }
                _ => {}
            }
        }

        if let Some(slot) = mutation.incoming_mut() {
            let mut value = std::mem::replace(slot, Value::None);
            for rule in rules.iter().filter(|r| r.rewrites_incoming()) {
                value = self.transform(rule, value)?;
            }
            *slot = value;
        }

        let applied = commit(graph, mutation)?;
        tracing::trace!(rules = rules.len(), "mutation committed");
        Ok(applied)
    }

    fn validate(
        &mut self,
        graph: &GraphRef,
        validation: &Validation,
        mutation: &Mutation,
    ) -> Result<(), MutationError> {
        let rejected = |reason: Option<String>| {
            tracing::debug!(rule = %validation, reason = ?reason, "mutation rejected");
            MutationError::ValidationFailed {
                rule: validation.to_string(),
                reason,
            }
        };
        match validation {
            Validation::Predicate { callee, .. } => {
                let Some(value) = mutation.incoming() else {
                    return Ok(());
                };
                self.predicate(callee, value).map_err(|e| match e {
                    PredicateFailure::Rejected(reason) => rejected(reason),
                    PredicateFailure::Aborted(message) => MutationError::Aborted { message },
                })
            }
            builtin_rule => {
                let verdict = builtin::check(builtin_rule, &graph.borrow(), mutation);
                verdict.map_err(|reason| rejected(Some(reason)))
            }
        }
    }

    /// Calls a predicate. A raise counts as a rejection, never propagates.
    fn predicate(&mut self, callee: &Value, value: &Value) -> Result<(), PredicateFailure> {
        match self.invoke.invoke(callee, std::slice::from_ref(value)) {
            Ok(result) if result.is_truthy() => Ok(()),
            Ok(_) => Err(PredicateFailure::Rejected(None)),
            Err(InvokeError::Raised(raised)) => Err(PredicateFailure::Rejected(Some(format!(
                "predicate raised {}",
                raised.exception
            )))),
            Err(InvokeError::Fatal(message)) => Err(PredicateFailure::Aborted(message)),
        }
    }

    fn transform(&mut self, rule: &Rule, value: Value) -> Result<Value, MutationError> {
        match rule {
            Rule::Transform(t) => self.run_transform(t, value),
            Rule::Conditional {
                predicate,
                transform,
                fallback,
            } => {
                let holds = match self.invoke.invoke(predicate, std::slice::from_ref(&value)) {
                    Ok(result) => result.is_truthy(),
                    Err(InvokeError::Raised(raised)) => {
                        return Err(MutationError::TransformRaised {
                            rule: rule.to_string(),
                            raised,
                        })
                    }
                    Err(InvokeError::Fatal(message)) => return Err(MutationError::Aborted { message }),
                };
                match (holds, fallback) {
                    (true, _) => self.run_transform(transform, value),
                    (false, Some(fallback)) => self.run_transform(fallback, value),
                    (false, None) => Ok(value),
                }
            }
            Rule::Freeze(FreezeRule::CopyElements) => Ok(unfrozen_copy(value)),
            _ => Ok(value),
        }
    }

    fn run_transform(&mut self, transform: &Transform, value: Value) -> Result<Value, MutationError> {
        match transform {
            Transform::Custom { name, callee } => {
                self.invoke
                    .invoke(callee, &[value])
                    .map_err(|e| match e {
                        InvokeError::Raised(raised) => {
                            tracing::debug!(rule = %name, "transformation raised");
                            MutationError::TransformRaised {
                                rule: name.clone(),
                                raised,
                            }
                        }
                        InvokeError::Fatal(message) => MutationError::Aborted { message },
                    })
            }
            builtin_rule => builtin::apply(builtin_rule, value).map_err(|message| {
                MutationError::TransformFailed {
                    rule: builtin_rule.to_string(),
                    message,
                }
            }),
        }
    }

    /// Attaches `rule` and applies it to the existing members.
    ///
    /// Only the new rule runs. A validation that the current contents fail
    /// rejects the call; transformed values are all computed before any is
    /// written, so a failing transform leaves the graph untouched.
    pub fn add_rule(&mut self, graph: &GraphRef, rule: Rule) -> Result<(), MutationError> {
        if graph.borrow().is_frozen() {
            return Err(MutationError::Frozen);
        }

        let mut updates = Vec::new();
        match &rule {
            Rule::Validate(Validation::Predicate { callee, .. }) => {
                let values = graph.borrow().member_values();
                for value in &values {
                    self.predicate(callee, value).map_err(|e| match e {
                        PredicateFailure::Rejected(reason) => MutationError::ValidationFailed {
                            rule: rule.to_string(),
                            reason: Some(reason.unwrap_or_else(|| format!("existing member {value:?} fails"))),
                        },
                        PredicateFailure::Aborted(message) => MutationError::Aborted { message },
                    })?;
                }
            }
            Rule::Validate(validation) => {
                let verdict = builtin::check_existing(validation, &graph.borrow());
                verdict.map_err(|reason| MutationError::ValidationFailed {
                    rule: rule.to_string(),
                    reason: Some(reason),
                })?;
            }
            Rule::Freeze(FreezeRule::RejectMixed) => {
                let values = graph.borrow().member_values();
                for value in &values {
                    reject_mixed(graph, &rule, value)?;
                }
            }
            Rule::Transform(_) | Rule::Conditional { .. } | Rule::Freeze(FreezeRule::CopyElements) => {
                let members: Vec<(NodeId, Value)> = {
                    let g = graph.borrow();
                    g.members()
                        .into_iter()
                        .filter_map(|n| g.value(n).map(|v| (n, v.clone())))
                        .collect()
                };
                for (node, value) in members {
                    updates.push((node, self.transform(&rule, value)?));
                }
            }
        }

        let mut g = graph.borrow_mut();
        if g.is_frozen() {
            return Err(MutationError::Frozen);
        }
        for (node, value) in updates {
            // Members removed by a callback meanwhile are skipped.
            if g.contains_node(node) {
                g.set_value(node, value)?;
            }
        }
        tracing::debug!(rule = %rule, total = g.rules().len() + 1, "rule attached");
        g.push_rule(rule)?;
        Ok(())
    }

    /// Equivalent to calling [`add_rule`](Self::add_rule) for each rule in
    /// order; rules attached before a failure stay attached.
    pub fn apply_ruleset(&mut self, graph: &GraphRef, ruleset: &Ruleset) -> Result<(), MutationError> {
        tracing::debug!(ruleset = %ruleset.name, rules = ruleset.rules.len(), "applying ruleset");
        for rule in &ruleset.rules {
            self.add_rule(graph, rule.clone())?;
        }
        Ok(())
    }

    /// Freezes the graph. Under `reject_mixed_freeze` the call fails while
    /// an unfrozen graph is still held as a member. Freezing an already
    /// frozen graph is a no-op.
    pub fn freeze(&mut self, graph: &GraphRef) -> Result<(), MutationError> {
        let g = graph.borrow();
        if g.is_frozen() {
            return Ok(());
        }
        if let Some(rule) = g.rules().iter().find(|r| matches!(r, Rule::Freeze(FreezeRule::RejectMixed))) {
            let mixed = g.member_values().iter().any(|v| match v {
                Value::Graph(inner) => !inner.ptr_eq(graph) && !inner.borrow().is_frozen(),
                _ => false,
            });
            if mixed {
                return Err(MutationError::ValidationFailed {
                    rule: rule.to_string(),
                    reason: Some("a member graph is not frozen".to_string()),
                });
            }
        }
        drop(g);

        graph.borrow_mut().freeze();
        tracing::debug!("graph frozen");
        Ok(())
    }
}

/// Fails when `value` is a graph whose frozen state differs from `target`'s.
fn reject_mixed(target: &GraphRef, rule: &Rule, value: &Value) -> Result<(), MutationError> {
    let Value::Graph(inner) = value else {
        return Ok(());
    };
    if inner.ptr_eq(target) {
        return Ok(());
    }
    let (held, into) = (inner.borrow().is_frozen(), target.borrow().is_frozen());
    if held == into {
        return Ok(());
    }
    tracing::debug!(rule = %rule, "mutation rejected: mixed freeze states");
    Err(MutationError::ValidationFailed {
        rule: rule.to_string(),
        reason: Some(format!(
            "cannot hold a {} graph in a {} one",
            if held { "frozen" } else { "unfrozen" },
            if into { "frozen" } else { "unfrozen" },
        )),
    })
}

/// Graph values become unfrozen deep copies; anything else passes through.
fn unfrozen_copy(value: Value) -> Value {
    match value {
        Value::Graph(inner) => {
            let copy = inner.borrow().deep_copy();
            Value::Graph(GraphRef::new(copy))
        }
        other => other,
    }
}

enum PredicateFailure {
    Rejected(Option<String>),
    Aborted(String),
}

fn unexpected(applied: Applied) -> MutationError {
    MutationError::Aborted {
        message: format!("mutation produced {applied:?}"),
    }
}

fn kind_name(kind: &GraphKind) -> String {
    match kind {
        GraphKind::List => "list".to_string(),
        GraphKind::Map => "map".to_string(),
        GraphKind::User(name) => format!("graph {name}"),
    }
}

fn expect_kind(graph: &ValueGraph, expected: &'static str) -> Result<(), MutationError> {
    let matches = match graph.kind() {
        GraphKind::List => expected == "list",
        GraphKind::Map => expected == "map",
        GraphKind::User(_) => expected == "graph",
    };
    if matches {
        Ok(())
    } else {
        Err(MutationError::WrongKind {
            expected,
            actual: kind_name(graph.kind()),
        })
    }
}

fn check_index(graph: &ValueGraph, index: usize) -> Result<NodeId, MutationError> {
    graph
        .element_node(index)
        .ok_or(MutationError::IndexOutOfRange {
            index: index as i64,
            len: graph.len(),
        })
}

fn check_member(graph: &ValueGraph, node: NodeId) -> Result<(), MutationError> {
    if node == graph.root() || !graph.contains_node(node) {
        return Err(GraphError::UnknownNode { id: node }.into());
    }
    Ok(())
}

/// Structural preconditions that do not depend on rules.
fn preflight(graph: &ValueGraph, mutation: &Mutation) -> Result<(), MutationError> {
    match mutation {
        Mutation::Insert(_) => expect_kind(graph, "list"),
        Mutation::Set { index, .. } => {
            expect_kind(graph, "list")?;
            check_index(graph, *index).map(|_| ())
        }
        Mutation::Put { .. } => expect_kind(graph, "map"),
        Mutation::Remove(Target::Index(index)) => {
            expect_kind(graph, "list")?;
            check_index(graph, *index).map(|_| ())
        }
        Mutation::Remove(Target::Key(key)) => {
            expect_kind(graph, "map")?;
            match graph.entry_node(key) {
                Some(_) => Ok(()),
                None => Err(MutationError::KeyNotFound { key: key.to_string() }),
            }
        }
        Mutation::Remove(Target::Node(node)) => {
            expect_kind(graph, "graph")?;
            check_member(graph, *node)
        }
        Mutation::AddMember { parent, .. } => {
            expect_kind(graph, "graph")?;
            match parent {
                Some((node, _)) => check_member(graph, *node),
                None => Ok(()),
            }
        }
        Mutation::Link { from, to, .. } => {
            expect_kind(graph, "graph")?;
            check_member(graph, *from)?;
            check_member(graph, *to)
        }
    }
}

fn commit(graph: &GraphRef, mutation: Mutation) -> Result<Applied, MutationError> {
    let mut g = graph.borrow_mut();
    if g.is_frozen() {
        return Err(MutationError::Frozen);
    }
    preflight(&g, &mutation)?;
    let applied = match mutation {
        Mutation::Insert(value) => Applied::Node(g.add_member(Label::Element, value)?),
        Mutation::Set { index, value } => {
            let node = check_index(&g, index)?;
            Applied::Replaced(g.set_value(node, value)?)
        }
        Mutation::Put { key, value } => match g.entry_node(&key) {
            Some(node) => {
                g.set_value(node, value)?;
                Applied::Node(node)
            }
            None => Applied::Node(g.add_member(Label::Entry(key), value)?),
        },
        Mutation::Remove(target) => {
            let node = match target {
                Target::Index(index) => check_index(&g, index)?,
                Target::Key(key) => g
                    .entry_node(&key)
                    .ok_or(MutationError::KeyNotFound { key: key.to_string() })?,
                Target::Node(node) => node,
            };
            Applied::Removed(g.remove_node(node)?.value)
        }
        Mutation::AddMember { value, parent } => {
            let node = g.add_member(Label::Contains, value)?;
            if let Some((from, name)) = parent {
                g.add_edge(from, node, Label::Link(name), None)?;
            }
            Applied::Node(node)
        }
        Mutation::Link { from, to, name, data } => {
            Applied::Edge(g.add_edge(from, to, Label::Link(name), data)?)
        }
    };
    Ok(applied)
}
