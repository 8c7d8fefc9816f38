//! Core error types for weft-core.
//!
//! Uses `thiserror` for structured, matchable error variants, one enum per
//! layer: primitive graph errors, scope binding errors, governed mutation
//! errors and construction-time errors.

use thiserror::Error;

use crate::edge::Role;
use crate::id::{ClosureId, EdgeId, ExecNodeId, FunctionId, NodeId, ScopeId, VarId};
use crate::signal::Raised;
use crate::types::SourceLocation;

fn at(location: &Option<SourceLocation>) -> String {
    match location {
        Some(loc) => format!(" at {loc}"),
        None => String::new(),
    }
}

/// Errors from the primitive [`ValueGraph`](crate::value_graph::ValueGraph)
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("unknown node: NodeId({id})")]
    UnknownNode { id: NodeId },

    #[error("unknown edge: EdgeId({id})")]
    UnknownEdge { id: EdgeId },

    #[error("graph is frozen")]
    Frozen,

    /// The container root anchors membership and cannot be removed.
    #[error("the container root cannot be removed")]
    ProtectedRoot,
}

/// Errors from scope graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("unbound variable '{name}'")]
    UnboundVariable { name: String },

    /// Assigning to, or redefining, an immutable binding.
    #[error("cannot rebind immutable variable '{name}'")]
    ImmutableBinding { name: String },

    #[error("unknown scope: ScopeId({id})")]
    UnknownScope { id: ScopeId },

    #[error("unknown variable: VarId({id})")]
    UnknownVariable { id: VarId },

    #[error("unknown closure: ClosureId({id})")]
    UnknownClosure { id: ClosureId },
}

/// Errors from governed mutations. A mutation that fails with any of these
/// has left its target unchanged.
#[derive(Debug, Clone, Error)]
pub enum MutationError {
    #[error("graph is frozen")]
    Frozen,

    #[error("validation rule '{rule}' rejected the mutation{}", reason_suffix(.reason))]
    ValidationFailed {
        rule: String,
        reason: Option<String>,
    },

    #[error("transformation rule '{rule}' failed: {message}")]
    TransformFailed { rule: String, message: String },

    /// A user-defined transformation raised. The exception is surfaced at
    /// the mutation's call site.
    #[error("transformation rule '{rule}' raised {}", .raised.exception)]
    TransformRaised { rule: String, raised: Raised },

    /// A callback failed fatally (e.g. recursion limit); not interceptable.
    #[error("rule evaluation aborted: {message}")]
    Aborted { message: String },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("key {key} not found")]
    KeyNotFound { key: String },

    #[error("operation needs a {expected}, found a {actual}")]
    WrongKind {
        expected: &'static str,
        actual: String,
    },

    #[error(transparent)]
    Graph(GraphError),
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {reason}"),
        None => String::new(),
    }
}

impl From<GraphError> for MutationError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Frozen => MutationError::Frozen,
            other => MutationError::Graph(other),
        }
    }
}

/// A malformed execution graph, reported before evaluation starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    #[error("{op} node {node} is missing its `{role}` edge{}", at(.location))]
    MissingRole {
        node: ExecNodeId,
        op: String,
        role: Role,
        location: Option<SourceLocation>,
    },

    #[error("{op} node {node} does not accept a `{role}` edge{}", at(.location))]
    UnexpectedRole {
        node: ExecNodeId,
        op: String,
        role: Role,
        location: Option<SourceLocation>,
    },

    #[error("node {node} has more than one `{role}` edge{}", at(.location))]
    DuplicateRole {
        node: ExecNodeId,
        role: Role,
        location: Option<SourceLocation>,
    },

    #[error("node {node} has a gap in its indexed edges: expected `{expected}`{}", at(.location))]
    NonContiguousRoles {
        node: ExecNodeId,
        expected: Role,
        location: Option<SourceLocation>,
    },

    #[error("{op} node {node} expects {expected} children, found {actual}{}", at(.location))]
    ChildCountMismatch {
        node: ExecNodeId,
        op: String,
        expected: usize,
        actual: usize,
        location: Option<SourceLocation>,
    },

    #[error("`{keyword}` outside of a loop at node {node}{}", at(.location))]
    LoopControlOutsideLoop {
        node: ExecNodeId,
        keyword: &'static str,
        location: Option<SourceLocation>,
    },

    #[error("structural cycle through node {node} in function {function}")]
    CycleInBody { function: FunctionId, node: ExecNodeId },

    #[error("node {node} is shared by more than one parent")]
    SharedChild { node: ExecNodeId },

    #[error("edge from node {from} to node {to} crosses a function boundary")]
    CrossFunctionEdge { from: ExecNodeId, to: ExecNodeId },

    #[error("unknown node: ExecNodeId({id})")]
    UnknownNode { id: ExecNodeId },

    #[error("unknown function: FunctionId({id})")]
    UnknownFunction { id: FunctionId },

    #[error("function '{name}' has no body")]
    MissingBody { function: FunctionId, name: String },

    #[error("invalid rule: {reason}{}", at(.location))]
    InvalidRule {
        reason: String,
        location: Option<SourceLocation>,
    },
}
