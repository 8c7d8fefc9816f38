//! Edge labels for the three graph layers.
//!
//! - [`Label`] tags edges inside a [`ValueGraph`](crate::value_graph::ValueGraph):
//!   ordered `Element` edges give lists their positional semantics, keyed
//!   `Entry` edges give maps theirs.
//! - [`ScopeEdge`] tags edges of the [`ScopeGraph`](crate::scope::ScopeGraph).
//! - [`Role`] names the structural slot a child occupies under an execution
//!   node. The evaluator reads children by role, never by position.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::MapKey;

// ---------------------------------------------------------------------------
// Value graph edges
// ---------------------------------------------------------------------------

/// Semantic label on a value-graph edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Label {
    /// Container root to list element. Order is insertion order.
    Element,
    /// Container root to map value, keyed.
    Entry(MapKey),
    /// Container root to a member of a user-defined graph.
    Contains,
    /// Named edge between members of a user-defined graph.
    Link(String),
}

impl Label {
    /// Returns `true` for edges that express user-level structure (as
    /// opposed to container membership).
    pub fn is_link(&self) -> bool {
        matches!(self, Label::Link(_))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Element => f.write_str("element"),
            Label::Entry(key) => write!(f, "entry({key})"),
            Label::Contains => f.write_str("contains"),
            Label::Link(name) => write!(f, "link({name})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope graph edges
// ---------------------------------------------------------------------------

/// Edge kinds in the scope graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeEdge {
    /// Scope to its lexically enclosing scope. Exactly one per non-root scope.
    Parent,
    /// Scope to each variable it declares.
    Contains,
    /// Variable to its current value. Exactly one per variable.
    BindsTo,
    /// Closure to its defining scope and captured variables, or a root scope
    /// to a variable imported from another unit.
    Captures,
}

impl fmt::Display for ScopeEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeEdge::Parent => "parent",
            ScopeEdge::Contains => "contains",
            ScopeEdge::BindsTo => "binds_to",
            ScopeEdge::Captures => "captures",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Execution graph edges
// ---------------------------------------------------------------------------

/// Structural role of a child edge in the execution graph.
///
/// The derived ordering sorts indexed roles by index, which is the order the
/// evaluator visits them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Left,
    Right,
    Operand,
    Callee,
    Argument(u16),
    Condition,
    Then,
    Else,
    Body,
    Target,
    Index,
    Value,
    Element(u16),
    Statement(u16),
    Handler,
    Finally,
}

impl Role {
    /// Position for indexed roles (`argument[i]`, `element[i]`, `statement[i]`).
    pub fn index(&self) -> Option<u16> {
        match self {
            Role::Argument(i) | Role::Element(i) | Role::Statement(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns `true` if `self` and `other` are the same indexed family.
    pub fn same_family(&self, other: &Role) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Left => f.write_str("left"),
            Role::Right => f.write_str("right"),
            Role::Operand => f.write_str("operand"),
            Role::Callee => f.write_str("callee"),
            Role::Argument(i) => write!(f, "argument[{i}]"),
            Role::Condition => f.write_str("condition"),
            Role::Then => f.write_str("then"),
            Role::Else => f.write_str("else"),
            Role::Body => f.write_str("body"),
            Role::Target => f.write_str("target"),
            Role::Index => f.write_str("index"),
            Role::Value => f.write_str("value"),
            Role::Element(i) => write!(f, "element[{i}]"),
            Role::Statement(i) => write!(f, "statement[{i}]"),
            Role::Handler => f.write_str("handler"),
            Role::Finally => f.write_str("finally"),
        }
    }
}
