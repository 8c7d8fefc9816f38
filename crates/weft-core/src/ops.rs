//! Operation vocabulary of the execution graph.
//!
//! Each [`ExecOp`] names what a node does; its operands are child nodes
//! reached through role-labelled edges, never positions. [`ExecOp::shape`]
//! declares which roles each op takes, and is the single source the
//! validator checks edges against.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::edge::Role;
use crate::id::FunctionId;
use crate::rules::RuleSpec;
use crate::types::Literal;

/// Arithmetic and comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Short-circuiting boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

/// What an execution node does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecOp {
    Literal(Literal),
    /// Elements from `element[i]`.
    ListLiteral,
    /// Values from `element[i]`, keyed by `keys[i]`.
    MapLiteral { keys: Vec<Literal> },
    Var { name: String },
    Define {
        name: String,
        #[serde(default = "default_true")]
        mutable: bool,
    },
    Assign { name: String },
    Binary(BinaryOp),
    Unary(UnaryOp),
    Logical(LogicalOp),
    Call,
    /// Creates a closure over the enclosing scope.
    Function { function: FunctionId },
    Return,
    If,
    While,
    /// Iterates list elements, map keys or `0..n`, binding `var`.
    For { var: String },
    Break,
    Continue,
    Raise,
    /// `body`, with an optional `handler` bound to `catch_var` and an
    /// optional `finally`.
    Try {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        catch_var: Option<String>,
    },
    Block,
    Index,
    SetIndex,
    Append,
    RemoveAt,
    AddRule { rule: RuleSpec },
    DefineRuleset { name: String, rules: Vec<RuleSpec> },
    ApplyRuleset { name: String },
    Freeze,
    /// Creates an empty user-defined graph of the given kind.
    NewGraph { kind: String },
    /// Adds a member to a user graph, optionally linked from the member
    /// handle in `left`. Evaluates to the new member's handle.
    AddMember {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    /// Links member `left` to member `right`, with optional edge data.
    Link { name: String },
}

fn default_true() -> bool {
    true
}

/// The child roles an op takes.
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    pub required: &'static [Role],
    pub optional: &'static [Role],
    /// Family of the indexed roles, if any (`argument[i]`, ...).
    pub indexed: Option<Role>,
}

impl Shape {
    const LEAF: Shape = Shape {
        required: &[],
        optional: &[],
        indexed: None,
    };

    const fn fixed(required: &'static [Role]) -> Shape {
        Shape {
            required,
            optional: &[],
            indexed: None,
        }
    }

    /// Returns `true` if an edge with `role` is allowed under this shape.
    pub fn accepts(&self, role: &Role) -> bool {
        self.required.contains(role)
            || self.optional.contains(role)
            || self.indexed.is_some_and(|family| family.same_family(role))
    }
}

impl ExecOp {
    pub fn shape(&self) -> Shape {
        use Role::*;
        match self {
            ExecOp::Literal(_)
            | ExecOp::Var { .. }
            | ExecOp::Function { .. }
            | ExecOp::Break
            | ExecOp::Continue
            | ExecOp::NewGraph { .. } => Shape::LEAF,
            ExecOp::ListLiteral | ExecOp::MapLiteral { .. } => Shape {
                required: &[],
                optional: &[],
                indexed: Some(Element(0)),
            },
            ExecOp::Define { .. } | ExecOp::Assign { .. } | ExecOp::Raise => Shape::fixed(&[Value]),
            ExecOp::Binary(_) | ExecOp::Logical(_) => Shape::fixed(&[Left, Right]),
            ExecOp::Unary(_) => Shape::fixed(&[Operand]),
            ExecOp::Call => Shape {
                required: &[Callee],
                optional: &[],
                indexed: Some(Argument(0)),
            },
            ExecOp::Return => Shape {
                required: &[],
                optional: &[Value],
                indexed: None,
            },
            ExecOp::If => Shape {
                required: &[Condition, Then],
                optional: &[Else],
                indexed: None,
            },
            ExecOp::While => Shape::fixed(&[Condition, Body]),
            ExecOp::For { .. } => Shape::fixed(&[Target, Body]),
            ExecOp::Try { .. } => Shape {
                required: &[Body],
                optional: &[Handler, Finally],
                indexed: None,
            },
            ExecOp::Block => Shape {
                required: &[],
                optional: &[],
                indexed: Some(Statement(0)),
            },
            ExecOp::Index | ExecOp::RemoveAt => Shape::fixed(&[Target, Index]),
            ExecOp::SetIndex => Shape::fixed(&[Target, Index, Value]),
            ExecOp::Append => Shape::fixed(&[Target, Value]),
            ExecOp::AddRule { .. } => Shape {
                required: &[Target],
                optional: &[],
                indexed: Some(Argument(0)),
            },
            ExecOp::DefineRuleset { .. } => Shape {
                required: &[],
                optional: &[],
                indexed: Some(Argument(0)),
            },
            ExecOp::ApplyRuleset { .. } | ExecOp::Freeze => Shape::fixed(&[Target]),
            ExecOp::AddMember { .. } => Shape {
                required: &[Target, Value],
                optional: &[Left],
                indexed: None,
            },
            ExecOp::Link { .. } => Shape {
                required: &[Target, Left, Right],
                optional: &[Value],
                indexed: None,
            },
        }
    }

    /// Exact number of indexed children the op needs, when its payload
    /// fixes it.
    pub fn indexed_count(&self) -> Option<usize> {
        match self {
            ExecOp::MapLiteral { keys } => Some(keys.len()),
            ExecOp::AddRule { rule } => Some(rule.arg_count()),
            ExecOp::DefineRuleset { rules, .. } => Some(rules.iter().map(RuleSpec::arg_count).sum()),
            _ => None,
        }
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ExecOp::Literal(_) => "literal",
            ExecOp::ListLiteral => "list",
            ExecOp::MapLiteral { .. } => "map",
            ExecOp::Var { .. } => "var",
            ExecOp::Define { .. } => "define",
            ExecOp::Assign { .. } => "assign",
            ExecOp::Binary(_) => "binary",
            ExecOp::Unary(_) => "unary",
            ExecOp::Logical(_) => "logical",
            ExecOp::Call => "call",
            ExecOp::Function { .. } => "function",
            ExecOp::Return => "return",
            ExecOp::If => "if",
            ExecOp::While => "while",
            ExecOp::For { .. } => "for",
            ExecOp::Break => "break",
            ExecOp::Continue => "continue",
            ExecOp::Raise => "raise",
            ExecOp::Try { .. } => "try",
            ExecOp::Block => "block",
            ExecOp::Index => "index",
            ExecOp::SetIndex => "set_index",
            ExecOp::Append => "append",
            ExecOp::RemoveAt => "remove_at",
            ExecOp::AddRule { .. } => "add_rule",
            ExecOp::DefineRuleset { .. } => "define_ruleset",
            ExecOp::ApplyRuleset { .. } => "apply_ruleset",
            ExecOp::Freeze => "freeze",
            ExecOp::NewGraph { .. } => "new_graph",
            ExecOp::AddMember { .. } => "add_member",
            ExecOp::Link { .. } => "link",
        }
    }

    /// Loops: `break`/`continue` inside their body are bound to them.
    pub fn is_loop(&self) -> bool {
        matches!(self, ExecOp::While | ExecOp::For { .. })
    }

    /// Statements after one of these in a block can never run.
    pub fn diverges(&self) -> bool {
        matches!(
            self,
            ExecOp::Return | ExecOp::Raise | ExecOp::Break | ExecOp::Continue
        )
    }
}

impl fmt::Display for ExecOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOp::Literal(lit) => write!(f, "literal {lit}"),
            ExecOp::Var { name } => write!(f, "var {name}"),
            ExecOp::Define { name, .. } => write!(f, "define {name}"),
            ExecOp::Assign { name } => write!(f, "assign {name}"),
            ExecOp::Binary(op) => write!(f, "binary {}", op.symbol()),
            ExecOp::Unary(UnaryOp::Neg) => f.write_str("unary -"),
            ExecOp::Unary(UnaryOp::Not) => f.write_str("unary not"),
            ExecOp::Logical(LogicalOp::And) => f.write_str("logical and"),
            ExecOp::Logical(LogicalOp::Or) => f.write_str("logical or"),
            ExecOp::Function { function } => write!(f, "function #{function}"),
            ExecOp::For { var } => write!(f, "for {var}"),
            ExecOp::ApplyRuleset { name } | ExecOp::DefineRuleset { name, .. } => {
                write!(f, "{} {name}", self.name())
            }
            other => f.write_str(other.name()),
        }
    }
}
