//! Rules governing ValueGraph mutations.
//!
//! A [`Rule`] is attached to one graph and consulted on every structural
//! mutation of it. Validations decide whether a mutation may happen at all;
//! transformations rewrite the incoming value before it is committed.
//! Freeze rules only act when the graph is frozen.
//!
//! User-defined predicates and procedures are runtime values (closures or
//! natives). The engine calls them back through the [`Invoke`] trait, which
//! the evaluator implements; this keeps `weft-core` free of any dependency
//! on the evaluator.

pub mod builtin;
pub mod engine;
pub mod spec;

use std::fmt;

use indexmap::IndexMap;

use crate::signal::Raised;
use crate::value::Value;

pub use engine::{Mutation, RuleEngine, Target};
pub use spec::RuleSpec;

/// A precondition checked before any transformation runs.
#[derive(Debug, Clone)]
pub enum Validation {
    /// At most `n` members after the mutation.
    MaxSize(usize),
    /// `Link` edges never form a cycle.
    Acyclic,
    /// A non-empty user graph has exactly one member without incoming links.
    SingleRoot,
    /// Every member value has the same [`ValueType`](crate::value::ValueType).
    Homogeneous,
    /// A user predicate called with the incoming value; truthy passes.
    Predicate { name: String, callee: Value },
}

/// A rewrite of the incoming value.
#[derive(Debug, Clone)]
pub enum Transform {
    NoneToZero,
    /// Replaces `none` with the given value.
    Coalesce(Value),
    /// Clamps numbers into `[min, max]`.
    ValidateRange { min: Value, max: Value },
    /// Rounds floats to `digits` decimal places.
    Round(u32),
    Lowercase,
    Uppercase,
    Trim,
    /// Maps values through a map graph, falling back to `default`.
    Lookup { table: Value, default: Value },
    /// A user procedure called with the value; its result replaces it.
    Custom { name: String, callee: Value },
}

/// Rules about graphs held inside other graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreezeRule {
    /// Rejects inserting a graph whose frozen state differs from the
    /// target's, and freezing while an unfrozen graph is held.
    RejectMixed,
    /// Stores inserted graphs as unfrozen deep copies.
    CopyElements,
}

/// One rule in a graph's ordered rule set.
#[derive(Debug, Clone)]
pub enum Rule {
    Validate(Validation),
    Transform(Transform),
    /// Applies `transform` when `predicate(value)` is truthy, `fallback`
    /// otherwise.
    Conditional {
        predicate: Value,
        transform: Box<Transform>,
        fallback: Option<Box<Transform>>,
    },
    Freeze(FreezeRule),
}

impl Rule {
    pub fn is_validation(&self) -> bool {
        matches!(self, Rule::Validate(_))
    }

    pub fn is_transformation(&self) -> bool {
        matches!(self, Rule::Transform(_) | Rule::Conditional { .. })
    }

    /// Whether the rule runs in the insert pipeline, rewriting the incoming
    /// value.
    pub fn rewrites_incoming(&self) -> bool {
        self.is_transformation() || matches!(self, Rule::Freeze(FreezeRule::CopyElements))
    }

    /// Runtime values the rule keeps alive (callees, tables, defaults).
    pub fn callbacks(&self) -> Vec<Value> {
        match self {
            Rule::Validate(Validation::Predicate { callee, .. }) => vec![callee.clone()],
            Rule::Validate(_) | Rule::Freeze(_) => Vec::new(),
            Rule::Transform(t) => t.callbacks(),
            Rule::Conditional {
                predicate,
                transform,
                fallback,
            } => {
                let mut values = vec![predicate.clone()];
                values.extend(transform.callbacks());
                if let Some(fallback) = fallback {
                    values.extend(fallback.callbacks());
                }
                values
            }
        }
    }
}

impl Transform {
    fn callbacks(&self) -> Vec<Value> {
        match self {
            Transform::Coalesce(v) => vec![v.clone()],
            Transform::Lookup { table, default } => vec![table.clone(), default.clone()],
            Transform::Custom { callee, .. } => vec![callee.clone()],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Validation::MaxSize(n) => write!(f, "max_size({n})"),
            Validation::Acyclic => f.write_str("acyclic"),
            Validation::SingleRoot => f.write_str("single_root"),
            Validation::Homogeneous => f.write_str("homogeneous"),
            Validation::Predicate { name, .. } => f.write_str(name),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::NoneToZero => f.write_str("none_to_zero"),
            Transform::Coalesce(v) => write!(f, "coalesce({v:?})"),
            Transform::ValidateRange { min, max } => write!(f, "validate_range({min}, {max})"),
            Transform::Round(digits) => write!(f, "round({digits})"),
            Transform::Lowercase => f.write_str("lowercase"),
            Transform::Uppercase => f.write_str("uppercase"),
            Transform::Trim => f.write_str("trim"),
            Transform::Lookup { .. } => f.write_str("lookup"),
            Transform::Custom { name, .. } => f.write_str(name),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Validate(v) => write!(f, "{v}"),
            Rule::Transform(t) => write!(f, "{t}"),
            Rule::Conditional { transform, .. } => write!(f, "conditional({transform})"),
            Rule::Freeze(FreezeRule::RejectMixed) => f.write_str("reject_mixed_freeze"),
            Rule::Freeze(FreezeRule::CopyElements) => f.write_str("copy_elements"),
        }
    }
}

impl From<Validation> for Rule {
    fn from(v: Validation) -> Self {
        Rule::Validate(v)
    }
}

impl From<Transform> for Rule {
    fn from(t: Transform) -> Self {
        Rule::Transform(t)
    }
}

/// Why a callback did not produce a value.
#[derive(Debug, Clone)]
pub enum InvokeError {
    /// The callee raised an exception into the program.
    Raised(Raised),
    /// Evaluation cannot continue (e.g. the call depth limit was hit).
    Fatal(String),
}

/// Calls runtime values on behalf of the rule engine.
pub trait Invoke {
    fn invoke(&mut self, callee: &Value, args: &[Value]) -> Result<Value, InvokeError>;
}

/// An [`Invoke`] that can only call natives, for graphs used outside an
/// evaluator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeOnly;

impl Invoke for NativeOnly {
    fn invoke(&mut self, callee: &Value, args: &[Value]) -> Result<Value, InvokeError> {
        match callee {
            Value::Native(native) => native
                .call(args)
                .map_err(|exception| InvokeError::Raised(Raised::new(exception))),
            other => Err(InvokeError::Fatal(format!(
                "cannot call a {} without an evaluator",
                other.type_name()
            ))),
        }
    }
}

/// A named, ordered bundle of rules.
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Ruleset {
    pub fn new(name: &str) -> Self {
        Ruleset {
            name: name.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn with(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }
}

/// Rulesets by name, in definition order. Redefining a name replaces it.
#[derive(Debug, Clone, Default)]
pub struct RulesetRegistry {
    sets: IndexMap<String, Ruleset>,
}

impl RulesetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(&mut self, ruleset: Ruleset) {
        self.sets.insert(ruleset.name.clone(), ruleset);
    }

    pub fn get(&self, name: &str) -> Option<&Ruleset> {
        self.sets.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Every callback held by any registered rule.
    pub fn callbacks(&self) -> Vec<Value> {
        self.sets
            .values()
            .flat_map(|set| set.rules.iter().flat_map(Rule::callbacks))
            .collect()
    }
}
