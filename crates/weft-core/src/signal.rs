//! Control signals: the tagged outcome of evaluating one execution node.
//!
//! Every composite node inspects each child's signal and re-emits anything
//! other than [`ControlSignal::Normal`] unchanged, so `return`, `break`,
//! `continue` and raised exceptions unwind through the traversal without a
//! separate exception mechanism on the Rust side.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{ExecNodeId, FunctionId, UnitId};
use crate::value::Value;

/// One frame on a propagation path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    /// Function name as written at its definition (`<main>` for the unit body).
    pub name: String,
    pub unit: UnitId,
    pub function: FunctionId,
    /// The `call` node that created this frame, if any.
    pub call_node: Option<ExecNodeId>,
    /// Serial number of the frame; unique for the lifetime of a context.
    pub frame: u64,
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call_node {
            Some(node) => write!(f, "{} (called at node {node})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// An exception in flight together with the frames it has left.
#[derive(Debug, Clone)]
pub struct Raised {
    pub exception: Value,
    /// Innermost first.
    pub path: Vec<CallSite>,
}

impl Raised {
    pub fn new(exception: Value) -> Self {
        // Re-raising a caught exception continues its recorded path.
        let path = exception
            .as_exception()
            .map(|e| e.path.clone())
            .unwrap_or_default();
        Raised { exception, path }
    }

    /// Appends `site` unless it is already the last recorded frame.
    pub fn leave_frame(&mut self, site: &CallSite) {
        if self.path.last().map(|last| last.frame) != Some(site.frame) {
            self.path.push(site.clone());
        }
    }

    pub fn path_names(&self) -> Vec<String> {
        self.path.iter().map(|site| site.name.clone()).collect()
    }
}

/// Outcome of evaluating one node.
#[derive(Debug, Clone)]
pub enum ControlSignal {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
    Raised(Raised),
}

impl ControlSignal {
    pub fn none() -> Self {
        ControlSignal::Normal(Value::None)
    }

    pub fn raise(exception: Value) -> Self {
        ControlSignal::Raised(Raised::new(exception))
    }

    pub fn is_normal(&self) -> bool {
        matches!(self, ControlSignal::Normal(_))
    }

    /// Short label for traces and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlSignal::Normal(_) => "normal",
            ControlSignal::Return(_) => "return",
            ControlSignal::Break => "break",
            ControlSignal::Continue => "continue",
            ControlSignal::Raised(_) => "raised",
        }
    }
}
