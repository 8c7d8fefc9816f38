//! Execution graph nodes.

use serde::{Deserialize, Serialize};

use crate::id::FunctionId;
use crate::ops::ExecOp;
use crate::types::SourceLocation;

/// A node in the execution graph: an operation tagged with the function
/// whose body it belongs to.
///
/// All nodes of a unit live in one flat `StableGraph`; function boundaries
/// are the `owner` field, so a function's nodes are those with
/// `owner == function_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecNode {
    pub op: ExecOp,
    pub owner: FunctionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl ExecNode {
    pub fn new(op: ExecOp, owner: FunctionId) -> Self {
        ExecNode {
            op,
            owner,
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}
