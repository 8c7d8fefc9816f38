//! Function definitions.
//!
//! [`FunctionDef`] is metadata only: the body lives as execution nodes
//! owned by this function's id in the unit's flat graph. Nested functions
//! reference their enclosing function through `parent`; the closure value a
//! `function` node produces captures the scope it is evaluated in.

use serde::{Deserialize, Serialize};

use crate::id::{ExecNodeId, FunctionId};

/// Name the implicit top-level function of a unit is reported under.
pub const MAIN_NAME: &str = "<main>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub id: FunctionId,
    /// Name as written at the definition; used in call paths.
    pub name: String,
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    /// Root of the body. `None` until the body has been built.
    pub body: Option<ExecNodeId>,
    /// Enclosing function for nested definitions; `None` for the unit body.
    pub parent: Option<FunctionId>,
}

impl FunctionDef {
    pub fn new(id: FunctionId, name: &str, params: Vec<String>, parent: Option<FunctionId>) -> Self {
        FunctionDef {
            id,
            name: name.to_string(),
            params,
            body: None,
            parent,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn is_main(&self) -> bool {
        self.id == FunctionId::MAIN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_function_has_no_body() {
        let f = FunctionDef::new(FunctionId(3), "add", vec!["a".into(), "b".into()], Some(FunctionId::MAIN));
        assert_eq!(f.arity(), 2);
        assert!(f.body.is_none());
        assert!(!f.is_main());
    }
}
