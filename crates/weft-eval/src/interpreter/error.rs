//! Errors that end an evaluation.
//!
//! Program-level failures (unbound names, type errors, rejected mutations)
//! are not here: they become exception values raised into the program and
//! can be intercepted by `try`. An [`EvalError`] is what is left when
//! evaluation cannot or must not continue.

use std::fmt::Write as _;

use weft_core::error::{BindingError, ConstructionError};
use weft_core::id::UnitId;
use weft_core::signal::CallSite;
use weft_core::value::Value;

#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("malformed execution graph:{}", render_errors(.0))]
    Construction(Vec<ConstructionError>),

    /// An exception reached the unit root. `path` runs from the raise site
    /// outward.
    #[error("uncaught exception: {exception}{}", render_path(.path))]
    Uncaught { exception: Value, path: Vec<CallSite> },

    /// Fatal and never interceptable by `try`.
    #[error("recursion depth limit ({limit}) exceeded{}", render_path(.path))]
    RecursionLimitExceeded { limit: usize, path: Vec<CallSite> },

    #[error("unknown unit: UnitId({id})")]
    UnknownUnit { id: UnitId },

    #[error("'{name}' is not defined in unit {unit}")]
    UnknownExport { unit: UnitId, name: String },

    /// Scope bookkeeping failed outside of any program-level operation.
    #[error("scope graph error: {0}")]
    Scope(#[from] BindingError),

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl EvalError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        EvalError::Internal {
            message: message.into(),
        }
    }

    /// The call path attached to the error, innermost first.
    pub fn path(&self) -> &[CallSite] {
        match self {
            EvalError::Uncaught { path, .. } | EvalError::RecursionLimitExceeded { path, .. } => path,
            _ => &[],
        }
    }
}

fn render_errors(errors: &[ConstructionError]) -> String {
    let mut out = String::new();
    for err in errors {
        let _ = write!(out, "\n  {err}");
    }
    out
}

fn render_path(path: &[CallSite]) -> String {
    let mut out = String::new();
    for site in path {
        let _ = write!(out, "\n  in {site}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::id::FunctionId;

    #[test]
    fn uncaught_renders_innermost_first() {
        let site = |name: &str, frame| CallSite {
            name: name.into(),
            unit: UnitId(0),
            function: FunctionId(frame as u32),
            call_node: None,
            frame,
        };
        let err = EvalError::Uncaught {
            exception: Value::from("boom"),
            path: vec![site("inner", 2), site("<main>", 1)],
        };
        insta::assert_snapshot!(err.to_string(), @r"
        uncaught exception: boom
          in inner
          in <main>
        ");
    }
}
