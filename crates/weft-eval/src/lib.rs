//! Evaluation of execution graphs.
//!
//! [`interpreter`] walks a validated unit node by node; [`optimize`] holds
//! the rewrite passes that may run before it.

pub mod interpreter;
pub mod optimize;

pub use interpreter::{Context, EvalError, Interpreter, InterpreterConfig, TraceEntry};
pub use optimize::{optimize, OptimizeReport};
