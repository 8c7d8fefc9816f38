//! The host prelude: natives every unit can see.
//!
//! This is deliberately small; a standard library is a separate concern.
//! `print` writes to the interpreter's output log rather than stdout so
//! embedding hosts and tests can inspect it.

use std::cell::RefCell;
use std::rc::Rc;

use weft_core::value::{Exception, NativeFunction, Value};
use weft_core::value_graph::GraphKind;

use super::eval::TYPE_ERROR;

/// Lines written by `print`.
pub type OutputLog = Rc<RefCell<Vec<String>>>;

fn type_error(message: String) -> Value {
    Exception::new(TYPE_ERROR, message).into_value()
}

/// Builds the prelude natives, wiring `print` to `output`.
pub fn prelude(output: OutputLog) -> Vec<NativeFunction> {
    vec![
        NativeFunction::new("print", None, move |args| {
            let line = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
            tracing::debug!(%line, "print");
            output.borrow_mut().push(line);
            Ok(Value::None)
        }),
        NativeFunction::new("len", Some(1), |args| match &args[0] {
            Value::Graph(g) => Ok(Value::Int(g.borrow().len() as i64)),
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            other => Err(type_error(format!("a {} has no length", other.type_name()))),
        }),
        NativeFunction::new("str", Some(1), |args| Ok(Value::from(args[0].to_string()))),
        NativeFunction::new("type_of", Some(1), |args| Ok(Value::from(args[0].type_name()))),
        NativeFunction::new("range", Some(1), |args| match args[0] {
            Value::Int(n) => Ok(Value::list((0..n.max(0)).map(Value::Int))),
            ref other => Err(type_error(format!("range needs an int, not {}", other.type_name()))),
        }),
        NativeFunction::new("keys", Some(1), |args| match &args[0] {
            Value::Graph(g) if *g.borrow().kind() == GraphKind::Map => {
                Ok(Value::list(g.borrow().keys().iter().map(|k| k.to_value())))
            }
            other => Err(type_error(format!("keys needs a map, not {}", other.type_name()))),
        }),
        // exception(kind, message) builds a raisable exception value.
        NativeFunction::new("exception", Some(2), |args| match (&args[0], &args[1]) {
            (Value::Str(kind), message) => {
                let mut exc = Exception::new(kind.as_ref(), message.to_string());
                exc.payload = message.clone();
                Ok(exc.into_value())
            }
            (other, _) => Err(type_error(format!(
                "exception kind must be a str, not {}",
                other.type_name()
            ))),
        }),
        NativeFunction::new("is_frozen", Some(1), |args| match &args[0] {
            Value::Graph(g) => Ok(Value::Bool(g.borrow().is_frozen())),
            _ => Ok(Value::Bool(false)),
        }),
    ]
}
