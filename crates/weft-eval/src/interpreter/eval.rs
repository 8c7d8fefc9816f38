//! Value-level semantics of operators, shared by the interpreter and the
//! constant folder.
//!
//! Every function here is pure: it never touches scopes or mutates graphs,
//! and it reports failure as the [`Exception`] the interpreter would raise.
//! The folder relies on that: an expression is folded only when evaluating
//! it here succeeds, so folding can never hide a runtime error.

use weft_core::ops::{BinaryOp, LogicalOp, UnaryOp};
use weft_core::value::{Exception, MapKey, Value};
use weft_core::value_graph::{GraphKind, ValueGraph};
use weft_core::GraphRef;

pub const TYPE_ERROR: &str = "TypeError";
pub const ZERO_DIVISION: &str = "ZeroDivisionError";
pub const OVERFLOW: &str = "OverflowError";
pub const INDEX_ERROR: &str = "IndexError";
pub const KEY_ERROR: &str = "KeyError";

fn type_error(message: String) -> Exception {
    Exception::new(TYPE_ERROR, message)
}

fn overflow(op: BinaryOp) -> Exception {
    Exception::new(OVERFLOW, format!("integer overflow in '{}'", op.symbol()))
}

/// Evaluates `left op right`.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::Ne => return Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => return compare(op, left, right),
        _ => {}
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_arith(op, *a, *b),
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::from(s))
        }
        (Value::Graph(a), Value::Graph(b)) if op == BinaryOp::Add => concat(a, b),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => float_arith(op, a, b),
            _ => Err(type_error(format!(
                "unsupported operand types for '{}': {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        },
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<Value, Exception> {
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Sub => a.checked_sub(b),
        BinaryOp::Mul => a.checked_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => {
            return Err(Exception::new(ZERO_DIVISION, "integer division by zero"));
        }
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Mod => a.checked_rem(b),
        _ => None,
    };
    result.map(Value::Int).ok_or_else(|| overflow(op))
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<Value, Exception> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Mod if b == 0.0 => {
            return Err(Exception::new(ZERO_DIVISION, "float division by zero"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => return Err(type_error(format!("'{}' is not arithmetic", op.symbol()))),
    };
    Ok(Value::Float(result))
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Exception> {
    let ordering = match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(type_error(format!(
                    "cannot order {} and {}",
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
    };
    // NaN compares false to everything.
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::Le => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

/// List concatenation builds a fresh, rule-less list.
fn concat(a: &GraphRef, b: &GraphRef) -> Result<Value, Exception> {
    let (a, b) = (a.borrow(), b.borrow());
    if *a.kind() != GraphKind::List || *b.kind() != GraphKind::List {
        return Err(type_error("only lists can be concatenated".to_string()));
    }
    Ok(Value::list(a.elements().into_iter().chain(b.elements())))
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value, Exception> {
    match (op, operand) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| Exception::new(OVERFLOW, "integer overflow in unary '-'")),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (UnaryOp::Neg, other) => Err(type_error(format!("cannot negate a {}", other.type_name()))),
    }
}

/// Combines two already evaluated operands. The interpreter short-circuits
/// before calling this; the folder calls it with both sides literal.
pub fn logical(op: LogicalOp, left: &Value, right: &Value) -> Value {
    let result = match op {
        LogicalOp::And => left.is_truthy() && right.is_truthy(),
        LogicalOp::Or => left.is_truthy() || right.is_truthy(),
    };
    Value::Bool(result)
}

/// Reads `target[index]`: a list position, a map key, a user-graph member
/// handle or a character of a string.
pub fn index(target: &Value, index: &Value) -> Result<Value, Exception> {
    match target {
        Value::Graph(graph) => {
            let graph = graph.borrow();
            match graph.kind() {
                GraphKind::List => {
                    let i = list_index(&graph, index)?;
                    graph.get(i).ok_or_else(|| out_of_range(index, graph.len()))
                }
                GraphKind::Map => {
                    let key = map_key(index)?;
                    graph
                        .get_key(&key)
                        .ok_or_else(|| Exception::new(KEY_ERROR, format!("key {key} not found")))
                }
                GraphKind::User(_) => {
                    let node = member_handle(index)?;
                    graph
                        .members()
                        .contains(&node)
                        .then(|| graph.value(node).cloned())
                        .flatten()
                        .ok_or_else(|| Exception::new(KEY_ERROR, format!("no member {}", node.0)))
                }
            }
        }
        Value::Str(s) => {
            let i = index
                .as_int()
                .ok_or_else(|| type_error(format!("string index must be an int, not {}", index.type_name())))?;
            usize::try_from(i)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| out_of_range(index, s.chars().count()))
        }
        other => Err(type_error(format!("a {} cannot be indexed", other.type_name()))),
    }
}

/// Converts a list index, rejecting negatives and non-integers.
pub fn list_index(graph: &ValueGraph, index: &Value) -> Result<usize, Exception> {
    let i = index
        .as_int()
        .ok_or_else(|| type_error(format!("list index must be an int, not {}", index.type_name())))?;
    usize::try_from(i).map_err(|_| out_of_range(index, graph.len()))
}

pub fn map_key(value: &Value) -> Result<MapKey, Exception> {
    MapKey::from_value(value)
        .ok_or_else(|| type_error(format!("a {} cannot be a map key", value.type_name())))
}

/// Member handles are exposed to programs as integer node ids.
pub fn member_handle(value: &Value) -> Result<weft_core::NodeId, Exception> {
    value
        .as_int()
        .and_then(|i| u32::try_from(i).ok())
        .map(weft_core::NodeId)
        .ok_or_else(|| type_error(format!("expected a member handle, found {value}")))
}

fn out_of_range(index: &Value, len: usize) -> Exception {
    Exception::new(INDEX_ERROR, format!("index {index} out of range for length {len}"))
}
