//! Runtime value representation.
//!
//! [`Value`] is what every execution node produces and what every variable
//! binds to. Scalars are stored inline; composite values are
//! [`GraphRef`]s, shared handles to a [`ValueGraph`]. Cloning a `Value`
//! never copies a graph: two variables holding the same `GraphRef` alias
//! the same container and observe each other's mutations.

use std::cell::{BorrowError, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::id::{ClosureId, FunctionId, UnitId};
use crate::signal::CallSite;
use crate::value_graph::{GraphKind, ValueGraph};

/// Nesting depth past which `Display` stops descending into graphs.
const DISPLAY_DEPTH_LIMIT: usize = 16;

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    /// A list, map or user-defined graph, shared by reference.
    Graph(GraphRef),
    /// A user-defined function together with its captured environment.
    Function(FunctionValue),
    /// An opaque host procedure.
    Native(NativeFunction),
    Exception(Rc<Exception>),
}

/// Coarse runtime type tag, used by homogeneity rules and `type_of`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    None,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Graph,
    Function,
    Exception,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::None => "none",
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Graph => "graph",
            ValueType::Function => "function",
            ValueType::Exception => "exception",
        };
        f.write_str(name)
    }
}

/// Shared, interior-mutable handle to a [`ValueGraph`].
///
/// Single-threaded by construction (`Rc`, not `Arc`): the evaluator runs on
/// one thread and aliasing between handles is part of the language
/// semantics.
#[derive(Clone)]
pub struct GraphRef(Rc<RefCell<ValueGraph>>);

impl GraphRef {
    pub fn new(graph: ValueGraph) -> Self {
        GraphRef(Rc::new(RefCell::new(graph)))
    }

    pub fn borrow(&self) -> Ref<'_, ValueGraph> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ValueGraph> {
        self.0.borrow_mut()
    }

    pub fn try_borrow(&self) -> Result<Ref<'_, ValueGraph>, BorrowError> {
        self.0.try_borrow()
    }

    /// Returns `true` if both handles point at the same graph.
    pub fn ptr_eq(&self, other: &GraphRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Address-based identity, stable for the lifetime of the graph.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for GraphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(graph) => write!(f, "GraphRef({:?}, {} nodes)", graph.kind(), graph.node_count()),
            Err(_) => f.write_str("GraphRef(<borrowed>)"),
        }
    }
}

/// A closure value: which function to run and which environment to run it in.
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub unit: UnitId,
    pub function: FunctionId,
    pub closure: ClosureId,
    pub name: Rc<str>,
    pub arity: usize,
}

/// Signature shared by every host procedure.
///
/// A native returns `Err(exception)` to raise into the evaluated program.
pub type NativeFn = dyn Fn(&[Value]) -> Result<Value, Value>;

/// A host procedure exposed to programs (print, len, ...).
#[derive(Clone)]
pub struct NativeFunction {
    name: Rc<str>,
    arity: Option<usize>,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    /// Wraps a closure as a native. `arity = None` accepts any argument count.
    pub fn new(
        name: &str,
        arity: Option<usize>,
        func: impl Fn(&[Value]) -> Result<Value, Value> + 'static,
    ) -> Self {
        NativeFunction {
            name: Rc::from(name),
            arity,
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Value> {
        (self.func)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

/// A raised exception.
///
/// `path` is empty while the exception is in flight; once a `try` node
/// intercepts it the accumulated call path is attached, so re-raising keeps
/// extending the same path.
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: String,
    pub message: String,
    pub payload: Value,
    pub path: Vec<CallSite>,
}

impl Exception {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Exception {
            kind: kind.into(),
            message: message.into(),
            payload: Value::None,
            path: Vec::new(),
        }
    }

    /// Names of the functions on the recorded path, innermost first.
    pub fn path_names(&self) -> Vec<String> {
        self.path.iter().map(|site| site.name.clone()).collect()
    }

    pub fn into_value(self) -> Value {
        Value::Exception(Rc::new(self))
    }
}

/// Hashable scalar usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl MapKey {
    /// Converts a runtime value into a key, if it is a key-compatible scalar.
    pub fn from_value(value: &Value) -> Option<MapKey> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::Str(s) => Some(MapKey::Str(s.to_string())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::Str(s) => Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => write!(f, "{b}"),
            MapKey::Int(i) => write!(f, "{i}"),
            MapKey::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl Value {
    /// Builds a fresh, rule-less list from the given elements.
    pub fn list(elements: impl IntoIterator<Item = Value>) -> Value {
        Value::Graph(GraphRef::new(ValueGraph::from_elements(elements)))
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::None => ValueType::None,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::Str,
            Value::Graph(g) => match g.borrow().kind() {
                GraphKind::List => ValueType::List,
                GraphKind::Map => ValueType::Map,
                GraphKind::User(_) => ValueType::Graph,
            },
            Value::Function(_) | Value::Native(_) => ValueType::Function,
            Value::Exception(_) => ValueType::Exception,
        }
    }

    /// Returns a human-readable description of the value's type.
    pub fn type_name(&self) -> String {
        self.value_type().to_string()
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Graph(g) => g.borrow().len() > 0,
            Value::Function(_) | Value::Native(_) | Value::Exception(_) => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_graph(&self) -> Option<&GraphRef> {
        match self {
            Value::Graph(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_exception(&self) -> Option<&Exception> {
        match self {
            Value::Exception(e) => Some(e),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic and range rules.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>, depth: usize, quoted: bool) -> fmt::Result {
        match self {
            Value::None => f.write_str("none"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) if quoted => write!(f, "{:?}", s.as_ref()),
            Value::Str(s) => f.write_str(s),
            Value::Graph(g) => {
                if depth >= DISPLAY_DEPTH_LIMIT {
                    return f.write_str("...");
                }
                let graph = match g.0.try_borrow() {
                    Ok(graph) => graph,
                    Err(_) => return f.write_str("<graph in use>"),
                };
                match graph.kind() {
                    GraphKind::List => {
                        f.write_str("[")?;
                        for (i, element) in graph.elements().iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            element.fmt_nested(f, depth + 1, true)?;
                        }
                        f.write_str("]")
                    }
                    GraphKind::Map => {
                        f.write_str("{")?;
                        for (i, (key, value)) in graph.entries().iter().enumerate() {
                            if i > 0 {
                                f.write_str(", ")?;
                            }
                            write!(f, "{key}: ")?;
                            value.fmt_nested(f, depth + 1, true)?;
                        }
                        f.write_str("}")
                    }
                    GraphKind::User(name) => {
                        write!(f, "<graph {name}: {} members>", graph.len())
                    }
                }
            }
            Value::Function(func) => write!(f, "<function {}>", func.name),
            Value::Native(native) => write!(f, "<native {}>", native.name()),
            Value::Exception(e) => write!(f, "{}: {}", e.kind, e.message),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_nested(f, 0, false)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s.as_ref()),
            Value::Graph(_) => {
                f.write_str("Graph(")?;
                self.fmt_nested(f, 0, true)?;
                f.write_str(")")
            }
            Value::Function(func) => write!(f, "Function({})", func.name),
            Value::Native(native) => write!(f, "Native({})", native.name()),
            Value::Exception(e) => write!(f, "Exception({}: {})", e.kind, e.message),
            other => other.fmt_nested(f, 0, true),
        }
    }
}

/// Scalars compare by value; graphs, functions and exceptions by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Graph(a), Value::Graph(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => {
                a.unit == b.unit && a.function == b.function && a.closure == b.closure
            }
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(&a.func, &b.func),
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}
