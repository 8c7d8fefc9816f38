//! The interpreter: recursive traversal of execution graphs.
//!
//! [`Interpreter::eval`] evaluates one node and returns a [`ControlSignal`].
//! Composite nodes evaluate their children strictly left to right, in role
//! order, and re-emit any non-`Normal` child signal unchanged; only loops
//! (for `break`/`continue`), calls (for `return`) and `try` (for raised
//! exceptions) consume signals.
//!
//! Two kinds of failure exist:
//!
//! - program-level errors (unbound names, type errors, rejected mutations)
//!   become exceptions raised into the program and can be caught;
//! - fatal errors (the call depth limit, broken internal invariants) are
//!   returned as `Err(EvalError)` and unwind straight to the host.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use weft_core::edge::Role;
use weft_core::error::{BindingError, MutationError};
use weft_core::function::MAIN_NAME;
use weft_core::graph::ExecutionGraph;
use weft_core::id::{ExecNodeId, FunctionId, ScopeId, UnitId};
use weft_core::ops::{ExecOp, LogicalOp};
use weft_core::rules::{Invoke, InvokeError, RuleEngine, Ruleset, Target};
use weft_core::scope::{Mutability, ScopeGraph, ScopeKind};
use weft_core::signal::{CallSite, ControlSignal, Raised};
use weft_core::value::{Exception, FunctionValue, GraphRef, NativeFunction, Value};
use weft_core::value_graph::{GraphKind, ValueGraph};

use super::context::Context;
use super::error::EvalError;
use super::eval::{self, INDEX_ERROR, KEY_ERROR, TYPE_ERROR};
use super::natives::{self, OutputLog};
use super::trace::TraceEntry;

pub const NAME_ERROR: &str = "NameError";
pub const BINDING_ERROR: &str = "BindingError";
pub const ARITY_ERROR: &str = "ArityError";
pub const MUTATION_ERROR: &str = "MutationError";
pub const RULE_ERROR: &str = "RuleError";
/// Kind given to raised values that are not exceptions.
pub const GENERIC_ERROR: &str = "Error";

/// Grow the native stack when less than this much is left.
const RED_ZONE: usize = 100 * 1024;
/// Size of each newly allocated stack segment.
const STACK_GROWTH: usize = 1024 * 1024;

/// Configuration for the interpreter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Whether to record execution traces.
    pub trace_enabled: bool,
    /// Maximum number of active call frames, the unit body included.
    pub max_call_depth: usize,
    /// Whether to run the optimization passes on every loaded unit.
    pub optimize: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            trace_enabled: false,
            max_call_depth: 256,
            optimize: false,
        }
    }
}

/// The unit being evaluated together with its graph.
#[derive(Clone, Copy)]
struct Code<'a> {
    unit: UnitId,
    graph: &'a ExecutionGraph,
}

/// Unwraps a `Normal` signal or returns any other signal from the caller.
macro_rules! value {
    ($signal:expr) => {
        match $signal {
            ControlSignal::Normal(value) => value,
            other => return Ok(other),
        }
    };
}

/// Unwraps an `Ok` or returns the signal in `Err` from the caller.
macro_rules! attempt {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(signal) => return Ok(signal),
        }
    };
}

fn raise(kind: &str, message: impl Into<String>) -> ControlSignal {
    raise_exception(Exception::new(kind, message))
}

fn raise_exception(exception: Exception) -> ControlSignal {
    ControlSignal::raise(exception.into_value())
}

/// Everything raised is an exception; other values are wrapped.
fn into_exception(value: Value) -> Value {
    match value {
        Value::Exception(_) => value,
        other => {
            let mut exc = Exception::new(GENERIC_ERROR, other.to_string());
            exc.payload = other;
            exc.into_value()
        }
    }
}

/// Attaches the accumulated path to an intercepted exception.
fn with_path(exception: Value, path: Vec<CallSite>) -> Value {
    match exception {
        Value::Exception(exc) => {
            let mut exc = (*exc).clone();
            exc.path = path;
            exc.into_value()
        }
        other => other,
    }
}

fn binding_failed(err: BindingError) -> Result<ControlSignal, EvalError> {
    match err {
        BindingError::UnboundVariable { .. } => Ok(raise(NAME_ERROR, err.to_string())),
        BindingError::ImmutableBinding { .. } => Ok(raise(BINDING_ERROR, err.to_string())),
        other => Err(EvalError::Scope(other)),
    }
}

fn expect_graph(value: &Value) -> Result<GraphRef, ControlSignal> {
    match value {
        Value::Graph(graph) => Ok(graph.clone()),
        other => Err(raise(
            TYPE_ERROR,
            format!("expected a list, map or graph, found a {}", other.type_name()),
        )),
    }
}

/// The graph interpreter.
///
/// Owns the evaluation [`Context`]; units are loaded with
/// [`load`](Self::load) and evaluated with [`run`](Self::run).
pub struct Interpreter {
    config: InterpreterConfig,
    context: Context,
    /// Active call frames, outermost first.
    frames: Vec<CallSite>,
    next_frame: u64,
    free_variables: HashMap<(UnitId, FunctionId), Rc<[String]>>,
    trace: Option<Vec<TraceEntry>>,
    output: OutputLog,
    /// Fatal error raised inside a rule callback, waiting to be rethrown
    /// once the rule engine has unwound.
    pending_fatal: Option<EvalError>,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> Self {
        let output = OutputLog::default();
        let mut context = Context::new();
        for native in natives::prelude(output.clone()) {
            let name = native.name().to_string();
            // A fresh prelude has no bindings to conflict with.
            let _ = context.define_global(&name, Value::Native(native));
        }
        let trace = config.trace_enabled.then(Vec::new);
        Interpreter {
            config,
            context,
            frames: Vec::new(),
            next_frame: 0,
            free_variables: HashMap::new(),
            trace,
            output,
            pending_fatal: None,
        }
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn scopes(&self) -> &ScopeGraph {
        self.context.scopes()
    }

    /// Exposes a host procedure to every unit under its own name.
    pub fn register_native(&mut self, native: NativeFunction) -> Result<(), EvalError> {
        let name = native.name().to_string();
        self.context.define_global(&name, Value::Native(native))
    }

    /// Validates a unit (optimizing it if configured) and gives it a module
    /// scope. The unit is not evaluated.
    pub fn load(&mut self, mut graph: ExecutionGraph) -> Result<UnitId, EvalError> {
        graph.validate().map_err(EvalError::Construction)?;
        if self.config.optimize {
            let report = crate::optimize::optimize(&mut graph);
            tracing::debug!(unit = %graph.name(), ?report, "unit optimized");
        }
        let name = graph.name().to_string();
        let id = self.context.add_unit(graph)?;
        tracing::debug!(unit = %id, %name, "unit loaded");
        Ok(id)
    }

    /// Evaluates a loaded unit's body and returns its value.
    pub fn run(&mut self, unit: UnitId) -> Result<Value, EvalError> {
        let loaded = self.context.unit(unit)?;
        let (graph, scope) = (Rc::clone(&loaded.graph), loaded.scope);
        let body = graph
            .main()
            .and_then(|main| main.body)
            .ok_or_else(|| EvalError::internal("unit has no body"))?;
        let code = Code { unit, graph: &graph };

        let site = self.enter_frame(unit, FunctionId::MAIN, MAIN_NAME, None);
        let result = self.eval_body(code, body, scope);
        self.frames.pop();

        match result? {
            ControlSignal::Normal(value) | ControlSignal::Return(value) => Ok(value),
            ControlSignal::Raised(mut raised) => {
                raised.leave_frame(&site);
                tracing::debug!(exception = %raised.exception, "uncaught exception");
                Err(EvalError::Uncaught {
                    exception: raised.exception,
                    path: raised.path,
                })
            }
            signal => Err(EvalError::internal(format!(
                "`{}` escaped the unit body",
                signal.kind()
            ))),
        }
    }

    /// Loads and runs a unit in one step.
    pub fn execute(&mut self, graph: ExecutionGraph) -> Result<Value, EvalError> {
        let unit = self.load(graph)?;
        self.run(unit)
    }

    /// Makes `export`, defined at the top level of `from`, visible in the
    /// root scope of `into`. `from` must have run already.
    pub fn import(&mut self, into: UnitId, from: UnitId, export: &str) -> Result<(), EvalError> {
        let into_scope = self.context.unit(into)?.scope;
        let from_scope = self.context.unit(from)?.scope;
        let var = self
            .context
            .scopes
            .variables(from_scope)
            .into_iter()
            .find_map(|(name, var)| (name == export).then_some(var))
            .ok_or_else(|| EvalError::UnknownExport {
                unit: from,
                name: export.to_string(),
            })?;
        self.context.scopes.import(into_scope, var)?;
        Ok(())
    }

    /// Calls a function or native value from the host.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, EvalError> {
        match self.invoke_value(callee, args, None)? {
            ControlSignal::Normal(value) => Ok(value),
            ControlSignal::Raised(raised) => Err(EvalError::Uncaught {
                exception: raised.exception,
                path: raised.path,
            }),
            signal => Err(EvalError::internal(format!("`{}` escaped a call", signal.kind()))),
        }
    }

    /// Active call frames, innermost first.
    pub fn call_path(&self) -> Vec<CallSite> {
        self.frames.iter().rev().cloned().collect()
    }

    /// Recorded trace entries; empty unless tracing is enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        self.trace.as_deref().unwrap_or(&[])
    }

    /// Lines written by `print`, in order.
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Removes scope graph nodes no live scope, unit or ruleset can reach.
    ///
    /// Closures held only by the host (values returned from
    /// [`run`](Self::run) and not bound anywhere) are not roots; bind them
    /// or pass them back before collecting.
    pub fn collect_garbage(&mut self) -> usize {
        let roots = self.context.root_scopes();
        let closures = self.context.ruleset_closures();
        let removed = self.context.scopes.collect(&roots, &closures);
        tracing::debug!(removed, "scope graph collected");
        removed
    }

    // -----------------------------------------------------------------------
    // Frames and calls
    // -----------------------------------------------------------------------

    fn enter_frame(
        &mut self,
        unit: UnitId,
        function: FunctionId,
        name: &str,
        call_node: Option<ExecNodeId>,
    ) -> CallSite {
        let site = CallSite {
            name: name.to_string(),
            unit,
            function,
            call_node,
            frame: self.next_frame,
        };
        self.next_frame += 1;
        self.frames.push(site.clone());
        site
    }

    /// The single dispatch point for calls from `call` nodes, rules and the
    /// host.
    fn invoke_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        call_node: Option<ExecNodeId>,
    ) -> Result<ControlSignal, EvalError> {
        match callee {
            Value::Function(function) => self.call_function(function, args, call_node),
            Value::Native(native) => {
                if let Some(arity) = native.arity() {
                    if arity != args.len() {
                        return Ok(raise(
                            ARITY_ERROR,
                            format!("{} takes {arity} arguments, got {}", native.name(), args.len()),
                        ));
                    }
                }
                tracing::debug!(native = native.name(), "native call");
                Ok(match native.call(&args) {
                    Ok(value) => ControlSignal::Normal(value),
                    Err(exception) => ControlSignal::raise(into_exception(exception)),
                })
            }
            other => Ok(raise(TYPE_ERROR, format!("a {} is not callable", other.type_name()))),
        }
    }

    fn call_function(
        &mut self,
        function: &FunctionValue,
        args: Vec<Value>,
        call_node: Option<ExecNodeId>,
    ) -> Result<ControlSignal, EvalError> {
        let limit = self.config.max_call_depth;
        if self.frames.len() >= limit {
            tracing::debug!(limit, function = %function.name, "call depth limit exceeded");
            return Err(EvalError::RecursionLimitExceeded {
                limit,
                path: self.call_path(),
            });
        }
        let graph = Rc::clone(&self.context.unit(function.unit)?.graph);
        let def = graph
            .function(function.function)
            .ok_or_else(|| EvalError::internal(format!("unknown function {}", function.function)))?;
        if def.arity() != args.len() {
            return Ok(raise(
                ARITY_ERROR,
                format!("{} takes {} arguments, got {}", def.name, def.arity(), args.len()),
            ));
        }
        let body = def
            .body
            .ok_or_else(|| EvalError::internal(format!("function {} has no body", def.name)))?;

        // The call scope nests under the defining scope, not the caller's.
        let defining = self.context.scopes.closure_scope(function.closure)?;
        let call_scope = self.context.scopes.push_scope(defining, ScopeKind::Function)?;
        for (param, arg) in def.params.iter().zip(args) {
            self.context.scopes.define(call_scope, param, arg)?;
        }

        let site = self.enter_frame(function.unit, function.function, &def.name, call_node);
        tracing::debug!(function = %def.name, depth = self.frames.len(), "call");
        let result = self.eval_body(
            Code {
                unit: function.unit,
                graph: &graph,
            },
            body,
            call_scope,
        );
        self.frames.pop();
        self.context.scopes.pop_scope(call_scope)?;

        match result? {
            ControlSignal::Normal(value) | ControlSignal::Return(value) => Ok(ControlSignal::Normal(value)),
            ControlSignal::Raised(mut raised) => {
                raised.leave_frame(&site);
                Ok(ControlSignal::Raised(raised))
            }
            signal => Err(EvalError::internal(format!(
                "`{}` escaped function {}",
                signal.kind(),
                def.name
            ))),
        }
    }

    /// A body that is a block runs directly in the function (or module)
    /// scope, so its definitions are the function's locals.
    fn eval_body(&mut self, code: Code<'_>, body: ExecNodeId, scope: ScopeId) -> Result<ControlSignal, EvalError> {
        match code.graph.op(body) {
            Some(ExecOp::Block) => self.eval_block(code, body, scope, false),
            _ => self.eval(code, body, scope),
        }
    }

    fn make_closure(&mut self, code: Code<'_>, function: FunctionId, scope: ScopeId) -> Result<Value, EvalError> {
        let def = code
            .graph
            .function(function)
            .ok_or_else(|| EvalError::internal(format!("unknown function {function}")))?;
        let free = Rc::clone(
            self.free_variables
                .entry((code.unit, function))
                .or_insert_with(|| code.graph.free_variables(function).into()),
        );
        let closure = self.context.scopes.create_closure(scope, &def.name, &free)?;
        Ok(Value::Function(FunctionValue {
            unit: code.unit,
            function,
            closure,
            name: Rc::from(def.name.as_str()),
            arity: def.arity(),
        }))
    }

    // -----------------------------------------------------------------------
    // Node evaluation
    // -----------------------------------------------------------------------

    fn eval(&mut self, code: Code<'_>, node: ExecNodeId, scope: ScopeId) -> Result<ControlSignal, EvalError> {
        stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || {
            let signal = self.eval_node(code, node, scope)?;
            if let Some(trace) = self.trace.as_mut() {
                let op = code.graph.op(node).map(ToString::to_string).unwrap_or_default();
                trace.push(TraceEntry::record(code.unit, node, op, self.frames.len(), &signal));
            }
            Ok(signal)
        })
    }

    fn child(&self, code: Code<'_>, node: ExecNodeId, role: Role) -> Result<ExecNodeId, EvalError> {
        code.graph
            .child(node, role)
            .ok_or_else(|| EvalError::internal(format!("node {node} has no `{role}` child")))
    }

    /// Evaluates the child in `role`; an absent optional child is `none`.
    fn eval_role(
        &mut self,
        code: Code<'_>,
        node: ExecNodeId,
        role: Role,
        scope: ScopeId,
    ) -> Result<ControlSignal, EvalError> {
        let child = self.child(code, node, role)?;
        self.eval(code, child, scope)
    }

    /// Evaluates an indexed family of children in index order.
    fn eval_indexed(
        &mut self,
        code: Code<'_>,
        node: ExecNodeId,
        family: Role,
        scope: ScopeId,
    ) -> Result<Result<Vec<Value>, ControlSignal>, EvalError> {
        let children = code.graph.indexed(node, family);
        let mut values = Vec::with_capacity(children.len());
        for (_, child) in children {
            match self.eval(code, child, scope)? {
                ControlSignal::Normal(value) => values.push(value),
                other => return Ok(Err(other)),
            }
        }
        Ok(Ok(values))
    }

    fn eval_node(&mut self, code: Code<'_>, node: ExecNodeId, scope: ScopeId) -> Result<ControlSignal, EvalError> {
        let op = code
            .graph
            .op(node)
            .ok_or_else(|| EvalError::internal(format!("unknown node {node}")))?;
        tracing::trace!(unit = %code.unit, %node, op = op.name(), "eval");

        match op {
            ExecOp::Literal(lit) => Ok(ControlSignal::Normal(lit.to_value())),

            ExecOp::ListLiteral => {
                let elements = attempt!(self.eval_indexed(code, node, Role::Element(0), scope)?);
                Ok(ControlSignal::Normal(Value::list(elements)))
            }

            ExecOp::MapLiteral { keys } => {
                let values = attempt!(self.eval_indexed(code, node, Role::Element(0), scope)?);
                let mut entries = Vec::with_capacity(keys.len());
                for (key, value) in keys.iter().zip(values) {
                    let key = attempt!(eval::map_key(&key.to_value()).map_err(raise_exception));
                    entries.push((key, value));
                }
                let map = ValueGraph::from_entries(entries);
                Ok(ControlSignal::Normal(Value::Graph(GraphRef::new(map))))
            }

            ExecOp::Var { name } => match self.context.scopes.get(scope, name) {
                Ok(value) => Ok(ControlSignal::Normal(value)),
                Err(err) => binding_failed(err),
            },

            ExecOp::Define { name, mutable } => {
                let value = value!(self.eval_role(code, node, Role::Value, scope)?);
                let mutability = if *mutable {
                    Mutability::Mutable
                } else {
                    Mutability::Immutable
                };
                match self.context.scopes.define_with(scope, name, value, mutability) {
                    Ok(_) => Ok(ControlSignal::none()),
                    Err(err) => binding_failed(err),
                }
            }

            ExecOp::Assign { name } => {
                let value = value!(self.eval_role(code, node, Role::Value, scope)?);
                match self.context.scopes.assign(scope, name, value.clone()) {
                    Ok(_) => Ok(ControlSignal::Normal(value)),
                    Err(err) => binding_failed(err),
                }
            }

            ExecOp::Binary(op) => {
                let left = value!(self.eval_role(code, node, Role::Left, scope)?);
                let right = value!(self.eval_role(code, node, Role::Right, scope)?);
                Ok(match eval::binary(*op, &left, &right) {
                    Ok(value) => ControlSignal::Normal(value),
                    Err(exception) => raise_exception(exception),
                })
            }

            ExecOp::Unary(op) => {
                let operand = value!(self.eval_role(code, node, Role::Operand, scope)?);
                Ok(match eval::unary(*op, &operand) {
                    Ok(value) => ControlSignal::Normal(value),
                    Err(exception) => raise_exception(exception),
                })
            }

            ExecOp::Logical(op) => {
                let left = value!(self.eval_role(code, node, Role::Left, scope)?);
                let decided = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                };
                if decided {
                    return Ok(ControlSignal::Normal(Value::Bool(left.is_truthy())));
                }
                let right = value!(self.eval_role(code, node, Role::Right, scope)?);
                Ok(ControlSignal::Normal(eval::logical(*op, &left, &right)))
            }

            ExecOp::Call => {
                let callee = value!(self.eval_role(code, node, Role::Callee, scope)?);
                let args = attempt!(self.eval_indexed(code, node, Role::Argument(0), scope)?);
                self.invoke_value(&callee, args, Some(node))
            }

            ExecOp::Function { function } => self
                .make_closure(code, *function, scope)
                .map(ControlSignal::Normal),

            ExecOp::Return => {
                let value = match code.graph.child(node, Role::Value) {
                    Some(child) => value!(self.eval(code, child, scope)?),
                    None => Value::None,
                };
                Ok(ControlSignal::Return(value))
            }

            ExecOp::If => {
                let condition = value!(self.eval_role(code, node, Role::Condition, scope)?);
                if condition.is_truthy() {
                    self.eval_role(code, node, Role::Then, scope)
                } else if let Some(otherwise) = code.graph.child(node, Role::Else) {
                    self.eval(code, otherwise, scope)
                } else {
                    Ok(ControlSignal::none())
                }
            }

            ExecOp::While => {
                let body = self.child(code, node, Role::Body)?;
                loop {
                    let condition = value!(self.eval_role(code, node, Role::Condition, scope)?);
                    if !condition.is_truthy() {
                        break;
                    }
                    match self.eval(code, body, scope)? {
                        ControlSignal::Normal(_) | ControlSignal::Continue => {}
                        ControlSignal::Break => break,
                        other => return Ok(other),
                    }
                }
                Ok(ControlSignal::none())
            }

            ExecOp::For { var } => self.eval_for(code, node, var, scope),

            ExecOp::Break => Ok(ControlSignal::Break),
            ExecOp::Continue => Ok(ControlSignal::Continue),

            ExecOp::Raise => {
                let value = value!(self.eval_role(code, node, Role::Value, scope)?);
                let raised = Raised::new(into_exception(value));
                tracing::debug!(exception = %raised.exception, %node, "raise");
                Ok(ControlSignal::Raised(raised))
            }

            ExecOp::Try { catch_var } => self.eval_try(code, node, catch_var.as_deref(), scope),

            ExecOp::Block => self.eval_block(code, node, scope, true),

            ExecOp::Index => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let index = value!(self.eval_role(code, node, Role::Index, scope)?);
                Ok(match eval::index(&target, &index) {
                    Ok(value) => ControlSignal::Normal(value),
                    Err(exception) => raise_exception(exception),
                })
            }

            ExecOp::SetIndex => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let index = value!(self.eval_role(code, node, Role::Index, scope)?);
                let value = value!(self.eval_role(code, node, Role::Value, scope)?);
                let graph = attempt!(expect_graph(&target));
                let kind = graph.borrow().kind().clone();
                match kind {
                    GraphKind::List => {
                        let i = attempt!(eval::list_index(&graph.borrow(), &index).map_err(raise_exception));
                        attempt!(self.governed(|engine| engine.set(&graph, i, value))?);
                    }
                    GraphKind::Map => {
                        let key = attempt!(eval::map_key(&index).map_err(raise_exception));
                        attempt!(self.governed(|engine| engine.put(&graph, key, value))?);
                    }
                    GraphKind::User(name) => {
                        return Ok(raise(
                            TYPE_ERROR,
                            format!("members of graph {name} are replaced with add_member"),
                        ));
                    }
                }
                Ok(ControlSignal::none())
            }

            ExecOp::Append => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let value = value!(self.eval_role(code, node, Role::Value, scope)?);
                let graph = attempt!(expect_graph(&target));
                attempt!(self.governed(|engine| engine.insert(&graph, value))?);
                Ok(ControlSignal::none())
            }

            ExecOp::RemoveAt => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let index = value!(self.eval_role(code, node, Role::Index, scope)?);
                let graph = attempt!(expect_graph(&target));
                let kind = graph.borrow().kind().clone();
                let member = match kind {
                    GraphKind::List => {
                        Target::Index(attempt!(eval::list_index(&graph.borrow(), &index).map_err(raise_exception)))
                    }
                    GraphKind::Map => Target::Key(attempt!(eval::map_key(&index).map_err(raise_exception))),
                    GraphKind::User(_) => Target::Node(attempt!(eval::member_handle(&index).map_err(raise_exception))),
                };
                let removed = attempt!(self.governed(|engine| engine.remove(&graph, member))?);
                Ok(ControlSignal::Normal(removed))
            }

            ExecOp::AddRule { rule } => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let args = attempt!(self.eval_indexed(code, node, Role::Argument(0), scope)?);
                let graph = attempt!(expect_graph(&target));
                let rule = attempt!(rule.instantiate(&args).map_err(|reason| raise(RULE_ERROR, reason)));
                tracing::debug!(%rule, "add rule");
                attempt!(self.governed(|engine| engine.add_rule(&graph, rule))?);
                Ok(ControlSignal::Normal(target))
            }

            ExecOp::DefineRuleset { name, rules } => {
                let args = attempt!(self.eval_indexed(code, node, Role::Argument(0), scope)?);
                let mut ruleset = Ruleset::new(name);
                let mut rest = args.as_slice();
                for spec in rules {
                    let (mine, tail) = rest.split_at(spec.arg_count().min(rest.len()));
                    rest = tail;
                    let rule = attempt!(spec.instantiate(mine).map_err(|reason| raise(RULE_ERROR, reason)));
                    ruleset.rules.push(rule);
                }
                tracing::debug!(ruleset = %name, rules = ruleset.rules.len(), "ruleset defined");
                self.context.rulesets.define(ruleset);
                Ok(ControlSignal::none())
            }

            ExecOp::ApplyRuleset { name } => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let graph = attempt!(expect_graph(&target));
                let Some(ruleset) = self.context.rulesets.get(name).cloned() else {
                    return Ok(raise(NAME_ERROR, format!("no ruleset named '{name}'")));
                };
                attempt!(self.governed(|engine| engine.apply_ruleset(&graph, &ruleset))?);
                Ok(ControlSignal::Normal(target))
            }

            ExecOp::Freeze => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let graph = attempt!(expect_graph(&target));
                attempt!(self.governed(|engine| engine.freeze(&graph))?);
                Ok(ControlSignal::Normal(target))
            }

            ExecOp::NewGraph { kind } => Ok(ControlSignal::Normal(Value::Graph(GraphRef::new(
                ValueGraph::user(kind),
            )))),

            ExecOp::AddMember { link } => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let value = value!(self.eval_role(code, node, Role::Value, scope)?);
                let parent = match code.graph.child(node, Role::Left) {
                    Some(child) => Some(value!(self.eval(code, child, scope)?)),
                    None => None,
                };
                let graph = attempt!(expect_graph(&target));
                let parent = match (parent, link) {
                    (Some(handle), Some(name)) => {
                        let handle = attempt!(eval::member_handle(&handle).map_err(raise_exception));
                        Some((handle, name.as_str()))
                    }
                    _ => None,
                };
                let member = attempt!(self.governed(|engine| engine.add_member(&graph, value, parent))?);
                Ok(ControlSignal::Normal(Value::Int(i64::from(member.0))))
            }

            ExecOp::Link { name } => {
                let target = value!(self.eval_role(code, node, Role::Target, scope)?);
                let from = value!(self.eval_role(code, node, Role::Left, scope)?);
                let to = value!(self.eval_role(code, node, Role::Right, scope)?);
                let data = match code.graph.child(node, Role::Value) {
                    Some(child) => Some(value!(self.eval(code, child, scope)?)),
                    None => None,
                };
                let graph = attempt!(expect_graph(&target));
                let from = attempt!(eval::member_handle(&from).map_err(raise_exception));
                let to = attempt!(eval::member_handle(&to).map_err(raise_exception));
                attempt!(self.governed(|engine| engine.link(&graph, from, to, name, data))?);
                Ok(ControlSignal::none())
            }
        }
    }

    fn eval_block(
        &mut self,
        code: Code<'_>,
        node: ExecNodeId,
        scope: ScopeId,
        fresh_scope: bool,
    ) -> Result<ControlSignal, EvalError> {
        let inner = if fresh_scope {
            self.context.scopes.push_scope(scope, ScopeKind::Block)?
        } else {
            scope
        };
        let mut result = Ok(ControlSignal::none());
        for (_, statement) in code.graph.indexed(node, Role::Statement(0)) {
            match self.eval(code, statement, inner) {
                Ok(ControlSignal::Normal(_)) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }
        if fresh_scope {
            self.context.scopes.pop_scope(inner)?;
        }
        result
    }

    fn eval_for(&mut self, code: Code<'_>, node: ExecNodeId, var: &str, scope: ScopeId) -> Result<ControlSignal, EvalError> {
        let iterable = value!(self.eval_role(code, node, Role::Target, scope)?);
        let body = self.child(code, node, Role::Body)?;
        // Collections are iterated as a snapshot taken before the first
        // iteration.
        let items: Box<dyn Iterator<Item = Value>> = match &iterable {
            Value::Int(n) => Box::new((0..*n).map(Value::Int)),
            Value::Str(s) => Box::new(s.chars().map(|c| Value::from(c.to_string())).collect::<Vec<_>>().into_iter()),
            Value::Graph(graph) => {
                let graph = graph.borrow();
                let items: Vec<Value> = match graph.kind() {
                    GraphKind::List => graph.elements(),
                    GraphKind::Map => graph.keys().iter().map(|k| k.to_value()).collect(),
                    GraphKind::User(_) => graph
                        .members()
                        .into_iter()
                        .map(|member| Value::Int(i64::from(member.0)))
                        .collect(),
                };
                Box::new(items.into_iter())
            }
            other => {
                return Ok(raise(TYPE_ERROR, format!("a {} is not iterable", other.type_name())));
            }
        };

        for item in items {
            let iteration = self.context.scopes.push_scope(scope, ScopeKind::Loop)?;
            self.context.scopes.define(iteration, var, item)?;
            let signal = self.eval(code, body, iteration);
            self.context.scopes.pop_scope(iteration)?;
            match signal? {
                ControlSignal::Normal(_) | ControlSignal::Continue => {}
                ControlSignal::Break => break,
                other => return Ok(other),
            }
        }
        Ok(ControlSignal::none())
    }

    fn eval_try(
        &mut self,
        code: Code<'_>,
        node: ExecNodeId,
        catch_var: Option<&str>,
        scope: ScopeId,
    ) -> Result<ControlSignal, EvalError> {
        let body = self.child(code, node, Role::Body)?;
        let handler = code.graph.child(node, Role::Handler);
        let finally = code.graph.child(node, Role::Finally);

        let mut signal = match (self.eval(code, body, scope)?, handler) {
            (ControlSignal::Raised(mut raised), Some(handler)) => {
                // The intercepting frame is part of the recorded path.
                if let Some(site) = self.frames.last() {
                    raised.leave_frame(site);
                }
                let exception = with_path(raised.exception, raised.path);
                tracing::debug!(%exception, %node, "exception caught");
                let catch_scope = self.context.scopes.push_scope(scope, ScopeKind::Catch)?;
                if let Some(var) = catch_var {
                    self.context.scopes.define(catch_scope, var, exception)?;
                }
                let handled = self.eval(code, handler, catch_scope);
                self.context.scopes.pop_scope(catch_scope)?;
                handled?
            }
            (signal, _) => signal,
        };

        if let Some(finally) = finally {
            let after = self.eval(code, finally, scope)?;
            if !after.is_normal() {
                signal = after;
            }
        }
        Ok(signal)
    }

    // -----------------------------------------------------------------------
    // Governed mutations
    // -----------------------------------------------------------------------

    /// Runs a mutation through the rule engine, turning its failure into
    /// the signal the program sees.
    fn governed<T>(
        &mut self,
        mutate: impl FnOnce(&mut RuleEngine<'_>) -> Result<T, MutationError>,
    ) -> Result<Result<T, ControlSignal>, EvalError> {
        let result = {
            let mut engine = RuleEngine::new(&mut *self);
            mutate(&mut engine)
        };
        match result {
            Ok(value) => Ok(Ok(value)),
            Err(err) => self.mutation_failed(err).map(Err),
        }
    }

    fn mutation_failed(&mut self, err: MutationError) -> Result<ControlSignal, EvalError> {
        tracing::debug!(error = %err, "mutation rejected");
        let kind = match &err {
            MutationError::TransformRaised { .. } | MutationError::Aborted { .. } => "",
            MutationError::IndexOutOfRange { .. } => INDEX_ERROR,
            MutationError::KeyNotFound { .. } => KEY_ERROR,
            MutationError::WrongKind { .. } => TYPE_ERROR,
            _ => MUTATION_ERROR,
        };
        match err {
            // Surfaces at the mutation site with the callback's path.
            MutationError::TransformRaised { raised, .. } => Ok(ControlSignal::Raised(raised)),
            MutationError::Aborted { message } => Err(self
                .pending_fatal
                .take()
                .unwrap_or(EvalError::Internal { message })),
            other => Ok(raise(kind, other.to_string())),
        }
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new(InterpreterConfig::default())
    }
}

/// Rule callbacks run through the same dispatch as `call` nodes.
impl Invoke for Interpreter {
    fn invoke(&mut self, callee: &Value, args: &[Value]) -> Result<Value, InvokeError> {
        match self.invoke_value(callee, args.to_vec(), None) {
            Ok(ControlSignal::Normal(value)) => Ok(value),
            Ok(ControlSignal::Raised(raised)) => Err(InvokeError::Raised(raised)),
            Ok(signal) => Err(InvokeError::Fatal(format!("`{}` escaped a rule callback", signal.kind()))),
            Err(fatal) => {
                let message = fatal.to_string();
                self.pending_fatal = Some(fatal);
                Err(InvokeError::Fatal(message))
            }
        }
    }
}
