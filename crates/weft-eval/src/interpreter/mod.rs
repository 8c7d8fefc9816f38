//! Graph interpreter for execution graphs.
//!
//! Evaluates a validated [`ExecutionGraph`](weft_core::graph::ExecutionGraph)
//! by recursive traversal, consulting the scope graph for every variable
//! operation and the rule engine for every mutation of a graph value.
//!
//! # Architecture
//!
//! - [`Interpreter`] owns a [`Context`] and drives evaluation; every node
//!   produces a [`ControlSignal`](weft_core::signal::ControlSignal).
//! - [`Context`] holds the shared scope graph, the prelude, loaded units
//!   and the ruleset registry.
//! - [`EvalError`] covers what ends an evaluation: malformed graphs,
//!   uncaught exceptions and the call depth limit.
//! - [`TraceEntry`] records each node evaluation when tracing is enabled.
//!
//! # Usage
//!
//! ```
//! use weft_core::build::Builder;
//! use weft_core::graph::ExecutionGraph;
//! use weft_core::ops::BinaryOp;
//! use weft_eval::interpreter::{Interpreter, InterpreterConfig};
//!
//! let mut unit = ExecutionGraph::new("demo");
//! let mut b = Builder::main(&mut unit);
//! let two = b.lit(2);
//! let three = b.lit(3);
//! let sum = b.binary(BinaryOp::Add, two, three);
//! b.finish(sum).unwrap();
//!
//! let mut interp = Interpreter::new(InterpreterConfig::default());
//! let value = interp.execute(unit).unwrap();
//! assert_eq!(value.to_string(), "5");
//! ```

pub mod context;
pub mod error;
pub mod eval;
pub mod natives;
pub mod state;
pub mod trace;

pub use context::{Context, LoadedUnit};
pub use error::EvalError;
pub use state::{Interpreter, InterpreterConfig};
pub use trace::TraceEntry;

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::build::Builder;
    use weft_core::graph::ExecutionGraph;
    use weft_core::ops::{BinaryOp, UnaryOp};
    use weft_core::rules::RuleSpec;
    use weft_core::types::Literal;
    use weft_core::value::{NativeFunction, Value};

    fn run(unit: ExecutionGraph) -> Result<Value, EvalError> {
        Interpreter::default().execute(unit)
    }

    fn run_with(config: InterpreterConfig, unit: ExecutionGraph) -> (Interpreter, Result<Value, EvalError>) {
        let mut interp = Interpreter::new(config);
        let result = interp.execute(unit);
        (interp, result)
    }

    /// `define factorial = function(n) { if n <= 1 return 1; return n * factorial(n - 1) }`
    fn def_factorial(b: &mut Builder<'_>) -> weft_core::ExecNodeId {
        b.def("factorial", &["n"], |f| {
            let n = f.var("n");
            let one = f.lit(1);
            let small = f.binary(BinaryOp::Le, n, one);
            let one = f.lit(1);
            let base = f.return_(Some(one));
            let guard = f.if_(small, base, None);
            let n = f.var("n");
            let n2 = f.var("n");
            let one = f.lit(1);
            let pred = f.binary(BinaryOp::Sub, n2, one);
            let rec = f.call_named("factorial", &[pred]);
            let product = f.binary(BinaryOp::Mul, n, rec);
            let ret = f.return_(Some(product));
            f.block(&[guard, ret])
        })
    }

    // -----------------------------------------------------------------------
    // 1. Functions and recursion
    // -----------------------------------------------------------------------

    #[test]
    fn factorial_of_five() {
        let mut unit = ExecutionGraph::new("fact");
        let mut b = Builder::main(&mut unit);
        let def = def_factorial(&mut b);
        let five = b.lit(5);
        let call = b.call_named("factorial", &[five]);
        let result = b.define("result", call);
        let read = b.var("result");
        let ret = b.return_(Some(read));
        let body = b.block(&[def, result, ret]);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap(), Value::Int(120));
    }

    #[test]
    fn recursion_does_not_mutate_the_graph() {
        let mut unit = ExecutionGraph::new("fact");
        let mut b = Builder::main(&mut unit);
        let def = def_factorial(&mut b);
        let ten = b.lit(10);
        let call = b.call_named("factorial", &[ten]);
        let ret = b.return_(Some(call));
        let body = b.block(&[def, ret]);
        b.finish(body).unwrap();
        let (nodes, edges) = (unit.node_count(), unit.edge_count());

        let mut interp = Interpreter::default();
        let id = interp.load(unit).unwrap();
        assert_eq!(interp.run(id).unwrap(), Value::Int(3_628_800));
        let graph = &interp.context().unit(id).unwrap().graph;
        assert_eq!((graph.node_count(), graph.edge_count()), (nodes, edges));
    }

    #[test]
    fn closures_share_captured_variables() {
        // count = 0; inc = fn() count = count + 1; dec = fn() count = count - 1
        // inc(); inc(); dec(); count
        let mut unit = ExecutionGraph::new("counter");
        let mut b = Builder::main(&mut unit);
        let zero = b.lit(0);
        let count = b.define("count", zero);
        let inc = b.def("inc", &[], |f| {
            let c = f.var("count");
            let one = f.lit(1);
            let sum = f.binary(BinaryOp::Add, c, one);
            f.assign("count", sum)
        });
        let dec = b.def("dec", &[], |f| {
            let c = f.var("count");
            let one = f.lit(1);
            let diff = f.binary(BinaryOp::Sub, c, one);
            f.assign("count", diff)
        });
        let c1 = b.call_named("inc", &[]);
        let c2 = b.call_named("inc", &[]);
        let c3 = b.call_named("dec", &[]);
        let read = b.var("count");
        let ret = b.return_(Some(read));
        let body = b.block(&[count, inc, dec, c1, c2, c3, ret]);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap(), Value::Int(1));
    }

    #[test]
    fn call_scope_nests_under_defining_scope() {
        // x = "outer"; f = fn() x; g = fn() { x = "local"; f() }
        // f still sees the module-level x.
        let mut unit = ExecutionGraph::new("lexical");
        let mut b = Builder::main(&mut unit);
        let outer = b.lit("outer");
        let x = b.define("x", outer);
        let f = b.def("f", &[], |f| f.var("x"));
        let g = b.def("g", &[], |g| {
            let local = g.lit("local");
            let shadow = g.define("x", local);
            let call = g.call_named("f", &[]);
            let ret = g.return_(Some(call));
            g.block(&[shadow, ret])
        });
        let call = b.call_named("g", &[]);
        let ret = b.return_(Some(call));
        let body = b.block(&[x, f, g, ret]);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap(), Value::from("outer"));
    }

    #[test]
    fn arity_mismatch_is_catchable() {
        let mut unit = ExecutionGraph::new("arity");
        let mut b = Builder::main(&mut unit);
        let f = b.def("f", &["a"], |f| f.var("a"));
        let call = b.call_named("f", &[]);
        let kind = b.var("e");
        let try_ = b.try_(call, Some("e"), Some(kind), None);
        let ret = b.return_(Some(try_));
        let body = b.block(&[f, ret]);
        b.finish(body).unwrap();

        let value = run(unit).unwrap();
        assert_eq!(value.as_exception().unwrap().kind, "ArityError");
    }

    #[test]
    fn recursion_limit_is_fatal_and_uncatchable() {
        // loop = fn() loop(); try loop() catch e -> 0
        let mut unit = ExecutionGraph::new("deep");
        let mut b = Builder::main(&mut unit);
        let f = b.def("spin", &[], |f| f.call_named("spin", &[]));
        let call = b.call_named("spin", &[]);
        let zero = b.lit(0);
        let try_ = b.try_(call, Some("e"), Some(zero), None);
        let body = b.block(&[f, try_]);
        b.finish(body).unwrap();

        let config = InterpreterConfig {
            max_call_depth: 32,
            ..InterpreterConfig::default()
        };
        let (_, result) = run_with(config, unit);
        match result {
            Err(EvalError::RecursionLimitExceeded { limit, path }) => {
                assert_eq!(limit, 32);
                assert_eq!(path.len(), 32);
                assert_eq!(path[0].name, "spin");
                assert_eq!(path.last().unwrap().name, "<main>");
            }
            other => panic!("expected recursion limit, got {other:?}"),
        }
    }

    // -----------------------------------------------------------------------
    // 2. Exceptions
    // -----------------------------------------------------------------------

    /// a() calls b() calls c() calls d(), which raises. `trail` records
    /// which statements ran after each call.
    fn nested_raise_unit() -> ExecutionGraph {
        let mut unit = ExecutionGraph::new("raise");
        let mut b = Builder::main(&mut unit);
        let log = b.list(&[]);
        let trail = b.define("trail", log);
        let d = b.def("d", &[], |f| {
            let msg = f.lit("boom");
            f.raise(msg)
        });
        let mut defs = vec![trail, d];
        for (name, callee) in [("c", "d"), ("b", "c"), ("a", "b")] {
            let def = b.def(name, &[], |f| {
                let call = f.call_named(callee, &[]);
                let t = f.var("trail");
                let marker = f.lit(name);
                let after = f.append(t, marker);
                f.block(&[call, after])
            });
            defs.push(def);
        }
        let call = b.call_named("a", &[]);
        defs.push(call);
        let body = b.block(&defs);
        b.finish(body).unwrap();
        unit
    }

    #[test]
    fn uncaught_raise_reports_path_innermost_first() {
        let mut interp = Interpreter::default();
        let result = interp.execute(nested_raise_unit());
        let Err(EvalError::Uncaught { exception, path }) = result else {
            panic!("expected an uncaught exception, got {result:?}");
        };
        assert_eq!(exception.to_string(), "Error: boom");
        let names: Vec<&str> = path.iter().map(|site| site.name.as_str()).collect();
        assert_eq!(names, vec!["d", "c", "b", "a", "<main>"]);

        // No statement after a raising call ran.
        let unit = interp.context().unit(weft_core::UnitId(0)).unwrap().scope;
        let trail = interp.scopes().get(unit, "trail").unwrap();
        assert_eq!(trail.to_string(), "[]");
    }

    #[test]
    fn try_binds_exception_with_its_path() {
        let mut unit = ExecutionGraph::new("catch");
        let mut b = Builder::main(&mut unit);
        let thrower = b.def("thrower", &[], |f| {
            let kind = f.lit("ValueError");
            let msg = f.lit("nope");
            let exc = f.call_named("exception", &[kind, msg]);
            f.raise(exc)
        });
        let call = b.call_named("thrower", &[]);
        let e = b.var("e");
        let caught = b.try_(call, Some("e"), Some(e), None);
        let ret = b.return_(Some(caught));
        let body = b.block(&[thrower, ret]);
        b.finish(body).unwrap();

        let value = run(unit).unwrap();
        let exc = value.as_exception().unwrap();
        assert_eq!(exc.kind, "ValueError");
        assert_eq!(exc.path_names(), vec!["thrower", "<main>"]);
    }

    #[test]
    fn exception_caught_in_outer_call_carries_the_inner_frames() {
        // d raises; c and b pass it through; a catches and returns it.
        let mut unit = ExecutionGraph::new("catch_in_a");
        let mut b = Builder::main(&mut unit);
        let d = b.def("d", &[], |f| {
            let msg = f.lit("boom");
            f.raise(msg)
        });
        let mut defs = vec![d];
        for (name, callee) in [("c", "d"), ("b", "c")] {
            let def = b.def(name, &[], |f| f.call_named(callee, &[]));
            defs.push(def);
        }
        let a = b.def("a", &[], |f| {
            let call = f.call_named("b", &[]);
            let e = f.var("e");
            let caught = f.try_(call, Some("e"), Some(e), None);
            f.return_(Some(caught))
        });
        defs.push(a);
        let call = b.call_named("a", &[]);
        let ret = b.return_(Some(call));
        defs.push(ret);
        let body = b.block(&defs);
        b.finish(body).unwrap();

        let value = run(unit).unwrap();
        assert_eq!(value.to_string(), "Error: boom");
        let exc = value.as_exception().unwrap();
        assert_eq!(exc.path_names(), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn finally_always_runs_and_can_override() {
        let mut unit = ExecutionGraph::new("finally");
        let mut b = Builder::main(&mut unit);
        let zero = b.lit(0);
        let n = b.define("n", zero);
        let msg = b.lit("x");
        let raise = b.raise(msg);
        let one = b.lit(1);
        let bump = b.assign("n", one);
        let handler = b.lit("handled");
        let inner = b.try_(raise, None, Some(handler), Some(bump));
        let read = b.var("n");
        let ret = b.return_(Some(read));
        let body = b.block(&[n, inner, ret]);
        b.finish(body).unwrap();
        assert_eq!(run(unit).unwrap(), Value::Int(1));

        // A `return` in finally replaces the body's value.
        let mut unit = ExecutionGraph::new("override");
        let mut b = Builder::main(&mut unit);
        let f = b.def("f", &[], |f| {
            let one = f.lit(1);
            let body = f.return_(Some(one));
            let two = f.lit(2);
            let fin = f.return_(Some(two));
            f.try_(body, None, None, Some(fin))
        });
        let call = b.call_named("f", &[]);
        let ret = b.return_(Some(call));
        let body = b.block(&[f, ret]);
        b.finish(body).unwrap();
        assert_eq!(run(unit).unwrap(), Value::Int(2));
    }

    #[test]
    fn binding_errors_are_raised_into_the_program() {
        let mut unit = ExecutionGraph::new("unbound");
        let mut b = Builder::main(&mut unit);
        let missing = b.var("missing");
        let e = b.var("e");
        let caught = b.try_(missing, Some("e"), Some(e), None);
        b.finish(caught).unwrap();
        let value = run(unit).unwrap();
        assert_eq!(value.as_exception().unwrap().kind, "NameError");

        let mut unit = ExecutionGraph::new("immutable");
        let mut b = Builder::main(&mut unit);
        let one = b.lit(1);
        let k = b.define_const("k", one);
        let two = b.lit(2);
        let assign = b.assign("k", two);
        let body = b.block(&[k, assign]);
        b.finish(body).unwrap();
        let Err(EvalError::Uncaught { exception, .. }) = run(unit) else {
            panic!("expected BindingError");
        };
        assert_eq!(exception.as_exception().unwrap().kind, "BindingError");
    }

    // -----------------------------------------------------------------------
    // 3. Loops
    // -----------------------------------------------------------------------

    #[test]
    fn while_with_break_and_continue() {
        // i = 0; total = 0
        // while true { i = i + 1; if i == 3 continue; if i > 5 break; total = total + i }
        let mut unit = ExecutionGraph::new("loop");
        let mut b = Builder::main(&mut unit);
        let zero = b.lit(0);
        let i = b.define("i", zero);
        let zero = b.lit(0);
        let total = b.define("total", zero);

        let iv = b.var("i");
        let one = b.lit(1);
        let next = b.binary(BinaryOp::Add, iv, one);
        let step = b.assign("i", next);
        let iv = b.var("i");
        let three = b.lit(3);
        let is_three = b.binary(BinaryOp::Eq, iv, three);
        let cont = b.continue_();
        let skip = b.if_(is_three, cont, None);
        let iv = b.var("i");
        let five = b.lit(5);
        let past = b.binary(BinaryOp::Gt, iv, five);
        let brk = b.break_();
        let stop = b.if_(past, brk, None);
        let t = b.var("total");
        let iv = b.var("i");
        let sum = b.binary(BinaryOp::Add, t, iv);
        let acc = b.assign("total", sum);
        let loop_body = b.block(&[step, skip, stop, acc]);
        let forever = b.lit(true);
        let w = b.while_(forever, loop_body);

        let t = b.var("total");
        let ret = b.return_(Some(t));
        let body = b.block(&[i, total, w, ret]);
        b.finish(body).unwrap();

        // 1 + 2 + 4 + 5
        assert_eq!(run(unit).unwrap(), Value::Int(12));
    }

    #[test]
    fn for_iterates_lists_maps_and_counts() {
        let mut unit = ExecutionGraph::new("for");
        let mut b = Builder::main(&mut unit);
        let out = b.list(&[]);
        let seen = b.define("seen", out);

        let (x, y) = (b.lit(10), b.lit(20));
        let list = b.list(&[x, y]);
        let s = b.var("seen");
        let v = b.var("v");
        let push = b.append(s, v);
        let over_list = b.for_each("v", list, push);

        let one = b.lit(1);
        let map = b.map(&[(Literal::from("k"), one)]);
        let s = b.var("seen");
        let k = b.var("k");
        let push = b.append(s, k);
        let over_map = b.for_each("k", map, push);

        let two = b.lit(2);
        let s = b.var("seen");
        let i = b.var("i");
        let push = b.append(s, i);
        let over_count = b.for_each("i", two, push);

        let s = b.var("seen");
        let ret = b.return_(Some(s));
        let body = b.block(&[seen, over_list, over_map, over_count, ret]);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap().to_string(), r#"[10, 20, "k", 0, 1]"#);
    }

    #[test]
    fn logical_operators_short_circuit() {
        // false and missing() must not evaluate the right side.
        let mut unit = ExecutionGraph::new("logic");
        let mut b = Builder::main(&mut unit);
        let f = b.lit(false);
        let boom = b.call_named("missing", &[]);
        let and = b.and(f, boom);
        let t = b.lit(true);
        let boom = b.call_named("missing", &[]);
        let or = b.or(t, boom);
        let not_and = b.unary(UnaryOp::Not, and);
        let both = b.binary(BinaryOp::Eq, not_and, or);
        b.finish(both).unwrap();
        assert_eq!(run(unit).unwrap(), Value::Bool(true));
    }

    // -----------------------------------------------------------------------
    // 4. Governed mutations
    // -----------------------------------------------------------------------

    #[test]
    fn validate_range_clamps_appends() {
        let mut unit = ExecutionGraph::new("range");
        let mut b = Builder::main(&mut unit);
        let empty = b.list(&[]);
        let xs = b.define("xs", empty);
        let target = b.var("xs");
        let rule = b.add_rule(
            target,
            RuleSpec::ValidateRange {
                min: Literal::Int(0),
                max: Literal::Int(100),
            },
            &[],
        );
        let mut stmts = vec![xs, rule];
        for n in [-5, 150, 50] {
            let t = b.var("xs");
            let v = b.lit(n);
            stmts.push(b.append(t, v));
        }
        let t = b.var("xs");
        stmts.push(b.return_(Some(t)));
        let body = b.block(&stmts);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap().to_string(), "[0, 100, 50]");
    }

    #[test]
    fn retroactive_rule_rewrites_existing_elements() {
        let mut unit = ExecutionGraph::new("retro");
        let mut b = Builder::main(&mut unit);
        let (n1, five, n2) = (b.none(), b.lit(5), b.none());
        let list = b.list(&[n1, five, n2]);
        let xs = b.define("xs", list);
        let t = b.var("xs");
        let first = b.add_rule(t, RuleSpec::NoneToZero, &[]);
        let t = b.var("xs");
        let again = b.add_rule(t, RuleSpec::NoneToZero, &[]);
        let t = b.var("xs");
        let ret = b.return_(Some(t));
        let body = b.block(&[xs, first, again, ret]);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap().to_string(), "[0, 5, 0]");
    }

    #[test]
    fn rejected_insert_is_catchable_and_leaves_graph_unchanged() {
        let mut unit = ExecutionGraph::new("max");
        let mut b = Builder::main(&mut unit);
        let (one, two) = (b.lit(1), b.lit(2));
        let list = b.list(&[one, two]);
        let xs = b.define("xs", list);
        let t = b.var("xs");
        let rule = b.add_rule(t, RuleSpec::MaxSize(2), &[]);
        let t = b.var("xs");
        let three = b.lit(3);
        let push = b.append(t, three);
        let e = b.var("e");
        let caught = b.try_(push, Some("e"), Some(e), None);
        let caught = b.define("err", caught);
        let t = b.var("xs");
        let ret = b.return_(Some(t));
        let body = b.block(&[xs, rule, caught, ret]);
        b.finish(body).unwrap();

        let mut interp = Interpreter::default();
        let list = interp.execute(unit).unwrap();
        assert_eq!(list.to_string(), "[1, 2]");
        let scope = interp.context().unit(weft_core::UnitId(0)).unwrap().scope;
        let err = interp.scopes().get(scope, "err").unwrap();
        assert_eq!(err.as_exception().unwrap().kind, "MutationError");
    }

    #[test]
    fn raising_custom_rule_aborts_only_that_insert() {
        // reject_big = fn(v) { if v > 10 raise "too big"; return v }
        let mut unit = ExecutionGraph::new("custom");
        let mut b = Builder::main(&mut unit);
        let check = b.def("reject_big", &["v"], |f| {
            let v = f.var("v");
            let ten = f.lit(10);
            let big = f.binary(BinaryOp::Gt, v, ten);
            let msg = f.lit("too big");
            let raise = f.raise(msg);
            let guard = f.if_(big, raise, None);
            let v = f.var("v");
            let ret = f.return_(Some(v));
            f.block(&[guard, ret])
        });
        let empty = b.list(&[]);
        let xs = b.define("xs", empty);
        let t = b.var("xs");
        let callee = b.var("reject_big");
        let rule = b.add_rule(t, RuleSpec::Custom { name: "reject_big".into() }, &[callee]);
        let mut stmts = vec![check, xs, rule];
        for n in [1, 50, 2] {
            let t = b.var("xs");
            let v = b.lit(n);
            let push = b.append(t, v);
            let zero = b.lit(0);
            stmts.push(b.try_(push, None, Some(zero), None));
        }
        let t = b.var("xs");
        stmts.push(b.return_(Some(t)));
        let body = b.block(&stmts);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap().to_string(), "[1, 2]");
    }

    #[test]
    fn frozen_graphs_reject_mutation() {
        let mut unit = ExecutionGraph::new("frozen");
        let mut b = Builder::main(&mut unit);
        let one = b.lit(1);
        let list = b.list(&[one]);
        let xs = b.define("xs", list);
        let t = b.var("xs");
        let freeze = b.freeze(t);
        let t = b.var("xs");
        let two = b.lit(2);
        let push = b.append(t, two);
        let e = b.var("e");
        let caught = b.try_(push, Some("e"), Some(e), None);
        let err = b.define("err", caught);
        let t = b.var("xs");
        let ret = b.return_(Some(t));
        let body = b.block(&[xs, freeze, err, ret]);
        b.finish(body).unwrap();

        let mut interp = Interpreter::default();
        assert_eq!(interp.execute(unit).unwrap().to_string(), "[1]");
        let scope = interp.context().unit(weft_core::UnitId(0)).unwrap().scope;
        let err = interp.scopes().get(scope, "err").unwrap();
        assert_eq!(err.as_exception().unwrap().message, "graph is frozen");
    }

    #[test]
    fn rulesets_apply_in_order() {
        let mut unit = ExecutionGraph::new("rulesets");
        let mut b = Builder::main(&mut unit);
        let define = b.define_ruleset(
            "clean",
            vec![RuleSpec::Trim, RuleSpec::Lowercase],
            &[],
        );
        let empty = b.list(&[]);
        let xs = b.define("xs", empty);
        let t = b.var("xs");
        let apply = b.apply_ruleset("clean", t);
        let t = b.var("xs");
        let v = b.lit("  HeLLo ");
        let push = b.append(t, v);
        let t = b.var("xs");
        let zero = b.lit(0);
        let first = b.index(t, zero);
        let ret = b.return_(Some(first));
        let body = b.block(&[define, xs, apply, push, ret]);
        b.finish(body).unwrap();

        assert_eq!(run(unit).unwrap(), Value::from("hello"));
    }

    #[test]
    fn user_graphs_add_members_and_links() {
        let mut unit = ExecutionGraph::new("graph");
        let mut b = Builder::main(&mut unit);
        let g = b.new_graph("tree");
        let g = b.define("g", g);
        let t = b.var("g");
        let rule = b.add_rule(t, RuleSpec::Acyclic, &[]);
        let t = b.var("g");
        let root = b.lit("root");
        let root = b.add_member(t, root, None);
        let root = b.define("root", root);
        let t = b.var("g");
        let leaf = b.lit("leaf");
        let parent = b.var("root");
        let leaf = b.add_member(t, leaf, Some((parent, "child")));
        let leaf = b.define("leaf", leaf);
        // leaf -> root would close a cycle.
        let t = b.var("g");
        let from = b.var("leaf");
        let to = b.var("root");
        let back = b.link(t, from, to, "up", None);
        let zero = b.lit(0);
        let rejected = b.try_(back, None, Some(zero), None);
        let t = b.var("g");
        let leaf_handle = b.var("leaf");
        let read = b.index(t, leaf_handle);
        let ret = b.return_(Some(read));
        let body = b.block(&[g, rule, root, leaf, rejected, ret]);
        b.finish(body).unwrap();

        let mut interp = Interpreter::default();
        assert_eq!(interp.execute(unit).unwrap(), Value::from("leaf"));
        let scope = interp.context().unit(weft_core::UnitId(0)).unwrap().scope;
        let Value::Graph(g) = interp.scopes().get(scope, "g").unwrap() else {
            panic!("expected a graph");
        };
        assert_eq!(g.borrow().len(), 2);
        assert_eq!(g.borrow().links().len(), 1);
    }

    // -----------------------------------------------------------------------
    // 5. Host interface
    // -----------------------------------------------------------------------

    #[test]
    fn natives_and_output_log() {
        let mut unit = ExecutionGraph::new("print");
        let mut b = Builder::main(&mut unit);
        let hello = b.lit("hello");
        let two = b.lit(2);
        let print = b.call_named("print", &[hello, two]);
        let x = b.lit(21);
        let doubled = b.call_named("double", &[x]);
        let ret = b.return_(Some(doubled));
        let body = b.block(&[print, ret]);
        b.finish(body).unwrap();

        let mut interp = Interpreter::default();
        interp
            .register_native(NativeFunction::new("double", Some(1), |args| match args[0] {
                Value::Int(i) => Ok(Value::Int(i * 2)),
                _ => Err(Value::from("not an int")),
            }))
            .unwrap();
        assert_eq!(interp.execute(unit).unwrap(), Value::Int(42));
        assert_eq!(interp.output(), vec!["hello 2".to_string()]);
    }

    #[test]
    fn imports_expose_another_units_bindings() {
        let mut lib = ExecutionGraph::new("lib");
        let mut b = Builder::main(&mut lib);
        let seven = b.lit(7);
        let answer = b.define("answer", seven);
        let body = b.block(&[answer]);
        b.finish(body).unwrap();

        let mut app = ExecutionGraph::new("app");
        let mut b = Builder::main(&mut app);
        let read = b.var("answer");
        b.finish(read).unwrap();

        let mut interp = Interpreter::default();
        let lib = interp.load(lib).unwrap();
        let app = interp.load(app).unwrap();
        interp.run(lib).unwrap();
        interp.import(app, lib, "answer").unwrap();
        assert_eq!(interp.run(app).unwrap(), Value::Int(7));
        assert!(matches!(
            interp.import(app, lib, "nothing"),
            Err(EvalError::UnknownExport { .. })
        ));
    }

    #[test]
    fn call_value_reaches_closures_from_the_host() {
        let mut unit = ExecutionGraph::new("host");
        let mut b = Builder::main(&mut unit);
        let f = b.function("square", &["x"], |f| {
            let (x1, x2) = (f.var("x"), f.var("x"));
            f.binary(BinaryOp::Mul, x1, x2)
        });
        b.finish(f).unwrap();

        let mut interp = Interpreter::default();
        let square = interp.execute(unit).unwrap();
        assert_eq!(interp.call_value(&square, vec![Value::Int(9)]).unwrap(), Value::Int(81));
        assert!(interp.call_path().is_empty());
    }

    #[test]
    fn construction_errors_stop_loading() {
        let mut unit = ExecutionGraph::new("broken");
        let mut b = Builder::main(&mut unit);
        let brk = b.break_();
        let body = b.block(&[brk]);
        b.finish(body).unwrap();
        assert!(matches!(run(unit), Err(EvalError::Construction(_))));
    }

    #[test]
    fn trace_records_nodes_when_enabled() {
        let mut unit = ExecutionGraph::new("trace");
        let mut b = Builder::main(&mut unit);
        let (one, two) = (b.lit(1), b.lit(2));
        let sum = b.binary(BinaryOp::Add, one, two);
        b.finish(sum).unwrap();

        let config = InterpreterConfig {
            trace_enabled: true,
            ..InterpreterConfig::default()
        };
        let (interp, result) = run_with(config, unit);
        assert_eq!(result.unwrap(), Value::Int(3));
        let ops: Vec<&str> = interp.trace().iter().map(|e| e.op.as_str()).collect();
        assert_eq!(ops, vec!["literal 1", "literal 2", "binary +"]);
        assert_eq!(interp.trace()[2].value.as_deref(), Some("3"));
    }

    #[test]
    fn garbage_collection_keeps_captured_scopes() {
        // make = fn() { local = 5; return fn() local }; keep = make()
        let mut unit = ExecutionGraph::new("gc");
        let mut b = Builder::main(&mut unit);
        let make = b.def("make", &[], |f| {
            let five = f.lit(5);
            let local = f.define("local", five);
            let inner = f.function("get", &[], |g| g.var("local"));
            let ret = f.return_(Some(inner));
            f.block(&[local, ret])
        });
        let call = b.call_named("make", &[]);
        let keep = b.define("keep", call);
        let call = b.call_named("make", &[]);
        let discard = b.define("discard", call);
        let none = b.none();
        let reset = b.assign("discard", none);
        let body = b.block(&[make, keep, discard, reset]);
        b.finish(body).unwrap();

        let mut interp = Interpreter::default();
        interp.execute(unit).unwrap();
        let removed = interp.collect_garbage();
        assert!(removed > 0);
        let scope = interp.context().unit(weft_core::UnitId(0)).unwrap().scope;
        let keep = interp.scopes().get(scope, "keep").unwrap();
        assert_eq!(interp.call_value(&keep, vec![]).unwrap(), Value::Int(5));
    }
}
