//! Rewrite passes over a built execution graph.
//!
//! All passes preserve what a program observes: output, raised exceptions
//! and final bindings. They run after construction and before evaluation,
//! either through [`optimize`] directly or by setting
//! [`InterpreterConfig::optimize`](crate::interpreter::InterpreterConfig).
//!
//! # Passes
//!
//! 1. Constant folding of `binary`, `unary` and `logical` nodes whose
//!    operands are all literals. Operators that would raise (division by
//!    zero, overflow, mismatched types) are left in place.
//! 2. Branch folding of `if` nodes with a literal condition.
//! 3. Pruning of block statements after an unconditional `return`,
//!    `raise`, `break` or `continue`.
//! 4. Dead-code elimination of functions no `function` node creates and of
//!    nodes outside every live body.
//!
//! Folding runs again after branch folding, since a folded branch can
//! expose new literal operands.

mod dce;
mod fold;

use serde::Serialize;

use weft_core::graph::ExecutionGraph;

pub use dce::live_functions;

/// What a run of [`optimize`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptimizeReport {
    /// Operator nodes replaced by literals.
    pub folded: usize,
    pub branches_folded: usize,
    /// Block statements dropped as unreachable.
    pub pruned: usize,
    pub removed_nodes: usize,
    pub removed_functions: usize,
}

impl OptimizeReport {
    pub fn is_unchanged(&self) -> bool {
        *self == OptimizeReport::default()
    }
}

/// Runs every pass over `graph` in place.
pub fn optimize(graph: &mut ExecutionGraph) -> OptimizeReport {
    let before = graph.node_count();
    let mut report = OptimizeReport {
        folded: fold::fold_constants(graph),
        ..OptimizeReport::default()
    };
    report.branches_folded = fold::fold_branches(graph);
    if report.branches_folded > 0 {
        report.folded += fold::fold_constants(graph);
    }
    report.pruned = dce::prune_unreachable(graph);
    let (_, functions) = dce::eliminate_dead_code(graph);
    report.removed_functions = functions;
    report.removed_nodes = before - graph.node_count();
    tracing::debug!(
        unit = %graph.name(),
        folded = report.folded,
        branches = report.branches_folded,
        pruned = report.pruned,
        removed = report.removed_nodes,
        "optimized"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{Interpreter, InterpreterConfig};
    use weft_core::build::Builder;
    use weft_core::ops::BinaryOp;

    /// Prints a folded sum, a branch on a literal and a value after an
    /// early-exiting helper.
    fn sample() -> ExecutionGraph {
        let mut unit = ExecutionGraph::new("sample");
        let mut b = Builder::main(&mut unit);
        let (one, two) = (b.lit(1), b.lit(2));
        let sum = b.binary(BinaryOp::Add, one, two);
        let first = b.call_named("print", &[sum]);

        let cond = b.lit(true);
        let yes = b.lit("taken");
        let say_yes = b.call_named("print", &[yes]);
        let no = b.lit("skipped");
        let say_no = b.call_named("print", &[no]);
        let branch = b.if_(cond, say_yes, Some(say_no));

        let early = b.def("early", &[], |f| {
            let x = f.lit("early");
            let ret = f.return_(Some(x));
            let y = f.lit("late");
            let dead = f.call_named("print", &[y]);
            f.block(&[ret, dead])
        });
        let result = b.call_named("early", &[]);
        let last = b.call_named("print", &[result]);
        let (seven, zero) = (b.lit(7), b.lit(0));
        let unsafe_div = b.binary(BinaryOp::Div, seven, zero);
        let zero = b.lit(0);
        let guarded = b.try_(unsafe_div, None, Some(zero), None);
        let body = b.block(&[first, branch, early, last, guarded]);
        b.finish(body).unwrap();
        unit
    }

    #[test]
    fn report_counts_each_pass() {
        let mut unit = sample();
        let report = optimize(&mut unit);
        assert_eq!(report.folded, 1);
        assert_eq!(report.branches_folded, 1);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.removed_functions, 0);
        assert!(report.removed_nodes > 0);
        assert!(unit.validate().is_ok());
        assert!(optimize(&mut unit).is_unchanged());
    }

    #[test]
    fn optimized_programs_print_the_same_lines() {
        let mut plain = Interpreter::new(InterpreterConfig::default());
        plain.execute(sample()).unwrap();

        let mut optimized = Interpreter::new(InterpreterConfig {
            optimize: true,
            ..InterpreterConfig::default()
        });
        optimized.execute(sample()).unwrap();

        assert_eq!(plain.output(), vec!["3", "taken", "early"]);
        assert_eq!(optimized.output(), plain.output());
    }
}
