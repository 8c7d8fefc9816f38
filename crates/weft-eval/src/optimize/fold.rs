//! Constant and branch folding.

use weft_core::edge::Role;
use weft_core::graph::ExecutionGraph;
use weft_core::id::ExecNodeId;
use weft_core::ops::{ExecOp, LogicalOp};
use weft_core::types::Literal;
use weft_core::value::Value;

use crate::interpreter::eval;

/// The literal child in `role`, if the child is a literal owned by `node`
/// alone.
fn literal_child(graph: &ExecutionGraph, node: ExecNodeId, role: Role) -> Option<(ExecNodeId, Value)> {
    let child = graph.child(node, role)?;
    if graph.parents(child).len() != 1 {
        return None;
    }
    match graph.op(child)? {
        ExecOp::Literal(lit) => Some((child, lit.to_value())),
        _ => None,
    }
}

/// The value an operator node would produce, if all its operands are
/// literals and evaluating it cannot raise.
fn folded_value(graph: &ExecutionGraph, node: ExecNodeId) -> Option<(Value, Vec<ExecNodeId>)> {
    match graph.op(node)? {
        ExecOp::Binary(op) => {
            let (l, left) = literal_child(graph, node, Role::Left)?;
            let (r, right) = literal_child(graph, node, Role::Right)?;
            let value = eval::binary(*op, &left, &right).ok()?;
            Some((value, vec![l, r]))
        }
        ExecOp::Unary(op) => {
            let (o, operand) = literal_child(graph, node, Role::Operand)?;
            let value = eval::unary(*op, &operand).ok()?;
            Some((value, vec![o]))
        }
        ExecOp::Logical(op) => {
            let (l, left) = literal_child(graph, node, Role::Left)?;
            let (r, right) = literal_child(graph, node, Role::Right)?;
            let decided = match op {
                LogicalOp::And => !left.is_truthy(),
                LogicalOp::Or => left.is_truthy(),
            };
            let value = if decided {
                Value::Bool(left.is_truthy())
            } else {
                eval::logical(*op, &left, &right)
            };
            Some((value, vec![l, r]))
        }
        _ => None,
    }
}

/// Folds literal-only operator subtrees until nothing changes. Returns the
/// number of operator nodes replaced.
pub(crate) fn fold_constants(graph: &mut ExecutionGraph) -> usize {
    let mut folded = 0;
    loop {
        let candidates: Vec<ExecNodeId> = graph.node_ids().collect();
        let mut changed = false;
        for node in candidates {
            let Some((value, operands)) = folded_value(graph, node) else {
                continue;
            };
            let Some(literal) = Literal::from_value(&value) else {
                continue;
            };
            if graph.replace_op(node, ExecOp::Literal(literal)).is_err() {
                continue;
            }
            for operand in operands {
                graph.remove_node(operand);
            }
            tracing::trace!(%node, %value, "folded constant");
            folded += 1;
            changed = true;
        }
        if !changed {
            return folded;
        }
    }
}

/// Replaces `if` nodes whose condition is a literal with the branch that
/// would run. Returns the number of branches folded.
pub(crate) fn fold_branches(graph: &mut ExecutionGraph) -> usize {
    let candidates: Vec<ExecNodeId> = graph
        .node_ids()
        .filter(|&n| matches!(graph.op(n), Some(ExecOp::If)))
        .collect();
    let mut folded = 0;
    for node in candidates {
        if fold_branch(graph, node) {
            folded += 1;
        }
    }
    folded
}

fn fold_branch(graph: &mut ExecutionGraph, node: ExecNodeId) -> bool {
    let Some((condition, value)) = literal_child(graph, node, Role::Condition) else {
        return false;
    };
    let (taken, dropped) = if value.is_truthy() {
        (graph.child(node, Role::Then), graph.child(node, Role::Else))
    } else {
        (graph.child(node, Role::Else), graph.child(node, Role::Then))
    };
    let body_of = graph
        .functions()
        .find(|def| def.body == Some(node))
        .map(|def| def.id);

    match taken {
        // A block at a body root shares the function scope, so swapping one
        // in there would change what its definitions bind.
        Some(branch) if body_of.is_some() && matches!(graph.op(branch), Some(ExecOp::Block)) => {
            return false;
        }
        Some(branch) => {
            let parents = graph.parents(node);
            for (parent, role) in parents {
                graph.disconnect(parent, role);
                if graph.connect(parent, branch, role).is_err() {
                    return false;
                }
            }
            if let Some(function) = body_of {
                if graph.set_body(function, branch).is_err() {
                    return false;
                }
            }
            graph.remove_node(node);
        }
        // No `else`: the `if` evaluates to `none`.
        None => {
            if graph.replace_op(node, ExecOp::Literal(Literal::None)).is_err() {
                return false;
            }
            if let Some(then) = graph.disconnect(node, Role::Then) {
                remove_subtree(graph, then);
            }
        }
    }
    graph.remove_node(condition);
    if let Some(dropped) = dropped {
        remove_subtree(graph, dropped);
    }
    tracing::trace!(%node, taken = value.is_truthy(), "folded branch");
    true
}

pub(crate) fn remove_subtree(graph: &mut ExecutionGraph, root: ExecNodeId) -> usize {
    let nodes = graph.subtree(root);
    for &n in &nodes {
        graph.remove_node(n);
    }
    nodes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::build::Builder;
    use weft_core::ops::{BinaryOp, UnaryOp};

    #[test]
    fn nested_arithmetic_folds_to_one_literal() {
        let mut unit = ExecutionGraph::new("fold");
        let mut b = Builder::main(&mut unit);
        let (two, three, four) = (b.lit(2), b.lit(3), b.lit(4));
        let sum = b.binary(BinaryOp::Add, two, three);
        let product = b.binary(BinaryOp::Mul, sum, four);
        let neg = b.unary(UnaryOp::Neg, product);
        b.finish(neg).unwrap();

        assert_eq!(fold_constants(&mut unit), 3);
        assert_eq!(unit.node_count(), 1);
        let body = unit.main().and_then(|m| m.body).unwrap();
        assert_eq!(unit.op(body), Some(&ExecOp::Literal(Literal::Int(-20))));
    }

    #[test]
    fn raising_operations_are_left_in_place() {
        let mut unit = ExecutionGraph::new("fold");
        let mut b = Builder::main(&mut unit);
        let (one, zero) = (b.lit(1), b.lit(0));
        let div = b.binary(BinaryOp::Div, one, zero);
        let (max, one) = (b.lit(i64::MAX), b.lit(1));
        let overflow = b.binary(BinaryOp::Add, max, one);
        let body = b.block(&[div, overflow]);
        b.finish(body).unwrap();

        let before = unit.node_count();
        assert_eq!(fold_constants(&mut unit), 0);
        assert_eq!(unit.node_count(), before);
    }

    #[test]
    fn literal_conditions_keep_only_the_taken_branch() {
        let mut unit = ExecutionGraph::new("branch");
        let mut b = Builder::main(&mut unit);
        let cond = b.lit(false);
        let yes = b.lit("yes");
        let no = b.lit("no");
        let if_ = b.if_(cond, yes, Some(no));
        let cond = b.lit(false);
        let yes = b.lit("unused");
        let lone = b.if_(cond, yes, None);
        let body = b.block(&[if_, lone]);
        b.finish(body).unwrap();

        assert_eq!(fold_branches(&mut unit), 2);
        let statements: Vec<_> = unit
            .indexed(body, Role::Statement(0))
            .into_iter()
            .map(|(_, n)| unit.op(n).cloned())
            .collect();
        assert_eq!(
            statements,
            vec![
                Some(ExecOp::Literal(Literal::from("no"))),
                Some(ExecOp::Literal(Literal::None)),
            ]
        );
        assert_eq!(unit.node_count(), 3);
        assert!(unit.validate().is_ok());
    }
}
