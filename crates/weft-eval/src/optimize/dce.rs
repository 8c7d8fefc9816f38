//! Unreachable statement pruning and dead-code elimination.

use std::collections::{HashSet, VecDeque};

use weft_core::edge::Role;
use weft_core::graph::ExecutionGraph;
use weft_core::id::{ExecNodeId, FunctionId};
use weft_core::ops::ExecOp;

use super::fold::remove_subtree;

/// Drops block statements that follow an unconditional `return`, `raise`,
/// `break` or `continue`. Returns the number of statements removed.
pub(crate) fn prune_unreachable(graph: &mut ExecutionGraph) -> usize {
    let blocks: Vec<ExecNodeId> = graph
        .node_ids()
        .filter(|&n| matches!(graph.op(n), Some(ExecOp::Block)))
        .collect();
    let mut pruned = 0;
    for block in blocks {
        let statements = graph.indexed(block, Role::Statement(0));
        let Some(cut) = statements
            .iter()
            .position(|(_, s)| graph.op(*s).is_some_and(ExecOp::diverges))
        else {
            continue;
        };
        for &(role, statement) in &statements[cut + 1..] {
            graph.disconnect(block, role);
            remove_subtree(graph, statement);
            pruned += 1;
        }
    }
    pruned
}

/// Functions reachable from the unit body through `function` nodes.
pub fn live_functions(graph: &ExecutionGraph) -> HashSet<FunctionId> {
    let mut live = HashSet::new();
    let mut queue = VecDeque::from([FunctionId::MAIN]);
    while let Some(function) = queue.pop_front() {
        if !live.insert(function) {
            continue;
        }
        queue.extend(graph.nested_functions(function));
    }
    live
}

/// Removes functions no `function` node can create, then every node not
/// reachable from a live body. Returns `(nodes, functions)` removed.
pub(crate) fn eliminate_dead_code(graph: &mut ExecutionGraph) -> (usize, usize) {
    let live = live_functions(graph);
    let dead: Vec<FunctionId> = graph
        .functions()
        .map(|def| def.id)
        .filter(|id| !live.contains(id))
        .collect();

    let before = graph.node_count();
    for &function in &dead {
        tracing::trace!(%function, "removing dead function");
        graph.remove_function(function);
    }

    let reachable: HashSet<ExecNodeId> = graph
        .functions()
        .filter_map(|def| def.body)
        .flat_map(|body| graph.subtree(body))
        .collect();
    let orphans: Vec<ExecNodeId> = graph.node_ids().filter(|n| !reachable.contains(n)).collect();
    for node in orphans {
        graph.remove_node(node);
    }
    (before - graph.node_count(), dead.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::build::Builder;
    use weft_core::types::Literal;

    #[test]
    fn statements_after_return_are_pruned() {
        let mut unit = ExecutionGraph::new("prune");
        let mut b = Builder::main(&mut unit);
        let one = b.lit(1);
        let ret = b.return_(Some(one));
        let msg = b.lit("never");
        let print = b.call_named("print", &[msg]);
        let two = b.lit(2);
        let body = b.block(&[ret, print, two]);
        b.finish(body).unwrap();

        assert_eq!(prune_unreachable(&mut unit), 2);
        assert_eq!(unit.indexed(body, Role::Statement(0)).len(), 1);
        // block, return, literal
        assert_eq!(unit.node_count(), 3);
        assert!(unit.validate().is_ok());
    }

    #[test]
    fn unreferenced_functions_are_removed() {
        let mut unit = ExecutionGraph::new("dce");
        let mut b = Builder::main(&mut unit);
        let used = b.def("used", &[], |f| f.lit(1));
        let call = b.call_named("used", &[]);
        let body = b.block(&[used, call]);
        b.finish(body).unwrap();
        let orphan = unit.add_function("orphan", vec![], FunctionId::MAIN).unwrap();
        let lit = unit.add_node(ExecOp::Literal(Literal::Int(0)), orphan, None).unwrap();
        unit.set_body(orphan, lit).unwrap();

        let (nodes, functions) = eliminate_dead_code(&mut unit);
        assert_eq!((nodes, functions), (1, 1));
        assert!(unit.function(orphan).is_none());
        assert_eq!(unit.function_count(), 2);
    }
}
