//! Build-time checks for execution graphs.
//!
//! A unit that passes [`ExecutionGraph::validate`] can be evaluated without
//! the evaluator ever finding a missing child, a stray `break` or a cycle:
//! malformed structure is reported here, with source locations, instead of
//! surfacing as a runtime failure.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::edge::Role;
use crate::error::ConstructionError;
use crate::graph::ExecutionGraph;
use crate::id::{ExecNodeId, FunctionId};
use crate::ops::ExecOp;

impl ExecutionGraph {
    /// Checks every structural invariant, returning all violations found.
    pub fn validate(&self) -> Result<(), Vec<ConstructionError>> {
        let mut errors = Vec::new();
        self.check_functions(&mut errors);
        self.check_edges(&mut errors);
        for id in self.node_ids() {
            self.check_shape(id, &mut errors);
        }
        // Loop-control and cycle checks walk bodies; only meaningful on a
        // structurally sound graph.
        if errors.is_empty() {
            self.check_cycles(&mut errors);
        }
        if errors.is_empty() {
            self.check_loop_control(&mut errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(unit = %self.name(), errors = errors.len(), "execution graph rejected");
            Err(errors)
        }
    }

    fn check_functions(&self, errors: &mut Vec<ConstructionError>) {
        for def in self.functions() {
            match def.body {
                None => errors.push(ConstructionError::MissingBody {
                    function: def.id,
                    name: def.name.clone(),
                }),
                Some(body) if !self.contains_node(body) => {
                    errors.push(ConstructionError::UnknownNode { id: body });
                }
                Some(_) => {}
            }
        }
        for id in self.node_ids() {
            if let Some(ExecOp::Function { function }) = self.op(id) {
                if self.function(*function).is_none() {
                    errors.push(ConstructionError::UnknownFunction { id: *function });
                }
            }
        }
    }

    fn check_edges(&self, errors: &mut Vec<ConstructionError>) {
        let mut parents: HashMap<ExecNodeId, usize> = HashMap::new();
        for (from, to, _) in self.edges() {
            *parents.entry(to).or_default() += 1;
            let owners = (self.node(from).map(|n| n.owner), self.node(to).map(|n| n.owner));
            if let (Some(a), Some(b)) = owners {
                if a != b {
                    errors.push(ConstructionError::CrossFunctionEdge { from, to });
                }
            }
        }
        let mut shared: Vec<ExecNodeId> = parents
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(node, _)| node)
            .collect();
        shared.sort();
        errors.extend(shared.into_iter().map(|node| ConstructionError::SharedChild { node }));
    }

    fn check_shape(&self, id: ExecNodeId, errors: &mut Vec<ConstructionError>) {
        let Some(node) = self.node(id) else {
            return;
        };
        let shape = node.op.shape();
        let location = node.location;
        let op = node.op.name().to_string();
        let children = self.children(id);

        let mut seen = HashSet::new();
        for (role, _) in &children {
            if !shape.accepts(role) {
                errors.push(ConstructionError::UnexpectedRole {
                    node: id,
                    op: op.clone(),
                    role: *role,
                    location,
                });
            } else if !seen.insert(*role) {
                errors.push(ConstructionError::DuplicateRole {
                    node: id,
                    role: *role,
                    location,
                });
            }
        }
        for role in shape.required {
            if !seen.contains(role) {
                errors.push(ConstructionError::MissingRole {
                    node: id,
                    op: op.clone(),
                    role: *role,
                    location,
                });
            }
        }
        if let ExecOp::Try { .. } = node.op {
            if !seen.contains(&Role::Handler) && !seen.contains(&Role::Finally) {
                errors.push(ConstructionError::MissingRole {
                    node: id,
                    op: op.clone(),
                    role: Role::Handler,
                    location,
                });
            }
        }

        if let Some(family) = shape.indexed {
            let mut indices: Vec<u16> = seen
                .iter()
                .filter(|role| role.same_family(&family))
                .filter_map(Role::index)
                .collect();
            indices.sort_unstable();
            if let Some(gap) = (0u16..).zip(indices.iter()).find(|(want, got)| want != *got) {
                errors.push(ConstructionError::NonContiguousRoles {
                    node: id,
                    expected: with_index(family, gap.0),
                    location,
                });
            }
            if let Some(expected) = node.op.indexed_count() {
                if indices.len() != expected {
                    errors.push(ConstructionError::ChildCountMismatch {
                        node: id,
                        op: op.clone(),
                        expected,
                        actual: indices.len(),
                        location,
                    });
                }
            }
        }

        let specs = match &node.op {
            ExecOp::AddRule { rule } => std::slice::from_ref(rule),
            ExecOp::DefineRuleset { rules, .. } => rules.as_slice(),
            _ => &[],
        };
        for spec in specs {
            if let Err(reason) = spec.check() {
                errors.push(ConstructionError::InvalidRule { reason, location });
            }
        }
    }

    fn check_cycles(&self, errors: &mut Vec<ConstructionError>) {
        if let Err(cycle) = toposort(self.raw(), None) {
            let node = ExecNodeId::from(cycle.node_id());
            let function = self.node(node).map_or(FunctionId::MAIN, |n| n.owner);
            errors.push(ConstructionError::CycleInBody { function, node });
        }
    }

    /// `break`/`continue` must sit inside the body of a loop of the same
    /// function.
    fn check_loop_control(&self, errors: &mut Vec<ConstructionError>) {
        for def in self.functions() {
            let Some(body) = def.body else {
                continue;
            };
            let mut stack = vec![(body, false)];
            while let Some((node, in_loop)) = stack.pop() {
                let Some(exec) = self.node(node) else {
                    continue;
                };
                let keyword = match exec.op {
                    ExecOp::Break => Some("break"),
                    ExecOp::Continue => Some("continue"),
                    _ => None,
                };
                if let (Some(keyword), false) = (keyword, in_loop) {
                    errors.push(ConstructionError::LoopControlOutsideLoop {
                        node,
                        keyword,
                        location: exec.location,
                    });
                }
                let is_loop = exec.op.is_loop();
                for edge in self.raw().edges_directed(node.into(), Direction::Outgoing) {
                    let child_in_loop = in_loop || (is_loop && *edge.weight() == Role::Body);
                    stack.push((ExecNodeId::from(edge.target()), child_in_loop));
                }
            }
        }
    }
}

fn with_index(family: Role, index: u16) -> Role {
    match family {
        Role::Argument(_) => Role::Argument(index),
        Role::Element(_) => Role::Element(index),
        Role::Statement(_) => Role::Statement(index),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::BinaryOp;
    use crate::types::{Literal, SourceLocation};

    fn unit() -> ExecutionGraph {
        ExecutionGraph::new("test")
    }

    fn add(g: &mut ExecutionGraph, op: ExecOp) -> ExecNodeId {
        g.add_node(op, FunctionId::MAIN, None).unwrap()
    }

    #[test]
    fn well_formed_graph_passes() {
        let mut g = unit();
        let plus = add(&mut g, ExecOp::Binary(BinaryOp::Add));
        let one = add(&mut g, ExecOp::Literal(Literal::Int(1)));
        let two = add(&mut g, ExecOp::Literal(Literal::Int(2)));
        g.connect(plus, one, Role::Left).unwrap();
        g.connect(plus, two, Role::Right).unwrap();
        g.set_body(FunctionId::MAIN, plus).unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn missing_role_reports_location() {
        let mut g = unit();
        let plus = g
            .add_node(
                ExecOp::Binary(BinaryOp::Add),
                FunctionId::MAIN,
                Some(SourceLocation::new(3, 9)),
            )
            .unwrap();
        let one = add(&mut g, ExecOp::Literal(Literal::Int(1)));
        g.connect(plus, one, Role::Left).unwrap();
        g.set_body(FunctionId::MAIN, plus).unwrap();
        let errors = g.validate().unwrap_err();
        insta::assert_snapshot!(errors[0].to_string(), @"binary node 0 is missing its `right` edge at 3:9");
    }

    #[test]
    fn gaps_in_indexed_roles_are_rejected() {
        let mut g = unit();
        let block = add(&mut g, ExecOp::Block);
        let a = add(&mut g, ExecOp::Literal(Literal::None));
        let b = add(&mut g, ExecOp::Literal(Literal::None));
        g.connect(block, a, Role::Statement(0)).unwrap();
        g.connect(block, b, Role::Statement(2)).unwrap();
        g.set_body(FunctionId::MAIN, block).unwrap();
        let errors = g.validate().unwrap_err();
        assert!(errors.contains(&ConstructionError::NonContiguousRoles {
            node: block,
            expected: Role::Statement(1),
            location: None,
        }));
    }

    #[test]
    fn break_outside_loop_is_rejected() {
        let mut g = unit();
        let block = add(&mut g, ExecOp::Block);
        let brk = add(&mut g, ExecOp::Break);
        g.connect(block, brk, Role::Statement(0)).unwrap();
        g.set_body(FunctionId::MAIN, block).unwrap();
        let errors = g.validate().unwrap_err();
        assert!(matches!(
            errors[0],
            ConstructionError::LoopControlOutsideLoop { keyword: "break", .. }
        ));
    }

    #[test]
    fn break_in_loop_condition_is_rejected_but_body_is_fine() {
        let mut g = unit();
        let w = add(&mut g, ExecOp::While);
        let cond = add(&mut g, ExecOp::Literal(Literal::Bool(true)));
        let brk = add(&mut g, ExecOp::Break);
        g.connect(w, cond, Role::Condition).unwrap();
        g.connect(w, brk, Role::Body).unwrap();
        g.set_body(FunctionId::MAIN, w).unwrap();
        assert!(g.validate().is_ok());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut g = unit();
        let a = add(&mut g, ExecOp::Unary(crate::ops::UnaryOp::Neg));
        let b = add(&mut g, ExecOp::Unary(crate::ops::UnaryOp::Neg));
        g.connect(a, b, Role::Operand).unwrap();
        g.connect(b, a, Role::Operand).unwrap();
        g.set_body(FunctionId::MAIN, a).unwrap();
        let errors = g.validate().unwrap_err();
        assert!(matches!(errors[0], ConstructionError::CycleInBody { .. }));
    }

    #[test]
    fn missing_bodies_and_functions_are_reported() {
        let mut g = unit();
        let f = add(&mut g, ExecOp::Function { function: FunctionId(5) });
        g.set_body(FunctionId::MAIN, f).unwrap();
        g.add_function("g", vec![], FunctionId::MAIN).unwrap();
        let errors = g.validate().unwrap_err();
        assert!(errors.contains(&ConstructionError::UnknownFunction { id: FunctionId(5) }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConstructionError::MissingBody { name, .. } if name == "g")));
    }

    #[test]
    fn rule_argument_counts_are_checked() {
        let mut g = unit();
        let rule = add(
            &mut g,
            ExecOp::AddRule {
                rule: crate::rules::RuleSpec::Custom { name: "f".into() },
            },
        );
        let target = add(&mut g, ExecOp::ListLiteral);
        g.connect(rule, target, Role::Target).unwrap();
        g.set_body(FunctionId::MAIN, rule).unwrap();
        let errors = g.validate().unwrap_err();
        assert!(matches!(
            errors[0],
            ConstructionError::ChildCountMismatch { expected: 1, actual: 0, .. }
        ));
    }
}
