//! Fluent construction of execution graphs.
//!
//! Front ends (and tests) build a unit bottom-up: children first, then the
//! node that takes them in its roles.
//!
//! ```
//! use weft_core::build::Builder;
//! use weft_core::graph::ExecutionGraph;
//! use weft_core::ops::BinaryOp;
//!
//! let mut unit = ExecutionGraph::new("demo");
//! let mut b = Builder::main(&mut unit);
//! let one = b.lit(1);
//! let two = b.lit(2);
//! let sum = b.binary(BinaryOp::Add, one, two);
//! b.finish(sum).unwrap();
//! assert!(unit.validate().is_ok());
//! ```
//!
//! Builder methods never fail: an id that does not belong to the graph
//! leaves its role empty, which [`ExecutionGraph::validate`] then reports.

use crate::edge::Role;
use crate::error::ConstructionError;
use crate::graph::ExecutionGraph;
use crate::id::{ExecNodeId, FunctionId};
use crate::node::ExecNode;
use crate::ops::{BinaryOp, ExecOp, LogicalOp, UnaryOp};
use crate::rules::RuleSpec;
use crate::types::{Literal, SourceLocation};

/// Builds the body of one function.
pub struct Builder<'g> {
    graph: &'g mut ExecutionGraph,
    function: FunctionId,
    location: Option<SourceLocation>,
}

impl<'g> Builder<'g> {
    /// Builds the unit body.
    pub fn main(graph: &'g mut ExecutionGraph) -> Self {
        Builder {
            graph,
            function: FunctionId::MAIN,
            location: None,
        }
    }

    /// Builds the body of an already registered function.
    pub fn for_function(graph: &'g mut ExecutionGraph, function: FunctionId) -> Result<Self, ConstructionError> {
        if graph.function(function).is_none() {
            return Err(ConstructionError::UnknownFunction { id: function });
        }
        Ok(Builder {
            graph,
            function,
            location: None,
        })
    }

    pub fn function_id(&self) -> FunctionId {
        self.function
    }

    /// Tags nodes created from now on with a source location.
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        self.location = Some(SourceLocation::new(line, column));
        self
    }

    /// Sets `body` as the function's body.
    pub fn finish(self, body: ExecNodeId) -> Result<FunctionId, ConstructionError> {
        self.graph.set_body(self.function, body)?;
        Ok(self.function)
    }

    /// Adds a node with the given children.
    pub fn node(&mut self, op: ExecOp, children: &[(Role, ExecNodeId)]) -> ExecNodeId {
        let id = self.graph.push_node(ExecNode {
            op,
            owner: self.function,
            location: self.location,
        });
        for &(role, child) in children {
            self.graph.push_edge(id, child, role);
        }
        id
    }

    // -- values and names -------------------------------------------------

    pub fn lit(&mut self, value: impl Into<Literal>) -> ExecNodeId {
        self.node(ExecOp::Literal(value.into()), &[])
    }

    pub fn none(&mut self) -> ExecNodeId {
        self.node(ExecOp::Literal(Literal::None), &[])
    }

    pub fn list(&mut self, elements: &[ExecNodeId]) -> ExecNodeId {
        let children = indexed(Role::Element, elements);
        self.node(ExecOp::ListLiteral, &children)
    }

    pub fn map(&mut self, entries: &[(Literal, ExecNodeId)]) -> ExecNodeId {
        let keys = entries.iter().map(|(k, _)| k.clone()).collect();
        let values: Vec<ExecNodeId> = entries.iter().map(|(_, v)| *v).collect();
        let children = indexed(Role::Element, &values);
        self.node(ExecOp::MapLiteral { keys }, &children)
    }

    pub fn var(&mut self, name: &str) -> ExecNodeId {
        self.node(ExecOp::Var { name: name.to_string() }, &[])
    }

    pub fn define(&mut self, name: &str, value: ExecNodeId) -> ExecNodeId {
        let op = ExecOp::Define {
            name: name.to_string(),
            mutable: true,
        };
        self.node(op, &[(Role::Value, value)])
    }

    /// Defines an immutable binding.
    pub fn define_const(&mut self, name: &str, value: ExecNodeId) -> ExecNodeId {
        let op = ExecOp::Define {
            name: name.to_string(),
            mutable: false,
        };
        self.node(op, &[(Role::Value, value)])
    }

    pub fn assign(&mut self, name: &str, value: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Assign { name: name.to_string() }, &[(Role::Value, value)])
    }

    // -- operators --------------------------------------------------------

    pub fn binary(&mut self, op: BinaryOp, left: ExecNodeId, right: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Binary(op), &[(Role::Left, left), (Role::Right, right)])
    }

    pub fn unary(&mut self, op: UnaryOp, operand: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Unary(op), &[(Role::Operand, operand)])
    }

    pub fn and(&mut self, left: ExecNodeId, right: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Logical(LogicalOp::And), &[(Role::Left, left), (Role::Right, right)])
    }

    pub fn or(&mut self, left: ExecNodeId, right: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Logical(LogicalOp::Or), &[(Role::Left, left), (Role::Right, right)])
    }

    // -- functions --------------------------------------------------------

    pub fn call(&mut self, callee: ExecNodeId, args: &[ExecNodeId]) -> ExecNodeId {
        let mut children = indexed(Role::Argument, args);
        children.push((Role::Callee, callee));
        self.node(ExecOp::Call, &children)
    }

    /// Calls the function bound to `name`.
    pub fn call_named(&mut self, name: &str, args: &[ExecNodeId]) -> ExecNodeId {
        let callee = self.var(name);
        self.call(callee, args)
    }

    /// Registers a function nested in the current one, builds its body with
    /// `body`, and returns the `function` node that creates its closure.
    pub fn function(
        &mut self,
        name: &str,
        params: &[&str],
        body: impl FnOnce(&mut Builder<'_>) -> ExecNodeId,
    ) -> ExecNodeId {
        let params = params.iter().map(|p| p.to_string()).collect();
        let id = self.graph.push_function(name, params, self.function);
        let mut inner = Builder {
            graph: &mut *self.graph,
            function: id,
            location: self.location,
        };
        let root = body(&mut inner);
        // The root was just created by `inner`, so it exists.
        let _ = self.graph.set_body(id, root);
        self.node(ExecOp::Function { function: id }, &[])
    }

    /// `define name = function(params) body`.
    pub fn def(
        &mut self,
        name: &str,
        params: &[&str],
        body: impl FnOnce(&mut Builder<'_>) -> ExecNodeId,
    ) -> ExecNodeId {
        let function = self.function(name, params, body);
        self.define(name, function)
    }

    pub fn return_(&mut self, value: Option<ExecNodeId>) -> ExecNodeId {
        let children: Vec<_> = value.map(|v| (Role::Value, v)).into_iter().collect();
        self.node(ExecOp::Return, &children)
    }

    // -- control flow -----------------------------------------------------

    pub fn if_(&mut self, condition: ExecNodeId, then: ExecNodeId, otherwise: Option<ExecNodeId>) -> ExecNodeId {
        let mut children = vec![(Role::Condition, condition), (Role::Then, then)];
        if let Some(otherwise) = otherwise {
            children.push((Role::Else, otherwise));
        }
        self.node(ExecOp::If, &children)
    }

    pub fn while_(&mut self, condition: ExecNodeId, body: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::While, &[(Role::Condition, condition), (Role::Body, body)])
    }

    pub fn for_each(&mut self, var: &str, iterable: ExecNodeId, body: ExecNodeId) -> ExecNodeId {
        let op = ExecOp::For { var: var.to_string() };
        self.node(op, &[(Role::Target, iterable), (Role::Body, body)])
    }

    pub fn break_(&mut self) -> ExecNodeId {
        self.node(ExecOp::Break, &[])
    }

    pub fn continue_(&mut self) -> ExecNodeId {
        self.node(ExecOp::Continue, &[])
    }

    pub fn raise(&mut self, value: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Raise, &[(Role::Value, value)])
    }

    pub fn try_(
        &mut self,
        body: ExecNodeId,
        catch_var: Option<&str>,
        handler: Option<ExecNodeId>,
        finally: Option<ExecNodeId>,
    ) -> ExecNodeId {
        let mut children = vec![(Role::Body, body)];
        if let Some(handler) = handler {
            children.push((Role::Handler, handler));
        }
        if let Some(finally) = finally {
            children.push((Role::Finally, finally));
        }
        let op = ExecOp::Try {
            catch_var: catch_var.map(str::to_string),
        };
        self.node(op, &children)
    }

    pub fn block(&mut self, statements: &[ExecNodeId]) -> ExecNodeId {
        let children = indexed(Role::Statement, statements);
        self.node(ExecOp::Block, &children)
    }

    // -- containers -------------------------------------------------------

    pub fn index(&mut self, target: ExecNodeId, index: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Index, &[(Role::Target, target), (Role::Index, index)])
    }

    pub fn set_index(&mut self, target: ExecNodeId, index: ExecNodeId, value: ExecNodeId) -> ExecNodeId {
        self.node(
            ExecOp::SetIndex,
            &[(Role::Target, target), (Role::Index, index), (Role::Value, value)],
        )
    }

    pub fn append(&mut self, target: ExecNodeId, value: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Append, &[(Role::Target, target), (Role::Value, value)])
    }

    pub fn remove_at(&mut self, target: ExecNodeId, index: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::RemoveAt, &[(Role::Target, target), (Role::Index, index)])
    }

    pub fn add_rule(&mut self, target: ExecNodeId, rule: RuleSpec, args: &[ExecNodeId]) -> ExecNodeId {
        let mut children = indexed(Role::Argument, args);
        children.push((Role::Target, target));
        self.node(ExecOp::AddRule { rule }, &children)
    }

    pub fn define_ruleset(&mut self, name: &str, rules: Vec<RuleSpec>, args: &[ExecNodeId]) -> ExecNodeId {
        let children = indexed(Role::Argument, args);
        let op = ExecOp::DefineRuleset {
            name: name.to_string(),
            rules,
        };
        self.node(op, &children)
    }

    pub fn apply_ruleset(&mut self, name: &str, target: ExecNodeId) -> ExecNodeId {
        let op = ExecOp::ApplyRuleset { name: name.to_string() };
        self.node(op, &[(Role::Target, target)])
    }

    pub fn freeze(&mut self, target: ExecNodeId) -> ExecNodeId {
        self.node(ExecOp::Freeze, &[(Role::Target, target)])
    }

    pub fn new_graph(&mut self, kind: &str) -> ExecNodeId {
        self.node(ExecOp::NewGraph { kind: kind.to_string() }, &[])
    }

    /// Adds a member to a user graph, linked from `parent` when given.
    pub fn add_member(
        &mut self,
        target: ExecNodeId,
        value: ExecNodeId,
        parent: Option<(ExecNodeId, &str)>,
    ) -> ExecNodeId {
        let mut children = vec![(Role::Target, target), (Role::Value, value)];
        let link = parent.map(|(node, name)| {
            children.push((Role::Left, node));
            name.to_string()
        });
        self.node(ExecOp::AddMember { link }, &children)
    }

    pub fn link(
        &mut self,
        target: ExecNodeId,
        from: ExecNodeId,
        to: ExecNodeId,
        name: &str,
        data: Option<ExecNodeId>,
    ) -> ExecNodeId {
        let mut children = vec![(Role::Target, target), (Role::Left, from), (Role::Right, to)];
        if let Some(data) = data {
            children.push((Role::Value, data));
        }
        self.node(ExecOp::Link { name: name.to_string() }, &children)
    }
}

fn indexed(role: fn(u16) -> Role, nodes: &[ExecNodeId]) -> Vec<(Role, ExecNodeId)> {
    nodes
        .iter()
        .enumerate()
        .map(|(i, &node)| (role(i as u16), node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_functions_are_owned_separately() {
        let mut unit = ExecutionGraph::new("t");
        let mut b = Builder::main(&mut unit);
        let def = b.def("double", &["x"], |f| {
            let x = f.var("x");
            let two = f.lit(2);
            let product = f.binary(BinaryOp::Mul, x, two);
            f.return_(Some(product))
        });
        let body = b.block(&[def]);
        b.finish(body).unwrap();

        assert!(unit.validate().is_ok());
        assert_eq!(unit.function_count(), 2);
        let double = unit.functions().find(|f| f.name == "double").unwrap();
        assert_eq!(double.params, vec!["x".to_string()]);
        assert_eq!(double.parent, Some(FunctionId::MAIN));
        assert_eq!(unit.function_nodes(double.id).len(), 4);
    }

    #[test]
    fn locations_are_attached() {
        let mut unit = ExecutionGraph::new("t");
        let mut b = Builder::main(&mut unit);
        let x = b.at(4, 2).lit(1);
        b.finish(x).unwrap();
        assert_eq!(unit.node(x).unwrap().location, Some(SourceLocation::new(4, 2)));
    }

    #[test]
    fn foreign_ids_surface_as_missing_roles() {
        let mut unit = ExecutionGraph::new("t");
        let mut b = Builder::main(&mut unit);
        let neg = b.unary(UnaryOp::Neg, ExecNodeId(999));
        b.finish(neg).unwrap();
        let errors = unit.validate().unwrap_err();
        assert!(matches!(
            errors[0],
            ConstructionError::MissingRole { role: Role::Operand, .. }
        ));
    }
}
