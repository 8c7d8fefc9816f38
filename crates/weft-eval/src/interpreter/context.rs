//! The evaluation context: everything a program can observe besides the
//! node it is evaluating.
//!
//! One [`Context`] owns the scope graph shared by all loaded units, the
//! prelude scope the natives live in, the loaded units themselves and the
//! ruleset registry. Nothing here is global; two interpreters never share
//! state.

use std::rc::Rc;

use weft_core::graph::ExecutionGraph;
use weft_core::id::{ClosureId, ScopeId, UnitId};
use weft_core::rules::RulesetRegistry;
use weft_core::scope::{Mutability, ScopeGraph, ScopeKind};
use weft_core::value::Value;

use super::error::EvalError;

/// A compilation unit that has been validated and given a module scope.
#[derive(Debug, Clone)]
pub struct LoadedUnit {
    pub graph: Rc<ExecutionGraph>,
    /// Root scope of the unit; its parent is the prelude.
    pub scope: ScopeId,
}

#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) scopes: ScopeGraph,
    prelude: ScopeId,
    units: Vec<LoadedUnit>,
    pub(crate) rulesets: RulesetRegistry,
}

impl Context {
    pub fn new() -> Self {
        let mut scopes = ScopeGraph::new();
        let prelude = scopes.push_root(ScopeKind::Prelude);
        Context {
            scopes,
            prelude,
            units: Vec::new(),
            rulesets: RulesetRegistry::new(),
        }
    }

    pub fn scopes(&self) -> &ScopeGraph {
        &self.scopes
    }

    pub fn prelude(&self) -> ScopeId {
        self.prelude
    }

    pub fn rulesets(&self) -> &RulesetRegistry {
        &self.rulesets
    }

    pub fn unit(&self, id: UnitId) -> Result<&LoadedUnit, EvalError> {
        self.units
            .get(id.0 as usize)
            .ok_or(EvalError::UnknownUnit { id })
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &LoadedUnit)> {
        self.units
            .iter()
            .enumerate()
            .map(|(i, unit)| (UnitId(i as u32), unit))
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub(crate) fn add_unit(&mut self, graph: ExecutionGraph) -> Result<UnitId, EvalError> {
        let scope = self.scopes.push_scope(self.prelude, ScopeKind::Module)?;
        let id = UnitId(self.units.len() as u32);
        self.units.push(LoadedUnit {
            graph: Rc::new(graph),
            scope,
        });
        Ok(id)
    }

    /// Binds an immutable name in the prelude.
    pub(crate) fn define_global(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        self.scopes
            .define_with(self.prelude, name, value, Mutability::Immutable)?;
        Ok(())
    }

    /// Scopes that stay alive regardless of the call path.
    pub(crate) fn root_scopes(&self) -> Vec<ScopeId> {
        std::iter::once(self.prelude)
            .chain(self.units.iter().map(|u| u.scope))
            .collect()
    }

    /// Closures reachable only through registered rulesets.
    pub(crate) fn ruleset_closures(&self) -> Vec<ClosureId> {
        self.rulesets
            .callbacks()
            .iter()
            .filter_map(|callback| match callback {
                Value::Function(f) => Some(f.closure),
                _ => None,
            })
            .collect()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
