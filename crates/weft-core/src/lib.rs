pub mod build;
pub mod edge;
pub mod error;
pub mod function;
pub mod graph;
pub mod id;
pub mod node;
pub mod ops;
pub mod rules;
pub mod scope;
pub mod signal;
pub mod types;
pub mod validate;
pub mod value;
pub mod value_graph;

// Re-export commonly used types
pub use build::Builder;
pub use edge::{Label, Role, ScopeEdge};
pub use error::{BindingError, ConstructionError, GraphError, MutationError};
pub use function::FunctionDef;
pub use graph::ExecutionGraph;
pub use id::{ClosureId, EdgeId, ExecNodeId, FunctionId, NodeId, ScopeId, UnitId, VarId};
pub use node::ExecNode;
pub use ops::{BinaryOp, ExecOp, LogicalOp, UnaryOp};
pub use rules::{Invoke, InvokeError, Rule, RuleEngine, RuleSpec, Ruleset, RulesetRegistry};
pub use scope::{Mutability, ScopeGraph, ScopeKind};
pub use signal::{CallSite, ControlSignal, Raised};
pub use types::{Literal, SourceLocation};
pub use value::{Exception, FunctionValue, GraphRef, MapKey, NativeFunction, Value, ValueType};
pub use value_graph::{GraphKind, ValueGraph};
