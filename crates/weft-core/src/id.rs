//! Stable ID newtypes for graph entities.
//!
//! All IDs are distinct newtype wrappers over `u32`, providing type safety
//! so that a [`ScopeId`] cannot be accidentally used where a [`VarId`] is
//! expected even though both address nodes of the same scope graph.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// Declares a `u32` handle that bridges to a petgraph index type.
macro_rules! graph_handle {
    ($(#[$meta:meta])* $name:ident => $index:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$index<u32>> for $name {
            fn from(idx: $index<u32>) -> Self {
                $name(idx.index() as u32)
            }
        }

        impl From<$name> for $index<u32> {
            fn from(id: $name) -> Self {
                $index::new(id.0 as usize)
            }
        }
    };
}

graph_handle! {
    /// Node handle inside one [`ValueGraph`](crate::value_graph::ValueGraph).
    NodeId => NodeIndex
}

graph_handle! {
    /// Edge handle inside one [`ValueGraph`](crate::value_graph::ValueGraph).
    EdgeId => EdgeIndex
}

graph_handle! {
    /// A scope node in the [`ScopeGraph`](crate::scope::ScopeGraph).
    ScopeId => NodeIndex
}

graph_handle! {
    /// A variable node in the [`ScopeGraph`](crate::scope::ScopeGraph).
    VarId => NodeIndex
}

graph_handle! {
    /// A closure node in the [`ScopeGraph`](crate::scope::ScopeGraph).
    ClosureId => NodeIndex
}

graph_handle! {
    /// An executable node in an [`ExecutionGraph`](crate::graph::ExecutionGraph).
    ExecNodeId => NodeIndex
}

/// Function identity within one execution graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

/// A loaded compilation unit inside an evaluation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UnitId(pub u32);

impl FunctionId {
    /// The implicit top-level function of every compilation unit.
    pub const MAIN: FunctionId = FunctionId(0);
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_to_node_index_roundtrip() {
        let idx = NodeIndex::<u32>::new(42);
        let node_id = NodeId::from(idx);
        assert_eq!(node_id.0, 42);

        let back: NodeIndex<u32> = node_id.into();
        assert_eq!(back.index(), 42);
    }

    #[test]
    fn edge_id_to_edge_index_roundtrip() {
        let idx = EdgeIndex::<u32>::new(9);
        let edge_id = EdgeId::from(idx);
        let back: EdgeIndex<u32> = edge_id.into();
        assert_eq!(back.index(), 9);
    }

    #[test]
    fn display_prints_inner_value() {
        assert_eq!(format!("{}", NodeId(7)), "7");
        assert_eq!(format!("{}", ScopeId(3)), "3");
        assert_eq!(format!("{}", ExecNodeId(11)), "11");
        assert_eq!(format!("{}", FunctionId::MAIN), "0");
    }

    #[test]
    fn serde_roundtrip() {
        let var = VarId(42);
        let json = serde_json::to_string(&var).unwrap();
        let back: VarId = serde_json::from_str(&json).unwrap();
        assert_eq!(var, back);

        let func = FunctionId(7);
        let json = serde_json::to_string(&func).unwrap();
        let back: FunctionId = serde_json::from_str(&json).unwrap();
        assert_eq!(func, back);
    }
}
