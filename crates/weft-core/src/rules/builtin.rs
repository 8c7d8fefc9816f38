//! Built-in validations and transformations.
//!
//! Everything here is pure: no callbacks, no mutation. `Err(reason)` from a
//! check is a rejection, from a transform a failure; the engine wraps both
//! in [`MutationError`](crate::error::MutationError) with the rule's name.

use crate::rules::engine::{Mutation, Target};
use crate::rules::{Transform, Validation};
use crate::value::{MapKey, Value};
use crate::value_graph::{GraphKind, ValueGraph};

/// Checks a built-in validation against a proposed mutation.
///
/// Predicates are not built-in and always pass here.
pub fn check(validation: &Validation, graph: &ValueGraph, mutation: &Mutation) -> Result<(), String> {
    match validation {
        Validation::MaxSize(limit) => {
            let after = graph.len() + usize::from(mutation.grows(graph));
            if after > *limit {
                return Err(format!("size would be {after}"));
            }
            Ok(())
        }
        Validation::Acyclic => match mutation {
            Mutation::Link { from, to, .. } => {
                if from == to || graph.link_path_exists(*to, *from) {
                    Err(format!("link {from} -> {to} would close a cycle"))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        },
        Validation::SingleRoot => check_single_root(graph, mutation),
        Validation::Homogeneous => {
            let Some(incoming) = mutation.incoming_member() else {
                return Ok(());
            };
            let replaced = mutation.replaced(graph);
            let expected = graph
                .members()
                .into_iter()
                .filter(|&n| Some(n) != replaced)
                .find_map(|n| graph.value(n).map(Value::value_type));
            match expected {
                Some(expected) if expected != incoming.value_type() => Err(format!(
                    "expected {expected}, found {}",
                    incoming.value_type()
                )),
                _ => Ok(()),
            }
        }
        Validation::Predicate { .. } => Ok(()),
    }
}

fn check_single_root(graph: &ValueGraph, mutation: &Mutation) -> Result<(), String> {
    if !matches!(graph.kind(), GraphKind::User(_)) {
        return Ok(());
    }
    let roots = graph.link_roots();
    match mutation {
        Mutation::AddMember { parent: None, .. } if !roots.is_empty() => {
            Err("graph already has a root".to_string())
        }
        Mutation::Link { to, .. } => {
            let remaining = roots.iter().filter(|&&r| r != *to).count();
            if remaining == 0 {
                Err("link would leave the graph without a root".to_string())
            } else {
                Ok(())
            }
        }
        Mutation::Remove(Target::Node(node)) => {
            // Children linked only from `node` become roots once it is gone.
            let orphans = graph
                .edges_from(*node, None)
                .into_iter()
                .filter(|view| view.edge.label.is_link())
                .filter(|view| {
                    graph
                        .edges_to(view.to, None)
                        .iter()
                        .all(|incoming| !incoming.edge.label.is_link() || incoming.from == *node)
                })
                .count();
            let after = roots.iter().filter(|&&r| r != *node).count() + orphans;
            if after > 1 {
                Err(format!("removal would leave {after} roots"))
            } else {
                Ok(())
            }
        }
        _ => Ok(()),
    }
}

/// Checks a built-in validation against the graph as it stands, for
/// retroactive attachment.
pub fn check_existing(validation: &Validation, graph: &ValueGraph) -> Result<(), String> {
    match validation {
        Validation::MaxSize(limit) => {
            if graph.len() > *limit {
                Err(format!("size is already {}", graph.len()))
            } else {
                Ok(())
            }
        }
        Validation::Acyclic => {
            if graph.has_link_cycle() {
                Err("graph already contains a cycle".to_string())
            } else {
                Ok(())
            }
        }
        Validation::SingleRoot => {
            let roots = graph.link_roots().len();
            if matches!(graph.kind(), GraphKind::User(_)) && roots > 1 {
                Err(format!("graph has {roots} roots"))
            } else {
                Ok(())
            }
        }
        Validation::Homogeneous => {
            let values = graph.member_values();
            let mut types = values.iter().map(Value::value_type);
            match types.next() {
                Some(first) => match types.find(|t| *t != first) {
                    Some(other) => Err(format!("found both {first} and {other}")),
                    None => Ok(()),
                },
                None => Ok(()),
            }
        }
        Validation::Predicate { .. } => Ok(()),
    }
}

/// Applies a built-in transformation. Values of a type the transform does
/// not apply to pass through unchanged.
pub fn apply(transform: &Transform, value: Value) -> Result<Value, String> {
    match transform {
        Transform::NoneToZero => Ok(match value {
            Value::None => Value::Int(0),
            other => other,
        }),
        Transform::Coalesce(replacement) => Ok(match value {
            Value::None => replacement.clone(),
            other => other,
        }),
        Transform::ValidateRange { min, max } => {
            let (Some(lo), Some(hi)) = (min.as_number(), max.as_number()) else {
                return Err("range bounds must be numbers".to_string());
            };
            Ok(match value.as_number() {
                Some(x) if x < lo => min.clone(),
                Some(x) if x > hi => max.clone(),
                _ => value,
            })
        }
        Transform::Round(digits) => Ok(match value {
            Value::Float(x) => {
                // Past 10^308 the scale is infinite; such precision keeps x as is.
                let exp = i32::try_from(*digits).unwrap_or(i32::MAX).min(f64::MAX_10_EXP);
                let scale = 10f64.powi(exp);
                let scaled = x * scale;
                if scaled.is_finite() {
                    Value::Float(scaled.round() / scale)
                } else {
                    Value::Float(x)
                }
            }
            other => other,
        }),
        Transform::Lowercase => Ok(map_str(value, |s| s.to_lowercase())),
        Transform::Uppercase => Ok(map_str(value, |s| s.to_uppercase())),
        Transform::Trim => Ok(map_str(value, |s| s.trim().to_string())),
        Transform::Lookup { table, default } => {
            let Some(table) = table.as_graph() else {
                return Err(format!("lookup table must be a map, found {}", table.type_name()));
            };
            let table = table.borrow();
            if *table.kind() != GraphKind::Map {
                return Err("lookup table must be a map".to_string());
            }
            Ok(MapKey::from_value(&value)
                .and_then(|key| table.get_key(&key))
                .unwrap_or_else(|| default.clone()))
        }
        Transform::Custom { name, .. } => Err(format!("'{name}' needs an evaluator")),
    }
}

fn map_str(value: Value, f: impl Fn(&str) -> String) -> Value {
    match value {
        Value::Str(s) => Value::from(f(&s)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Label;
    use crate::value::GraphRef;

    #[test]
    fn validate_range_clamps() {
        let range = Transform::ValidateRange {
            min: Value::Int(0),
            max: Value::Int(100),
        };
        assert_eq!(apply(&range, Value::Int(-5)).unwrap(), Value::Int(0));
        assert_eq!(apply(&range, Value::Int(150)).unwrap(), Value::Int(100));
        assert_eq!(apply(&range, Value::Int(50)).unwrap(), Value::Int(50));
        assert_eq!(apply(&range, Value::str("x")).unwrap(), Value::str("x"));
    }

    #[test]
    fn none_to_zero_is_idempotent() {
        let once = apply(&Transform::NoneToZero, Value::None).unwrap();
        let twice = apply(&Transform::NoneToZero, once.clone()).unwrap();
        assert_eq!(once, Value::Int(0));
        assert_eq!(twice, once);
    }

    #[test]
    fn string_transforms() {
        assert_eq!(apply(&Transform::Trim, Value::str("  a ")).unwrap(), Value::str("a"));
        assert_eq!(apply(&Transform::Uppercase, Value::str("ab")).unwrap(), Value::str("AB"));
        assert_eq!(apply(&Transform::Lowercase, Value::Int(1)).unwrap(), Value::Int(1));
    }

    #[test]
    fn round_only_touches_floats() {
        assert_eq!(apply(&Transform::Round(2), Value::Float(1.23456)).unwrap(), Value::Float(1.23));
        assert_eq!(apply(&Transform::Round(2), Value::Int(7)).unwrap(), Value::Int(7));
        assert_eq!(apply(&Transform::Round(0), Value::Float(2.5)).unwrap(), Value::Float(3.0));
        for digits in [400, u32::MAX] {
            assert_eq!(apply(&Transform::Round(digits), Value::Float(2.5)).unwrap(), Value::Float(2.5));
        }
    }

    #[test]
    fn lookup_maps_through_table() {
        let table = Value::Graph(GraphRef::new(ValueGraph::from_entries(vec![(
            MapKey::Str("y".into()),
            Value::Bool(true),
        )])));
        let lookup = Transform::Lookup {
            table,
            default: Value::Bool(false),
        };
        assert_eq!(apply(&lookup, Value::str("y")).unwrap(), Value::Bool(true));
        assert_eq!(apply(&lookup, Value::str("n")).unwrap(), Value::Bool(false));
        let bad = Transform::Lookup {
            table: Value::Int(1),
            default: Value::None,
        };
        assert!(apply(&bad, Value::None).is_err());
    }

    #[test]
    fn max_size_counts_growth_only() {
        let graph = ValueGraph::from_elements([Value::Int(1), Value::Int(2)]);
        let limit = Validation::MaxSize(2);
        assert!(check(&limit, &graph, &Mutation::Insert(Value::Int(3))).is_err());
        assert!(check(
            &limit,
            &graph,
            &Mutation::Set {
                index: 0,
                value: Value::Int(3)
            }
        )
        .is_ok());
    }

    #[test]
    fn homogeneous_ignores_the_replaced_member() {
        let graph = ValueGraph::from_elements([Value::str("only")]);
        let rule = Validation::Homogeneous;
        assert!(check(&rule, &graph, &Mutation::Insert(Value::Int(1))).is_err());
        assert!(check(
            &rule,
            &graph,
            &Mutation::Set {
                index: 0,
                value: Value::Int(1)
            }
        )
        .is_ok());
    }

    #[test]
    fn single_root_rejects_second_root() {
        let mut graph = ValueGraph::user("tree");
        let a = graph.add_member(Label::Contains, Value::str("a")).unwrap();
        let rule = Validation::SingleRoot;
        let orphan = Mutation::AddMember {
            value: Value::str("b"),
            parent: None,
        };
        assert!(check(&rule, &graph, &orphan).is_err());
        let child = Mutation::AddMember {
            value: Value::str("b"),
            parent: Some((a, "child".into())),
        };
        assert!(check(&rule, &graph, &child).is_ok());
    }
}
