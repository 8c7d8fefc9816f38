//! Serializable rule descriptions, as embedded in `AddRule` and
//! `DefineRuleset` execution nodes.
//!
//! Literal parameters live in the spec; runtime parameters (callees, lookup
//! tables) come from the node's `argument[i]` children and are consumed in
//! order by [`RuleSpec::instantiate`].

use serde::{Deserialize, Serialize};

use crate::rules::{FreezeRule, Rule, Transform, Validation};
use crate::types::Literal;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSpec {
    MaxSize(usize),
    Acyclic,
    SingleRoot,
    Homogeneous,
    /// Takes the predicate as one argument.
    Predicate { name: String },
    NoneToZero,
    Coalesce(Literal),
    ValidateRange { min: Literal, max: Literal },
    Round(u32),
    Lowercase,
    Uppercase,
    Trim,
    /// Takes the table as one argument.
    Lookup { default: Literal },
    /// Takes the procedure as one argument.
    Custom { name: String },
    /// Takes the predicate, then the arguments of `transform`, then those of
    /// `fallback`.
    Conditional {
        transform: Box<RuleSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<Box<RuleSpec>>,
    },
    RejectMixedFreeze,
    CopyElements,
}

impl RuleSpec {
    /// Number of runtime arguments the rule consumes.
    pub fn arg_count(&self) -> usize {
        match self {
            RuleSpec::Predicate { .. } | RuleSpec::Lookup { .. } | RuleSpec::Custom { .. } => 1,
            RuleSpec::Conditional { transform, fallback } => {
                1 + transform.arg_count() + fallback.as_ref().map_or(0, |f| f.arg_count())
            }
            _ => 0,
        }
    }

    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            RuleSpec::NoneToZero
                | RuleSpec::Coalesce(_)
                | RuleSpec::ValidateRange { .. }
                | RuleSpec::Round(_)
                | RuleSpec::Lowercase
                | RuleSpec::Uppercase
                | RuleSpec::Trim
                | RuleSpec::Lookup { .. }
                | RuleSpec::Custom { .. }
        )
    }

    /// Static well-formedness, checked when the execution graph is built.
    pub fn check(&self) -> Result<(), String> {
        match self {
            RuleSpec::ValidateRange { min, max } => {
                match (min.to_value().as_number(), max.to_value().as_number()) {
                    (Some(lo), Some(hi)) if lo <= hi => Ok(()),
                    (Some(_), Some(_)) => Err(format!("empty range {min}..{max}")),
                    _ => Err("range bounds must be numbers".to_string()),
                }
            }
            RuleSpec::Conditional { transform, fallback } => {
                for branch in std::iter::once(transform).chain(fallback.iter()) {
                    if !branch.is_transformation() {
                        return Err(format!("conditional branch {branch:?} is not a transformation"));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Builds the runtime rule, taking runtime parameters from `args`.
    pub fn instantiate(&self, args: &[Value]) -> Result<Rule, String> {
        if args.len() != self.arg_count() {
            return Err(format!(
                "rule takes {} arguments, got {}",
                self.arg_count(),
                args.len()
            ));
        }
        let mut args = args.iter().cloned();
        let rule = match self {
            RuleSpec::MaxSize(n) => Rule::Validate(Validation::MaxSize(*n)),
            RuleSpec::Acyclic => Rule::Validate(Validation::Acyclic),
            RuleSpec::SingleRoot => Rule::Validate(Validation::SingleRoot),
            RuleSpec::Homogeneous => Rule::Validate(Validation::Homogeneous),
            RuleSpec::Predicate { name } => Rule::Validate(Validation::Predicate {
                name: name.clone(),
                callee: next(&mut args)?,
            }),
            RuleSpec::Conditional { transform, fallback } => {
                let predicate = next(&mut args)?;
                let transform = Box::new(transform.transform(&mut args)?);
                let fallback = match fallback {
                    Some(f) => Some(Box::new(f.transform(&mut args)?)),
                    None => None,
                };
                Rule::Conditional {
                    predicate,
                    transform,
                    fallback,
                }
            }
            RuleSpec::RejectMixedFreeze => Rule::Freeze(FreezeRule::RejectMixed),
            RuleSpec::CopyElements => Rule::Freeze(FreezeRule::CopyElements),
            transform => Rule::Transform(transform.transform(&mut args)?),
        };
        Ok(rule)
    }

    fn transform(&self, args: &mut impl Iterator<Item = Value>) -> Result<Transform, String> {
        let transform = match self {
            RuleSpec::NoneToZero => Transform::NoneToZero,
            RuleSpec::Coalesce(lit) => Transform::Coalesce(lit.to_value()),
            RuleSpec::ValidateRange { min, max } => Transform::ValidateRange {
                min: min.to_value(),
                max: max.to_value(),
            },
            RuleSpec::Round(digits) => Transform::Round(*digits),
            RuleSpec::Lowercase => Transform::Lowercase,
            RuleSpec::Uppercase => Transform::Uppercase,
            RuleSpec::Trim => Transform::Trim,
            RuleSpec::Lookup { default } => Transform::Lookup {
                table: next(args)?,
                default: default.to_value(),
            },
            RuleSpec::Custom { name } => Transform::Custom {
                name: name.clone(),
                callee: next(args)?,
            },
            other => return Err(format!("{other:?} is not a transformation")),
        };
        Ok(transform)
    }
}

fn next(args: &mut impl Iterator<Item = Value>) -> Result<Value, String> {
    args.next().ok_or_else(|| "missing rule argument".to_string())
}
