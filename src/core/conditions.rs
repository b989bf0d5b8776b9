/// Condition evaluation against live game state.
use std::cmp::Ordering;
use thiserror::Error;

use crate::core::persistence::PersistenceMap;
use crate::core::variables::{Resolvers, Variables};
use crate::schema::actor::Actor;
use crate::schema::condition::{CompareOp, Condition, ConditionGroup, VarRef, VarScope};
use crate::schema::node::NodeId;
use crate::schema::value::{Value, VariableTable};

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("actor variable '{0}' read with no actor in context")]
    NoActor(String),
    #[error("no resolver registered for custom variable '{0}'")]
    UnknownResolver(String),
    #[error("cannot compare {left} {op:?} {right}")]
    Incomparable {
        left: Value,
        op: CompareOp,
        right: Value,
    },
}

/// Everything a condition may read.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub variables: &'a Variables,
    pub persistence: &'a PersistenceMap,
    pub resolvers: &'a Resolvers,
    /// The trigger's actor context, falling back to the target actor.
    pub actor: Option<&'a Actor>,
    /// Thread-local variables passed with the trigger.
    pub locals: Option<&'a VariableTable>,
    pub now: f64,
}

impl<'a> EvalContext<'a> {
    pub fn lookup(&self, var: &VarRef) -> Result<Option<Value>, ConditionError> {
        let value = match var.scope {
            VarScope::Global | VarScope::Chapter | VarScope::Session => {
                self.variables.get(var.scope, &var.name).cloned()
            }
            VarScope::Actor => {
                let actor = self
                    .actor
                    .ok_or_else(|| ConditionError::NoActor(var.name.clone()))?;
                actor.variables.get(&var.name).cloned()
            }
            VarScope::Local => self.locals.and_then(|l| l.get(&var.name)).cloned(),
            VarScope::Custom => self
                .resolvers
                .resolve(&var.name)
                .ok_or_else(|| ConditionError::UnknownResolver(var.name.clone()))?,
        };
        Ok(value)
    }
}

/// Decides whether a compiled condition group holds.
///
/// The dispatcher treats an `Err` as false.
pub trait ConditionEvaluator {
    fn evaluate(&self, group: &ConditionGroup, ctx: &EvalContext<'_>)
        -> Result<bool, ConditionError>;
}

/// Evaluates the built-in [`Condition`] forms. A group is the conjunction
/// of its conditions; missing variables are false.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardEvaluator;

impl ConditionEvaluator for StandardEvaluator {
    fn evaluate(
        &self,
        group: &ConditionGroup,
        ctx: &EvalContext<'_>,
    ) -> Result<bool, ConditionError> {
        for condition in group.conditions() {
            if !eval_condition(condition, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn eval_condition(condition: &Condition, ctx: &EvalContext<'_>) -> Result<bool, ConditionError> {
    match condition {
        Condition::Var(var) => Ok(ctx.lookup(var)?.is_some_and(|v| v.is_truthy())),
        Condition::Compare { var, op, value } => match ctx.lookup(var)? {
            Some(current) => compare(&current, *op, value),
            None => Ok(false),
        },
        Condition::Visited { node, scope } => {
            Ok(ctx.persistence.has_seen(NodeId::from_name(node), *scope))
        }
        Condition::SeenRecently { node, window } => Ok(ctx
            .persistence
            .has_recently_seen(NodeId::from_name(node), *window)),
        Condition::TargetHasTag(tag) => Ok(ctx.actor.is_some_and(|a| a.has_tag(tag))),
        Condition::Not(inner) => Ok(!eval_condition(inner, ctx)?),
        Condition::Any(options) => {
            for option in options {
                if eval_condition(option, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Result<bool, ConditionError> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::String(_), _) | (_, Value::String(_)) => None,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    let Some(ordering) = ordering else {
        return match op {
            CompareOp::Eq => Ok(false),
            CompareOp::Ne => Ok(true),
            _ => Err(ConditionError::Incomparable {
                left: left.clone(),
                op,
                right: right.clone(),
            }),
        };
    };
    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::node::PersistenceScope;

    struct Fixture {
        variables: Variables,
        persistence: PersistenceMap,
        resolvers: Resolvers,
        actor: Actor,
    }

    fn make_fixture() -> Fixture {
        let mut variables = Variables::new();
        variables.global.set("fish", Value::Int(3));
        variables.chapter.set("mood", Value::String("grumpy".into()));
        let mut resolvers = Resolvers::new();
        resolvers.register("clock", Box::new(|_: &str| Some(Value::Int(21))));
        Fixture {
            variables,
            persistence: PersistenceMap::default(),
            resolvers,
            actor: Actor::named("Penguin1")
                .with_tags(&["hungry"])
                .with_var("waddles", Value::Bool(true)),
        }
    }

    fn eval(f: &Fixture, conditions: Vec<Condition>, with_actor: bool) -> Result<bool, ConditionError> {
        let ctx = EvalContext {
            variables: &f.variables,
            persistence: &f.persistence,
            resolvers: &f.resolvers,
            actor: with_actor.then_some(&f.actor),
            locals: None,
            now: 0.0,
        };
        StandardEvaluator.evaluate(&ConditionGroup::new(conditions), &ctx)
    }

    fn cmp(var: VarRef, op: CompareOp, value: Value) -> Condition {
        Condition::Compare { var, op, value }
    }

    #[test]
    fn empty_group_is_true() {
        let f = make_fixture();
        assert_eq!(eval(&f, vec![], false), Ok(true));
    }

    #[test]
    fn numeric_comparisons_mix_int_and_float() {
        let f = make_fixture();
        let fish = VarRef::global("fish");
        assert_eq!(eval(&f, vec![cmp(fish.clone(), CompareOp::Ge, Value::Float(3.0))], false), Ok(true));
        assert_eq!(eval(&f, vec![cmp(fish.clone(), CompareOp::Lt, Value::Int(3))], false), Ok(false));
        assert_eq!(eval(&f, vec![cmp(fish, CompareOp::Ne, Value::String("x".into()))], false), Ok(true));
    }

    #[test]
    fn ordering_string_against_number_errors() {
        let f = make_fixture();
        let result = eval(
            &f,
            vec![cmp(VarRef::new(VarScope::Chapter, "mood"), CompareOp::Gt, Value::Int(1))],
            false,
        );
        assert!(matches!(result, Err(ConditionError::Incomparable { .. })));
    }

    #[test]
    fn missing_variable_is_false() {
        let f = make_fixture();
        assert_eq!(eval(&f, vec![Condition::Var(VarRef::global("nope"))], false), Ok(false));
        assert_eq!(
            eval(&f, vec![cmp(VarRef::global("nope"), CompareOp::Eq, Value::Int(0))], false),
            Ok(false)
        );
    }

    #[test]
    fn actor_scope_and_tags() {
        let f = make_fixture();
        assert_eq!(eval(&f, vec![Condition::Var(VarRef::actor("waddles"))], true), Ok(true));
        assert_eq!(eval(&f, vec![Condition::TargetHasTag("hungry".into())], true), Ok(true));
        assert_eq!(eval(&f, vec![Condition::TargetHasTag("hungry".into())], false), Ok(false));
        assert_eq!(
            eval(&f, vec![Condition::Var(VarRef::actor("waddles"))], false),
            Err(ConditionError::NoActor("waddles".into()))
        );
    }

    #[test]
    fn custom_resolvers() {
        let f = make_fixture();
        let hour = VarRef::new(VarScope::Custom, "clock.hour");
        assert_eq!(eval(&f, vec![cmp(hour, CompareOp::Gt, Value::Int(20))], false), Ok(true));
        assert_eq!(
            eval(&f, vec![Condition::Var(VarRef::new(VarScope::Custom, "moon.phase"))], false),
            Err(ConditionError::UnknownResolver("moon.phase".into()))
        );
    }

    #[test]
    fn visited_and_combinators() {
        let mut f = make_fixture();
        f.persistence
            .record_visit(NodeId::from_name("penguins.greet"), PersistenceScope::Session, 1.0, true);
        let visited = Condition::Visited {
            node: "penguins.greet".into(),
            scope: PersistenceScope::Session,
        };
        let recently = Condition::SeenRecently {
            node: "penguins.greet".into(),
            window: 1,
        };
        assert_eq!(eval(&f, vec![visited.clone(), recently], false), Ok(true));
        assert_eq!(eval(&f, vec![Condition::Not(Box::new(visited.clone()))], false), Ok(false));
        let never = Condition::Var(VarRef::global("nope"));
        assert_eq!(eval(&f, vec![Condition::Any(vec![never, visited])], false), Ok(true));
    }
}
