/// Compiled condition groups attached to nodes and script waits.
///
/// The expression compiler that produces these lives outside this crate;
/// this is the compiled form the dispatcher hands to a
/// [`ConditionEvaluator`](crate::core::conditions::ConditionEvaluator).
use serde::{Deserialize, Serialize};

use super::node::PersistenceScope;
use super::value::Value;

/// Which variable table a reference reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarScope {
    Global,
    Chapter,
    Session,
    /// Variables of the trigger's target actor (or actor context).
    Actor,
    /// Thread-local variables passed with the trigger.
    Local,
    /// Answered by a named custom resolver.
    Custom,
}

/// A reference to a variable in a given scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarRef {
    pub scope: VarScope,
    pub name: String,
}

impl VarRef {
    pub fn new(scope: VarScope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    pub fn global(name: impl Into<String>) -> Self {
        Self::new(VarScope::Global, name)
    }

    pub fn actor(name: impl Into<String>) -> Self {
        Self::new(VarScope::Actor, name)
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self::new(VarScope::Local, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A single compiled test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// The variable exists and is truthy.
    Var(VarRef),
    Compare {
        var: VarRef,
        op: CompareOp,
        value: Value,
    },
    /// The named node has been visited in the given persistence scope.
    Visited {
        node: String,
        scope: PersistenceScope,
    },
    /// The named node is among the last `window` recorded visits.
    SeenRecently { node: String, window: usize },
    /// The resolved target actor carries the tag.
    TargetHasTag(String),
    Not(Box<Condition>),
    Any(Vec<Condition>),
}

/// A conjunction of conditions. An empty group is always true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionGroup {
    conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn single(condition: Condition) -> Self {
        Self {
            conditions: vec![condition],
        }
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_from_ron() {
        let ron_text = r#"[
            Compare(var: (scope: Global, name: "fish"), op: Ge, value: Int(3)),
            Not(TargetHasTag("sleepy")),
        ]"#;
        let group: ConditionGroup = ron::from_str(ron_text).unwrap();
        assert_eq!(group.len(), 2);
        assert!(matches!(
            &group.conditions()[0],
            Condition::Compare { op: CompareOp::Ge, value: Value::Int(3), .. }
        ));
    }

    #[test]
    fn empty_group() {
        let group = ConditionGroup::default();
        assert!(group.is_empty());
    }
}
