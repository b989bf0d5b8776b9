use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::value::{Value, VariableTable};

/// Authored identifier of a named actor, e.g. `"Penguin1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An actor is any game object that narrative content can target:
/// a character, a creature, a prop with dialogue.
///
/// Anonymous actors (no id) can still be registered and used as the
/// actor context of a trigger, but no node can target them by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<ActorId>,
    pub name: String,
    pub tags: FxHashSet<String>,
    #[serde(default)]
    pub variables: VariableTable,
}

impl Actor {
    /// Create a named actor with an authored id.
    pub fn named(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id: Some(ActorId(id)),
            ..Self::default()
        }
    }

    /// Create an actor without an authored id.
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| t.to_string()));
        self
    }

    pub fn with_var(mut self, name: &str, value: Value) -> Self {
        self.variables.set(name, value);
        self
    }

    /// Returns true if this actor has the given tag.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_actor() {
        let actor = Actor::named("Penguin1").with_tags(&["penguin", "chatty"]);
        assert_eq!(actor.id, Some(ActorId::from("Penguin1")));
        assert_eq!(actor.name, "Penguin1");
        assert!(actor.has_tag("chatty"));
        assert!(!actor.has_tag("grumpy"));
    }

    #[test]
    fn anonymous_actor_has_no_id() {
        let actor = Actor::anonymous("crowd").with_var("mood", Value::Int(2));
        assert!(actor.id.is_none());
        assert_eq!(actor.variables.get("mood"), Some(&Value::Int(2)));
    }
}
