/// Nodes: one unit of triggerable authored content and the metadata that
/// decides when, for whom and how often it may run.
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::actor::ActorId;
use super::condition::ConditionGroup;
use super::package::PackageId;
use super::script::Action;

/// Stable 32-bit node identifier, derived from the node's full name.
///
/// Persistent visitation history stores these, so the derivation must
/// not change between builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// FNV-1a over the UTF-8 bytes of the full name.
    pub const fn from_name(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut hash: u32 = 0x811c_9dc5;
        let mut i = 0;
        while i < bytes.len() {
            hash ^= bytes[i] as u32;
            hash = hash.wrapping_mul(0x0100_0193);
            i += 1;
        }
        Self(hash)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct NodeFlags: u16 {
        const TRIGGER = 1 << 0;
        const FUNCTION = 1 << 1;
        const ONCE = 1 << 2;
        const CUTSCENE = 1 << 3;
        const EXPOSED = 1 << 4;
        const IGNORE_DURING_CUTSCENE = 1 << 5;
        const INTERRUPT_SAME_PRIORITY = 1 << 6;
        const ANY_TARGET = 1 << 7;
        const WEIGHTED = 1 << 8;
        const TIME_COOLDOWN = 1 << 9;
    }
}

/// Priority of a node, and of the thread running it. Ordered lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Priority {
    None,
    Low,
    #[default]
    Medium,
    High,
    Cutscene,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "None",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Cutscene => "Cutscene",
        };
        f.write_str(name)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "cutscene" => Ok(Self::Cutscene),
            _ => Err(format!("unknown priority '{}'", s)),
        }
    }
}

/// Minimum gap between two selections of the same node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Cooldown {
    /// Blocked until this many other trigger-node visits have happened.
    Nodes(u32),
    /// Blocked for this many seconds of simulated time.
    Seconds(f64),
}

impl Cooldown {
    fn validate(&self) -> Result<(), &'static str> {
        match *self {
            Self::Nodes(0) => Err("node-count cooldown must be at least 1"),
            Self::Seconds(s) if !s.is_finite() || s <= 0.0 => {
                Err("time cooldown must be a positive number of seconds")
            }
            _ => Ok(()),
        }
    }
}

/// Where a "visited" fact is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PersistenceScope {
    #[default]
    Untracked,
    Chapter,
    Session,
    Persistent,
}

impl PersistenceScope {
    /// The three scopes backed by a visited-id set.
    pub const TRACKED: [PersistenceScope; 3] = [Self::Chapter, Self::Session, Self::Persistent];

    /// Index into the tracked scope sets; `None` for `Untracked`.
    pub fn tracked_index(self) -> Option<usize> {
        match self {
            Self::Untracked => None,
            Self::Chapter => Some(0),
            Self::Session => Some(1),
            Self::Persistent => Some(2),
        }
    }
}

impl TryFrom<u8> for PersistenceScope {
    type Error = u8;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(Self::Untracked),
            1 => Ok(Self::Chapter),
            2 => Ok(Self::Session),
            3 => Ok(Self::Persistent),
            other => Err(other),
        }
    }
}

impl FromStr for PersistenceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "untracked" | "none" => Ok(Self::Untracked),
            "chapter" => Ok(Self::Chapter),
            "session" => Ok(Self::Session),
            "persistent" | "save" => Ok(Self::Persistent),
            _ => Err(format!("unknown persistence scope '{}'", s)),
        }
    }
}

/// The actor a node applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Target {
    #[default]
    Any,
    Actor(ActorId),
}

impl Target {
    pub fn actor(&self) -> Option<&ActorId> {
        match self {
            Self::Any => None,
            Self::Actor(id) => Some(id),
        }
    }
}

/// A compiled node.
///
/// Nodes are created only through [`Package::create_node`](super::package::Package::create_node)
/// and live exactly as long as their package. Metadata setters are the
/// single place node invariants are enforced: a setter that would break
/// one logs a warning, leaves the node untouched and returns `false`.
#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    name: String,
    package: PackageId,
    flags: NodeFlags,
    event_id: Option<String>,
    target: Target,
    conditions: ConditionGroup,
    priority: Priority,
    cooldown: Option<Cooldown>,
    scope: PersistenceScope,
    weight: f32,
    score_adjust: i32,
    script: Vec<Action>,
}

impl Node {
    pub(crate) fn new(package: PackageId, full_name: String) -> Self {
        Self {
            id: NodeId::from_name(&full_name),
            name: full_name,
            package,
            flags: NodeFlags::ANY_TARGET,
            event_id: None,
            target: Target::Any,
            conditions: ConditionGroup::default(),
            priority: Priority::Medium,
            cooldown: None,
            scope: PersistenceScope::Untracked,
            weight: 1.0,
            score_adjust: 0,
            script: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Full name, `package.node`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn package(&self) -> PackageId {
        self.package
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn has(&self, flag: NodeFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_trigger(&self) -> bool {
        self.has(NodeFlags::TRIGGER)
    }

    pub fn is_function(&self) -> bool {
        self.has(NodeFlags::FUNCTION)
    }

    pub fn is_cutscene(&self) -> bool {
        self.has(NodeFlags::CUTSCENE)
    }

    /// The trigger or function id this node responds to.
    pub fn event_id(&self) -> Option<&str> {
        self.event_id.as_deref()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn conditions(&self) -> &ConditionGroup {
        &self.conditions
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn cooldown(&self) -> Option<Cooldown> {
        self.cooldown
    }

    pub fn scope(&self) -> PersistenceScope {
        self.scope
    }

    /// Selection weight; 1 for unweighted nodes.
    pub fn weight(&self) -> f32 {
        if self.has(NodeFlags::WEIGHTED) {
            self.weight
        } else {
            1.0
        }
    }

    /// Evaluation specificity: more conditions sort first.
    pub fn sorting_score(&self) -> i32 {
        self.conditions.len() as i32 + self.score_adjust
    }

    pub fn script(&self) -> &[Action] {
        &self.script
    }

    // --- metadata setters -------------------------------------------------

    pub fn set_trigger(&mut self, trigger_id: impl Into<String>) -> bool {
        if self.has(NodeFlags::FUNCTION) {
            return self.reject("trigger", "node is already a function");
        }
        self.flags.insert(NodeFlags::TRIGGER);
        self.event_id = Some(trigger_id.into());
        true
    }

    pub fn set_function(&mut self, function_id: impl Into<String>) -> bool {
        if self.has(NodeFlags::TRIGGER) {
            return self.reject("function", "node is already a trigger");
        }
        self.flags.insert(NodeFlags::FUNCTION);
        self.event_id = Some(function_id.into());
        true
    }

    pub fn set_target(&mut self, target: Target) -> bool {
        if !self.is_trigger() {
            return self.reject("who", "requires a trigger node");
        }
        self.flags.set(NodeFlags::ANY_TARGET, target == Target::Any);
        self.target = target;
        true
    }

    pub fn set_conditions(&mut self, conditions: ConditionGroup) -> bool {
        if !self.is_trigger() && !self.is_function() {
            return self.reject("conditions", "requires a trigger or function node");
        }
        self.conditions = conditions;
        true
    }

    pub fn set_priority(&mut self, priority: Priority) -> bool {
        if !self.is_trigger() {
            return self.reject("priority", "requires a trigger node");
        }
        if self.is_cutscene() && priority != Priority::Cutscene {
            return self.reject("priority", "cutscene nodes always run at cutscene priority");
        }
        if !self.is_cutscene() && priority == Priority::Cutscene {
            return self.reject("priority", "cutscene priority is reserved for cutscene nodes");
        }
        self.priority = priority;
        true
    }

    pub fn set_cutscene(&mut self) -> bool {
        self.flags.insert(NodeFlags::CUTSCENE);
        self.priority = Priority::Cutscene;
        true
    }

    pub fn set_once(&mut self) -> bool {
        if self.cooldown.is_some() {
            return self.reject("once", "node already has a cooldown");
        }
        self.flags.insert(NodeFlags::ONCE);
        true
    }

    pub fn set_cooldown(&mut self, cooldown: Cooldown) -> bool {
        if !self.is_trigger() {
            return self.reject("cooldown", "requires a trigger node");
        }
        if self.has(NodeFlags::ONCE) {
            return self.reject("cooldown", "once nodes cannot have a cooldown");
        }
        if let Err(reason) = cooldown.validate() {
            return self.reject("cooldown", reason);
        }
        self.flags
            .set(NodeFlags::TIME_COOLDOWN, matches!(cooldown, Cooldown::Seconds(_)));
        self.cooldown = Some(cooldown);
        true
    }

    pub fn set_exposed(&mut self) -> bool {
        self.flags.insert(NodeFlags::EXPOSED);
        true
    }

    pub fn set_ignore_during_cutscene(&mut self) -> bool {
        if !self.is_trigger() {
            return self.reject("ignoreDuringCutscene", "requires a trigger node");
        }
        self.flags.insert(NodeFlags::IGNORE_DURING_CUTSCENE);
        true
    }

    pub fn set_interrupt_same_priority(&mut self) -> bool {
        if !self.is_trigger() {
            return self.reject("interrupt", "requires a trigger node");
        }
        self.flags.insert(NodeFlags::INTERRUPT_SAME_PRIORITY);
        true
    }

    pub fn set_scope(&mut self, scope: PersistenceScope) -> bool {
        self.scope = scope;
        true
    }

    pub fn set_weight(&mut self, weight: f32) -> bool {
        if !self.is_trigger() && !self.is_function() {
            return self.reject("weight", "requires a trigger or function node");
        }
        if !weight.is_finite() || weight <= 0.0 {
            return self.reject("weight", "weight must be a positive number");
        }
        self.flags.insert(NodeFlags::WEIGHTED);
        self.weight = weight;
        true
    }

    pub fn set_score_adjust(&mut self, adjust: i32) -> bool {
        if !self.is_trigger() && !self.is_function() {
            return self.reject("boostScore", "requires a trigger or function node");
        }
        self.score_adjust = adjust;
        true
    }

    pub fn set_script(&mut self, script: Vec<Action>) {
        self.script = script;
    }

    fn reject(&self, kind: &str, reason: &str) -> bool {
        warn!(node = %self.name, metadata = kind, reason, "ignoring node metadata");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::condition::{Condition, VarRef};

    fn make_node() -> Node {
        Node::new(PackageId(0), "penguins.greet".to_string())
    }

    #[test]
    fn node_id_is_stable() {
        // FNV-1a reference values.
        assert_eq!(NodeId::from_name("").0, 0x811c_9dc5);
        assert_eq!(NodeId::from_name("a").0, 0xe40c_292c);
        let node = make_node();
        assert_eq!(node.id(), NodeId::from_name("penguins.greet"));
    }

    #[test]
    fn defaults() {
        let node = make_node();
        assert_eq!(node.priority(), Priority::Medium);
        assert_eq!(node.scope(), PersistenceScope::Untracked);
        assert_eq!(node.target(), &Target::Any);
        assert!(node.has(NodeFlags::ANY_TARGET));
        assert_eq!(node.weight(), 1.0);
        assert_eq!(node.sorting_score(), 0);
    }

    #[test]
    fn trigger_and_function_are_exclusive() {
        let mut node = make_node();
        assert!(node.set_trigger("Greet"));
        assert!(!node.set_function("DoThing"));
        assert!(node.is_trigger());
        assert!(!node.is_function());
        assert_eq!(node.event_id(), Some("Greet"));

        let mut func = make_node();
        assert!(func.set_function("DoThing"));
        assert!(!func.set_trigger("Greet"));
        assert_eq!(func.event_id(), Some("DoThing"));
    }

    #[test]
    fn trigger_metadata_rejected_without_trigger() {
        let mut node = make_node();
        assert!(!node.set_target(Target::Actor(ActorId::from("Penguin1"))));
        assert!(!node.set_priority(Priority::High));
        assert!(!node.set_cooldown(Cooldown::Nodes(3)));
        assert!(!node.set_weight(2.0));
        assert_eq!(node.target(), &Target::Any);
        assert_eq!(node.priority(), Priority::Medium);
        assert!(node.cooldown().is_none());
    }

    #[test]
    fn once_and_cooldown_are_exclusive() {
        let mut node = make_node();
        node.set_trigger("Greet");
        assert!(node.set_once());
        assert!(!node.set_cooldown(Cooldown::Seconds(5.0)));
        assert!(node.cooldown().is_none());

        let mut other = make_node();
        other.set_trigger("Greet");
        assert!(other.set_cooldown(Cooldown::Seconds(5.0)));
        assert!(other.has(NodeFlags::TIME_COOLDOWN));
        assert!(!other.set_once());
        assert!(!other.has(NodeFlags::ONCE));
    }

    #[test]
    fn invalid_cooldowns_rejected() {
        let mut node = make_node();
        node.set_trigger("Greet");
        assert!(!node.set_cooldown(Cooldown::Nodes(0)));
        assert!(!node.set_cooldown(Cooldown::Seconds(-1.0)));
        assert!(!node.set_cooldown(Cooldown::Seconds(f64::NAN)));
        assert!(node.set_cooldown(Cooldown::Nodes(2)));
        assert!(!node.has(NodeFlags::TIME_COOLDOWN));
    }

    #[test]
    fn cutscene_forces_priority() {
        let mut node = make_node();
        node.set_trigger("Intro");
        assert!(node.set_priority(Priority::Low));
        node.set_cutscene();
        assert_eq!(node.priority(), Priority::Cutscene);
        assert!(!node.set_priority(Priority::High));
        assert!(node.set_priority(Priority::Cutscene));
        assert_eq!(node.priority(), Priority::Cutscene);
    }

    #[test]
    fn cutscene_priority_reserved() {
        let mut node = make_node();
        node.set_trigger("Greet");
        assert!(!node.set_priority(Priority::Cutscene));
        assert_eq!(node.priority(), Priority::Medium);
    }

    #[test]
    fn target_updates_any_flag() {
        let mut node = make_node();
        node.set_trigger("Greet");
        node.set_target(Target::Actor(ActorId::from("Penguin1")));
        assert!(!node.has(NodeFlags::ANY_TARGET));
        node.set_target(Target::Any);
        assert!(node.has(NodeFlags::ANY_TARGET));
    }

    #[test]
    fn weight_validation() {
        let mut node = make_node();
        node.set_trigger("Greet");
        assert!(!node.set_weight(0.0));
        assert!(!node.set_weight(f32::INFINITY));
        assert_eq!(node.weight(), 1.0);
        assert!(node.set_weight(3.0));
        assert!(node.has(NodeFlags::WEIGHTED));
        assert_eq!(node.weight(), 3.0);
    }

    #[test]
    fn sorting_score_counts_conditions() {
        let mut node = make_node();
        node.set_trigger("Greet");
        node.set_conditions(ConditionGroup::new(vec![
            Condition::Var(VarRef::global("a")),
            Condition::Var(VarRef::global("b")),
        ]));
        node.set_score_adjust(3);
        assert_eq!(node.sorting_score(), 5);
    }

    #[test]
    fn parse_enums() {
        assert_eq!("high".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(
            "Session".parse::<PersistenceScope>(),
            Ok(PersistenceScope::Session)
        );
        assert_eq!(PersistenceScope::try_from(3), Ok(PersistenceScope::Persistent));
        assert_eq!(PersistenceScope::try_from(9), Err(9));
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::None < Priority::Low);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Cutscene);
    }
}
