/// Node metadata: a closed set of tagged variants, parsed from authored
/// `@tag args` lines and applied to nodes through a fixed dispatch table.
use std::fmt;
use thiserror::Error;

use super::actor::ActorId;
use super::condition::ConditionGroup;
use super::node::{Cooldown, Node, PersistenceScope, Priority, Target};

#[derive(Debug, Error, PartialEq)]
pub enum MetadataError {
    #[error("metadata line must start with '@': {0}")]
    MissingAt(String),
    #[error("unknown metadata tag '@{0}'")]
    UnknownTag(String),
    #[error("'@{tag}' expects an argument")]
    MissingArgument { tag: String },
    #[error("'@{tag}' takes no argument, got '{arg}'")]
    UnexpectedArgument { tag: String, arg: String },
    #[error("invalid argument for '@{tag}': {reason}")]
    InvalidArgument { tag: String, reason: String },
}

/// One piece of node metadata with its typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeMetadata {
    Trigger(String),
    Function(String),
    Who(Target),
    Conditions(ConditionGroup),
    Priority(Priority),
    Once,
    Cutscene,
    Exposed,
    IgnoreDuringCutscene,
    InterruptSamePriority,
    Cooldown(Cooldown),
    Scope(PersistenceScope),
    Weight(f32),
    BoostScore(i32),
}

/// Payload-free discriminant of [`NodeMetadata`], used to index the
/// apply table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Trigger,
    Function,
    Who,
    Conditions,
    Priority,
    Once,
    Cutscene,
    Exposed,
    IgnoreDuringCutscene,
    InterruptSamePriority,
    Cooldown,
    Scope,
    Weight,
    BoostScore,
}

impl MetadataKind {
    pub const COUNT: usize = 14;

    /// Authored tag name, without the leading `@`.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Trigger => "trigger",
            Self::Function => "function",
            Self::Who => "who",
            Self::Conditions => "when",
            Self::Priority => "priority",
            Self::Once => "once",
            Self::Cutscene => "cutscene",
            Self::Exposed => "exposed",
            Self::IgnoreDuringCutscene => "ignoreDuringCutscene",
            Self::InterruptSamePriority => "interrupt",
            Self::Cooldown => "cooldown",
            Self::Scope => "scope",
            Self::Weight => "weight",
            Self::BoostScore => "boostScore",
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.tag())
    }
}

type ApplyFn = fn(&mut Node, NodeMetadata) -> bool;

/// Kind → setter, in `MetadataKind` declaration order.
static APPLY_TABLE: [ApplyFn; MetadataKind::COUNT] = [
    |node, meta| match meta {
        NodeMetadata::Trigger(id) => node.set_trigger(id),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::Function(id) => node.set_function(id),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::Who(target) => node.set_target(target),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::Conditions(group) => node.set_conditions(group),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::Priority(p) => node.set_priority(p),
        _ => false,
    },
    |node, _| node.set_once(),
    |node, _| node.set_cutscene(),
    |node, _| node.set_exposed(),
    |node, _| node.set_ignore_during_cutscene(),
    |node, _| node.set_interrupt_same_priority(),
    |node, meta| match meta {
        NodeMetadata::Cooldown(c) => node.set_cooldown(c),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::Scope(s) => node.set_scope(s),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::Weight(w) => node.set_weight(w),
        _ => false,
    },
    |node, meta| match meta {
        NodeMetadata::BoostScore(b) => node.set_score_adjust(b),
        _ => false,
    },
];

impl NodeMetadata {
    pub fn kind(&self) -> MetadataKind {
        match self {
            Self::Trigger(_) => MetadataKind::Trigger,
            Self::Function(_) => MetadataKind::Function,
            Self::Who(_) => MetadataKind::Who,
            Self::Conditions(_) => MetadataKind::Conditions,
            Self::Priority(_) => MetadataKind::Priority,
            Self::Once => MetadataKind::Once,
            Self::Cutscene => MetadataKind::Cutscene,
            Self::Exposed => MetadataKind::Exposed,
            Self::IgnoreDuringCutscene => MetadataKind::IgnoreDuringCutscene,
            Self::InterruptSamePriority => MetadataKind::InterruptSamePriority,
            Self::Cooldown(_) => MetadataKind::Cooldown,
            Self::Scope(_) => MetadataKind::Scope,
            Self::Weight(_) => MetadataKind::Weight,
            Self::BoostScore(_) => MetadataKind::BoostScore,
        }
    }

    /// Apply to a node. Returns `false` if the node rejected it; the
    /// node is unchanged in that case.
    pub fn apply(self, node: &mut Node) -> bool {
        let apply = APPLY_TABLE[self.kind() as usize];
        apply(node, self)
    }

    /// Parse an authored metadata line such as `@cooldown 2.5s`.
    ///
    /// Conditions are not expressible as a tag line; they arrive already
    /// compiled, so `@when` is reported as an unknown tag here.
    pub fn parse(line: &str) -> Result<NodeMetadata, MetadataError> {
        let line = line.trim();
        let body = line
            .strip_prefix('@')
            .ok_or_else(|| MetadataError::MissingAt(line.to_string()))?;
        let (tag, arg) = match body.split_once(char::is_whitespace) {
            Some((tag, arg)) => (tag, arg.trim()),
            None => (body, ""),
        };

        let needs_arg = || {
            if arg.is_empty() {
                Err(MetadataError::MissingArgument {
                    tag: tag.to_string(),
                })
            } else {
                Ok(arg)
            }
        };
        let no_arg = |meta: NodeMetadata| {
            if arg.is_empty() {
                Ok(meta)
            } else {
                Err(MetadataError::UnexpectedArgument {
                    tag: tag.to_string(),
                    arg: arg.to_string(),
                })
            }
        };
        let invalid = |reason: String| MetadataError::InvalidArgument {
            tag: tag.to_string(),
            reason,
        };

        match tag {
            "trigger" => Ok(NodeMetadata::Trigger(needs_arg()?.to_string())),
            "function" => Ok(NodeMetadata::Function(needs_arg()?.to_string())),
            "who" => {
                let who = needs_arg()?;
                if who == "*" || who.eq_ignore_ascii_case("any") {
                    Ok(NodeMetadata::Who(Target::Any))
                } else {
                    Ok(NodeMetadata::Who(Target::Actor(ActorId::from(who))))
                }
            }
            "priority" => needs_arg()?
                .parse::<Priority>()
                .map(NodeMetadata::Priority)
                .map_err(invalid),
            "once" => no_arg(NodeMetadata::Once),
            "cutscene" => no_arg(NodeMetadata::Cutscene),
            "exposed" => no_arg(NodeMetadata::Exposed),
            "ignoreDuringCutscene" => no_arg(NodeMetadata::IgnoreDuringCutscene),
            "interrupt" => no_arg(NodeMetadata::InterruptSamePriority),
            "cooldown" => parse_cooldown(needs_arg()?)
                .map(NodeMetadata::Cooldown)
                .map_err(invalid),
            "scope" => needs_arg()?
                .parse::<PersistenceScope>()
                .map(NodeMetadata::Scope)
                .map_err(invalid),
            "weight" => needs_arg()?
                .parse::<f32>()
                .map(NodeMetadata::Weight)
                .map_err(|e| invalid(e.to_string())),
            "boostScore" => needs_arg()?
                .parse::<i32>()
                .map(NodeMetadata::BoostScore)
                .map_err(|e| invalid(e.to_string())),
            other => Err(MetadataError::UnknownTag(other.to_string())),
        }
    }
}

/// `4` is a node-count window, `2.5s` a time window.
fn parse_cooldown(arg: &str) -> Result<Cooldown, String> {
    if let Some(seconds) = arg.strip_suffix('s') {
        seconds
            .trim()
            .parse::<f64>()
            .map(Cooldown::Seconds)
            .map_err(|e| format!("'{}': {}", arg, e))
    } else {
        arg.parse::<u32>()
            .map(Cooldown::Nodes)
            .map_err(|e| format!("'{}': {}", arg, e))
    }
}
