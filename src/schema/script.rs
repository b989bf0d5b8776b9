/// Authored node bodies: a flat list of actions run by
/// [`ScriptBody`](crate::core::thread::ScriptBody).
use serde::{Deserialize, Serialize};

use super::condition::{ConditionGroup, VarRef};
use super::value::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Suspend for `seconds`, plus or minus up to `variance`.
    Wait {
        seconds: f64,
        #[serde(default)]
        variance: f64,
    },
    /// Suspend until the group evaluates true.
    WaitUntil(ConditionGroup),
    Set { var: VarRef, value: Value },
    /// Raise another trigger once the current tick's thread pass ends.
    Emit {
        trigger: String,
        #[serde(default)]
        target: Option<String>,
    },
    Log(String),
}
