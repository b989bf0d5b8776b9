//! Narrative Dispatch — trigger selection and thread scheduling for
//! authored game narrative.
//!
//! Game systems raise triggers; the dispatcher picks which authored node
//! runs for each target actor, keeps at most one narrative thread per
//! target, remembers what has been seen across chapter, session and
//! persistent scopes, and steps running threads cooperatively once per
//! frame.

pub mod core;
pub mod schema;

pub use crate::core::config::DispatchConfig;
pub use crate::core::dispatch::{Dispatcher, DispatcherBuilder, DispatchError, TriggerRequest};
