pub mod actor_map;
pub mod conditions;
pub mod config;
pub mod dispatch;
pub mod loader;
pub mod persistence;
pub mod runtime;
pub mod thread;
pub mod thread_map;
pub mod variables;
