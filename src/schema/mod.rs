pub mod actor;
pub mod condition;
pub mod metadata;
pub mod node;
pub mod package;
pub mod script;
pub mod value;
