/// Dispatcher configuration, loadable from RON.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Capacities and tuning for one dispatcher instance.
///
/// Every field has a default, so a config file only lists what it changes:
///
/// ```ron
/// (recent_history_capacity: 64, seed: 7)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Size of the rolling recent-visit window.
    pub recent_history_capacity: usize,
    /// Initial capacity of the Chapter-scope visited set.
    pub chapter_capacity: usize,
    pub session_capacity: usize,
    pub persistent_capacity: usize,
    /// Threads allocated up front in the thread pool.
    pub thread_pool_capacity: usize,
    /// Scratch variable tables allocated up front.
    pub table_pool_capacity: usize,
    /// Cap on `Step::Continue` chains per thread per tick.
    pub max_steps_per_tick: u32,
    pub seed: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            recent_history_capacity: 32,
            chapter_capacity: 64,
            session_capacity: 256,
            persistent_capacity: 256,
            thread_pool_capacity: 16,
            table_pool_capacity: 16,
            max_steps_per_tick: 64,
            seed: 0,
        }
    }
}

impl DispatchConfig {
    pub fn from_ron(input: &str) -> Result<Self, ConfigError> {
        let config: DispatchConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_ron(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recent_history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "recent_history_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_steps_per_tick == 0 {
            return Err(ConfigError::Invalid(
                "max_steps_per_tick must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
