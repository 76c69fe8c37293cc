//! Runtime configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tunables for a [`Runtime`](crate::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust,ignore
/// let config = RuntimeConfig::from_json(r#"{ "log_commits": true }"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of dispatched actions the store keeps for replay.
    pub action_log_capacity: usize,

    /// Append the diagnostic trace (`|hook` segments) to action types.
    pub trace_actions: bool,

    /// Log every commit at `info` instead of `debug`.
    pub log_commits: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            action_log_capacity: 256,
            trace_actions: true,
            log_commits: false,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }
}
