use serde::{Deserialize, Serialize};
use tracker_core::ReconnectPolicy;

pub const DEFAULT_BASE_URL: &str = "ws://127.0.0.1:8000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// WebSocket origin; task streams live under `/ws/progress/{task_id}`.
    pub base_url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
