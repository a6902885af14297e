// ABOUTME: Launch lifecycle hook configuration.
// ABOUTME: Heartbeat timeout and the result applied when bootstrap never reports back.

use serde::Deserialize;
use std::time::Duration;

use crate::lifecycle::LifecycleResult;

#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_heartbeat_timeout", with = "humantime_serde")]
    pub heartbeat_timeout: Duration,

    #[serde(default = "default_result")]
    pub default_result: LifecycleResult,
}

fn default_heartbeat_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_result() -> LifecycleResult {
    LifecycleResult::Abandon
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        LifecycleConfig {
            heartbeat_timeout: default_heartbeat_timeout(),
            default_result: default_result(),
        }
    }
}
