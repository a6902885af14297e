// ABOUTME: Timing knobs for convergence polling, drain, and pre-flip stabilization.
// ABOUTME: Every wait the orchestrator performs is bounded by one of these.

use serde::Deserialize;
use std::time::Duration;

/// Poll-with-timeout settings used while waiting for fleets to converge.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ConvergenceConfig {
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_convergence_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_convergence_timeout() -> Duration {
    Duration::from_secs(600)
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        ConvergenceConfig {
            poll_interval: default_poll_interval(),
            timeout: default_convergence_timeout(),
        }
    }
}

/// How long the old color keeps draining after a flip before it may be retired.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DrainConfig {
    #[serde(default = "default_drain_wait", with = "humantime_serde")]
    pub wait: Duration,
}

fn default_drain_wait() -> Duration {
    Duration::from_secs(300)
}

impl Default for DrainConfig {
    fn default() -> Self {
        DrainConfig {
            wait: default_drain_wait(),
        }
    }
}

pub(crate) fn default_stabilization() -> Duration {
    Duration::from_secs(30)
}
