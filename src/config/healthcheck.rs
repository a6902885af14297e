// ABOUTME: Target group health check configuration.
// ABOUTME: Passed through to the routing layer; the orchestrator never probes itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckSpec {
    #[serde(default = "default_path")]
    pub path: String,

    /// Port to probe. `None` probes the traffic port.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,

    /// HTTP status codes counted as healthy, e.g. `"200"` or `"200-299"`.
    #[serde(default = "default_matcher")]
    pub matcher: String,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_protocol() -> String {
    "HTTP".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_healthy_threshold() -> u32 {
    2
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_matcher() -> String {
    "200".to_string()
}

impl Default for HealthCheckSpec {
    fn default() -> Self {
        HealthCheckSpec {
            path: default_path(),
            port: None,
            protocol: default_protocol(),
            interval: default_interval(),
            timeout: default_timeout(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
            matcher: default_matcher(),
        }
    }
}

impl HealthCheckSpec {
    /// Probe timeout must be shorter than the probe interval.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout >= self.interval {
            return Err(format!(
                "health check timeout ({:?}) must be shorter than interval ({:?})",
                self.timeout, self.interval
            ));
        }
        if self.healthy_threshold == 0 || self.unhealthy_threshold == 0 {
            return Err("health check thresholds must be at least 1".to_string());
        }
        Ok(())
    }
}
