// ABOUTME: Selects which fleet manager / routing layer backend to talk to.
// ABOUTME: `memory` simulates both in-process; `http` talks to a controller endpoint.

use serde::Deserialize;
use std::time::Duration;

use super::EnvValue;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// Simulated fleets seeded from the configured capacities.
    #[default]
    Memory,

    /// JSON over HTTP/1.1.
    Http {
        /// `host:port` or `http://host:port`.
        endpoint: String,

        #[serde(default)]
        auth_token: Option<EnvValue>,

        #[serde(default = "default_request_timeout", with = "humantime_serde")]
        request_timeout: Duration,
    },
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}
