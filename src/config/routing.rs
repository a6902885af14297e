// ABOUTME: Target group roles and listener override configuration.
// ABOUTME: A role without paths or hosts is the default (catch-all) group.

use serde::Deserialize;

use super::HealthCheckSpec;
use crate::fleet::{RouteMatch, TargetGroupSpec};
use crate::routing::{FixedResponse, Redirect};
use crate::types::ResourceName;

#[derive(Debug, Clone, Deserialize)]
pub struct TargetGroupConfig {
    pub role: ResourceName,

    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub priority: Option<u32>,

    #[serde(default)]
    pub health_check: HealthCheckSpec,
}

impl TargetGroupConfig {
    pub fn to_spec(&self) -> TargetGroupSpec {
        TargetGroupSpec {
            role: self.role.clone(),
            route: RouteMatch {
                paths: self.paths.clone(),
                hosts: self.hosts.clone(),
            },
            priority: self.priority,
            health_check: self.health_check.clone(),
        }
    }
}

/// Replaces the default forward action, e.g. during maintenance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerOverride {
    FixedResponse(FixedResponse),
    Redirect(Redirect),
}

impl ListenerOverride {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            ListenerOverride::FixedResponse(response) => response.validate(),
            ListenerOverride::Redirect(redirect) => redirect.validate(),
        }
    }
}
