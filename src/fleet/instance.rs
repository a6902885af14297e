// ABOUTME: Observed fleet members as reported by the external fleet manager.
// ABOUTME: Lifecycle and health state are read-only from the orchestrator's side.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Color, InstanceId, LifecycleToken};

/// Where an instance is in its launch/terminate lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Launched but still held by the lifecycle gate.
    Pending,
    /// Released by the lifecycle gate; eligible for traffic.
    InService,
    /// Abandoned, scaled in, or interrupted.
    Terminating,
}

/// Result of the instance's health checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

/// A single fleet member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub color: Color,
    pub lifecycle_state: LifecycleState,
    pub health: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_token: Option<LifecycleToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launched_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// An instance that is in service and healthy.
    pub fn serving(id: impl Into<String>, color: Color) -> Self {
        Self {
            id: InstanceId::new(id),
            color,
            lifecycle_state: LifecycleState::InService,
            health: HealthStatus::Healthy,
            lifecycle_token: None,
            launched_at: None,
        }
    }

    /// An instance still held at launch.
    pub fn pending(id: impl Into<String>, color: Color) -> Self {
        Self {
            lifecycle_state: LifecycleState::Pending,
            health: HealthStatus::Unknown,
            ..Self::serving(id, color)
        }
    }

    pub fn with_health(mut self, health: HealthStatus) -> Self {
        self.health = health;
        self
    }

    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.lifecycle_state = state;
        self
    }

    /// In service and passing health checks.
    pub fn is_serving(&self) -> bool {
        self.lifecycle_state == LifecycleState::InService && self.health == HealthStatus::Healthy
    }

    pub fn is_terminating(&self) -> bool {
        self.lifecycle_state == LifecycleState::Terminating
    }

    /// Time since launch, if the fleet manager reported a launch time.
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.launched_at.map(|launched| now - launched)
    }
}
