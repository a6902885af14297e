// ABOUTME: Deployment history entries, one per applied transition.
// ABOUTME: Kept newest-first and capped so the file stays small.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::traffic::TrafficSplit;
use crate::types::Color;

use super::state::{DeploymentState, Phase};

/// Maximum number of entries retained.
pub const MAX_HISTORY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    pub intent: String,
    pub from_active: Color,
    pub to_active: Color,
    pub phase: Phase,
    #[serde(default)]
    pub traffic_split: TrafficSplit,
    pub actor: String,
    /// Release serving as the active color after this transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
}

impl HistoryEntry {
    pub fn record(intent: &str, from: &DeploymentState, to: &DeploymentState) -> Self {
        Self {
            timestamp: to.updated_at,
            version: to.version,
            intent: intent.to_string(),
            from_active: from.active_color,
            to_active: to.active_color,
            phase: to.phase,
            traffic_split: to.traffic_split.clone(),
            actor: current_actor(),
            release: to.active_release().map(str::to_string),
        }
    }
}

/// Who is running the transition: `$USER`, else the hostname.
pub fn current_actor() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| gethostname::gethostname().to_string_lossy().into_owned())
}
