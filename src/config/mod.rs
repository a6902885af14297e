// ABOUTME: Configuration types and parsing for fleetflip.yml.
// ABOUTME: Handles YAML parsing, validation, state directory resolution, and destination merging.

mod backend;
mod deserialize;
mod env_value;
mod healthcheck;
mod lifecycle;
mod routing;
mod timing;

pub use backend::BackendConfig;
pub use env_value::EnvValue;
pub use healthcheck::HealthCheckSpec;
pub use lifecycle::LifecycleConfig;
pub use routing::{ListenerOverride, TargetGroupConfig};
pub use timing::{ConvergenceConfig, DrainConfig};

use crate::error::{Error, Result};
use crate::fleet::{Capacity, TargetGroupSpec};
use crate::types::{Color, PerColor, ResourceName};
use deserialize::deserialize_target_groups;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use timing::default_stabilization;

pub const CONFIG_FILENAME: &str = "fleetflip.yml";
pub const CONFIG_FILENAME_ALT: &str = "fleetflip.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".fleetflip/config.yml";

/// Environment variable that overrides the configured state directory.
pub const STATE_DIR_ENV: &str = "FLEETFLIP_STATE_DIR";

/// State directory under `$HOME` when nothing else is configured.
const DEFAULT_STATE_DIR: &str = ".local/state/fleetflip";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ResourceName,

    /// Color that is authoritative when no state has been recorded yet.
    #[serde(default = "default_initial_active")]
    pub initial_active: Color,

    /// Resting capacity for each fleet.
    pub fleets: PerColor<Capacity>,

    /// Capacity used when introducing a standby fleet. Defaults to the
    /// active fleet's current bounds.
    #[serde(default)]
    pub standby_capacity: Option<Capacity>,

    #[serde(deserialize_with = "deserialize_target_groups")]
    pub target_groups: NonEmpty<TargetGroupConfig>,

    /// Written as `fixed_response: {...}` or `redirect: {...}`.
    #[serde(default, with = "serde_yaml::with::singleton_map_recursive")]
    pub listener_override: Option<ListenerOverride>,

    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    #[serde(default)]
    pub convergence: ConvergenceConfig,

    #[serde(default)]
    pub drain: DrainConfig,

    /// Wait between a standby turning ready and an automated flip.
    #[serde(default = "default_stabilization", with = "humantime_serde")]
    pub stabilization: Duration,

    /// Protect fleets carrying traffic from scale-in.
    #[serde(default = "default_instance_protection")]
    pub instance_protection: bool,

    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default)]
    pub backend: Option<BackendConfig>,

    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    #[serde(default)]
    pub fleets: Option<PerColor<Capacity>>,

    #[serde(default)]
    pub standby_capacity: Option<Capacity>,

    #[serde(default)]
    pub instance_protection: Option<bool>,
}

fn default_initial_active() -> Color {
    Color::Blue
}

fn default_instance_protection() -> bool {
    true
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(ref backend) = dest.backend {
            merged.backend = backend.clone();
        }
        if let Some(ref dir) = dest.state_dir {
            merged.state_dir = Some(dir.clone());
        }
        if let Some(fleets) = dest.fleets {
            merged.fleets = fleets;
        }
        if dest.standby_capacity.is_some() {
            merged.standby_capacity = dest.standby_capacity;
        }
        if let Some(protection) = dest.instance_protection {
            merged.instance_protection = protection;
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (color, capacity) in self.fleets.iter() {
            capacity
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("fleets.{color}: {e}")))?;
        }

        if self.fleets.get(self.initial_active).desired == 0 {
            return Err(Error::InvalidConfig(format!(
                "initial active fleet '{}' must have desired capacity above zero",
                self.initial_active
            )));
        }

        if let Some(standby) = self.standby_capacity {
            standby
                .validate_standby()
                .map_err(|e| Error::InvalidConfig(format!("standby_capacity: {e}")))?;
        }

        let mut roles = HashSet::new();
        let mut priorities = HashSet::new();
        for group in self.target_groups.iter() {
            if !roles.insert(group.role.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate target group role: {}",
                    group.role
                )));
            }
            if let Some(priority) = group.priority
                && !priorities.insert(priority)
            {
                return Err(Error::InvalidConfig(format!(
                    "duplicate rule priority {priority} (role {})",
                    group.role
                )));
            }
            group
                .health_check
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("{}: {e}", group.role)))?;
        }

        if let Some(ref listener_override) = self.listener_override {
            listener_override
                .validate()
                .map_err(|e| Error::InvalidConfig(format!("listener_override: {e}")))?;
        }

        let catch_all = self
            .target_groups
            .iter()
            .filter(|g| g.paths.is_empty() && g.hosts.is_empty())
            .count();
        if catch_all != 1 {
            return Err(Error::InvalidConfig(format!(
                "exactly one target group must have no paths or hosts (found {catch_all})"
            )));
        }

        Ok(())
    }

    /// Target group specs in configuration order.
    pub fn target_group_specs(&self) -> Vec<TargetGroupSpec> {
        self.target_groups.iter().map(|g| g.to_spec()).collect()
    }

    /// Capacity for bringing up `standby` while `active` serves traffic.
    pub fn standby_capacity_for(&self, standby: Color, active_capacity: Capacity) -> Capacity {
        if let Some(capacity) = self.standby_capacity {
            return capacity;
        }
        let configured = *self.fleets.get(standby);
        if configured.desired > 0 {
            configured
        } else {
            active_capacity
        }
    }

    /// Directory holding deployment state, history, and the deploy lock.
    ///
    /// Resolution order: `FLEETFLIP_STATE_DIR`, `state_dir` in config,
    /// then `$HOME/.local/state/fleetflip`.
    pub fn state_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(STATE_DIR_ENV)
            && !dir.is_empty()
        {
            return PathBuf::from(dir);
        }
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        Path::new(&home).join(DEFAULT_STATE_DIR)
    }
}

/// Service name written into a fresh template.
const TEMPLATE_SERVICE: &str = "my-app";

pub fn init_config(dir: &Path, service: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let service = ResourceName::new(service.unwrap_or(TEMPLATE_SERVICE))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    std::fs::write(&config_path, generate_template_yaml(&service))?;

    Ok(())
}

fn generate_template_yaml(service: &ResourceName) -> String {
    format!(
        r#"service: {service}
initial_active: blue

fleets:
  blue: {{ desired: 1, min: 1, max: 2 }}
  green: {{ desired: 0, min: 0, max: 0 }}

target_groups:
  - role: frontend
    health_check:
      path: /
  - role: api
    paths: ["/api/*", "/admin/*"]
    priority: 10
    health_check:
      path: /api/health

lifecycle:
  heartbeat_timeout: 5m
  default_result: abandon

convergence:
  poll_interval: 10s
  timeout: 10m

drain:
  wait: 5m

backend:
  kind: memory
"#
    )
}
