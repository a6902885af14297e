// ABOUTME: Shared fixtures for integration tests.
// ABOUTME: Builds configs and orchestrators wired to the in-memory backend.

#![allow(dead_code)]

use fleetflip::backend::MemoryBackend;
use fleetflip::config::Config;
use fleetflip::deploy::{Orchestrator, StateStore};
use fleetflip::fleet::TargetGroupKey;
use fleetflip::types::{Color, ResourceName};
use std::sync::Arc;
use tempfile::TempDir;

pub const BASE_CONFIG: &str = r#"
service: shop
fleets:
  blue: { desired: 2, min: 1, max: 4 }
  green: { desired: 0, min: 0, max: 0 }
target_groups:
  - role: frontend
  - role: api
    paths: ["/api/*"]
    priority: 10
convergence:
  poll_interval: 1s
  timeout: 30s
drain:
  wait: 5m
stabilization: 0s
"#;

pub fn base_config() -> Config {
    Config::from_yaml(BASE_CONFIG).unwrap()
}

pub fn key(role: &str, color: Color) -> TargetGroupKey {
    TargetGroupKey {
        role: ResourceName::new(role).unwrap(),
        color,
    }
}

/// An orchestrator over a memory backend, with state in a temp dir.
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub orchestrator: Orchestrator<MemoryBackend>,
    pub config: Config,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(base_config())
    }

    pub fn with_config(config: Config) -> Self {
        let backend = MemoryBackend::from_config(&config);
        Self::with_backend(config, backend)
    }

    pub fn with_backend(config: Config, backend: MemoryBackend) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(backend);
        let store = StateStore::new(dir.path(), config.service.clone());
        let orchestrator =
            Orchestrator::new(config.clone(), Arc::clone(&backend), store).unwrap();
        Self {
            backend,
            orchestrator,
            config,
            dir,
        }
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.dir.path(), self.config.service.clone())
    }

    /// A second orchestrator over the same backend and state directory.
    pub fn reopen(&self) -> Orchestrator<MemoryBackend> {
        Orchestrator::new(self.config.clone(), Arc::clone(&self.backend), self.store()).unwrap()
    }
}
