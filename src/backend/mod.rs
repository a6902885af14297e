// ABOUTME: Adapters for the external fleet manager and routing layer.
// ABOUTME: Exports the capability traits plus in-memory and HTTP implementations.

mod error;
mod http;
mod memory;
pub(crate) mod sealed;
mod traits;

pub use error::{BackendError, BackendErrorKind, ExternalSystem};
pub use http::HttpBackend;
pub use memory::{LaunchMode, LifecycleCompletion, MemoryBackend};
pub use traits::{Backend, FleetOps, RoutingOps};

use async_trait::async_trait;

use crate::config::{BackendConfig, Config};
use crate::error::Result;
use crate::fleet::{Capacity, Instance, TargetHealth};
use crate::lifecycle::LifecycleResult;
use crate::routing::RoutingRules;
use crate::types::{Color, InstanceId, LifecycleToken, ResourceName};

/// The backend selected by configuration.
#[derive(Debug)]
pub enum ConfiguredBackend {
    Memory(MemoryBackend),
    Http(HttpBackend),
}

impl ConfiguredBackend {
    pub fn from_config(config: &Config) -> Result<Self> {
        match &config.backend {
            BackendConfig::Memory => Ok(ConfiguredBackend::Memory(MemoryBackend::from_config(
                config,
            ))),
            BackendConfig::Http {
                endpoint,
                auth_token,
                request_timeout,
            } => {
                let token = auth_token.as_ref().map(|t| t.resolve()).transpose()?;
                let backend = HttpBackend::new(endpoint, token, *request_timeout)?;
                Ok(ConfiguredBackend::Http(backend))
            }
        }
    }

    /// Short label for status output.
    pub fn describe(&self) -> String {
        match self {
            ConfiguredBackend::Memory(_) => "memory (simulated)".to_string(),
            ConfiguredBackend::Http(http) => format!("http://{}", http.authority()),
        }
    }
}

impl sealed::Sealed for ConfiguredBackend {}

#[async_trait]
impl FleetOps for ConfiguredBackend {
    async fn set_capacity(
        &self,
        color: Color,
        capacity: Capacity,
    ) -> std::result::Result<(), BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.set_capacity(color, capacity).await,
            ConfiguredBackend::Http(b) => b.set_capacity(color, capacity).await,
        }
    }

    async fn capacity_of(&self, color: Color) -> std::result::Result<Capacity, BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.capacity_of(color).await,
            ConfiguredBackend::Http(b) => b.capacity_of(color).await,
        }
    }

    async fn list_instances(
        &self,
        color: Color,
    ) -> std::result::Result<Vec<Instance>, BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.list_instances(color).await,
            ConfiguredBackend::Http(b) => b.list_instances(color).await,
        }
    }

    async fn set_scale_in_protection(
        &self,
        color: Color,
        protected: bool,
    ) -> std::result::Result<(), BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.set_scale_in_protection(color, protected).await,
            ConfiguredBackend::Http(b) => b.set_scale_in_protection(color, protected).await,
        }
    }

    async fn complete_lifecycle_action(
        &self,
        instance: &InstanceId,
        token: &LifecycleToken,
        result: LifecycleResult,
    ) -> std::result::Result<(), BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => {
                b.complete_lifecycle_action(instance, token, result).await
            }
            ConfiguredBackend::Http(b) => {
                b.complete_lifecycle_action(instance, token, result).await
            }
        }
    }

    async fn target_group_health(
        &self,
        role: &ResourceName,
        color: Color,
    ) -> std::result::Result<Vec<TargetHealth>, BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.target_group_health(role, color).await,
            ConfiguredBackend::Http(b) => b.target_group_health(role, color).await,
        }
    }
}

#[async_trait]
impl RoutingOps for ConfiguredBackend {
    async fn apply_routing_rules(
        &self,
        rules: &RoutingRules,
    ) -> std::result::Result<(), BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.apply_routing_rules(rules).await,
            ConfiguredBackend::Http(b) => b.apply_routing_rules(rules).await,
        }
    }

    async fn current_routing_rules(
        &self,
    ) -> std::result::Result<Option<RoutingRules>, BackendError> {
        match self {
            ConfiguredBackend::Memory(b) => b.current_routing_rules().await,
            ConfiguredBackend::Http(b) => b.current_routing_rules().await,
        }
    }
}
