// ABOUTME: Fleet model: the two colored fleets, their capacity bounds and target groups.
// ABOUTME: Capacity intents are validated here before they reach the fleet manager.

mod capacity;
mod instance;
mod target_group;

pub use capacity::{Capacity, CapacityError};
pub use instance::{HealthStatus, Instance, LifecycleState};
pub use target_group::{
    RouteMatch, TargetGroup, TargetGroupKey, TargetGroupSpec, TargetHealth, TargetHealthState,
};

use crate::backend::{BackendError, FleetOps};
use crate::types::{Color, PerColor};

/// Errors from fleet capacity operations.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// Bounds were rejected locally; nothing was sent.
    #[error("invalid capacity for {color}: {source}")]
    Configuration {
        color: Color,
        #[source]
        source: CapacityError,
    },

    #[error(transparent)]
    External(#[from] BackendError),
}

/// One colored fleet as the orchestrator last requested it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fleet {
    pub color: Color,
    pub capacity: Capacity,
    pub protected_from_scale_in: bool,
}

/// Both fleets, keyed by color.
///
/// Membership is owned by the fleet manager; this only tracks the bounds and
/// scale-in protection the orchestrator has asked for.
#[derive(Debug, Clone)]
pub struct FleetModel {
    fleets: PerColor<Fleet>,
}

impl FleetModel {
    pub fn new(capacities: PerColor<Capacity>) -> Self {
        Self {
            fleets: capacities.map(|color, capacity| Fleet {
                color,
                capacity,
                protected_from_scale_in: false,
            }),
        }
    }

    pub fn capacity_of(&self, color: Color) -> Capacity {
        self.fleets.get(color).capacity
    }

    /// Re-read capacity bounds from the fleet manager.
    pub async fn refresh<F: FleetOps + ?Sized>(&mut self, ops: &F) -> Result<(), FleetError> {
        for color in Color::ALL {
            let observed = ops.capacity_of(color).await?;
            self.fleets.get_mut(color).capacity = observed;
        }
        Ok(())
    }

    /// Request new capacity bounds.
    ///
    /// Identical values may be submitted repeatedly; the fleet manager treats
    /// them as an upsert. Convergence is not awaited here.
    pub async fn set_capacity<F: FleetOps + ?Sized>(
        &mut self,
        ops: &F,
        color: Color,
        capacity: Capacity,
    ) -> Result<(), FleetError> {
        capacity
            .validate()
            .map_err(|source| FleetError::Configuration { color, source })?;

        ops.set_capacity(color, capacity).await?;
        tracing::info!(%color, desired = capacity.desired, min = capacity.min, max = capacity.max, "capacity requested");

        self.fleets.get_mut(color).capacity = capacity;
        Ok(())
    }

    /// Toggle scale-in protection. Always submitted: after a restart the
    /// recorded flag may not match the fleet manager.
    pub async fn set_protection<F: FleetOps + ?Sized>(
        &mut self,
        ops: &F,
        color: Color,
        protected: bool,
    ) -> Result<(), FleetError> {
        ops.set_scale_in_protection(color, protected).await?;
        tracing::debug!(%color, protected, "scale-in protection updated");
        self.fleets.get_mut(color).protected_from_scale_in = protected;
        Ok(())
    }
}
