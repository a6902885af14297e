// ABOUTME: Capacity bounds for a fleet (desired, min, max).
// ABOUTME: Validation happens before any capacity request leaves the process.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Invalid capacity bounds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapacityError {
    #[error("min size {min} is greater than desired capacity {desired}")]
    MinAboveDesired { min: u32, desired: u32 },

    #[error("desired capacity {desired} is greater than max size {max}")]
    DesiredAboveMax { desired: u32, max: u32 },

    #[error("standby capacity must be greater than zero")]
    ZeroStandby,
}

/// Desired/min/max instance counts for one fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capacity {
    pub desired: u32,
    pub min: u32,
    pub max: u32,
}

impl Capacity {
    pub const ZERO: Capacity = Capacity {
        desired: 0,
        min: 0,
        max: 0,
    };

    /// Build validated bounds.
    pub fn new(desired: u32, min: u32, max: u32) -> Result<Self, CapacityError> {
        let capacity = Capacity { desired, min, max };
        capacity.validate()?;
        Ok(capacity)
    }

    pub fn validate(&self) -> Result<(), CapacityError> {
        if self.min > self.desired {
            return Err(CapacityError::MinAboveDesired {
                min: self.min,
                desired: self.desired,
            });
        }
        if self.desired > self.max {
            return Err(CapacityError::DesiredAboveMax {
                desired: self.desired,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Validate bounds for a fleet that is about to take traffic.
    pub fn validate_standby(&self) -> Result<(), CapacityError> {
        self.validate()?;
        if self.desired == 0 {
            return Err(CapacityError::ZeroStandby);
        }
        Ok(())
    }

    pub fn is_zero(&self) -> bool {
        self.desired == 0 && self.max == 0
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (min: {}, max: {})",
            self.desired, self.min, self.max
        )
    }
}
