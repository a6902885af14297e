// ABOUTME: Error types for deployment transitions.
// ABOUTME: Rejections carry a typed reason and leave the deployment state untouched.

use std::time::Duration;

use crate::backend::BackendError;
use crate::fleet::FleetError;
use crate::traffic::InvalidSplitError;
use crate::types::Color;

use super::state::Phase;
use super::store::StoreError;

/// Errors returned by [`Orchestrator::request_intent`](super::Orchestrator::request_intent).
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    /// Locally invalid input; nothing was sent.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid traffic split: {0}")]
    InvalidSplit(#[from] InvalidSplitError),

    #[error("standby fleet {color} is not ready: {reason}")]
    StandbyNotReady { color: Color, reason: String },

    /// Readiness polling gave up. Not rolled back automatically.
    #[error("{color} did not become ready within {timeout:?} (last seen: {last})")]
    ConvergenceTimeout {
        color: Color,
        timeout: Duration,
        last: String,
    },

    #[error("wait for {color} was cancelled by a rollback")]
    Cancelled { color: Color },

    #[error(transparent)]
    External(#[from] BackendError),

    #[error("{color} is the active color; pass override to resize it in place")]
    ActiveColorTarget { color: Color },

    #[error("old fleet still draining, retire allowed in {remaining:?}")]
    DrainPending { remaining: Duration },

    #[error("cannot {intent} while {phase}")]
    IllegalTransition { intent: &'static str, phase: Phase },

    #[error("another transition is in progress")]
    Busy,

    /// The saved state moved on since it was loaded here.
    #[error("deployment state changed elsewhere (expected version {expected}, found {found}); retry")]
    Conflict { expected: u64, found: u64 },

    #[error("failed to persist deployment state: {0}")]
    Persistence(#[source] StoreError),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionErrorKind {
    Configuration,
    InvalidColorReference,
    WeightSumInvalid,
    StandbyNotReady,
    ConvergenceTimeout,
    Cancelled,
    External,
    ActiveColorTarget,
    DrainPending,
    IllegalTransition,
    Busy,
    Conflict,
    Persistence,
}

impl TransitionError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> TransitionErrorKind {
        match self {
            TransitionError::Configuration(_) => TransitionErrorKind::Configuration,
            TransitionError::InvalidSplit(InvalidSplitError::WeightSum { .. }) => {
                TransitionErrorKind::WeightSumInvalid
            }
            TransitionError::InvalidSplit(_) => TransitionErrorKind::InvalidColorReference,
            TransitionError::StandbyNotReady { .. } => TransitionErrorKind::StandbyNotReady,
            TransitionError::ConvergenceTimeout { .. } => TransitionErrorKind::ConvergenceTimeout,
            TransitionError::Cancelled { .. } => TransitionErrorKind::Cancelled,
            TransitionError::External(_) => TransitionErrorKind::External,
            TransitionError::ActiveColorTarget { .. } => TransitionErrorKind::ActiveColorTarget,
            TransitionError::DrainPending { .. } => TransitionErrorKind::DrainPending,
            TransitionError::IllegalTransition { .. } => TransitionErrorKind::IllegalTransition,
            TransitionError::Busy => TransitionErrorKind::Busy,
            TransitionError::Conflict { .. } => TransitionErrorKind::Conflict,
            TransitionError::Persistence(_) => TransitionErrorKind::Persistence,
        }
    }

    /// Rejections were decided before anything external changed.
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self.kind(),
            TransitionErrorKind::ConvergenceTimeout
                | TransitionErrorKind::Cancelled
                | TransitionErrorKind::External
                | TransitionErrorKind::Persistence
        )
    }
}

impl From<FleetError> for TransitionError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Configuration { color, source } => {
                TransitionError::Configuration(format!("{color}: {source}"))
            }
            FleetError::External(e) => TransitionError::External(e),
        }
    }
}
