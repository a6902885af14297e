// ABOUTME: Scripted rollout built on the orchestrator's intents.
// ABOUTME: Each step consumes the rollout and returns the next stage, or the current one on failure.

use std::time::Duration;

use crate::backend::Backend;
use crate::fleet::Capacity;
use crate::traffic::{TOTAL_WEIGHT, TrafficSplit};
use crate::types::Color;

use super::error::TransitionError;
use super::intent::Intent;
use super::orchestrator::Orchestrator;
use super::stages::{Completed, Flipped, Initialized, StandbyReady, StandbyScaling};
use super::state::DeploymentState;

/// Result type for steps that hand the rollout back on failure.
pub type TransitionResult<T, S> = Result<Rollout<T>, (Rollout<S>, TransitionError)>;

/// What a full rollout should do.
#[derive(Debug, Clone, Default)]
pub struct RolloutPlan {
    /// Color to bring up; defaults to the current standby.
    pub target: Option<Color>,
    pub capacity: Option<Capacity>,
    pub release: Option<String>,
    /// Standby weights to step through before the flip, e.g. `[10, 50]`.
    pub canary_steps: Vec<u32>,
    /// How long each canary step is observed.
    pub canary_interval: Duration,
    /// Pause after readiness before the flip.
    pub stabilization: Duration,
    /// Overrides the configured drain wait.
    pub drain: Option<Duration>,
}

/// A rollout in progress, parameterized by its current stage.
#[derive(Debug)]
pub struct Rollout<S> {
    pub(crate) plan: RolloutPlan,
    pub(crate) stage: S,
}

impl Rollout<Initialized> {
    pub fn new(plan: RolloutPlan) -> Self {
        Rollout {
            plan,
            stage: Initialized,
        }
    }
}

impl<S> Rollout<S> {
    pub fn plan(&self) -> &RolloutPlan {
        &self.plan
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    fn advance<T>(self, stage: T) -> Rollout<T> {
        Rollout {
            plan: self.plan,
            stage,
        }
    }
}

// =============================================================================
// Initialized -> StandbyScaling
// =============================================================================

impl Rollout<Initialized> {
    /// Request standby capacity.
    ///
    /// A convergence timeout still advances: the capacity request stands and
    /// `await_ready` keeps waiting.
    #[must_use = "rollout stage must be used"]
    pub async fn introduce_standby<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> TransitionResult<StandbyScaling, Initialized> {
        let target = self
            .plan
            .target
            .unwrap_or_else(|| orchestrator.current_state().standby_color());

        let intent = Intent::IntroduceStandby {
            target,
            capacity: self.plan.capacity,
            override_active: false,
            release: self.plan.release.clone(),
        };

        match orchestrator.request_intent(intent).await {
            Ok(_) => Ok(self.advance(StandbyScaling { target })),
            Err(TransitionError::ConvergenceTimeout { last, .. }) => {
                tracing::warn!(%target, %last, "standby not ready yet, continuing to wait");
                Ok(self.advance(StandbyScaling { target }))
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// StandbyScaling -> StandbyReady
// =============================================================================

impl Rollout<StandbyScaling> {
    #[must_use = "rollout stage must be used"]
    pub async fn await_ready<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> TransitionResult<StandbyReady, StandbyScaling> {
        let target = self.stage.target;
        match orchestrator.await_ready(target).await {
            Ok(()) => Ok(self.advance(StandbyReady { target })),
            Err(e) => Err((self, e)),
        }
    }

    pub async fn rollback<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> Result<DeploymentState, TransitionError> {
        orchestrator.request_intent(Intent::Rollback).await
    }
}

// =============================================================================
// StandbyReady -> Flipped
// =============================================================================

impl Rollout<StandbyReady> {
    /// Send `standby_weight` percent to the standby, then observe it for
    /// `canary_interval`.
    #[must_use = "rollout stage must be used"]
    pub async fn shift_canary<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
        standby_weight: u32,
    ) -> TransitionResult<StandbyReady, StandbyReady> {
        let active = self.stage.target.other();
        let split = TrafficSplit::canary(
            active,
            TOTAL_WEIGHT.saturating_sub(standby_weight),
            standby_weight,
        );

        if let Err(e) = orchestrator
            .request_intent(Intent::ShiftCanary { split })
            .await
        {
            return Err((self, e));
        }

        if !self.plan.canary_interval.is_zero() {
            tokio::time::sleep(self.plan.canary_interval).await;
        }
        Ok(self)
    }

    /// Step through every planned canary weight.
    #[must_use = "rollout stage must be used"]
    pub async fn run_canary<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> TransitionResult<StandbyReady, StandbyReady> {
        let steps = self.plan.canary_steps.clone();
        let mut rollout = self;
        for weight in steps {
            rollout = rollout.shift_canary(orchestrator, weight).await?;
        }
        Ok(rollout)
    }

    /// Wait out the stabilization window, then flip.
    #[must_use = "rollout stage must be used"]
    pub async fn flip<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> TransitionResult<Flipped, StandbyReady> {
        if !self.plan.stabilization.is_zero() {
            tokio::time::sleep(self.plan.stabilization).await;
        }

        match orchestrator.request_intent(Intent::Flip).await {
            Ok(state) => {
                let previous = state.active_color.other();
                Ok(self.advance(Flipped { previous }))
            }
            Err(e) => Err((self, e)),
        }
    }

    pub async fn rollback<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> Result<DeploymentState, TransitionError> {
        orchestrator.request_intent(Intent::Rollback).await
    }
}

// =============================================================================
// Flipped -> Completed
// =============================================================================

impl Rollout<Flipped> {
    /// Retire the old color once its drain window has passed.
    #[must_use = "rollout stage must be used"]
    pub async fn retire<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> TransitionResult<Completed, Flipped> {
        let intent = Intent::Retire {
            drain: self.plan.drain,
        };

        let result = match orchestrator.request_intent(intent.clone()).await {
            Err(TransitionError::DrainPending { remaining }) => {
                tracing::info!(
                    previous = %self.stage.previous,
                    remaining = ?remaining,
                    "waiting for drain before retiring"
                );
                tokio::time::sleep(remaining).await;
                orchestrator.request_intent(intent).await
            }
            other => other,
        };

        match result {
            Ok(state) => Ok(self.advance(Completed { state })),
            Err(e) => Err((self, e)),
        }
    }

    pub async fn rollback<B: Backend + ?Sized>(
        self,
        orchestrator: &Orchestrator<B>,
    ) -> Result<DeploymentState, TransitionError> {
        orchestrator.request_intent(Intent::Rollback).await
    }
}

// =============================================================================
// Completed - Terminal State
// =============================================================================

impl Rollout<Completed> {
    pub fn finish(self) -> DeploymentState {
        self.stage.state
    }
}
