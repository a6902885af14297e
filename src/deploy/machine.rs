// ABOUTME: Pure transition rules: guards for each intent and the states they lead to.
// ABOUTME: No I/O here; the orchestrator supplies readiness and applies the effects.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::traffic::{self, TrafficSplit};
use crate::types::Color;

use super::error::TransitionError;
use super::intent::Intent;
use super::state::{DeploymentState, Phase};

fn illegal(intent: &Intent, state: &DeploymentState) -> TransitionError {
    TransitionError::IllegalTransition {
        intent: intent.name(),
        phase: state.phase,
    }
}

/// Guard for introducing `target` as standby.
pub fn check_introduce(
    state: &DeploymentState,
    intent: &Intent,
    target: Color,
    override_active: bool,
) -> Result<(), TransitionError> {
    if !matches!(state.phase, Phase::Stable(_) | Phase::RolledBack) {
        return Err(illegal(intent, state));
    }
    if target == state.active_color && !override_active {
        return Err(TransitionError::ActiveColorTarget { color: target });
    }
    Ok(())
}

/// Guard for a canary shift; returns the validated split.
///
/// Any phase may shift weight. Standby readiness is checked by the caller
/// against a fresh observation.
pub fn check_canary(state: &DeploymentState, split: &TrafficSplit) -> Result<TrafficSplit, TransitionError> {
    traffic::resolve(state.active_color, split)?;
    Ok(split.clone())
}

/// Guard for retiring the inactive color.
///
/// After a flip (or a rollback of one) the drain wait must have elapsed
/// since `flipped_at`. `Retiring` means a previous attempt already passed
/// the wait.
pub fn check_retire(
    state: &DeploymentState,
    intent: &Intent,
    now: DateTime<Utc>,
    drain: Duration,
) -> Result<(), TransitionError> {
    match state.phase {
        Phase::Retiring => Ok(()),
        Phase::Flipping | Phase::RolledBack => {
            let Some(flipped_at) = state.flipped_at else {
                return Ok(());
            };
            let elapsed = (now - flipped_at).to_std().unwrap_or(Duration::ZERO);
            if elapsed < drain {
                return Err(TransitionError::DrainPending {
                    remaining: drain - elapsed,
                });
            }
            Ok(())
        }
        _ => Err(illegal(intent, state)),
    }
}

/// State after the standby capacity has been requested.
pub fn standby_scaling(
    state: &DeploymentState,
    target: Color,
    release: Option<String>,
) -> DeploymentState {
    let mut next = state.clone();
    next.phase = Phase::StandbyScaling;
    next.traffic_split = TrafficSplit::empty();
    next.previous_active = None;
    next.flipped_at = None;
    if release.is_some() {
        *next.releases.get_mut(target) = release;
    }
    next
}

/// State once readiness polling for `target` has finished.
pub fn standby_settled(state: &DeploymentState, target: Color) -> DeploymentState {
    let mut next = state.clone();
    next.phase = if target == state.active_color {
        Phase::Stable(target)
    } else {
        Phase::AwaitingReadiness
    };
    next
}

pub fn canary(state: &DeploymentState, split: TrafficSplit) -> DeploymentState {
    let mut next = state.clone();
    next.phase = Phase::Canary(split.weight_of(state.standby_color(), state.active_color));
    next.traffic_split = split;
    next
}

pub fn flipped(state: &DeploymentState, now: DateTime<Utc>) -> DeploymentState {
    let mut next = state.clone();
    next.previous_active = Some(state.active_color);
    next.active_color = state.standby_color();
    next.traffic_split = TrafficSplit::empty();
    next.flipped_at = Some(now);
    next.phase = Phase::Flipping;
    next
}

/// Start of retirement: the zero-weight route is dropped and the rollback
/// target cleared, since the old color is about to lose its instances.
pub fn retiring(state: &DeploymentState) -> DeploymentState {
    let mut next = state.clone();
    next.phase = Phase::Retiring;
    next.previous_active = None;
    next.flipped_at = None;
    next
}

pub fn retired(state: &DeploymentState) -> DeploymentState {
    let mut next = state.clone();
    next.phase = Phase::Stable(state.active_color);
    *next.releases.get_mut(state.standby_color()) = None;
    next
}

/// Rollback: back to the previous color after a flip, otherwise drop any
/// canary weight and stay on the current color.
pub fn rolled_back(state: &DeploymentState, now: DateTime<Utc>) -> DeploymentState {
    let mut next = state.clone();
    next.traffic_split = TrafficSplit::empty();
    next.phase = Phase::RolledBack;

    if state.phase == Phase::Flipping
        && let Some(previous) = state.previous_active
    {
        next.active_color = previous;
        next.previous_active = Some(state.active_color);
        next.flipped_at = Some(now);
    }
    next
}
