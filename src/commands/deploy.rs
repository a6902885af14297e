// ABOUTME: Deploy command implementation.
// ABOUTME: Drives a full rollout (standby, canary, flip, retire) under the deploy lock.

use super::connection::connect;
use super::status::describe_state;
use crate::cli::DeployArgs;
use fleetflip::backend::Backend;
use fleetflip::config::Config;
use fleetflip::deploy::{
    DeploymentState, Orchestrator, Rollout, RolloutPlan, TransitionError, with_lock,
};
use fleetflip::diagnostics::Diagnostics;
use fleetflip::error::{Error, Result};
use fleetflip::output::Output;
use std::future::Future;

pub async fn deploy(config: Config, args: DeployArgs, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let state_dir = config.state_dir();
    let service = config.service.clone();
    let plan = RolloutPlan {
        target: args.color,
        capacity: None,
        release: args.release.clone(),
        canary_steps: args.canary.clone(),
        canary_interval: args.canary_interval,
        stabilization: config.stabilization,
        drain: args.drain,
    };

    let orchestrator = connect(config, &output)?;
    let orchestrator = &orchestrator;
    let output_ref = &output;

    output.progress(&format!("Deploying {service}"));
    let result = with_lock(&state_dir, &service, force, move || async move {
        run_rollout(orchestrator, plan, &args, output_ref).await
    })
    .await;

    diag.extend_transition(orchestrator.take_warnings());
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let state = result?;
    output.data(&state, || describe_state(&state));
    output.success("Deployment complete!");
    Ok(())
}

/// Run the rollout state machine.
async fn run_rollout<B: Backend + ?Sized>(
    orchestrator: &Orchestrator<B>,
    plan: RolloutPlan,
    args: &DeployArgs,
    output: &Output,
) -> Result<DeploymentState> {
    let auto_rollback = args.auto_rollback;

    output.step("Introducing standby...");
    let rollout = match Rollout::new(plan).introduce_standby(orchestrator).await {
        Ok(r) => r,
        Err((_, e)) => return Err(e.into()),
    };

    output.step(&format!(
        "Waiting for {} to become ready...",
        rollout.stage().target
    ));
    let mut rollout = match rollout.await_ready(orchestrator).await {
        Ok(r) => r,
        Err((failed, e)) => {
            return abort(failed.rollback(orchestrator), e, auto_rollback, output).await;
        }
    };

    for weight in rollout.plan().canary_steps.clone() {
        output.step(&format!("Canary: {weight}% to {}", rollout.stage().target));
        rollout = match rollout.shift_canary(orchestrator, weight).await {
            Ok(r) => r,
            Err((failed, e)) => {
                return abort(failed.rollback(orchestrator), e, auto_rollback, output).await;
            }
        };
    }

    output.step("Flipping traffic...");
    let rollout = match rollout.flip(orchestrator).await {
        Ok(r) => r,
        Err((failed, e)) => {
            return abort(failed.rollback(orchestrator), e, auto_rollback, output).await;
        }
    };

    if args.no_retire {
        output.step(&format!(
            "Leaving {} draining; run `fleetflip retire` when ready",
            rollout.stage().previous
        ));
        return Ok(orchestrator.current_state());
    }

    output.step(&format!("Retiring {}...", rollout.stage().previous));
    // The new color already serves everything; a failed retire is not rolled back.
    let completed = rollout
        .retire(orchestrator)
        .await
        .map_err(|(_, e)| Error::from(e))?;

    Ok(completed.finish())
}

async fn abort(
    rollback: impl Future<Output = std::result::Result<DeploymentState, TransitionError>>,
    error: TransitionError,
    auto_rollback: bool,
    output: &Output,
) -> Result<DeploymentState> {
    output.step_failed(&error.to_string());
    if auto_rollback {
        output.step("Rolling back...");
        rollback.await?;
    }
    Err(error.into())
}
