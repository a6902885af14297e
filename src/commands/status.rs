// ABOUTME: Read-only commands: status, history, and drift detection.
// ABOUTME: Drift can optionally re-apply the expected routing rules.

use super::connection::connect;
use fleetflip::config::Config;
use fleetflip::deploy::{DeploymentState, StateStore};
use fleetflip::diagnostics::{Diagnostics, Warning};
use fleetflip::error::Result;
use fleetflip::output::Output;
use fleetflip::readiness::EnvironmentStatus;
use fleetflip::routing::ReconcileOutcome;
use fleetflip::types::Color;
use serde::Serialize;

/// One-paragraph summary of the recorded state.
pub fn describe_state(state: &DeploymentState) -> String {
    let mut lines = vec![
        format!("Active:  {}", state.active_color),
        format!("Phase:   {}", state.phase),
        format!("Traffic: {}", state.traffic_split),
    ];
    if let Some(previous) = state.previous_active {
        lines.push(format!("Rollback target: {previous}"));
    }
    if let Some(release) = state.active_release() {
        lines.push(format!("Release: {release}"));
    }
    lines.push(format!("Version: {}", state.version));
    lines.join("\n")
}

fn describe_environment(env: &EnvironmentStatus) -> String {
    let role = if env.active { "active" } else { "standby" };
    let mut lines = vec![format!(
        "{} ({role}, weight {}): desired {} [{}..{}], {} in service, {} pending, {} terminating",
        env.color,
        env.weight,
        env.capacity.desired,
        env.capacity.min,
        env.capacity.max,
        env.instances.in_service,
        env.instances.pending,
        env.instances.terminating,
    )];
    match &env.readiness.reason {
        None => lines.push("  ready".to_string()),
        Some(reason) => lines.push(format!("  not ready: {reason}")),
    }
    for group in &env.target_groups {
        lines.push(format!(
            "  {}: {} ({}/{} healthy)",
            group.target_group.role, group.summary, group.healthy, group.total
        ));
    }
    lines.join("\n")
}

#[derive(Serialize)]
struct StatusReport<'a> {
    service: String,
    state: &'a DeploymentState,
    environments: Vec<&'a EnvironmentStatus>,
    ready_to_flip: bool,
}

pub async fn status(config: Config, output: Output) -> Result<()> {
    let service = config.service.to_string();
    let orchestrator = connect(config, &output)?;
    let state = orchestrator.current_state();
    let environments = orchestrator.environment_status().await?;
    let ready_to_flip = orchestrator.is_ready_to_flip().await;

    let report = StatusReport {
        service,
        state: &state,
        environments: Color::ALL.iter().map(|c| environments.get(*c)).collect(),
        ready_to_flip,
    };

    output.data(&report, || {
        let mut text = vec![format!("Service: {}", report.service), describe_state(&state)];
        for env in &report.environments {
            text.push(describe_environment(env));
        }
        text.push(format!("Ready to flip: {}", if ready_to_flip { "yes" } else { "no" }));
        text.join("\n")
    });
    Ok(())
}

pub fn history(config: Config, limit: usize, output: Output) -> Result<()> {
    let store = StateStore::new(config.state_dir(), config.service.clone());
    let entries = store.history(limit)?;

    output.data(&entries, || {
        if entries.is_empty() {
            return "No transitions recorded".to_string();
        }
        entries
            .iter()
            .map(|e| {
                format!(
                    "{}  v{:<4} {:<18} {} -> {}  {}  by {}{}",
                    e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    e.version,
                    e.intent,
                    e.from_active,
                    e.to_active,
                    e.phase,
                    e.actor,
                    e.release
                        .as_deref()
                        .map(|r| format!("  [{r}]"))
                        .unwrap_or_default(),
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    });
    Ok(())
}

pub async fn drift(config: Config, reconcile: bool, output: Output) -> Result<()> {
    let orchestrator = connect(config, &output)?;
    let mut diag = Diagnostics::default();

    let Some(drift) = orchestrator.detect_drift().await? else {
        output.success("Routing matches recorded state");
        return Ok(());
    };

    for difference in &drift.differences {
        diag.warn(Warning::drift(difference.clone()));
    }
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    if reconcile {
        match orchestrator.reconcile_routing().await? {
            ReconcileOutcome::Applied => output.success("Expected routing rules re-applied"),
            ReconcileOutcome::Unchanged => output.success("Routing already converged"),
        }
    } else {
        output.success(&format!(
            "Routing drifted ({} differences); run with --reconcile to repair",
            drift.differences.len()
        ));
    }
    Ok(())
}
