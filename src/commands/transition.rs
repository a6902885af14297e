// ABOUTME: Single-intent commands: standby, canary, flip, retire, rollback.
// ABOUTME: Each runs one orchestrator transition under the deploy lock.

use super::connection::connect;
use super::status::describe_state;
use fleetflip::config::Config;
use fleetflip::deploy::{Intent, with_lock};
use fleetflip::diagnostics::Diagnostics;
use fleetflip::error::{Error, Result};
use fleetflip::output::Output;

/// Apply `intent` and report the resulting state.
pub async fn apply_intent(config: Config, intent: Intent, force: bool, mut output: Output) -> Result<()> {
    output.start_timer();
    let mut diag = Diagnostics::default();

    let state_dir = config.state_dir();
    let service = config.service.clone();
    let orchestrator = connect(config, &output)?;
    let orchestrator = &orchestrator;

    output.step(&format!("Requesting {intent}..."));
    let label = intent.to_string();
    let result = with_lock(&state_dir, &service, force, move || async move {
        orchestrator
            .request_intent(intent)
            .await
            .map_err(Error::from)
    })
    .await;

    diag.extend_transition(orchestrator.take_warnings());
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let state = result?;
    output.data(&state, || describe_state(&state));
    output.success(&format!("Applied {label}"));
    Ok(())
}
