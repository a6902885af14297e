// ABOUTME: Shared helper for loading config and connecting to the backend.
// ABOUTME: Every command that touches fleets or routing starts here.

use fleetflip::backend::ConfiguredBackend;
use fleetflip::config::Config;
use fleetflip::deploy::{Orchestrator, StateStore};
use fleetflip::error::Result;
use fleetflip::output::Output;
use fleetflip::types::Color;
use std::env;
use std::sync::Arc;

/// Discover config in the working directory and apply the destination overlay.
pub fn load_config(destination: Option<&str>) -> Result<Config> {
    let cwd = env::current_dir()?;
    let config = Config::discover(&cwd)?;
    match destination {
        Some(dest) => config.for_destination(dest),
        None => Ok(config),
    }
}

/// Build the orchestrator for `config`.
///
/// This handles the common pattern of:
/// 1. Building the configured backend
/// 2. Outputting progress messages
/// 3. Loading saved state from the state directory
pub fn connect(config: Config, output: &Output) -> Result<Orchestrator<ConfiguredBackend>> {
    let backend = ConfiguredBackend::from_config(&config)?;
    output.step(&format!("Backend: {}", backend.describe()));

    let store = StateStore::new(config.state_dir(), config.service.clone());
    tracing::debug!(dir = %store.dir().display(), "using state directory");

    Ok(Orchestrator::new(config, Arc::new(backend), store)?)
}

/// Active color from saved state, or the configured initial color.
pub fn current_active(config: &Config) -> Result<Color> {
    let store = StateStore::new(config.state_dir(), config.service.clone());
    Ok(store
        .load()?
        .map(|state| state.active_color)
        .unwrap_or(config.initial_active))
}
