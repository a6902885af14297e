// ABOUTME: Command module aggregator for the fleetflip CLI.
// ABOUTME: Re-exports the handlers main.rs dispatches to.

mod connection;
mod deploy;
mod status;
mod transition;

pub use connection::{current_active, load_config};
pub use deploy::deploy;
pub use status::{drift, history, status};
pub use transition::apply_intent;
