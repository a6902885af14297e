// ABOUTME: Library root for fleetflip - blue/green deployment orchestration.
// ABOUTME: The CLI binary lives in main.rs; everything it drives is exposed here for testing.

pub mod backend;
pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod error;
pub mod fleet;
pub mod lifecycle;
pub mod output;
pub mod readiness;
pub mod routing;
pub mod traffic;
pub mod types;
