// ABOUTME: Entry point for the fleetflip CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, StandbyArgs};
use fleetflip::config;
use fleetflip::deploy::Intent;
use fleetflip::error::{Error, Result};
use fleetflip::fleet::Capacity;
use fleetflip::output::{Output, OutputMode};
use fleetflip::traffic::{TOTAL_WEIGHT, TrafficSplit};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.json, cli.quiet);
    if let Err(e) = run(cli).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let output = Output::new(OutputMode::from_flags(cli.json, cli.quiet));
    let destination = cli.destination.as_deref();

    match cli.command {
        Commands::Init { service, overwrite } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, service.as_deref(), overwrite)?;
            output.success(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Status => {
            let config = commands::load_config(destination)?;
            commands::status(config, output).await
        }
        Commands::Standby(args) => {
            let config = commands::load_config(destination)?;
            let intent = standby_intent(args, &config)?;
            commands::apply_intent(config, intent, cli.force, output).await
        }
        Commands::Canary { split, weight } => {
            let config = commands::load_config(destination)?;
            let split = match (split, weight) {
                (Some(split), _) => split,
                (None, Some(weight)) => {
                    let active = commands::current_active(&config)?;
                    TrafficSplit::canary(active, TOTAL_WEIGHT.saturating_sub(weight), weight)
                }
                (None, None) => {
                    return Err(Error::InvalidConfig(
                        "canary needs a split or --weight".to_string(),
                    ));
                }
            };
            commands::apply_intent(config, Intent::ShiftCanary { split }, cli.force, output).await
        }
        Commands::Flip => {
            let config = commands::load_config(destination)?;
            commands::apply_intent(config, Intent::Flip, cli.force, output).await
        }
        Commands::Retire { drain } => {
            let config = commands::load_config(destination)?;
            commands::apply_intent(config, Intent::Retire { drain }, cli.force, output).await
        }
        Commands::Rollback => {
            let config = commands::load_config(destination)?;
            commands::apply_intent(config, Intent::Rollback, cli.force, output).await
        }
        Commands::Deploy(args) => {
            let config = commands::load_config(destination)?;
            commands::deploy(config, args, cli.force, output).await
        }
        Commands::History { limit } => {
            let config = commands::load_config(destination)?;
            commands::history(config, limit, output)
        }
        Commands::Drift { reconcile } => {
            let config = commands::load_config(destination)?;
            commands::drift(config, reconcile, output).await
        }
    }
}

fn standby_intent(args: StandbyArgs, config: &config::Config) -> Result<Intent> {
    let capacity = match (args.desired, args.min, args.max) {
        (Some(desired), Some(min), Some(max)) => Some(
            Capacity::new(desired, min, max).map_err(|e| Error::InvalidConfig(e.to_string()))?,
        ),
        _ => None,
    };
    let target = match args.color {
        Some(color) => color,
        None => commands::current_active(config)?.other(),
    };
    Ok(Intent::IntroduceStandby {
        target,
        capacity,
        override_active: args.override_active,
        release: args.release,
    })
}
