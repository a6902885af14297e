// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand};
use fleetflip::traffic::TrafficSplit;
use fleetflip::types::Color;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "fleetflip")]
#[command(about = "Blue/green fleet deployments with canary traffic shifting")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Target destination (defined in config)
    #[arg(short, long, global = true)]
    pub destination: Option<String>,

    /// Break an existing deploy lock
    #[arg(long, global = true)]
    pub force: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new fleetflip.yml configuration file
    Init {
        /// Service name
        #[arg(long)]
        service: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        overwrite: bool,
    },

    /// Show active color, traffic split, and per-color readiness
    Status,

    /// Scale up the standby fleet and wait for it to become ready
    Standby(StandbyArgs),

    /// Send part of the traffic to the standby color
    Canary {
        /// Explicit split, e.g. "blue=90,green=10"
        #[arg(conflicts_with = "weight")]
        split: Option<TrafficSplit>,

        /// Percentage for the standby; the active color gets the rest
        #[arg(short, long)]
        weight: Option<u32>,
    },

    /// Send all traffic to the standby color
    Flip,

    /// Scale the drained color down to zero
    Retire {
        /// Override the configured drain wait (e.g. "5m")
        #[arg(long, value_parser = parse_duration)]
        drain: Option<Duration>,
    },

    /// Restore traffic to the previous color
    Rollback,

    /// Run a full rollout: standby, canary steps, flip, retire
    Deploy(DeployArgs),

    /// Show recent transitions
    History {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Compare the routing layer against the recorded state
    Drift {
        /// Re-apply the expected rules when drift is found
        #[arg(long)]
        reconcile: bool,
    },
}

#[derive(Args)]
pub struct StandbyArgs {
    /// Color to bring up (defaults to the current standby)
    #[arg(long)]
    pub color: Option<Color>,

    #[arg(long, requires_all = ["min", "max"])]
    pub desired: Option<u32>,

    #[arg(long, requires = "desired")]
    pub min: Option<u32>,

    #[arg(long, requires = "desired")]
    pub max: Option<u32>,

    /// Release label recorded for this color
    #[arg(long)]
    pub release: Option<String>,

    /// Allow resizing the active color in place
    #[arg(long)]
    pub override_active: bool,
}

#[derive(Args)]
pub struct DeployArgs {
    /// Color to bring up (defaults to the current standby)
    #[arg(long)]
    pub color: Option<Color>,

    /// Release label recorded for the new color
    #[arg(long)]
    pub release: Option<String>,

    /// Standby weights to step through before flipping, e.g. "10,50"
    #[arg(long, value_delimiter = ',')]
    pub canary: Vec<u32>,

    /// How long each canary step is observed
    #[arg(long, value_parser = parse_duration, default_value = "0s")]
    pub canary_interval: Duration,

    /// Override the configured drain wait
    #[arg(long, value_parser = parse_duration)]
    pub drain: Option<Duration>,

    /// Stop after the flip and leave the old color draining
    #[arg(long)]
    pub no_retire: bool,

    /// Roll back automatically if any step fails
    #[arg(long)]
    pub auto_rollback: bool,
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn canary_accepts_an_explicit_split() {
        let cli = Cli::try_parse_from(["fleetflip", "canary", "blue=90,green=10"]).unwrap();
        let Commands::Canary { split, weight } = cli.command else {
            panic!("expected canary");
        };
        assert_eq!(split.unwrap().to_string(), "blue=90,green=10");
        assert!(weight.is_none());
    }

    #[test]
    fn deploy_parses_canary_steps_and_durations() {
        let cli = Cli::try_parse_from([
            "fleetflip",
            "--json",
            "deploy",
            "--canary",
            "10,50",
            "--drain",
            "30s",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Deploy(args) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.canary, vec![10, 50]);
        assert_eq!(args.drain, Some(Duration::from_secs(30)));
        assert_eq!(args.canary_interval, Duration::ZERO);
    }

    #[test]
    fn standby_capacity_needs_all_bounds() {
        assert!(Cli::try_parse_from(["fleetflip", "standby", "--desired", "3"]).is_err());
    }
}
