//! `sb`, the switchboard command-line entry point.
//!
//! # Usage
//!
//! ```text
//! sb send --from test --to build --action run_tests
//! sb cron add --schedule @hourly --target build --action nightly_check
//! sb sub add --event build --outcome failure --notify review --action triage
//! sb publish --event build --outcome failure --exit-code 101
//! sb watch --interval 5s
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{CompactCommand, CronCommand, HarnessCommand, PublishArgs, SendArgs, SubCommand};

/// Inbox alerts, cron triggers and event fan-out for agent roles in tmux.
#[derive(Parser)]
#[command(name = "sb")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default: ~/.config/switchboard/config.yaml)
    #[arg(short, long, global = true, env = "SB_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// tmux session the roles live in
    #[arg(short, long, global = true, env = "SB_SESSION", default_value = "switchboard")]
    session: String,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "SB_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put a message in a role's inbox and alert the role
    Send(SendArgs),

    /// Alert roles whose inbox grew (all roles when none given)
    Notify { roles: Vec<String> },

    /// Scheduled message injection
    Cron {
        #[command(subcommand)]
        command: CronCommand,
    },

    /// Event subscriptions
    Sub {
        #[command(subcommand)]
        command: SubCommand,
    },

    /// Announce an event outcome to subscribers
    Publish(PublishArgs),

    /// Memory compaction alerts
    Compact {
        #[command(subcommand)]
        command: CompactCommand,
    },

    /// Mark a role as driven by a polling harness
    Harness {
        #[command(subcommand)]
        command: HarnessCommand,
    },

    /// Poll cron, inboxes and compaction in a loop
    Watch {
        /// Delay between polls, e.g. 5s or 1m
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        interval: std::time::Duration,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let ctx = commands::Ctx::load(&config_path, &cli.session)?;

    match cli.command {
        Commands::Send(args) => commands::send(&ctx, args),
        Commands::Notify { roles } => commands::notify(&ctx, roles),
        Commands::Cron { command } => commands::cron(&ctx, command),
        Commands::Sub { command } => commands::sub(&ctx, command),
        Commands::Publish(args) => commands::publish(&ctx, args),
        Commands::Compact { command } => commands::compact(&ctx, command),
        Commands::Harness { command } => commands::harness(&ctx, command),
        Commands::Watch { interval } => commands::watch(&ctx, interval),
    }
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("switchboard")
        .join("config.yaml")
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
