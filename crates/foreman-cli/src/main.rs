//! Foreman CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "foreman")]
#[command(about = "Foreman executor scheduler", long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scheduling pass over the configured nodes and tasks
    Plan {
        /// Path to the configuration file
        #[arg(long, env = "FOREMAN_CONFIG", default_value = "foreman.kdl")]
        config: PathBuf,
        /// Only schedule this task
        #[arg(long)]
        task: Option<String>,
        /// Try first-fit placement before the exhaustive search
        #[arg(long)]
        greedy: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a schedule and list its next matching minutes
    CronCheck {
        /// Schedule, one cron entry per line
        spec: String,
        /// Number of upcoming matches to show
        #[arg(long, default_value = "5")]
        next: usize,
        /// Offset from UTC the schedule is read in
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        utc_offset_minutes: i32,
    },
    /// Show the availability window a schedule yields
    Window {
        /// Schedule, one cron entry per line
        spec: String,
        /// Minutes a node stays up after each scheduled start
        #[arg(long, default_value = "60")]
        up_minutes: u32,
        /// Evaluate at this RFC 3339 time instead of now
        #[arg(long)]
        at: Option<String>,
        /// Offset from UTC the schedule is read in
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        utc_offset_minutes: i32,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Apply retention policies to the configured nodes
    Retention {
        /// Path to the configuration file
        #[arg(long, env = "FOREMAN_CONFIG", default_value = "foreman.kdl")]
        config: PathBuf,
        /// Keep checking on the configured interval until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Plan {
            config,
            task,
            greedy,
            json,
        } => {
            commands::plan::run(&config, task.as_deref(), greedy, json)?;
        }
        Commands::CronCheck {
            spec,
            next,
            utc_offset_minutes,
        } => {
            commands::cron::check(&spec, next, utc_offset_minutes)?;
        }
        Commands::Window {
            spec,
            up_minutes,
            at,
            utc_offset_minutes,
            json,
        } => {
            commands::window::show(&spec, up_minutes, at.as_deref(), utc_offset_minutes, json)?;
        }
        Commands::Retention { config, watch } => {
            commands::retention::run(&config, watch).await?;
        }
    }

    Ok(())
}
