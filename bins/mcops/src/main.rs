use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

mod commands;
mod config;
mod control;
mod daemon;
mod lock;

use commands::Request;
use config::McopsConfig;
use control::SchedulerAction;
use mcops_scheduler::SchedulerKind;

/// mcops - game-server ops control plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (YAML)
    #[arg(short, long, value_name = "FILE")]
    config: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Idempotency key for lifecycle commands
    #[arg(long, global = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the schedulers and console tail until SIGINT/SIGTERM
    Run {
        /// Run duration in seconds (for testing)
        #[arg(long)]
        run_duration: Option<u64>,
    },
    /// Print server status as JSON
    Status,
    /// Start the server and wait until it is ready
    Start,
    /// Stop the server
    Stop {
        /// Escalate to SIGKILL when a graceful stop fails
        #[arg(long)]
        force: bool,
    },
    /// Gated restart
    Restart {
        /// Restart source recorded by the gate
        #[arg(long)]
        source: Option<String>,
    },
    /// Force-stop, clean a stale PID file and start again
    Recover,
    /// Send a console command
    Command {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Print the newest operation trace records
    Trace {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Inspect or steer a scheduler in the running daemon
    Scheduler {
        #[arg(value_enum)]
        which: SchedulerArg,
        #[command(subcommand)]
        action: SchedulerCommand,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SchedulerArg {
    Reboot,
    Backup,
}

impl From<SchedulerArg> for SchedulerKind {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::Reboot => SchedulerKind::Reboot,
            SchedulerArg::Backup => SchedulerKind::Backup,
        }
    }
}

#[derive(Subcommand, Debug)]
enum SchedulerCommand {
    /// Print state and cycle details as JSON
    Status,
    Enable,
    /// Disable, aborting a running cycle
    Disable,
    /// Start a cycle on the next tick
    Trigger {
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Cancel the running countdown
    Cancel,
    /// Leave the error state and resume monitoring
    ClearError,
}

impl From<SchedulerCommand> for SchedulerAction {
    fn from(command: SchedulerCommand) -> Self {
        match command {
            SchedulerCommand::Status => SchedulerAction::Status,
            SchedulerCommand::Enable => SchedulerAction::Enable,
            SchedulerCommand::Disable => SchedulerAction::Disable,
            SchedulerCommand::Trigger { reason } => SchedulerAction::Trigger { reason },
            SchedulerCommand::Cancel => SchedulerAction::Cancel,
            SchedulerCommand::ClearError => SchedulerAction::ClearError,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = McopsConfig::load_from_file(&args.config)?;
    initialize_logging(args.debug, &config.logging.level)?;

    let request = match args.command {
        Command::Run { run_duration } => {
            info!("Starting mcops, config file: {}", args.config);
            return match run_duration {
                Some(seconds) => {
                    info!("Running for {} seconds (test mode)", seconds);
                    daemon::run(config, tokio::time::sleep(std::time::Duration::from_secs(seconds))).await
                }
                None => daemon::run(config, shutdown_signal()).await,
            };
        }
        Command::Status => Request::Status,
        Command::Start => Request::Start,
        Command::Stop { force } => Request::Stop { force },
        Command::Restart { source } => Request::Restart { source },
        Command::Recover => Request::Recover,
        Command::Command { text } => Request::Command { text: text.join(" ") },
        Command::Trace { limit } => Request::Trace { limit },
        Command::Scheduler { which, action } => Request::Scheduler {
            scheduler: which.into(),
            action: action.into(),
        },
    };
    commands::run(&config, request, args.key.as_deref()).await
}

fn initialize_logging(debug: bool, level: &str) -> Result<()> {
    let level = if debug { "debug" } else { level };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    {
        let handlers = (
            signal::unix::signal(signal::unix::SignalKind::terminate()),
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
        );
        match handlers {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                    }
                    _ = sigint.recv() => {
                        info!("Received SIGINT signal");
                    }
                }
            }
            _ => {
                tracing::warn!("Signal handlers unavailable, waiting for Ctrl+C");
                let _ = signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        info!("Received Ctrl+C signal");
    }
}
