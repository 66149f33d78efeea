//! dropsort daemon (dropsortd)
//!
//! Background service that watches the download folder and routes new files.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dropsort::pidfile::{self, DaemonStatus};

#[derive(Parser, Debug)]
#[command(name = "dropsortd")]
#[command(author, version, about = "dropsort background daemon")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the rule store
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Folder to watch instead of the download directory
    #[arg(short, long, value_name = "DIR")]
    watch: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run in the foreground until interrupted (default)
    Run,

    /// Alias for run; use a service manager to background it
    Start,

    /// Stop a running daemon
    Stop,

    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    match cli.command.take() {
        None | Some(Commands::Run) | Some(Commands::Start) => run_daemon(cli).await?,
        Some(Commands::Stop) => {
            let pid = pidfile::terminate(&pidfile::pid_path())?;
            println!("Sent stop signal to dropsortd (pid {})", pid);
        }
        Some(Commands::Status) => match pidfile::status(&pidfile::pid_path()) {
            DaemonStatus::Running { pid } => println!("dropsortd is running (pid {})", pid),
            DaemonStatus::Stale { pid } => {
                println!("dropsortd is not running (stale pid file for {})", pid)
            }
            DaemonStatus::NotRunning => println!("dropsortd is not running"),
        },
    }

    Ok(())
}

async fn run_daemon(cli: Cli) -> Result<()> {
    let config = dropsort::Config::load(cli.config.as_deref())?;
    dropsort::logging::init(
        &config.general.log_level,
        cli.verbose,
        config.log_file().as_deref(),
    )?;
    dropsort::notifications::init(config.general.notifications_enabled);

    let store_path = cli
        .store
        .map(|p| dropsort::expand_path(&p))
        .or_else(|| config.store_path())
        .context("Could not determine rule store location")?;
    let target = cli
        .watch
        .map(|p| dropsort::expand_path(&p))
        .or_else(|| config.watch_target())
        .context("Could not determine download directory")?;

    info!("Rule store: {}", store_path.display());

    let dispatcher = dropsort::Dispatcher::new(
        dropsort::RuleStore::new(store_path),
        dropsort::DispatchSettings::from_config(&config),
    );
    let service = dropsort::DispatcherService::new(dispatcher, target, config.dedupe_window());

    let _pid_file = pidfile::PidFile::create(&pidfile::pid_path())?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Shutting down...");
            shutdown.cancel();
        });
    }

    info!("Daemon running. Press Ctrl+C to stop.");
    service
        .run(shutdown)
        .await
        .with_context(|| format!("Cannot watch {}", service.watch_target().display()))?;

    Ok(())
}

/// Resolve on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
