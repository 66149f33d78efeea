//! dropsort command line
//!
//! Manages keyword rules in the shared store and runs one-off dispatch passes.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use dropsort::pidfile::{self, DaemonStatus};
use dropsort::{Config, DispatchSettings, Dispatcher, Outcome, Rule, RuleStore};

#[derive(Parser, Debug)]
#[command(name = "dropsort")]
#[command(author, version, about = "Route new downloads into folders by keyword")]
struct Cli {
    /// Path to config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the rule store
    #[arg(long, value_name = "FILE")]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Add a keyword rule
    Add {
        /// Substring to look for in new file paths
        keyword: String,

        /// Folder matching files are moved into
        destination: PathBuf,

        /// Create the destination folder if it does not exist
        #[arg(long)]
        create: bool,

        /// Replace the destination of an existing keyword
        #[arg(long)]
        replace: bool,
    },

    /// Remove a keyword rule
    Remove {
        keyword: String,
    },

    /// List all rules in match order (default)
    List,

    /// Validate config and rule store
    Check,

    /// Route files already in the folder (dry-run by default)
    Run {
        /// Actually move files (not just dry-run)
        #[arg(long)]
        apply: bool,

        /// Folder to process instead of the watch target
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show daemon status
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    dropsort::logging::init("warn", cli.verbose, None)?;

    let store = RuleStore::new(
        cli.store
            .as_deref()
            .map(dropsort::expand_path)
            .or_else(|| config.store_path())
            .context("Could not determine rule store location")?,
    );

    match cli.command {
        Some(Commands::Add {
            keyword,
            destination,
            create,
            replace,
        }) => {
            let rule = Rule::validated(&keyword, &destination, create)?;
            let shown = format!("'{}' -> {}", rule.keyword, rule.destination.display());
            match store.add(rule, replace)? {
                Some(previous) => println!("✓ Replaced {} (was {})", shown, previous.display()),
                None => println!("✓ Added {}", shown),
            }
        }
        Some(Commands::Remove { keyword }) => match store.remove(&keyword)? {
            Some(destination) => {
                println!("✓ Removed '{}' -> {}", keyword, destination.display())
            }
            None => {
                eprintln!("✗ No rule for keyword '{}'", keyword);
                std::process::exit(1);
            }
        },
        None | Some(Commands::List) => {
            let rules = store.load()?;
            if rules.is_empty() {
                println!("No rules in {}", store.path().display());
            } else {
                println!("Rules:");
                for (i, (keyword, destination)) in rules.iter().enumerate() {
                    let status = if destination.is_dir() { "✓" } else { "✗" };
                    println!("  {} [{}] {} -> {}", status, i + 1, keyword, destination.display());
                }
            }
        }
        Some(Commands::Check) => {
            let target = config.watch_target();
            match &target {
                Some(t) if t.is_dir() => println!("✓ Watch folder: {}", t.display()),
                Some(t) => println!("✗ Watch folder missing: {}", t.display()),
                None => println!("✗ Could not determine watch folder"),
            }

            match store.load() {
                Ok(rules) => {
                    println!("✓ Rule store: {}", store.path().display());
                    println!("  {} rules", rules.len());
                    for (keyword, destination) in rules.iter() {
                        if !destination.is_dir() {
                            println!("  ✗ '{}' -> {} is not a folder", keyword, destination.display());
                        }
                    }
                }
                Err(e) => {
                    eprintln!("✗ {}", e);
                    std::process::exit(1);
                }
            }

            if !target.is_some_and(|t| t.is_dir()) {
                std::process::exit(1);
            }
        }
        Some(Commands::Run { apply, dir }) => {
            let dir = dir
                .map(|d| dropsort::expand_path(&d))
                .or_else(|| config.watch_target())
                .context("Could not determine download directory")?;
            let dispatcher = Dispatcher::new(store, DispatchSettings::from_config(&config));

            println!("Processing: {}", dir.display());
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?;
            for entry in entries.flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                if apply {
                    match dispatcher.dispatch(&path) {
                        Outcome::Moved { to, .. } => {
                            println!("  Moved: {} -> {}", path.display(), to.display())
                        }
                        Outcome::MoveFailed { error, .. } => {
                            println!("  Failed: {}: {}", path.display(), error)
                        }
                        Outcome::StoreUnavailable(e) => return Err(e.into()),
                        _ => {}
                    }
                } else if let Some(rule) = dispatcher.preview(&path)? {
                    println!(
                        "  [dry-run] {} -> {} (keyword '{}')",
                        path.display(),
                        rule.destination.display(),
                        rule.keyword
                    );
                }
            }
        }
        Some(Commands::Status) => match pidfile::status(&pidfile::pid_path()) {
            DaemonStatus::Running { pid } => {
                println!("dropsortd is running");
                println!("   PID: {}", pid);
                println!("   Rule store: {}", store.path().display());
            }
            DaemonStatus::Stale { .. } | DaemonStatus::NotRunning => {
                println!("dropsortd is not running")
            }
        },
    }

    Ok(())
}
