//! Aurora - backup of the Penumbra mods your collections actually use
//!
//! Main entry point for the command line application.
//!
//! # Overview
//!
//! This binary crate provides the CLI frontend for Aurora. It initializes:
//! - Logging infrastructure (daily rolling file, console with `--debug`)
//! - Tokio async runtime (backup workers, progress stream, Ctrl-C handling)
//! - The [`Aurora`] facade (configuration, state, scan source, executor)
//!
//! # Commands
//!
//! - `aurora config [--reset] [--penumbra PATH] [--mods PATH] [--browse]`
//! - `aurora penumbra [--json]`
//! - `aurora filter add|remove <PATTERN>` / `aurora filter list`
//! - `aurora concurrency <0-32>`
//! - `aurora backup [--validate] [--threads N] [--json]`
//!
//! # Execution Flow
//!
//! 1. Parse arguments, resolve the configuration directory
//! 2. Initialize logging → `<config dir>/logs/aurora.<date>`
//! 3. Create the tokio runtime
//! 4. Open [`Aurora`] (loads or creates `aurora.yaml`)
//! 5. Run the command
//! 6. Log the metrics summary and shut the runtime down with a 5s timeout

use anyhow::{Context, Result};
use aurora::app::browse_directory;
use aurora::models::{BackupValidation, ConfigResult, Inventory};
use aurora::services::ProgressStream;
use aurora::{APP_NAME, Aurora, ConfigManager, VERSION};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Back up the Penumbra mods used by your collections
#[derive(Debug, Parser)]
#[command(name = "aurora", version, about)]
struct Cli {
    /// Directory holding aurora.yaml and the logs folder
    #[arg(long, global = true)]
    config_dir: Option<Utf8PathBuf>,

    /// Verbose logging, also echoed to the terminal
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show or change the Penumbra and mods paths
    Config {
        /// Restore the default settings first
        #[arg(long)]
        reset: bool,

        /// Penumbra plugin configuration folder
        #[arg(long)]
        penumbra: Option<Utf8PathBuf>,

        /// Folder holding the mod directories
        #[arg(long)]
        mods: Option<Utf8PathBuf>,

        /// Pick both folders with a directory dialog
        #[arg(long)]
        browse: bool,
    },

    /// List collections, unused mods and disk usage
    Penumbra {
        #[arg(long)]
        json: bool,
    },

    /// Manage the exclusion filters
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },

    /// Set the default number of backup workers (0 = all cores)
    Concurrency { value: u32 },

    /// Plan and run a backup
    Backup {
        /// Only print the plan
        #[arg(long)]
        validate: bool,

        /// Worker count for this run only
        #[arg(long)]
        threads: Option<u32>,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
enum FilterAction {
    /// Exclude mods whose name (or single collection) contains PATTERN
    Add { pattern: String },
    /// Remove a filter
    Remove { pattern: String },
    /// Print the filters in match order
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(ConfigManager::default_dir);
    let config_manager = ConfigManager::new(&config_dir)
        .with_context(|| format!("Failed to prepare config directory {}", config_dir))?;

    let _guard = aurora::logging::setup_logging_with_console(
        &config_manager.log_dir(),
        "aurora",
        cli.debug,
        cli.debug,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("aurora-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let app = Aurora::open(config_manager).context("Failed to load configuration")?;

    let result = runtime.block_on(run(cli.command, &app));
    if let Err(e) = &result {
        tracing::error!("Command failed: {:#}", e);
    }

    app.metrics().log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Shutdown complete");
    result
}

async fn run(command: Command, app: &Aurora) -> Result<()> {
    match command {
        Command::Config {
            reset,
            penumbra,
            mods,
            browse,
        } => configure(app, reset, penumbra, mods, browse),
        Command::Penumbra { json } => {
            let inventory = app.get_collections()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*inventory)?);
            } else {
                print_inventory(&inventory);
            }
            Ok(())
        }
        Command::Filter { action } => {
            let filters = match action {
                FilterAction::Add { pattern } => app.add_filter(&pattern)?,
                FilterAction::Remove { pattern } => app.remove_filter(&pattern)?,
                FilterAction::List => app.get_config().filters,
            };
            print_filters(&filters);
            Ok(())
        }
        Command::Concurrency { value } => {
            app.set_concurrency(value)?;
            println!("Concurrency: {}", describe_concurrency(value));
            Ok(())
        }
        Command::Backup {
            validate,
            threads,
            json,
        } => backup(app, validate, threads, json).await,
    }
}

fn configure(
    app: &Aurora,
    reset: bool,
    penumbra: Option<Utf8PathBuf>,
    mods: Option<Utf8PathBuf>,
    browse: bool,
) -> Result<()> {
    if reset {
        app.reset_config()?;
        println!("Configuration reset to defaults");
    }

    let (penumbra, mods) = if browse {
        let current = app.get_config();
        let penumbra = penumbra.or_else(|| {
            browse_directory(
                "Select the Penumbra configuration folder",
                Some(current.penumbra_path.as_path()),
            )
        });
        let mods = mods.or_else(|| {
            browse_directory("Select the Penumbra mods folder", Some(current.mods_path.as_path()))
        });
        (penumbra, mods)
    } else {
        (penumbra, mods)
    };

    let config = if penumbra.is_some() || mods.is_some() {
        app.update_config(penumbra, mods)?
    } else {
        app.get_config()
    };

    print_config(&config);
    Ok(())
}

async fn backup(app: &Aurora, validate_only: bool, threads: Option<u32>, json: bool) -> Result<()> {
    if validate_only {
        let plan = app.validate_backup()?;
        if json {
            println!("{}", serde_json::to_string_pretty(&*plan)?);
        } else {
            print_plan(&plan);
        }
        return Ok(());
    }

    let run = app.run_backup(threads)?;
    if !json {
        if let Some(plan) = app.state().read(|s| s.validation.clone()) {
            print_plan(&plan);
        }
    }

    let (mut progress, handle) = run.into_parts();

    let cancel = handle.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Cancelling backup...");
            cancel.cancel();
        }
    });

    let outcome = follow_progress(app, &mut progress, json).await;
    let result = handle.wait().await;
    ctrl_c.abort();
    outcome?;

    let result = result?;
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Backup written to {}", result.output_path);
        println!(
            "  {} mods, {} -> {} ({})",
            result.mods_archived,
            aurora::models::format_size(result.original_size),
            aurora::models::format_size(result.compressed_size),
            result.ratio
        );
    }
    Ok(())
}

/// Drive a progress bar from the run's event stream until the terminal event.
async fn follow_progress(app: &Aurora, progress: &mut ProgressStream, quiet: bool) -> Result<()> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(1000)
    };
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:40.cyan/dim}] {percent:>3}% {msg}")
            .context("Invalid progress template")?
            .progress_chars("━╸─"),
    );
    bar.enable_steady_tick(Duration::from_millis(100));

    while let Some(event) = progress.next().await {
        app.state().record_progress(&event);
        bar.set_position((event.percent * 10.0).round() as u64);
        bar.set_message(event.current.clone());

        if let Some(error) = event.error.as_deref() {
            bar.abandon_with_message(error.to_string());
            return Ok(());
        }
    }

    bar.finish_and_clear();
    Ok(())
}

fn print_config(config: &ConfigResult) {
    println!("Penumbra: {} ({})", config.penumbra_path, config.status.penumbra_status);
    println!("Mods:     {} ({})", config.mods_path, config.status.mods_status);
    println!("Concurrency: {}", describe_concurrency(config.concurrency));
    print_filters(&config.filters);
    if !config.status.valid {
        println!("Configuration is incomplete; fix the paths above before backing up");
    }
}

fn print_filters(filters: &[String]) {
    if filters.is_empty() {
        println!("No filters");
        return;
    }
    println!("Filters:");
    for (i, filter) in filters.iter().enumerate() {
        println!("  {}. {}", i + 1, filter);
    }
}

fn print_inventory(inventory: &Inventory) {
    for collection in &inventory.collections {
        println!("{} ({} mods)", collection.name, collection.mods.len());
        for mod_entry in &collection.mods {
            println!("  {:<50} {:>10}", mod_entry.name, mod_entry.size_human);
        }
    }

    let unused: Vec<_> = inventory.unused_mods().collect();
    if !unused.is_empty() {
        println!("Unused mods ({})", unused.len());
        for mod_entry in unused {
            println!("  {:<50} {:>10}", mod_entry.name, mod_entry.size_human);
        }
    }

    let stats = &inventory.stats;
    println!();
    println!(
        "{} mods, {} used, {} unused, {} collections",
        stats.total_mods, stats.used_mods, stats.unused_mods, stats.collection_count
    );
    println!(
        "Disk usage: {} total, {} used",
        stats.total_disk_size_human, stats.used_disk_size_human
    );
}

fn print_plan(plan: &BackupValidation) {
    for item in &plan.items {
        match &item.filtered_by {
            Some(filter) => println!("  - {} (filtered by \"{}\")", item.mod_entry.name, filter),
            None => println!("  + {} ({})", item.mod_entry.name, item.mod_entry.size_human),
        }
    }
    println!(
        "{} of {} used mods, {} total, estimated archive {}",
        plan.included_count(),
        plan.items.len(),
        plan.total_size_human,
        plan.estimated_size_human
    );
    if let Some(space) = plan.space {
        println!(
            "Free space: {} ({} required){}",
            aurora::models::format_size(space.available),
            aurora::models::format_size(space.required),
            if space.has_enough_space { "" } else { " - NOT ENOUGH" }
        );
    }
}

fn describe_concurrency(value: u32) -> String {
    match value {
        0 => "auto (all cores)".to_string(),
        n => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_backup_flags() {
        let cli = Cli::try_parse_from(["aurora", "backup", "--threads", "4", "--json"]).unwrap();
        match cli.command {
            Command::Backup {
                validate,
                threads,
                json,
            } => {
                assert!(!validate);
                assert_eq!(threads, Some(4));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_filter_add() {
        let cli = Cli::try_parse_from(["aurora", "--debug", "filter", "add", "weapon"]).unwrap();
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Command::Filter {
                action: FilterAction::Add { ref pattern }
            } if pattern == "weapon"
        ));
    }
}
