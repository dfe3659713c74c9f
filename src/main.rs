//! Rollcall - school attendance from the command line
//!
//! A CLI front-end for a remote student and attendance record store, with
//! a local aggregation engine for statistics and exported reports.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (connection, rejected request, bad config, etc.)
//!   2 - Class marking finished but some students could not be marked

mod analysis;
mod cli;
mod commands;
mod config;
mod models;
mod report;
mod store;
mod workflow;

use analysis::{Clock, FixedClock, SystemClock};
use anyhow::{Context, Result};
use cli::Args;
use commands::App;
use config::{Config, CONFIG_FILE_NAME};
use std::path::PathBuf;
use std::sync::Arc;
use store::{HttpRecordStore, RecordStore};
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Configuration decides the log level, so it is read before logging starts
    let (mut config, config_source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(&args, &config);

    info!("Rollcall v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    match config_source {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => debug!("No config file found, using defaults"),
    }

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .rollcall.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            CONFIG_FILE_NAME
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to set the API URL, token, narrative model, and more.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args, config: &Config) {
    let level = if config.general.verbose && !args.quiet {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the selected command. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    let Some(command) = args.command else {
        anyhow::bail!("No command given. Run with --help to see the commands.");
    };

    let clock: Arc<dyn Clock> = match args.today {
        Some(date) => {
            info!("Using {} as today", date);
            Arc::new(FixedClock::new(date.naive()))
        }
        None => Arc::new(SystemClock),
    };

    let http_store =
        HttpRecordStore::new(&config.api).context("Failed to set up the record store")?;
    debug!("Record store endpoint: {}", http_store.base_url());
    let store: Arc<dyn RecordStore> = Arc::new(http_store);

    let app = App {
        store,
        config,
        clock,
        show_progress: !args.quiet,
    };

    commands::run_command(&app, command).await
}

/// Load configuration from file or use defaults.
///
/// Returns the file the configuration came from, if any.
fn load_config(args: &Args) -> Result<(Config, Option<PathBuf>)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, Some(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, Some(PathBuf::from(CONFIG_FILE_NAME)))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("⚠️  Ignoring {}: {:#}", CONFIG_FILE_NAME, e);
            Ok((Config::default(), None))
        }
    }
}
