mod cli;
mod config;
mod error;
mod formatter;
mod notifier;
mod pipeline;
mod report;
mod scheduler;
mod warehouse;

use crate::cli::{Cli, Commands};
use crate::config::Config;
use crate::notifier::slack::SlackNotifier;
use crate::pipeline::SyncSummary;
use crate::report::toggl::ReportClient;
use crate::warehouse::Gateway;
use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => handle_run(),
        Commands::Service => handle_service(),
        Commands::Doctor => handle_doctor(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = %format!("{error:#}"), "tracksync failed");
            ExitCode::FAILURE
        }
    }
}

fn handle_run() -> Result<()> {
    let config = load_config()?;
    run_once(&config).map(|_| ())
}

fn handle_service() -> Result<()> {
    let config = load_config()?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(run_service(config))
}

fn handle_doctor() -> Result<()> {
    let config_path = Config::config_path();
    if config_path.exists() {
        println!("[OK] config.json found: {}", config_path.display());
    } else {
        println!(
            "[OK] config.json not found, using defaults + environment: {}",
            config_path.display()
        );
    }

    let config = Config::load()?;
    for (key, value) in config.display_entries() {
        println!("- {key}: {value}");
    }

    match config.validate() {
        Ok(()) => {
            println!("doctor result: no issues");
            Ok(())
        }
        Err(error) => {
            println!("[WARN] {error:#}");
            println!("doctor result: configuration invalid");
            Err(error)
        }
    }
}

fn run_once(config: &Config) -> Result<SyncSummary> {
    let notifier = SlackNotifier::new(config)?;

    let summary = pipeline::run_job(
        config,
        || Local::now().naive_local(),
        &notifier,
        || ReportClient::connect(config),
        || Gateway::open(config),
    )?;

    info!(
        from = %summary.window.start_date(),
        to = %summary.window.end_date(),
        fetched = summary.fetched,
        formatted = summary.formatted,
        dropped = summary.dropped,
        deleted = summary.deleted,
        inserted = summary.inserted,
        table = ?summary.table_status,
        "sync finished"
    );

    Ok(summary)
}

async fn run_service(config: Config) -> Result<()> {
    let shared_config = Arc::new(config);
    let schedule_fallback = Arc::clone(&shared_config);
    let job_config = Arc::clone(&shared_config);

    info!(sync_time = %shared_config.sync_time, "tracksync service started");

    tokio::select! {
        scheduler_result = scheduler::run_daily(move || {
            Config::load()
                .and_then(|runtime| runtime.parse_sync_time())
                .or_else(|_| schedule_fallback.parse_sync_time())
        }, move |_date| {
            let config = Arc::clone(&job_config);
            async move {
                let runtime_config = Config::load()
                    .ok()
                    .filter(|runtime| runtime.validate().is_ok())
                    .unwrap_or_else(|| (*config).clone());

                tokio::task::spawn_blocking(move || run_once(&runtime_config).map(|_| ()))
                    .await
                    .context("Sync task panicked")?
            }
        }) => {
            scheduler_result?;
        }
        _ = signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn load_config() -> Result<Config> {
    let config = Config::load()?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}
