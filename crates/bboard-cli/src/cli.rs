//! bboard - database connection pool tooling for the bulletin-board service
//!
//! - `health`: one readiness check against the configured database
//! - `watch`: periodic health checks until Ctrl+C or SIGTERM
//! - `config`: print the effective configuration

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bboard_connection::{ConnectionManager, HealthReport, spawn_shutdown_on_signal};
use bboard_driver_mysql::MySqlConnectionFactory;
use clap::{Parser, Subcommand};

mod logging;
mod settings;

use settings::Settings;

#[derive(Parser, Debug)]
#[command(
    name = "bboard",
    author,
    version,
    about = "Connection pool health tooling for the bulletin-board database"
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, short, global = true, env = "BBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Debug-level logging with span events
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one readiness check and print the JSON report
    Health(HealthArgs),
    /// Check health periodically until interrupted, then shut the pool down
    Watch(WatchArgs),
    /// Print the effective configuration with the password redacted
    Config,
}

#[derive(clap::Args, Debug)]
struct HealthArgs {
    /// Seconds allowed for acquiring a connection and running the check
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[derive(clap::Args, Debug)]
struct WatchArgs {
    /// Seconds between checks
    #[arg(long, short, default_value_t = 30)]
    interval: u64,

    /// Seconds allowed for each check
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _log_guard = logging::init(logging::LoggingConfig::from_settings(
        &settings.logging,
        cli.verbose,
    ))?;

    match cli.command {
        Commands::Health(args) => run_health(settings, args).await,
        Commands::Watch(args) => run_watch(settings, args).await,
        Commands::Config => run_config(&settings),
    }
}

fn build_manager(settings: &Settings) -> Result<Arc<ConnectionManager>> {
    let factory = MySqlConnectionFactory::new(settings.database.clone())
        .context("Invalid database configuration")?;
    let manager = ConnectionManager::new(settings.manager.clone(), Arc::new(factory))
        .context("Invalid pool configuration")?;
    Ok(Arc::new(manager))
}

fn print_report(report: &HealthReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    println!("{}", json);
    Ok(())
}

async fn run_health(settings: Settings, args: HealthArgs) -> Result<ExitCode> {
    let manager = build_manager(&settings)?;
    let report = manager
        .health_check(Duration::from_secs(args.timeout))
        .await;
    manager.shutdown().await;

    print_report(&report)?;
    Ok(if report.is_usable() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_watch(settings: Settings, args: WatchArgs) -> Result<ExitCode> {
    let manager = build_manager(&settings)?;
    let interval = Duration::from_secs(args.interval.max(1));
    let timeout = Duration::from_secs(args.timeout);

    tracing::info!(?interval, host = %settings.database.host, "watching database health");
    let mut shutdown = spawn_shutdown_on_signal(Arc::clone(&manager));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut last_usable = true;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let report = manager.health_check(timeout).await;
                if report.is_usable() != last_usable {
                    tracing::warn!(status = %report.status, "database health changed");
                }
                last_usable = report.is_usable();
                print_report(&report)?;
            }
        }
    }

    // A check racing the signal may have re-opened the pool
    manager.shutdown().await;
    tracing::info!("watch stopped");
    Ok(ExitCode::SUCCESS)
}

fn run_config(settings: &Settings) -> Result<ExitCode> {
    print!("{}", settings.to_toml()?);
    Ok(ExitCode::SUCCESS)
}
