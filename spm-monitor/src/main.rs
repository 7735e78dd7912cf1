//! spm-monitor - study-plan drift reconciler daemon
//!
//! `run` polls both reconciliation entry points until interrupted, `once` runs
//! a single pass of each, `report` lists the open monitor records.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spm_common::config::{ConfigOverrides, MonitorConfig, ENV_CONFIG_FILE};
use spm_monitor::alert::sink_for;
use spm_monitor::ledger::{MonitorLedger, MonitorType, RetrieveFilter, SqliteMonitorLedger};
use spm_monitor::scheduler::Scheduler;
use spm_monitor::StudyPlanMonitorService;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for spm-monitor
#[derive(Parser, Debug)]
#[command(name = "spm-monitor")]
#[command(about = "Detects and repairs study-plan drift")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = ENV_CONFIG_FILE, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Organization the learning-item pass runs for
    #[arg(long, global = true)]
    org_id: Option<String>,

    /// Enrollment drift poll interval, minutes
    #[arg(long, global = true)]
    student_course_interval: Option<u32>,

    /// Learning-item drift poll interval, minutes
    #[arg(long, global = true)]
    learning_item_interval: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll until interrupted
    Run,
    /// Run one pass of both entry points and exit
    Once,
    /// List open monitor records
    Report {
        /// Only records of this type
        #[arg(long = "type", value_enum)]
        monitor_type: Option<ReportType>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ReportType {
    EnrollmentDrift,
    LearningItemDrift,
}

impl From<ReportType> for MonitorType {
    fn from(t: ReportType) -> Self {
        match t {
            ReportType::EnrollmentDrift => MonitorType::EnrollmentDrift,
            ReportType::LearningItemDrift => MonitorType::LearningItemDrift,
        }
    }
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_file: self.config.clone(),
            database_path: self.database.clone(),
            organization_id: self.org_id.clone(),
            student_course_interval_minutes: self.student_course_interval,
            learning_item_interval_minutes: self.learning_item_interval,
            log_level: self.log_level.clone(),
        }
    }
}

fn init_tracing(level: &str) {
    let default_directives = format!("spm_monitor={level},spm_common={level}");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = MonitorConfig::resolve(&args.overrides()).context("Failed to load configuration")?;
    init_tracing(&config.log_level);

    info!("Starting spm-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {}", config.database_path.display());

    let pool = spm_common::db::init_database(&config.database_path)
        .await
        .context("Failed to initialize database")?;

    if let Command::Report { monitor_type } = args.command {
        return report(&pool, monitor_type.map(MonitorType::from)).await;
    }

    let alert = sink_for(config.alert_webhook_url.as_deref()).context("Failed to build alert sink")?;
    let service = Arc::new(StudyPlanMonitorService::new(pool, config, alert));
    let scheduler = Scheduler::new(service);

    match args.command {
        Command::Once => {
            scheduler.run_once().await.context("Reconciliation pass failed")?;
            info!("Pass complete");
        }
        Command::Run => {
            scheduler.run_until(shutdown_signal()).await;
            info!("Shutdown complete");
        }
        Command::Report { .. } => {}
    }

    Ok(())
}

async fn report(pool: &sqlx::SqlitePool, monitor_type: Option<MonitorType>) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let records = SqliteMonitorLedger
        .retrieve_by_filter(&mut conn, &RetrieveFilter::open(monitor_type))
        .await?;

    for record in &records {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            record.id,
            record.monitor_type(),
            record.course_id,
            record.student_id.as_deref().unwrap_or("-"),
            record.created_at.to_rfc3339(),
            serde_json::to_string(&record.payload)?
        );
    }
    info!(count = records.len(), "Open monitor records");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
