use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cms_dataset_sync::batch::{BatchCoordinator, CancelFlag};
use cms_dataset_sync::catalog::{CatalogClient, CatalogHttpClient};
use cms_dataset_sync::config::{ConfigLoader, ResolvedConfig};
use cms_dataset_sync::domain::DatasetRecord;
use cms_dataset_sync::error::SyncError;
use cms_dataset_sync::metadata::MetadataStore;
use cms_dataset_sync::output::{JsonOutput, LogSink, OutputMode};
use cms_dataset_sync::store::DataStore;

#[derive(Parser)]
#[command(name = "cms-sync")]
#[command(about = "Incremental downloader for CMS provider-data catalog datasets")]
#[command(version, author)]
struct Cli {
    /// Print results as JSON instead of logging progress.
    #[arg(long, global = true)]
    json: bool,

    /// Path to a JSON config file (default: cms-sync.json if present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run one sync batch")]
    Run,
    #[command(about = "Show recorded sync state")]
    Status,
    #[command(about = "Run one batch now, then one per interval")]
    Daemon(DaemonArgs),
}

#[derive(Args)]
struct DaemonArgs {
    #[arg(long, default_value_t = 24)]
    interval_hours: u64,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(sync) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(sync));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::ConfigRead(_) | SyncError::ConfigParse(_) => 2,
        SyncError::CatalogHttp(_)
        | SyncError::CatalogStatus { .. }
        | SyncError::DownloadHttp(_)
        | SyncError::DownloadStatus { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Text
    };

    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;

    let cancel = CancelFlag::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.as_atomic())
        .into_diagnostic()?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel.as_atomic())
        .into_diagnostic()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let client = CatalogHttpClient::new(&config.catalog_url).into_diagnostic()?;
            let coordinator = build_coordinator(client, &config, cancel)?;
            run_batch(&coordinator, output_mode)
        }
        Commands::Status => {
            let coordinator = build_coordinator(NopCatalog, &config, cancel)?;
            run_status(&coordinator, output_mode)
        }
        Commands::Daemon(args) => {
            let client = CatalogHttpClient::new(&config.catalog_url).into_diagnostic()?;
            let coordinator = build_coordinator(client, &config, cancel.clone())?;
            run_daemon(&coordinator, &args, &cancel)
        }
    }
}

fn build_coordinator<C: CatalogClient>(
    client: C,
    config: &ResolvedConfig,
    cancel: CancelFlag,
) -> miette::Result<BatchCoordinator<C>> {
    let data = DataStore::new(config.data_dir.clone());
    data.ensure_layout().into_diagnostic()?;
    let store = MetadataStore::open(&data.metadata_db_path()).into_diagnostic()?;
    Ok(BatchCoordinator::new(
        client,
        data,
        store,
        config.keyword.clone(),
        config.workers,
        cancel,
    ))
}

fn run_batch<C: CatalogClient>(
    coordinator: &BatchCoordinator<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => {
            let summary = coordinator.run(&JsonOutput).into_diagnostic()?;
            JsonOutput::print_run(&summary).into_diagnostic()?;
        }
        OutputMode::Text => {
            coordinator.run(&LogSink).into_diagnostic()?;
            tracing::info!("sync job completed");
        }
    }
    Ok(())
}

fn run_status<C: CatalogClient>(
    coordinator: &BatchCoordinator<C>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let status = coordinator.status().into_diagnostic()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_status(&status).into_diagnostic()?,
        OutputMode::Text => match &status.last_processed {
            Some(date) => {
                tracing::info!("{} datasets recorded, last processed {date}", status.datasets)
            }
            None => tracing::info!("no datasets recorded yet"),
        },
    }
    Ok(())
}

/// Stand-in scheduler: one batch immediately, then one per interval. A real
/// deployment can instead invoke `cms-sync run` from cron or a timer unit.
fn run_daemon<C: CatalogClient>(
    coordinator: &BatchCoordinator<C>,
    args: &DaemonArgs,
    cancel: &CancelFlag,
) -> miette::Result<()> {
    let interval = Duration::from_secs(args.interval_hours.max(1) * 60 * 60);
    let sink = LogSink;
    loop {
        // A failed cycle is logged and retried at the next interval; only
        // shutdown ends the loop.
        if let Err(err) = coordinator.run(&sink) {
            tracing::error!("sync batch failed: {err}");
        }
        if cancel.is_cancelled() {
            break;
        }
        tracing::info!(
            "next sync in {} hours",
            args.interval_hours.max(1)
        );
        sleep_until(Instant::now() + interval, cancel);
        if cancel.is_cancelled() {
            break;
        }
    }
    tracing::info!("scheduler stopped");
    Ok(())
}

fn sleep_until(deadline: Instant, cancel: &CancelFlag) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(Duration::from_secs(60)));
    }
}

struct NopCatalog;

impl CatalogClient for NopCatalog {
    fn list_datasets(&self) -> Result<Vec<DatasetRecord>, SyncError> {
        Err(SyncError::CatalogHttp(
            "catalog client not configured".to_string(),
        ))
    }

    fn download_table(&self, _url: &str) -> Result<Vec<u8>, SyncError> {
        Err(SyncError::DownloadHttp(
            "catalog client not configured".to_string(),
        ))
    }
}
