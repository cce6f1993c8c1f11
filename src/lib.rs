pub mod commands;
mod db;
pub mod diagnostics;
pub mod metrics;
pub mod settings;
pub mod store;
mod utils;
pub mod widget;

#[cfg(test)]
mod test_utils;

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use diagnostics::{DebugLog, LogSource};
use metrics::MetricsRecorder;
use settings::{SettingsStore, DATA_DIR_ENV, GROUP_CONTAINER_ENV};
use store::{KeyValueStore, LocalStore, SqliteStore};
use widget::{parse_source_records, DatabaseSyncer, TimelineReconstructor};

const ENABLE_LOGS: bool = true;

const DEFAULT_DATA_DIR: &str = ".widget-sync";
const DEFAULT_GROUP_CONTAINER_DIR: &str = "group-containers";
const LOCAL_NAMESPACE: &str = "local";

/// Everything the main process holds on to. `S` is the app group store
/// shared with the widget, `L` the process-local store.
pub struct AppState<S, L> {
    pub(crate) settings: SettingsStore,
    pub(crate) syncer: DatabaseSyncer<S>,
    pub(crate) timeline: TimelineReconstructor<S>,
    pub(crate) debug_log: DebugLog<S>,
    pub(crate) metrics: MetricsRecorder<L>,
}

impl<S: KeyValueStore + Clone, L: LocalStore> AppState<S, L> {
    pub fn new(shared: S, local: L, settings: SettingsStore) -> Self {
        let widget = settings.widget();
        Self {
            syncer: DatabaseSyncer::new(shared.clone(), widget.syncer_config()),
            timeline: TimelineReconstructor::new(shared.clone()),
            debug_log: DebugLog::new(shared, LogSource::Main, widget.log_capacity),
            metrics: MetricsRecorder::new(local, widget.metrics_config()),
            settings,
        }
    }
}

impl<S, L> AppState<S, L> {
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }
}

#[derive(Parser)]
#[command(name = "widget-sync", version, about = "Keep the home-screen widget's content in sync")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sample a content file into the widget database if the version changed
    Sync { content: PathBuf },
    /// Preview the widget's next 48 hours
    Timeline,
    /// Show what the widget database currently holds
    Stats,
    /// Print the shared diagnostic log
    Logs {
        #[arg(long)]
        clear: bool,
        /// Print counts and error rate instead of the entries
        #[arg(long)]
        stats: bool,
    },
    /// Export app state and performance metrics
    Metrics {
        #[arg(long)]
        clear: bool,
    },
    /// Record an app lifecycle transition (active, inactive, background)
    RecordState { state: String },
    /// Record a cold start duration in milliseconds
    RecordColdStart { ms: u64 },
    /// Show widget settings, optionally changing the background colour
    Settings {
        #[arg(long)]
        background_color: Option<String>,
    },
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    utils::logging::init(settings::debug_enabled());

    let data_dir = std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;

    let settings = SettingsStore::in_dir(&data_dir)?;
    log_debug!("Settings loaded from {}", settings.path().display());
    let widget = settings.widget();

    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move {
        let container_root = group_container_root(&data_dir, &widget.app_group)?;
        let shared =
            SqliteStore::open_app_group(&container_root, &widget.app_group, widget.store_timeout())
                .context("Failed to open app group store")?;
        let local = SqliteStore::open_local(&data_dir, LOCAL_NAMESPACE, widget.store_timeout())?;
        log_info!(
            "Shared store {} at {}",
            shared.namespace(),
            shared.path().display()
        );

        let state = AppState::new(shared, local, settings);
        execute(&state, cli.command).await
    })
}

/// The app group container is provisioned by the platform. Only the
/// default location under the data dir is created on demand.
fn group_container_root(data_dir: &Path, app_group: &str) -> Result<PathBuf> {
    if let Some(root) = std::env::var_os(GROUP_CONTAINER_ENV) {
        return Ok(PathBuf::from(root));
    }

    let root = data_dir.join(DEFAULT_GROUP_CONTAINER_DIR);
    fs::create_dir_all(root.join(app_group))
        .with_context(|| format!("Failed to create group container in {}", root.display()))?;
    Ok(root)
}

async fn execute<S, L>(state: &AppState<S, L>, command: Command) -> Result<ExitCode>
where
    S: KeyValueStore + Clone,
    L: LocalStore,
{
    match command {
        Command::Sync { content } => {
            let raw = fs::read_to_string(&content)
                .with_context(|| format!("Failed to read {}", content.display()))?;
            let records = parse_source_records(&raw)
                .with_context(|| format!("Failed to parse {}", content.display()))?;

            match commands::sync_widget_database(state, &records).await {
                Ok(outcome) => print_json(&outcome)?,
                Err(message) => {
                    eprintln!("{message}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Timeline => {
            let timeline = commands::get_widget_timeline(state)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&timeline)?
        }
        Command::Stats => {
            let stats = commands::get_widget_stats(state)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&stats)?
        }
        Command::Logs { clear: true, .. } => {
            commands::clear_logs(state).await.map_err(anyhow::Error::msg)?;
            log_info!("Diagnostic log cleared");
        }
        Command::Logs { stats: true, .. } => {
            let stats = commands::get_log_statistics(state)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&stats)?
        }
        Command::Logs { .. } => {
            println!("{}", commands::get_logs_as_text(state).await.map_err(anyhow::Error::msg)?)
        }
        Command::Metrics { clear: true } => {
            commands::clear_metrics(state).await.map_err(anyhow::Error::msg)?;
            log_info!("Metrics cleared");
        }
        Command::Metrics { clear: false } => {
            commands::record_storage_snapshot(state).await.map_err(anyhow::Error::msg)?;
            let export = commands::export_metrics(state)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&export)?
        }
        Command::RecordState { state: app_state } => {
            commands::record_app_state(state, &app_state).await.map_err(anyhow::Error::msg)?
        }
        Command::RecordColdStart { ms } => {
            commands::record_cold_start(state, ms).await.map_err(anyhow::Error::msg)?
        }
        Command::Settings {
            background_color: Some(color),
        } => {
            let settings = commands::set_widget_background_color(state, Some(color))
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&settings)?
        }
        Command::Settings {
            background_color: None,
        } => {
            let settings = commands::get_widget_settings(state)
                .await
                .map_err(anyhow::Error::msg)?;
            print_json(&settings)?
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
