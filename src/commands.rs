//! UI-facing commands. Each one returns `Result<_, String>` so the caller
//! can hand the error straight to an alert.

use crate::{
    diagnostics::{LogEntry, LogStatistics},
    metrics::{LifecycleState, MetricsExport, StorageSnapshot},
    settings::WidgetSettings,
    store::{KeyValueStore, LocalStore},
    widget::{ContentRecord, SyncOutcome, TimelineEntry, TimelineStats},
    AppState,
};

const ENABLE_LOGS: bool = true;

use crate::log_error;

/// Sync the widget database and report the result to the shared log.
///
/// On failure the log gets the failed step and the raw error, and the
/// caller gets the one user-facing message.
pub async fn sync_widget_database<S, L, R>(
    state: &AppState<S, L>,
    source: &[R],
) -> Result<SyncOutcome, String>
where
    S: KeyValueStore,
    L: LocalStore,
    R: ContentRecord,
{
    let version = state.syncer.config().version.clone();
    state
        .debug_log
        .info(format!(
            "Syncing widget database v{version} from {} records",
            source.len()
        ))
        .await;

    match state.syncer.sync(source).await {
        Ok(outcome) => {
            let message = match &outcome {
                SyncOutcome::UpToDate { version, .. } => {
                    format!("Widget database already at v{version}")
                }
                SyncOutcome::Synced { version, count, .. } => {
                    format!("Widget database synced: {count} insults, v{version}")
                }
            };
            state.debug_log.success(message).await;
            Ok(outcome)
        }
        Err(err) => {
            log_error!("widget sync failed at {}: {err:?}", err.step());
            state
                .debug_log
                .error(format!("Widget sync failed at {}: {err:?}", err.step()))
                .await;
            Err(err.user_message())
        }
    }
}

pub async fn get_widget_timeline<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<Vec<TimelineEntry>, String> {
    Ok(state.timeline.build_timeline().await)
}

pub async fn get_widget_stats<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<TimelineStats, String> {
    Ok(state.timeline.stats().await)
}

pub async fn get_logs<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<Vec<LogEntry>, String> {
    Ok(state.debug_log.get_all_logs().await)
}

pub async fn get_logs_as_text<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<String, String> {
    Ok(state.debug_log.get_all_logs_as_text().await)
}

pub async fn get_log_statistics<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<LogStatistics, String> {
    Ok(state.debug_log.log_statistics().await)
}

pub async fn clear_logs<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<(), String> {
    state
        .debug_log
        .clear_all_logs()
        .await
        .map_err(|e| e.to_string())
}

pub async fn record_app_state<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
    app_state: &str,
) -> Result<(), String> {
    let app_state: LifecycleState = app_state.parse().map_err(|e: anyhow::Error| e.to_string())?;
    state
        .metrics
        .record_app_state_transition(app_state)
        .await
        .map_err(|e| e.to_string())
}

pub async fn record_cold_start<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
    duration_ms: u64,
) -> Result<(), String> {
    state
        .metrics
        .record_cold_start(duration_ms)
        .await
        .map_err(|e| e.to_string())
}

pub async fn record_storage_snapshot<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<StorageSnapshot, String> {
    state
        .metrics
        .record_storage_snapshot()
        .await
        .map_err(|e| e.to_string())
}

pub async fn export_metrics<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<MetricsExport, String> {
    Ok(state.metrics.export_metrics().await)
}

pub async fn clear_metrics<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<(), String> {
    state
        .metrics
        .clear_all_metrics()
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_widget_settings<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
) -> Result<WidgetSettings, String> {
    Ok(state.settings().widget())
}

/// Persist a new widget background colour. It reaches the widget with the
/// next database write, since the colour travels inside the database blob.
pub async fn set_widget_background_color<S: KeyValueStore, L: LocalStore>(
    state: &AppState<S, L>,
    color: Option<String>,
) -> Result<WidgetSettings, String> {
    state
        .settings()
        .update_background_color(color)
        .map_err(|e| e.to_string())?;
    Ok(state.settings().widget())
}
