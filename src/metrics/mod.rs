mod types;

pub use types::{
    AppStateEvent, AppStateExport, AppStateStats, ColdStartEvent, ColdStartExport,
    ColdStartStats, LifecycleState, MetricsConfig, MetricsExport, PerformanceExport,
    StorageSnapshot, Timestamped,
};

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::store::{LocalStore, StoreError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const KEY_PREFIX: &str = "@insolentbard:";
pub const METRICS_KEY_PREFIX: &str = "@insolentbard:metrics:";
pub const APP_STATE_KEY: &str = "@insolentbard:metrics:appState";
pub const COLD_START_KEY: &str = "@insolentbard:metrics:coldStart";
pub const STORAGE_KEY: &str = "@insolentbard:metrics:storage";
const FAVORITES_KEY: &str = "favoriteInsults";

/// Lifecycle and performance samples kept in the process-local store.
///
/// Every series is a JSON array under one key, rewritten whole on each
/// append after pruning by age and then by count.
#[derive(Clone)]
pub struct MetricsRecorder<S> {
    store: S,
    config: MetricsConfig,
}

impl<S: LocalStore> MetricsRecorder<S> {
    pub fn new(store: S, config: MetricsConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    pub async fn record_app_state_transition(&self, state: LifecycleState) -> Result<()> {
        self.record_app_state_at(state, Utc::now()).await
    }

    pub async fn record_app_state_at(
        &self,
        state: LifecycleState,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let event = AppStateEvent { timestamp, state };
        self.append(APP_STATE_KEY, event, self.config.max_events)
            .await
            .context("failed to record app state")?;
        log_debug!("App state transition: {state}");
        Ok(())
    }

    pub async fn app_state_history(&self) -> Vec<AppStateEvent> {
        self.read_series(APP_STATE_KEY).await
    }

    pub async fn app_state_stats(&self) -> AppStateStats {
        app_state_stats(&self.app_state_history().await)
    }

    /// Milliseconds spent in each state; see [`state_time_breakdown`].
    pub async fn state_time_breakdown(&self) -> BTreeMap<LifecycleState, i64> {
        state_time_breakdown(&self.app_state_history().await)
    }

    pub async fn clear_app_state_metrics(&self) -> Result<()> {
        self.store
            .remove(APP_STATE_KEY)
            .await
            .context("failed to clear app state metrics")?;
        log_debug!("App state metrics cleared");
        Ok(())
    }

    /// Remove every key under [`METRICS_KEY_PREFIX`].
    pub async fn clear_all_metrics(&self) -> Result<()> {
        let entries = self
            .store
            .entries()
            .await
            .context("failed to list metrics keys")?;

        for (key, _) in entries
            .iter()
            .filter(|(key, _)| key.starts_with(METRICS_KEY_PREFIX))
        {
            self.store
                .remove(key)
                .await
                .with_context(|| format!("failed to remove {key}"))?;
        }

        log_debug!("All metrics cleared");
        Ok(())
    }

    pub async fn record_cold_start(&self, duration_ms: u64) -> Result<()> {
        self.record_cold_start_at(duration_ms, Utc::now()).await
    }

    pub async fn record_cold_start_at(&self, duration_ms: u64, timestamp: DateTime<Utc>) -> Result<()> {
        let event = ColdStartEvent {
            timestamp,
            duration_ms,
        };
        self.append(COLD_START_KEY, event, self.config.max_cold_start_records)
            .await
            .context("failed to record cold start")?;
        log_debug!("Cold start recorded: {duration_ms}ms");
        Ok(())
    }

    pub async fn cold_start_history(&self) -> Vec<ColdStartEvent> {
        self.read_series(COLD_START_KEY).await
    }

    pub async fn cold_start_stats(&self) -> ColdStartStats {
        cold_start_stats(&self.cold_start_history().await)
    }

    /// Size of everything in the local store right now.
    pub async fn storage_metrics(&self) -> StorageSnapshot {
        let now = Utc::now();
        match self.store.entries().await {
            Ok(entries) => storage_snapshot(&entries, now),
            Err(err) => {
                log_warn!("failed to get storage metrics: {err}");
                StorageSnapshot::empty(now)
            }
        }
    }

    /// Take a storage snapshot and keep it in the storage history.
    pub async fn record_storage_snapshot(&self) -> Result<StorageSnapshot> {
        let entries = self
            .store
            .entries()
            .await
            .context("failed to list local store")?;
        let snapshot = storage_snapshot(&entries, Utc::now());
        self.append(STORAGE_KEY, snapshot.clone(), self.config.max_storage_snapshots)
            .await
            .context("failed to record storage snapshot")?;
        Ok(snapshot)
    }

    pub async fn storage_history(&self) -> Vec<StorageSnapshot> {
        self.read_series(STORAGE_KEY).await
    }

    pub async fn export_metrics(&self) -> MetricsExport {
        let events = self.app_state_history().await;
        let cold_starts = self.cold_start_history().await;

        MetricsExport {
            exported_at: Utc::now(),
            app_state: AppStateExport {
                stats: app_state_stats(&events),
                time_breakdown: state_time_breakdown(&events),
                events,
            },
            performance: PerformanceExport {
                cold_start: ColdStartExport {
                    stats: cold_start_stats(&cold_starts),
                    events: cold_starts,
                },
                storage: self.storage_metrics().await,
                storage_history: self.storage_history().await,
            },
        }
    }

    /// History view: store failures read as an empty series.
    async fn read_series<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        match self.try_read_series(key).await {
            Ok(events) => events,
            Err(err) => {
                log_warn!("failed to read {key}: {err}");
                Vec::new()
            }
        }
    }

    /// Malformed data counts as empty; only store failures are errors.
    async fn try_read_series<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(events) => Ok(events),
            Err(err) => {
                log_warn!("discarding malformed {key}: {err}");
                Ok(Vec::new())
            }
        }
    }

    async fn append<T>(&self, key: &str, event: T, max_count: usize) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Timestamped,
    {
        let mut events: Vec<T> = self
            .try_read_series(key)
            .await
            .with_context(|| format!("failed to read {key} before appending"))?;
        events.push(event);
        let events = prune_events(events, Utc::now(), self.config.max_age, max_count);

        let payload = serde_json::to_string(&events)?;
        self.store.set(key, &payload).await?;
        Ok(())
    }
}

/// Drop events at least `max_age` old, then keep the newest `max_count`
/// of what is left.
pub fn prune_events<T: Timestamped>(
    events: Vec<T>,
    now: DateTime<Utc>,
    max_age: Duration,
    max_count: usize,
) -> Vec<T> {
    let mut kept: Vec<T> = events
        .into_iter()
        .filter(|event| now - event.timestamp() < max_age)
        .collect();

    if kept.len() > max_count {
        let excess = kept.len() - max_count;
        kept.drain(..excess);
    }

    kept
}

pub fn app_state_stats(events: &[AppStateEvent]) -> AppStateStats {
    let mut state_count = BTreeMap::new();
    for event in events {
        *state_count.entry(event.state).or_insert(0) += 1;
    }

    let last = events.last();
    AppStateStats {
        total_transitions: events.len(),
        last_state: last.map(|event| event.state),
        last_transition: last.map(|event| event.timestamp),
        state_count,
    }
}

/// Sum the gap between each event and its successor, credited to the
/// earlier event's state. The last event has no successor, so time since
/// then is not counted. Out-of-order pairs contribute nothing.
pub fn state_time_breakdown(events: &[AppStateEvent]) -> BTreeMap<LifecycleState, i64> {
    let mut time_spent = BTreeMap::new();

    for pair in events.windows(2) {
        let duration = (pair[1].timestamp - pair[0].timestamp)
            .num_milliseconds()
            .max(0);
        *time_spent.entry(pair[0].state).or_insert(0) += duration;
    }

    time_spent
}

pub fn cold_start_stats(records: &[ColdStartEvent]) -> ColdStartStats {
    let Some(last) = records.last() else {
        return ColdStartStats {
            count: 0,
            average: 0,
            min: 0,
            max: 0,
            last: None,
            last_timestamp: None,
        };
    };

    let durations = records.iter().map(|record| record.duration_ms);
    let sum: u64 = durations.clone().sum();

    ColdStartStats {
        count: records.len(),
        average: (sum as f64 / records.len() as f64).round() as u64,
        min: durations.clone().min().unwrap_or(0),
        max: durations.max().unwrap_or(0),
        last: Some(last.duration_ms),
        last_timestamp: Some(last.timestamp),
    }
}

fn storage_category(key: &str) -> &'static str {
    match key.strip_prefix(KEY_PREFIX) {
        Some(rest) if rest.starts_with("metrics:") => "metrics",
        Some(rest) if rest.starts_with("settings:") => "settings",
        Some(rest) if rest.starts_with("logs:") => "logs",
        _ if key == FAVORITES_KEY => "favorites",
        _ => "other",
    }
}

pub fn storage_snapshot(entries: &[(String, String)], timestamp: DateTime<Utc>) -> StorageSnapshot {
    let mut total_size_bytes = 0u64;
    let mut breakdown = BTreeMap::new();

    for (key, value) in entries {
        let size = value.len() as u64;
        total_size_bytes += size;
        *breakdown
            .entry(storage_category(key).to_string())
            .or_insert(0) += size;
    }

    StorageSnapshot {
        timestamp,
        total_keys: entries.len(),
        total_size_bytes,
        total_size_kb: format!("{:.2}", total_size_bytes as f64 / 1024.0),
        breakdown,
    }
}
