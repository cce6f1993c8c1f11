use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{
    diagnostics::DEFAULT_LOG_CAPACITY,
    metrics::MetricsConfig,
    widget::{SyncerConfig, CURRENT_DATABASE_VERSION, DEFAULT_APP_GROUP, WIDGET_INSULT_COUNT},
};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

pub const DEBUG_ENV: &str = "BARD_DEBUG";
pub const DATA_DIR_ENV: &str = "BARD_DATA_DIR";
pub const GROUP_CONTAINER_ENV: &str = "BARD_GROUP_CONTAINER";
pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub max_events: usize,
    pub max_age_days: i64,
    pub max_cold_start_records: usize,
    pub max_storage_snapshots: usize,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        let defaults = MetricsConfig::default();
        Self {
            max_events: defaults.max_events,
            max_age_days: defaults.max_age.num_days(),
            max_cold_start_records: defaults.max_cold_start_records,
            max_storage_snapshots: defaults.max_storage_snapshots,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetSettings {
    pub app_group: String,
    /// Marker written after a verified sync. Change it to force a resync.
    pub database_version: String,
    pub widget_insult_count: usize,
    pub log_capacity: usize,
    pub store_timeout_ms: u64,
    pub widget_background_color: Option<String>,
    pub metrics: MetricsSettings,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self {
            app_group: DEFAULT_APP_GROUP.into(),
            database_version: CURRENT_DATABASE_VERSION.into(),
            widget_insult_count: WIDGET_INSULT_COUNT,
            log_capacity: DEFAULT_LOG_CAPACITY,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            widget_background_color: None,
            metrics: MetricsSettings::default(),
        }
    }
}

impl WidgetSettings {
    pub fn syncer_config(&self) -> SyncerConfig {
        SyncerConfig {
            version: self.database_version.clone(),
            sample_size: self.widget_insult_count,
            background_color: self.widget_background_color.clone(),
        }
    }

    pub fn metrics_config(&self) -> MetricsConfig {
        MetricsConfig {
            max_events: self.metrics.max_events,
            max_age: Duration::days(self.metrics.max_age_days.max(0)),
            max_cold_start_records: self.metrics.max_cold_start_records,
            max_storage_snapshots: self.metrics.max_storage_snapshots,
        }
    }

    pub fn store_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.store_timeout_ms)
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<WidgetSettings>,
}

impl SettingsStore {
    /// Load from `path`. A missing or unparsable file falls back to
    /// defaults; only an unreadable existing file is an error.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log_warn!("ignoring malformed settings in {}: {err}", path.display());
                WidgetSettings::default()
            })
        } else {
            WidgetSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        Self::new(data_dir.join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn widget(&self) -> WidgetSettings {
        self.read().clone()
    }

    pub fn update_background_color(&self, color: Option<String>) -> Result<()> {
        let mut guard = self.write();
        guard.widget_background_color = color;
        self.persist(&guard)
    }

    fn persist(&self, data: &WidgetSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, WidgetSettings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, WidgetSettings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// `BARD_DEBUG=1` or `BARD_DEBUG=true`.
pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| is_truthy(&value))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}
