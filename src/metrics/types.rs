use std::{collections::BTreeMap, fmt, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// App lifecycle states as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Inactive,
    Background,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Background => "background",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(LifecycleState::Active),
            "inactive" => Ok(LifecycleState::Inactive),
            "background" => Ok(LifecycleState::Background),
            other => Err(anyhow!("unknown app state '{other}'")),
        }
    }
}

pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppStateEvent {
    pub timestamp: DateTime<Utc>,
    pub state: LifecycleState,
}

impl Timestamped for AppStateEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColdStartEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
}

impl Timestamped for ColdStartEvent {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_keys: usize,
    pub total_size_bytes: u64,
    #[serde(rename = "totalSizeKB")]
    pub total_size_kb: String,
    pub breakdown: BTreeMap<String, u64>,
}

impl StorageSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            total_keys: 0,
            total_size_bytes: 0,
            total_size_kb: "0.00".to_string(),
            breakdown: BTreeMap::new(),
        }
    }
}

impl Timestamped for StorageSnapshot {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateStats {
    pub total_transitions: usize,
    pub last_state: Option<LifecycleState>,
    pub last_transition: Option<DateTime<Utc>>,
    pub state_count: BTreeMap<LifecycleState, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartStats {
    pub count: usize,
    pub average: u64,
    pub min: u64,
    pub max: u64,
    pub last: Option<u64>,
    pub last_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppStateExport {
    pub events: Vec<AppStateEvent>,
    pub stats: AppStateStats,
    /// Milliseconds spent in each state.
    pub time_breakdown: BTreeMap<LifecycleState, i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartExport {
    pub events: Vec<ColdStartEvent>,
    pub stats: ColdStartStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceExport {
    pub cold_start: ColdStartExport,
    pub storage: StorageSnapshot,
    pub storage_history: Vec<StorageSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsExport {
    pub exported_at: DateTime<Utc>,
    pub app_state: AppStateExport,
    pub performance: PerformanceExport,
}

/// Retention limits. Age is applied before count.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub max_events: usize,
    pub max_age: Duration,
    pub max_cold_start_records: usize,
    pub max_storage_snapshots: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_events: 100,
            max_age: Duration::days(7),
            max_cold_start_records: 10,
            max_storage_snapshots: 50,
        }
    }
}
