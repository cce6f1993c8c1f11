//! In-app preview of the widget's 48-hour schedule.
//!
//! This is an approximation. The widget draws its own random sample when the
//! OS asks it for a timeline, and that draw is never shared back. The preview
//! draws again, independently, from the same stored database, so the items
//! it shows will usually differ from what is on the home screen. Only the
//! shape (slot count, spacing, which slot is current) is faithful.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::Serialize;

use crate::store::KeyValueStore;

use super::{read_database, select_random, ContentDatabase, SyncStep, TIMELINE_LENGTH};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub is_past: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineStats {
    pub total_insults: usize,
    pub synced_at: Option<DateTime<Utc>>,
    pub background_color: Option<String>,
    pub timeline_length: usize,
}

impl TimelineStats {
    fn empty() -> Self {
        Self {
            total_insults: 0,
            synced_at: None,
            background_color: None,
            timeline_length: 0,
        }
    }
}

pub struct TimelineReconstructor<S> {
    store: S,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl<S: KeyValueStore> TimelineReconstructor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    fn rng(&self) -> MutexGuard<'_, Box<dyn RngCore + Send>> {
        match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Read failures and malformed data both look like "nothing synced".
    async fn load(&self) -> Option<ContentDatabase> {
        match read_database(&self.store, SyncStep::Preview).await {
            Ok(database) => database,
            Err(err) => {
                log_warn!("failed to read widget database for preview: {err}");
                None
            }
        }
    }

    pub async fn build_timeline(&self) -> Vec<TimelineEntry> {
        self.build_timeline_at(Utc::now()).await
    }

    pub async fn build_timeline_at(&self, now: DateTime<Utc>) -> Vec<TimelineEntry> {
        let Some(database) = self.load().await else {
            return Vec::new();
        };

        let selected = {
            let mut rng = self.rng();
            select_random(&database.items, TIMELINE_LENGTH, &mut *rng)
        };

        selected
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                let timestamp = now + Duration::hours(index as i64);
                TimelineEntry {
                    index,
                    timestamp,
                    content,
                    is_past: timestamp < now,
                    is_current: index == 0,
                }
            })
            .collect()
    }

    /// Derived from stored metadata only, so repeated calls agree.
    pub async fn stats(&self) -> TimelineStats {
        match self.load().await {
            Some(database) => TimelineStats {
                total_insults: database.count,
                synced_at: Some(database.synced_at),
                background_color: database.widget_background_color,
                timeline_length: TIMELINE_LENGTH,
            },
            None => TimelineStats::empty(),
        }
    }
}
