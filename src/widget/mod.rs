//! Everything the home-screen widget sees, and how the main process keeps
//! it fed.
//!
//! The widget runs in its own OS-managed process on its own schedule. The
//! only thing the two processes share is the app group store, so this
//! module is built around two keys in it:
//!
//! - [`INSULT_DATABASE_KEY`]: a JSON [`ContentDatabase`], always replaced
//!   wholesale.
//! - [`INSULT_DATABASE_VERSION_KEY`]: the bare version string of the last
//!   database that was written *and* verified.

pub mod error;
pub mod sampling;
pub mod syncer;
pub mod timeline;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::KeyValueStore;

pub use error::{SyncError, SyncStep};
pub use sampling::select_random;
pub use syncer::{DatabaseSyncer, RendererNotifier, SyncOutcome, SyncerConfig};
pub use timeline::{TimelineEntry, TimelineReconstructor, TimelineStats};

pub const DEFAULT_APP_GROUP: &str = "group.com.bosshog811.TheInsolentBard";
pub const INSULT_DATABASE_KEY: &str = "insultDatabase";
pub const INSULT_DATABASE_VERSION_KEY: &str = "insultDatabaseVersion";

/// Bump whenever the sample size or the source data changes; a mismatch
/// with the stored marker is what triggers a resync.
pub const CURRENT_DATABASE_VERSION: &str = "1.0.0";
pub const WIDGET_INSULT_COUNT: usize = 1000;
/// The widget schedules one entry per hour for two days.
pub const TIMELINE_LENGTH: usize = 48;

/// The renderer-visible payload stored under [`INSULT_DATABASE_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentDatabase {
    #[serde(rename = "insults")]
    pub items: Vec<String>,
    pub version: String,
    pub synced_at: DateTime<Utc>,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget_background_color: Option<String>,
}

/// Anything in the full content set that can be shown on the widget.
pub trait ContentRecord {
    fn display_text(&self) -> &str;
}

impl ContentRecord for String {
    fn display_text(&self) -> &str {
        self
    }
}

impl ContentRecord for &str {
    fn display_text(&self) -> &str {
        self
    }
}

/// A record as the data layer ships it. Only `insult` survives into the
/// widget database; everything else rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub insult: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ContentRecord for SourceRecord {
    fn display_text(&self) -> &str {
        &self.insult
    }
}

/// Parse a content file shaped either `{"insults": [...]}` or as a bare
/// array of records.
pub fn parse_source_records(raw: &str) -> Result<Vec<SourceRecord>, serde_json::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SourceFile {
        Wrapped { insults: Vec<SourceRecord> },
        Bare(Vec<SourceRecord>),
    }

    Ok(match serde_json::from_str::<SourceFile>(raw)? {
        SourceFile::Wrapped { insults } => insults,
        SourceFile::Bare(records) => records,
    })
}

/// Read and parse the stored database. `Ok(None)` when nothing has been
/// synced yet.
pub async fn read_database<S: KeyValueStore>(
    store: &S,
    step: SyncStep,
) -> Result<Option<ContentDatabase>, SyncError> {
    let raw = store
        .get(INSULT_DATABASE_KEY)
        .await
        .map_err(|err| SyncError::from_read(step, err))?;

    match raw {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| SyncError::SerializationFailed { step, source }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_uses_widget_field_names() {
        let database = ContentDatabase {
            items: vec!["Thou knave!".into()],
            version: "1.0.0".into(),
            synced_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            count: 1,
            widget_background_color: None,
        };

        let value = serde_json::to_value(&database).unwrap();
        assert_eq!(value["insults"][0], "Thou knave!");
        assert_eq!(value["count"], 1);
        assert_eq!(value["syncedAt"], "2026-01-01T00:00:00Z");
        assert!(value.get("widgetBackgroundColor").is_none());
    }

    #[test]
    fn source_records_keep_only_display_text() {
        let wrapped = r#"{"insults": [{"insult": "Thou churl!", "play": "Lear", "id": 7}]}"#;
        let bare = r#"[{"insult": "Thou churl!"}]"#;

        let wrapped = parse_source_records(wrapped).unwrap();
        let bare = parse_source_records(bare).unwrap();

        assert_eq!(wrapped[0].display_text(), "Thou churl!");
        assert_eq!(wrapped[0].extra["play"], "Lear");
        assert_eq!(bare[0].display_text(), "Thou churl!");
        assert!(bare[0].extra.is_empty());
    }
}
