use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rand::{rngs::StdRng, RngCore, SeedableRng};
use serde::Serialize;

use crate::store::KeyValueStore;

use super::{
    read_database, select_random, ContentDatabase, ContentRecord, SyncError, SyncStep,
    CURRENT_DATABASE_VERSION, INSULT_DATABASE_KEY, INSULT_DATABASE_VERSION_KEY,
    WIDGET_INSULT_COUNT,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Asks the OS to re-run the widget's timeline provider.
pub trait RendererNotifier: Send + Sync {
    fn request_reload(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct SyncerConfig {
    pub version: String,
    pub sample_size: usize,
    pub background_color: Option<String>,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_DATABASE_VERSION.to_string(),
            sample_size: WIDGET_INSULT_COUNT,
            background_color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// The marker already matched; nothing was written.
    #[serde(rename_all = "camelCase")]
    UpToDate {
        version: String,
        reload_requested: bool,
    },
    #[serde(rename_all = "camelCase")]
    Synced {
        version: String,
        count: usize,
        reload_requested: bool,
    },
}

impl SyncOutcome {
    pub fn version(&self) -> &str {
        match self {
            SyncOutcome::UpToDate { version, .. } | SyncOutcome::Synced { version, .. } => version,
        }
    }

    pub fn wrote_database(&self) -> bool {
        matches!(self, SyncOutcome::Synced { .. })
    }
}

/// Keeps the widget's [`ContentDatabase`] current.
///
/// A sync only writes when the stored version marker differs from the
/// configured version. Writes go database first, then a read-back check,
/// then the marker, so the marker never points at a database that was not
/// fully stored. A crash anywhere before the marker write leaves the old
/// marker in place and the next sync starts over.
pub struct DatabaseSyncer<S> {
    store: S,
    config: SyncerConfig,
    notifier: Option<Box<dyn RendererNotifier>>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl<S: KeyValueStore> DatabaseSyncer<S> {
    pub fn new(store: S, config: SyncerConfig) -> Self {
        Self {
            store,
            config,
            notifier: None,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn RendererNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the random source, e.g. with a seeded `StdRng` in tests.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn config(&self) -> &SyncerConfig {
        &self.config
    }

    fn rng(&self) -> MutexGuard<'_, Box<dyn RngCore + Send>> {
        match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub async fn sync<R: ContentRecord>(&self, source: &[R]) -> Result<SyncOutcome, SyncError> {
        let version = self.config.version.as_str();

        let marker = self
            .store
            .get(INSULT_DATABASE_VERSION_KEY)
            .await
            .map_err(|err| SyncError::from_read(SyncStep::ReadMarker, err))?;

        if marker.as_deref() == Some(version) {
            log_debug!("widget database already at version {version}; skipping sync");
            let reload_requested = self.notify_renderer();
            return Ok(SyncOutcome::UpToDate {
                version: version.to_string(),
                reload_requested,
            });
        }

        log_info!(
            "widget database stale (stored {:?}, current {version}); syncing from {} items",
            marker,
            source.len()
        );

        if source.is_empty() {
            return Err(SyncError::EmptySource);
        }

        let texts: Vec<&str> = source.iter().map(|record| record.display_text()).collect();
        let sample: Vec<String> = {
            let mut rng = self.rng();
            select_random(&texts, self.config.sample_size, &mut *rng)
                .into_iter()
                .map(str::to_owned)
                .collect()
        };

        let database = ContentDatabase {
            count: sample.len(),
            items: sample,
            version: version.to_string(),
            synced_at: Utc::now(),
            widget_background_color: self.config.background_color.clone(),
        };

        let payload = serde_json::to_string(&database).map_err(|source| {
            SyncError::SerializationFailed {
                step: SyncStep::Serialize,
                source,
            }
        })?;

        self.store
            .set(INSULT_DATABASE_KEY, &payload)
            .await
            .map_err(|err| SyncError::from_write(SyncStep::WriteDatabase, err))?;

        self.verify(&database).await?;

        self.store
            .set(INSULT_DATABASE_VERSION_KEY, version)
            .await
            .map_err(|err| SyncError::from_write(SyncStep::WriteMarker, err))?;

        log_info!(
            "widget database synced: {} items at version {version} ({} bytes)",
            database.count,
            payload.len()
        );

        let reload_requested = self.notify_renderer();

        Ok(SyncOutcome::Synced {
            version: version.to_string(),
            count: database.count,
            reload_requested,
        })
    }

    async fn verify(&self, written: &ContentDatabase) -> Result<(), SyncError> {
        let stored = match read_database(&self.store, SyncStep::Verify).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                return Err(SyncError::VerifyFailed {
                    reason: "database missing after write".to_string(),
                })
            }
            Err(err @ SyncError::StoreUnavailable { .. }) | Err(err @ SyncError::Timeout { .. }) => {
                return Err(err)
            }
            Err(err) => {
                return Err(SyncError::VerifyFailed {
                    reason: format!("read-back failed: {err}"),
                })
            }
        };

        if stored.count != written.count || stored.items.len() != written.count {
            return Err(SyncError::VerifyFailed {
                reason: format!(
                    "count mismatch: wrote {}, read back {} ({} items)",
                    written.count,
                    stored.count,
                    stored.items.len()
                ),
            });
        }

        if stored.version != written.version {
            return Err(SyncError::VerifyFailed {
                reason: format!(
                    "version mismatch: wrote {}, read back {}",
                    written.version, stored.version
                ),
            });
        }

        Ok(())
    }

    /// Best effort; the widget also reloads on its own schedule.
    fn notify_renderer(&self) -> bool {
        let Some(notifier) = self.notifier.as_ref() else {
            log_debug!("no renderer reload capability; widget will refresh on its own schedule");
            return false;
        };

        match notifier.request_reload() {
            Ok(()) => true,
            Err(err) => {
                log_warn!("renderer reload request failed: {err:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use super::*;
    use crate::{store::KeyValueStore, test_utils::ScriptedStore};

    fn source(len: usize) -> Vec<String> {
        (0..len).map(|i| format!("Thou knave number {i}!")).collect()
    }

    fn config(version: &str, sample_size: usize) -> SyncerConfig {
        SyncerConfig {
            version: version.to_string(),
            sample_size,
            background_color: None,
        }
    }

    fn syncer(store: &ScriptedStore, version: &str, sample_size: usize) -> DatabaseSyncer<ScriptedStore> {
        DatabaseSyncer::new(store.clone(), config(version, sample_size))
            .with_rng(StdRng::seed_from_u64(5))
    }

    async fn stored_database(store: &ScriptedStore) -> ContentDatabase {
        let raw = store.backing().get(INSULT_DATABASE_KEY).await.unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    async fn stored_marker(store: &ScriptedStore) -> Option<String> {
        store.backing().get(INSULT_DATABASE_VERSION_KEY).await.unwrap()
    }

    struct CountingNotifier(Arc<AtomicUsize>);

    impl RendererNotifier for CountingNotifier {
        fn request_reload(&self) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct BrokenNotifier;

    impl RendererNotifier for BrokenNotifier {
        fn request_reload(&self) -> anyhow::Result<()> {
            anyhow::bail!("widget center missing")
        }
    }

    #[tokio::test]
    async fn first_sync_writes_database_then_marker() {
        let store = ScriptedStore::new();
        let items = source(10_000);

        let outcome = syncer(&store, "1.0.0", 1000).sync(&items).await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                version: "1.0.0".into(),
                count: 1000,
                reload_requested: false,
            }
        );
        let database = stored_database(&store).await;
        assert_eq!(database.count, 1000);
        assert_eq!(database.items.len(), 1000);
        assert_eq!(database.version, "1.0.0");
        let unique: HashSet<_> = database.items.iter().collect();
        assert_eq!(unique.len(), 1000);
        assert!(database.items.iter().all(|item| items.contains(item)));
        assert_eq!(stored_marker(&store).await.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn repeat_sync_at_same_version_only_reads_the_marker() {
        let store = ScriptedStore::new();
        let items = source(200);
        let syncer = syncer(&store, "1.0.0", 50);

        syncer.sync(&items).await.unwrap();
        let before = stored_database(&store).await;
        store.reset_counts();

        let outcome = syncer.sync(&items).await.unwrap();

        assert!(!outcome.wrote_database());
        assert_eq!(store.total_reads(), 1);
        assert_eq!(store.reads(INSULT_DATABASE_VERSION_KEY), 1);
        assert_eq!(store.reads(INSULT_DATABASE_KEY), 0);
        assert_eq!(store.total_writes(), 0);
        assert_eq!(stored_database(&store).await, before);
    }

    #[tokio::test]
    async fn version_bump_resamples() {
        let store = ScriptedStore::new();
        let items = source(10_000);

        syncer(&store, "1.0.0", 1000).sync(&items).await.unwrap();
        let first = stored_database(&store).await;

        let outcome = DatabaseSyncer::new(store.clone(), config("1.0.1", 1000))
            .with_rng(StdRng::seed_from_u64(99))
            .sync(&items)
            .await
            .unwrap();

        let second = stored_database(&store).await;
        assert_eq!(outcome.version(), "1.0.1");
        assert_eq!(second.count, 1000);
        assert_eq!(second.version, "1.0.1");
        assert_ne!(first.items, second.items);
        assert_eq!(stored_marker(&store).await.as_deref(), Some("1.0.1"));
    }

    #[tokio::test]
    async fn crash_before_marker_write_is_resynced() {
        let store = ScriptedStore::new();
        let items = source(100);
        let syncer = syncer(&store, "2.0.0", 10);

        store.fail_writes(INSULT_DATABASE_VERSION_KEY);
        let err = syncer.sync(&items).await.unwrap_err();
        assert!(matches!(err, SyncError::WriteFailed { step: SyncStep::WriteMarker, .. }));
        assert_eq!(stored_database(&store).await.version, "2.0.0");
        assert_eq!(stored_marker(&store).await, None);

        store.heal();
        store.reset_counts();
        let outcome = syncer.sync(&items).await.unwrap();

        assert!(outcome.wrote_database());
        assert_eq!(store.writes(INSULT_DATABASE_KEY), 1);
        assert_eq!(stored_marker(&store).await.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn count_mismatch_on_read_back_leaves_marker_untouched() {
        let store = ScriptedStore::new();
        store.backing().set(INSULT_DATABASE_VERSION_KEY, "0.9.0").await.unwrap();
        store.tamper_writes(INSULT_DATABASE_KEY, |raw| {
            let mut value: serde_json::Value = serde_json::from_str(raw).unwrap();
            value["count"] = serde_json::json!(3);
            value.to_string()
        });

        let err = syncer(&store, "1.0.0", 20).sync(&source(100)).await.unwrap_err();

        assert!(matches!(err, SyncError::VerifyFailed { .. }), "{err}");
        assert_eq!(store.writes(INSULT_DATABASE_VERSION_KEY), 0);
        assert_eq!(stored_marker(&store).await.as_deref(), Some("0.9.0"));
    }

    #[tokio::test]
    async fn unparsable_read_back_is_a_verify_failure() {
        let store = ScriptedStore::new();
        store.tamper_writes(INSULT_DATABASE_KEY, |_| "{not json".to_string());

        let err = syncer(&store, "1.0.0", 20).sync(&source(30)).await.unwrap_err();

        assert!(matches!(err, SyncError::VerifyFailed { .. }), "{err}");
        assert_eq!(stored_marker(&store).await, None);
    }

    #[tokio::test]
    async fn failed_database_write_writes_nothing_else() {
        let store = ScriptedStore::new();
        store.fail_writes(INSULT_DATABASE_KEY);

        let err = syncer(&store, "1.0.0", 20).sync(&source(30)).await.unwrap_err();

        assert!(matches!(err, SyncError::WriteFailed { step: SyncStep::WriteDatabase, .. }));
        assert_eq!(store.writes(INSULT_DATABASE_VERSION_KEY), 0);
        assert_eq!(store.backing().get(INSULT_DATABASE_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_store_is_fatal() {
        let store = ScriptedStore::new();
        store.make_unavailable();

        let err = syncer(&store, "1.0.0", 20).sync(&source(30)).await.unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(err.step(), SyncStep::ReadMarker);
    }

    #[tokio::test]
    async fn empty_source_is_rejected_before_any_write() {
        let store = ScriptedStore::new();

        let err = syncer(&store, "1.0.0", 20)
            .sync::<String>(&[])
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::EmptySource));
        assert_eq!(store.total_writes(), 0);
    }

    #[tokio::test]
    async fn small_source_is_shipped_whole() {
        let store = ScriptedStore::new();

        let outcome = syncer(&store, "1.0.0", 1000).sync(&source(12)).await.unwrap();

        assert!(matches!(outcome, SyncOutcome::Synced { count: 12, .. }));
    }

    #[tokio::test]
    async fn notifier_is_called_on_both_paths_and_failures_are_ignored() {
        let store = ScriptedStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let syncer = DatabaseSyncer::new(store.clone(), config("1.0.0", 5))
            .with_notifier(Box::new(CountingNotifier(calls.clone())));

        let first = syncer.sync(&source(10)).await.unwrap();
        let second = syncer.sync(&source(10)).await.unwrap();

        assert!(matches!(first, SyncOutcome::Synced { reload_requested: true, .. }));
        assert!(matches!(second, SyncOutcome::UpToDate { reload_requested: true, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let broken = DatabaseSyncer::new(ScriptedStore::new(), config("1.0.0", 5))
            .with_notifier(Box::new(BrokenNotifier));
        let outcome = broken.sync(&source(10)).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Synced { reload_requested: false, .. }));
    }

    #[tokio::test]
    async fn background_color_travels_with_the_database() {
        let store = ScriptedStore::new();
        let syncer = DatabaseSyncer::new(
            store.clone(),
            SyncerConfig {
                background_color: Some("#2c2c2c".into()),
                ..config("1.0.0", 5)
            },
        );

        syncer.sync(&source(10)).await.unwrap();

        assert_eq!(
            stored_database(&store).await.widget_background_color.as_deref(),
            Some("#2c2c2c")
        );
    }
}
