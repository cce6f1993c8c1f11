use std::{future::Future, path::Path, time::Duration};

use anyhow::Context;

use crate::db::Database;

use super::{KeyValueStore, LocalStore, StoreError};

const SHARED_DB_FILE: &str = "shared.sqlite3";
const LOCAL_DB_FILE: &str = "local.sqlite3";

/// A namespace inside a SQLite file. Every request is bounded by `timeout`.
#[derive(Clone)]
pub struct SqliteStore {
    db: Database,
    namespace: String,
    timeout: Duration,
}

impl SqliteStore {
    pub fn new(db: Database, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            db,
            namespace: namespace.into(),
            timeout,
        }
    }

    /// Open the cross-process namespace for `app_group`. The group container
    /// directory must already exist, the same way an app group container is
    /// provisioned by the OS rather than by the app.
    pub fn open_app_group(
        container_root: &Path,
        app_group: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let container = container_root.join(app_group);
        if !container.is_dir() {
            return Err(StoreError::Unavailable(format!(
                "app group container {} does not exist",
                container.display()
            )));
        }

        let db = Database::new(container.join(SHARED_DB_FILE))
            .map_err(|err| StoreError::Unavailable(format!("{err:#}")))?;

        Ok(Self::new(db, app_group, timeout))
    }

    /// Open the process-local store under `data_dir`, creating it if needed.
    pub fn open_local(data_dir: &Path, namespace: &str, timeout: Duration) -> anyhow::Result<Self> {
        let db = Database::new(data_dir.join(LOCAL_DB_FILE))
            .with_context(|| format!("failed to open local store in {}", data_dir.display()))?;
        Ok(Self::new(db, namespace, timeout))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn path(&self) -> &Path {
        self.db.path()
    }

    async fn bounded<T>(
        &self,
        key: &str,
        request: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(StoreError::Backend),
            Err(_) => Err(StoreError::Timeout {
                key: key.to_string(),
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.bounded(key, self.db.get_value(&self.namespace, key))
            .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.bounded(key, self.db.put_value(&self.namespace, key, value))
            .await
    }
}

impl LocalStore for SqliteStore {
    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(key, self.db.delete_value(&self.namespace, key))
            .await
    }

    async fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        let entries = self
            .bounded("*", self.db.list_entries(&self.namespace))
            .await?;
        Ok(entries
            .into_iter()
            .map(|entry| (entry.key, entry.value))
            .collect())
    }
}
