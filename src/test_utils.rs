//! Shared test helpers.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::store::{KeyValueStore, LocalStore, MemoryStore, StoreError};

type Tamper = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Default)]
struct Script {
    reads: HashMap<String, usize>,
    writes: HashMap<String, usize>,
    failing_writes: HashSet<String>,
    timed_out_reads: HashSet<String>,
    tampered_writes: HashMap<String, Tamper>,
    unavailable: bool,
}

/// A [`MemoryStore`] that counts requests per key and can be told to
/// misbehave.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    inner: MemoryStore,
    script: Arc<Mutex<Script>>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second handle that shares the stored values but not the script,
    /// like the other process looking at the same app group.
    pub fn backing(&self) -> MemoryStore {
        self.inner.clone()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        match self.script.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn reads(&self, key: &str) -> usize {
        self.script().reads.get(key).copied().unwrap_or(0)
    }

    pub fn writes(&self, key: &str) -> usize {
        self.script().writes.get(key).copied().unwrap_or(0)
    }

    pub fn total_reads(&self) -> usize {
        self.script().reads.values().sum()
    }

    pub fn total_writes(&self) -> usize {
        self.script().writes.values().sum()
    }

    pub fn reset_counts(&self) {
        let mut script = self.script();
        script.reads.clear();
        script.writes.clear();
    }

    /// Every `set` for `key` fails with a backend error until healed.
    pub fn fail_writes(&self, key: &str) {
        self.script().failing_writes.insert(key.to_string());
    }

    /// The next `get` for `key` times out; later reads succeed.
    pub fn time_out_next_read(&self, key: &str) {
        self.script().timed_out_reads.insert(key.to_string());
    }

    /// Every `set` for `key` stores `tamper(value)` instead of `value`.
    pub fn tamper_writes(&self, key: &str, tamper: impl Fn(&str) -> String + Send + Sync + 'static) {
        self.script()
            .tampered_writes
            .insert(key.to_string(), Arc::new(tamper));
    }

    pub fn make_unavailable(&self) {
        self.script().unavailable = true;
    }

    pub fn heal(&self) {
        let mut script = self.script();
        script.failing_writes.clear();
        script.timed_out_reads.clear();
        script.tampered_writes.clear();
        script.unavailable = false;
    }
}

impl KeyValueStore for ScriptedStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        {
            let mut script = self.script();
            if script.unavailable {
                return Err(StoreError::Unavailable("scripted".into()));
            }
            if script.timed_out_reads.remove(key) {
                return Err(StoreError::Timeout {
                    key: key.to_string(),
                    after_ms: 0,
                });
            }
            *script.reads.entry(key.to_string()).or_default() += 1;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let value = {
            let mut script = self.script();
            if script.unavailable {
                return Err(StoreError::Unavailable("scripted".into()));
            }
            if script.failing_writes.contains(key) {
                return Err(StoreError::Backend(anyhow::anyhow!(
                    "scripted write failure for {key}"
                )));
            }
            *script.writes.entry(key.to_string()).or_default() += 1;
            let stored = match script.tampered_writes.get(key) {
                Some(tamper) => tamper(value),
                None => value.to_string(),
            };
            stored
        };
        self.inner.set(key, &value).await
    }
}

impl LocalStore for ScriptedStore {
    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key).await
    }

    async fn entries(&self) -> Result<Vec<(String, String)>, StoreError> {
        self.inner.entries().await
    }
}
