//! Diagnostic log shared by the app and the widget.
//!
//! Both processes append to one JSON array stored under [`WIDGET_LOGS_KEY`]
//! in the app group store. An append is read, push, truncate, write, with no
//! lock around it, because the store has no atomic append. When both
//! processes append at the same moment the later write wins and the other
//! side's new entries are lost. That loss is accepted; the log is for
//! debugging, not auditing.
//!
//! Entries come back in storage order. Each process stamps entries with its
//! own clock, so that order is not guaranteed to be chronological.

use std::{collections::BTreeMap, fmt};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, StoreError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const WIDGET_LOGS_KEY: &str = "widgetLogs";
pub const DEFAULT_LOG_CAPACITY: usize = 100;
const RECENT_LOG_COUNT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Info,
    Error,
    Success,
    Warning,
    Debug,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Info => "info",
            LogType::Error => "error",
            LogType::Success => "success",
            LogType::Warning => "warning",
            LogType::Debug => "debug",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which process wrote an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Main,
    Renderer,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Main => "main",
            LogSource::Renderer => "renderer",
        }
    }
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// ISO-8601, kept as the writer produced it.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: LogType,
    pub source: LogSource,
    pub message: String,
}

impl LogEntry {
    pub fn new(kind: LogType, source: LogSource, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            source,
            message: message.into(),
        }
    }

    pub fn as_line(&self) -> String {
        format!(
            "[{}] [{}] [{}] {}",
            self.timestamp,
            self.source.as_str().to_uppercase(),
            self.kind.as_str().to_uppercase(),
            self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStatistics {
    pub total: usize,
    pub by_type: BTreeMap<LogType, usize>,
    pub by_source: BTreeMap<LogSource, usize>,
    /// Newest first.
    pub recent: Vec<LogEntry>,
    /// Percentage of error entries, one decimal.
    pub error_rate: f64,
}

/// Handle to the shared log for one process. Construct once per process
/// and pass it around.
pub struct DebugLog<S> {
    store: S,
    source: LogSource,
    capacity: usize,
}

impl<S: KeyValueStore> DebugLog<S> {
    pub fn new(store: S, source: LogSource, capacity: usize) -> Self {
        Self {
            store,
            source,
            capacity: capacity.max(1),
        }
    }

    pub fn source(&self) -> LogSource {
        self.source
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append one entry. Failures are reported through the `log` facade
    /// and otherwise swallowed; diagnostics never fail the caller.
    pub async fn log(&self, message: impl Into<String>, kind: LogType) {
        let entry = LogEntry::new(kind, self.source, message);
        mirror(&entry);

        // A failed read must not turn into an overwrite with one entry.
        let mut entries = match self.read_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                log_warn!("dropping diagnostic entry, log unreadable: {err}");
                return;
            }
        };
        entries.push(entry);
        if entries.len() > self.capacity {
            let excess = entries.len() - self.capacity;
            entries.drain(..excess);
        }

        if let Err(err) = self.write(&entries).await {
            log_warn!("failed to persist diagnostic log: {err:#}");
        }
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.log(message, LogType::Info).await
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.log(message, LogType::Error).await
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.log(message, LogType::Success).await
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.log(message, LogType::Warning).await
    }

    pub async fn debug(&self, message: impl Into<String>) {
        self.log(message, LogType::Debug).await
    }

    /// Entries from both processes in storage order. Unreadable or
    /// malformed data reads as an empty log.
    pub async fn get_all_logs(&self) -> Vec<LogEntry> {
        match self.read_entries().await {
            Ok(entries) => entries,
            Err(err) => {
                log_warn!("failed to read diagnostic log: {err}");
                Vec::new()
            }
        }
    }

    /// Malformed data counts as empty; only store failures are errors.
    async fn read_entries(&self) -> Result<Vec<LogEntry>, StoreError> {
        let Some(raw) = self.store.get(WIDGET_LOGS_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<LogEntry>>(&raw) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                log_warn!("discarding malformed diagnostic log: {err}");
                Ok(Vec::new())
            }
        }
    }

    pub async fn get_all_logs_as_text(&self) -> String {
        self.get_all_logs()
            .await
            .iter()
            .map(LogEntry::as_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn clear_all_logs(&self) -> anyhow::Result<()> {
        self.write(&[]).await?;
        log_debug!("diagnostic log cleared");
        Ok(())
    }

    pub async fn log_statistics(&self) -> LogStatistics {
        summarize(&self.get_all_logs().await)
    }

    async fn write(&self, entries: &[LogEntry]) -> anyhow::Result<()> {
        let payload = serde_json::to_string(entries)?;
        self.store.set(WIDGET_LOGS_KEY, &payload).await?;
        Ok(())
    }
}

fn mirror(entry: &LogEntry) {
    let line = format!(
        "[Debug {}] {}",
        entry.kind.as_str().to_uppercase(),
        entry.message
    );
    match entry.kind {
        LogType::Error => log::error!("{line}"),
        LogType::Warning => log::warn!("{line}"),
        LogType::Debug => log::debug!("{line}"),
        LogType::Info | LogType::Success => log::info!("{line}"),
    }
}

pub fn summarize(entries: &[LogEntry]) -> LogStatistics {
    let mut by_type = BTreeMap::new();
    let mut by_source = BTreeMap::new();
    for entry in entries {
        *by_type.entry(entry.kind).or_insert(0) += 1;
        *by_source.entry(entry.source).or_insert(0) += 1;
    }

    let errors = by_type.get(&LogType::Error).copied().unwrap_or(0);
    let error_rate = if entries.is_empty() {
        0.0
    } else {
        (errors as f64 / entries.len() as f64 * 1000.0).round() / 10.0
    };

    LogStatistics {
        total: entries.len(),
        by_type,
        by_source,
        recent: entries.iter().rev().take(RECENT_LOG_COUNT).cloned().collect(),
        error_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::MemoryStore, test_utils::ScriptedStore};

    #[tokio::test]
    async fn entries_are_tagged_with_the_writer() {
        let shared = MemoryStore::new();
        let app = DebugLog::new(shared.clone(), LogSource::Main, 100);
        let widget = DebugLog::new(shared.clone(), LogSource::Renderer, 100);

        app.info("sync started").await;
        widget.warning("database missing").await;
        app.success("sync finished").await;

        let entries = app.get_all_logs().await;
        let summary: Vec<_> = entries
            .iter()
            .map(|entry| (entry.source, entry.kind, entry.message.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (LogSource::Main, LogType::Info, "sync started"),
                (LogSource::Renderer, LogType::Warning, "database missing"),
                (LogSource::Main, LogType::Success, "sync finished"),
            ]
        );
        assert_eq!(widget.get_all_logs().await, entries);
    }

    #[tokio::test]
    async fn keeps_the_most_recent_entries_in_append_order() {
        let log = DebugLog::new(MemoryStore::new(), LogSource::Main, 5);

        for i in 0..12 {
            log.debug(format!("event {i}")).await;
        }

        let messages: Vec<_> = log
            .get_all_logs()
            .await
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(messages, vec!["event 7", "event 8", "event 9", "event 10", "event 11"]);
    }

    #[tokio::test]
    async fn storage_order_is_not_resorted() {
        let store = MemoryStore::new();
        let earlier = LogEntry {
            timestamp: "2026-01-01T10:00:00.000Z".into(),
            kind: LogType::Info,
            source: LogSource::Renderer,
            message: "written later, stamped earlier".into(),
        };
        let later = LogEntry {
            timestamp: "2026-01-01T11:00:00.000Z".into(),
            kind: LogType::Info,
            source: LogSource::Main,
            message: "written first".into(),
        };
        store
            .set(WIDGET_LOGS_KEY, &serde_json::to_string(&[later.clone(), earlier.clone()]).unwrap())
            .await
            .unwrap();

        let log = DebugLog::new(store, LogSource::Main, 100);

        assert_eq!(log.get_all_logs().await, vec![later, earlier]);
    }

    #[tokio::test]
    async fn text_transcript_has_one_line_per_entry() {
        let log = DebugLog::new(MemoryStore::new(), LogSource::Renderer, 100);
        log.error("timeline failed").await;
        log.info("timeline rebuilt").await;

        let text = log.get_all_logs_as_text().await;
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("[RENDERER] [ERROR] timeline failed"), "{}", lines[0]);
        assert!(lines[1].ends_with("[RENDERER] [INFO] timeline rebuilt"), "{}", lines[1]);
    }

    #[tokio::test]
    async fn clear_empties_the_shared_sequence() {
        let shared = MemoryStore::new();
        let app = DebugLog::new(shared.clone(), LogSource::Main, 100);
        let widget = DebugLog::new(shared, LogSource::Renderer, 100);
        widget.info("hello").await;

        app.clear_all_logs().await.unwrap();

        assert!(widget.get_all_logs().await.is_empty());
        assert_eq!(app.get_all_logs_as_text().await, "");
    }

    #[tokio::test]
    async fn malformed_log_reads_as_empty_and_is_replaced() {
        let store = MemoryStore::new();
        store.set(WIDGET_LOGS_KEY, "{\"not\": \"an array\"}").await.unwrap();
        let log = DebugLog::new(store, LogSource::Main, 100);

        assert!(log.get_all_logs().await.is_empty());
        log.info("fresh start").await;
        assert_eq!(log.get_all_logs().await.len(), 1);
    }

    #[tokio::test]
    async fn write_failures_do_not_propagate() {
        let store = ScriptedStore::new();
        store.fail_writes(WIDGET_LOGS_KEY);
        let log = DebugLog::new(store.clone(), LogSource::Main, 100);

        log.error("nobody will see this").await;

        assert!(log.get_all_logs().await.is_empty());
        assert!(log.clear_all_logs().await.is_err());
    }

    #[tokio::test]
    async fn interleaved_read_modify_write_loses_one_side() {
        let shared = MemoryStore::new();
        let app = DebugLog::new(shared.clone(), LogSource::Main, 100);
        let widget = DebugLog::new(shared.clone(), LogSource::Renderer, 100);
        app.info("baseline").await;

        // Both sides read the same snapshot before either writes back.
        let mut app_view = app.get_all_logs().await;
        let mut widget_view = widget.get_all_logs().await;
        app_view.push(LogEntry::new(LogType::Info, LogSource::Main, "app append"));
        widget_view.push(LogEntry::new(LogType::Info, LogSource::Renderer, "widget append"));
        app.write(&app_view).await.unwrap();
        widget.write(&widget_view).await.unwrap();

        let messages: Vec<_> = app
            .get_all_logs()
            .await
            .into_iter()
            .map(|entry| entry.message)
            .collect();
        assert_eq!(messages, vec!["baseline", "widget append"]);
    }

    #[test]
    fn statistics_count_by_type_and_source() {
        let mut entries = Vec::new();
        for i in 0..12 {
            let kind = if i % 4 == 0 { LogType::Error } else { LogType::Info };
            let source = if i % 2 == 0 { LogSource::Main } else { LogSource::Renderer };
            entries.push(LogEntry::new(kind, source, format!("entry {i}")));
        }

        let stats = summarize(&entries);

        assert_eq!(stats.total, 12);
        assert_eq!(stats.by_type[&LogType::Error], 3);
        assert_eq!(stats.by_type[&LogType::Info], 9);
        assert_eq!(stats.by_source[&LogSource::Main], 6);
        assert_eq!(stats.recent.len(), 10);
        assert_eq!(stats.recent[0].message, "entry 11");
        assert_eq!(stats.error_rate, 25.0);
        assert_eq!(summarize(&[]).error_rate, 0.0);
    }

    #[test]
    fn entry_serializes_with_type_field() {
        let entry = LogEntry::new(LogType::Success, LogSource::Main, "ok");

        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["type"], "success");
        assert_eq!(value["source"], "main");
        assert!(chrono::DateTime::parse_from_rfc3339(&entry.timestamp).is_ok());
    }

    #[tokio::test]
    async fn read_timeout_skips_the_append_instead_of_wiping_the_log() {
        let shared = ScriptedStore::new();
        let widget = DebugLog::new(shared.backing(), LogSource::Renderer, 100);
        for i in 0..50 {
            widget.info(format!("widget entry {i}")).await;
        }
        let app = DebugLog::new(shared.clone(), LogSource::Main, 100);

        shared.time_out_next_read(WIDGET_LOGS_KEY);
        app.info("after timeout").await;

        let entries = app.get_all_logs().await;
        assert_eq!(entries.len(), 50);
        assert!(entries.iter().all(|entry| entry.source == LogSource::Renderer));
        assert_eq!(shared.writes(WIDGET_LOGS_KEY), 0);

        app.info("after recovery").await;
        assert_eq!(app.get_all_logs().await.len(), 51);
    }

    #[tokio::test]
    async fn read_timeout_shows_an_empty_view() {
        let shared = ScriptedStore::new();
        let app = DebugLog::new(shared.clone(), LogSource::Main, 100);
        app.info("kept").await;

        shared.time_out_next_read(WIDGET_LOGS_KEY);

        assert!(app.get_all_logs().await.is_empty());
        assert_eq!(app.get_all_logs().await.len(), 1);
    }
}
