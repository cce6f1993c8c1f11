use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{helpers::parse_datetime, Database};

/// One stored value. `updated_at` is informational; readers never use it
/// to arbitrate between writers.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

fn row_to_entry(row: &Row) -> Result<KvEntry> {
    let updated_at: String = row.get("updated_at")?;

    Ok(KvEntry {
        key: row.get("key")?,
        value: row.get("value")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn get_value(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                    params![namespace, key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read {namespace}/{key}"))?;
            Ok(value)
        })
        .await
    }

    /// Replace the whole value stored under `key`. Concurrent writers from
    /// other processes simply overwrite each other.
    pub async fn put_value(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        let value = value.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (namespace, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(namespace, key) DO UPDATE
                 SET value = excluded.value,
                     updated_at = excluded.updated_at",
                params![namespace, key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write {namespace}/{key}"))?;
            Ok(())
        })
        .await
    }

    pub async fn delete_value(&self, namespace: &str, key: &str) -> Result<()> {
        let namespace = namespace.to_string();
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .with_context(|| format!("failed to delete {namespace}/{key}"))?;
            Ok(())
        })
        .await
    }

    /// All entries of a namespace, ordered by key.
    pub async fn list_entries(&self, namespace: &str) -> Result<Vec<KvEntry>> {
        let namespace = namespace.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, updated_at
                 FROM kv_entries
                 WHERE namespace = ?1
                 ORDER BY key ASC",
            )?;

            let mut rows = stmt.query(params![namespace])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_entry(row)?);
            }

            Ok(entries)
        })
        .await
    }
}
