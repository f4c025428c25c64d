//! Persistent storage for failure, recovery, alert and analytics history
//!
//! One embedded sled database per control plane, one named tree per record
//! kind. Values are JSON and are decoded back into their in-memory type on
//! every read, so a corrupt record surfaces as [`StorageError::Corrupt`]
//! instead of being skipped.
//!
//! Time-ordered trees use 24-byte keys: the record timestamp as big-endian
//! nanoseconds followed by the record's uuid. Keys therefore sort
//! chronologically and a range scan from an 8-byte prefix returns every
//! record at or after that instant.

mod alerts;
mod analytics;
mod failures;
mod recovery;
mod sessions;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record in '{tree}' at key {key}: {source}")]
    Corrupt {
        tree: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Handle to the on-disk store. Cheap to clone; all clones share one database.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    failure_events: sled::Tree,
    component_states: sled::Tree,
    recovery_attempts: sled::Tree,
    recovery_statistics: sled::Tree,
    recovery_sessions: sled::Tree,
    escalation_log: sled::Tree,
    stage_statistics: sled::Tree,
    alert_messages: sled::Tree,
    alert_deliveries: sled::Tree,
    analysis_results: sled::Tree,
    failure_patterns: sled::Tree,
    predictions: sled::Tree,
    root_cause_analyses: sled::Tree,
}

impl Store {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self {
            failure_events: db.open_tree("failure_events")?,
            component_states: db.open_tree("component_states")?,
            recovery_attempts: db.open_tree("recovery_attempts")?,
            recovery_statistics: db.open_tree("recovery_statistics")?,
            recovery_sessions: db.open_tree("recovery_sessions")?,
            escalation_log: db.open_tree("escalation_log")?,
            stage_statistics: db.open_tree("stage_statistics")?,
            alert_messages: db.open_tree("alert_messages")?,
            alert_deliveries: db.open_tree("alert_deliveries")?,
            analysis_results: db.open_tree("analysis_results")?,
            failure_patterns: db.open_tree("failure_patterns")?,
            predictions: db.open_tree("predictions")?,
            root_cause_analyses: db.open_tree("root_cause_analyses")?,
            db,
        })
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// On-disk size in bytes.
    pub fn size_on_disk(&self) -> Result<u64, StorageError> {
        Ok(self.db.size_on_disk()?)
    }
}

#[cfg(test)]
impl Store {
    pub(crate) fn component_states_tree(&self) -> &sled::Tree {
        &self.component_states
    }
}

// ============================================================================
// Key and value helpers
// ============================================================================

fn timestamp_nanos(ts: DateTime<Utc>) -> u64 {
    u64::try_from(ts.timestamp_nanos_opt().unwrap_or(0)).unwrap_or(0)
}

/// Big-endian timestamp prefix; sorts before every key at or after `ts`.
pub(crate) fn time_prefix(ts: DateTime<Utc>) -> [u8; 8] {
    timestamp_nanos(ts).to_be_bytes()
}

/// Chronological key for a record created at `ts` with identity `id`.
pub(crate) fn time_key(ts: DateTime<Utc>, id: Uuid) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&time_prefix(ts));
    key[8..].copy_from_slice(id.as_bytes());
    key
}

fn display_key(key: &[u8]) -> String {
    match std::str::from_utf8(key) {
        Ok(s) => s.to_string(),
        Err(_) => key.iter().map(|b| format!("{:02x}", b)).collect(),
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8], bytes: &[u8]) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|source| StorageError::Corrupt {
        tree: String::from_utf8_lossy(&tree.name()).into_owned(),
        key: display_key(key),
        source,
    })
}

fn put<K: AsRef<[u8]>, T: Serialize>(tree: &sled::Tree, key: K, value: &T) -> Result<(), StorageError> {
    tree.insert(key, encode(value)?)?;
    Ok(())
}

fn get<K: AsRef<[u8]>, T: DeserializeOwned>(tree: &sled::Tree, key: K) -> Result<Option<T>, StorageError> {
    match tree.get(key.as_ref())? {
        Some(bytes) => decode(tree, key.as_ref(), &bytes).map(Some),
        None => Ok(None),
    }
}

/// Every record in key order.
fn scan_all<T: DeserializeOwned>(tree: &sled::Tree) -> Result<Vec<T>, StorageError> {
    tree.iter()
        .map(|item| {
            let (k, v) = item?;
            decode(tree, &k, &v)
        })
        .collect()
}

/// Every record of a time-keyed tree created at or after `since`, oldest first.
fn scan_since<T: DeserializeOwned>(tree: &sled::Tree, since: DateTime<Utc>) -> Result<Vec<T>, StorageError> {
    tree.range(time_prefix(since).to_vec()..)
        .map(|item| {
            let (k, v) = item?;
            decode(tree, &k, &v)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn time_keys_sort_chronologically() {
        let now = Utc::now();
        let earlier = time_key(now - Duration::seconds(1), Uuid::new_v4());
        let later = time_key(now, Uuid::new_v4());
        assert!(earlier < later);
        assert!(time_prefix(now).as_slice() <= later.as_slice());
        assert!(time_prefix(now).as_slice() > earlier.as_slice());
    }

    #[test]
    fn corrupt_values_are_reported_not_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        store.escalation_log.insert("bad", b"{not json".to_vec()).unwrap();

        let result: Result<Vec<crate::types::EscalationRecord>, _> = scan_all(&store.escalation_log);
        match result {
            Err(StorageError::Corrupt { tree, key, .. }) => {
                assert_eq!(tree, "escalation_log");
                assert_eq!(key, "bad");
            }
            other => panic!("expected corrupt error, got {:?}", other.map(|v| v.len())),
        }
    }
}
