//! Durable per-source checkpoints.
//!
//! The file is a JSON object keyed by the decimal source id:
//!
//! ```json
//! { "-1001234567890": { "name": "Chan", "added_at": "2026-01-01T00:00:00+00:00", "last_msg_id": 812 } }
//! ```
//!
//! It is read once at startup and rewritten in full on every mutation.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{Position, SourceId, SourceRef},
    utils::iso_timestamp_utc,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub name: String,
    pub added_at: String,
    pub last_msg_id: i64,
}

impl CheckpointRecord {
    pub fn position(&self) -> Position {
        Position(self.last_msg_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitoredSource {
    pub source: SourceRef,
    pub record: CheckpointRecord,
}

type Records = BTreeMap<i64, CheckpointRecord>;

pub struct CheckpointStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl CheckpointStore {
    /// Load the store. A missing or unreadable file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = read_records(&path);
        tracing::info!(
            path = %path.display(),
            sources = records.len(),
            "checkpoint store loaded"
        );
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a source at `position`. Returns `false` if it was already present.
    pub async fn register(&self, source: &SourceRef, position: Position) -> Result<bool> {
        let mut records = self.records.lock().await;
        if records.contains_key(&source.id.0) {
            return Ok(false);
        }

        let mut next = records.clone();
        next.insert(
            source.id.0,
            CheckpointRecord {
                name: source.name.clone(),
                added_at: iso_timestamp_utc(),
                last_msg_id: position.0,
            },
        );
        write_records(&self.path, &next)?;
        *records = next;
        Ok(true)
    }

    /// Move the checkpoint forward. Never moves it back; returns whether it changed.
    pub async fn advance(&self, id: SourceId, position: Position) -> Result<bool> {
        let mut records = self.records.lock().await;
        let Some(current) = records.get(&id.0) else {
            return Ok(false);
        };
        if position.0 <= current.last_msg_id {
            return Ok(false);
        }

        let mut next = records.clone();
        if let Some(rec) = next.get_mut(&id.0) {
            rec.last_msg_id = position.0;
        }
        write_records(&self.path, &next)?;
        *records = next;
        Ok(true)
    }

    pub async fn remove(&self, id: SourceId) -> Result<Option<CheckpointRecord>> {
        let mut records = self.records.lock().await;
        if !records.contains_key(&id.0) {
            return Ok(None);
        }

        let mut next = records.clone();
        let removed = next.remove(&id.0);
        write_records(&self.path, &next)?;
        *records = next;
        Ok(removed)
    }

    pub async fn get(&self, id: SourceId) -> Option<CheckpointRecord> {
        self.records.lock().await.get(&id.0).cloned()
    }

    pub async fn contains(&self, id: SourceId) -> bool {
        self.records.lock().await.contains_key(&id.0)
    }

    pub async fn entries(&self) -> Vec<MonitoredSource> {
        self.records
            .lock()
            .await
            .iter()
            .map(|(id, rec)| MonitoredSource {
                source: SourceRef::new(*id, rec.name.clone()),
                record: rec.clone(),
            })
            .collect()
    }
}

fn read_records(path: &Path) -> Records {
    let txt = match fs::read_to_string(path) {
        Ok(txt) => txt,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Records::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), "cannot read checkpoint file: {e}");
            return Records::new();
        }
    };
    if txt.trim().is_empty() {
        return Records::new();
    }
    match serde_json::from_str::<Records>(&txt) {
        Ok(records) => records,
        Err(e) => {
            let path = path.display();
            tracing::warn!(%path, "malformed checkpoint file, starting empty: {e}");
            Records::new()
        }
    }
}

fn write_records(path: &Path, records: &Records) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let txt = serde_json::to_string_pretty(records)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, txt)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
