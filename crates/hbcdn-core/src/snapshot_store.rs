//! Persisted `{path -> (size, mtime_ns)}` snapshot carried across cycles.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};
use tracing::debug;

use hbcdn_domain::json_ascii;
use hbcdn_domain::Snapshot;

#[derive(Clone, Debug)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the previous snapshot, tolerantly.
    ///
    /// A missing or unreadable file yields an empty snapshot; entries whose
    /// value is not a 2-integer array are dropped silently.
    #[must_use]
    pub fn load(&self) -> Snapshot {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Snapshot::new(),
        };
        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                debug!("discarding malformed snapshot {}: {err}", self.path.display());
                return Snapshot::new();
            }
        };
        let Value::Object(entries) = value else {
            return Snapshot::new();
        };

        let mut snapshot = Snapshot::new();
        for (path, meta) in entries {
            let Some(parts) = meta.as_array() else {
                continue;
            };
            if parts.len() != 2 {
                continue;
            }
            let (Some(size), Some(mtime_ns)) = (parts[0].as_u64(), parts[1].as_i64()) else {
                continue;
            };
            snapshot.insert(path, (size, mtime_ns));
        }
        snapshot
    }

    /// Serialize sorted-keys JSON and swap it in atomically via a sibling
    /// `.tmp` rename.
    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut entries = Map::new();
        for (path, (size, mtime_ns)) in snapshot {
            entries.insert(path.clone(), json!([size, mtime_ns]));
        }
        let rendered = json_ascii::to_string_pretty(&Value::Object(entries));

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, rendered)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to move {} to {}", tmp.display(), self.path.display())
        })?;
        Ok(())
    }
}
