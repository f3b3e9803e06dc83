//! Snapshot diffing between two filesystem scans.

use std::collections::BTreeMap;

/// Absolute path to `(size_bytes, mtime_ns)`.
pub type Snapshot = BTreeMap<String, (u64, i64)>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanDelta {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl ScanDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Split `current` against `previous` into added/updated/removed path sets,
/// each sorted by path.
#[must_use]
pub fn build_delta(previous: &Snapshot, current: &Snapshot) -> ScanDelta {
    let mut delta = ScanDelta::default();
    for (path, meta) in current {
        match previous.get(path) {
            None => delta.added.push(path.clone()),
            Some(old) if old != meta => delta.updated.push(path.clone()),
            Some(_) => {}
        }
    }
    for path in previous.keys() {
        if !current.contains_key(path) {
            delta.removed.push(path.clone());
        }
    }
    delta
}
