//! One candidate path in, one decision out.

use std::path::Path;

use tracing::{debug, warn};

use hbcdn_domain::{fingerprint_pkg, CatalogItem};

use crate::catalog::{CatalogDb, UpsertOutcome};
use crate::package_store::{PackageStore, PlaceError};
use crate::probe::PackageProbe;

/// Decision for one candidate. Quarantined carries the reason that also ends
/// up in the quarantine filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    Upserted,
    Unchanged,
    Quarantined(String),
}

impl IngestOutcome {
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, IngestOutcome::Quarantined(_))
    }
}

/// Deterministic worker: stat, probe, canonicalize, upsert. Never propagates
/// an error past itself; every fault is a quarantine decision.
pub struct IngestWorker<'a> {
    store: &'a PackageStore,
    catalog: &'a CatalogDb,
    probe: &'a dyn PackageProbe,
}

impl<'a> IngestWorker<'a> {
    #[must_use]
    pub fn new(
        store: &'a PackageStore,
        catalog: &'a CatalogDb,
        probe: &'a dyn PackageProbe,
    ) -> Self {
        Self {
            store,
            catalog,
            probe,
        }
    }

    pub fn ingest(&self, path: &Path) -> IngestOutcome {
        let Ok((size, mtime_ns)) = self.store.stat(path) else {
            debug!("candidate vanished before ingest: {}", path.display());
            return IngestOutcome::Quarantined("vanished".to_string());
        };

        let probed = match self.probe.probe(path) {
            Ok(probed) => probed,
            Err(err) => return self.quarantine(path, err.quarantine_reason(), &err.to_string()),
        };

        let fingerprint = match fingerprint_pkg(path, size, mtime_ns) {
            Ok(fingerprint) => fingerprint,
            Err(err) => return self.quarantine(path, "worker_error", &err.to_string()),
        };

        let target = match self
            .store
            .move_to_canonical(path, probed.app_type, &probed.content_id)
        {
            Ok(target) => target,
            Err(PlaceError::Conflict(existing)) => {
                let reason = if self.same_fingerprint(&existing, &fingerprint) {
                    "duplicate"
                } else {
                    "conflict"
                };
                return self.quarantine(path, reason, "canonical target occupied");
            }
            Err(PlaceError::Io(err)) => {
                return self.quarantine(path, "worker_error", &err.to_string())
            }
        };

        // Rename preserves size and mtime, but restat the canonical location
        // so the row always describes the path it references.
        let (pkg_size, pkg_mtime_ns) = match self.store.stat(&target) {
            Ok(stat) => stat,
            Err(err) => {
                warn!("canonical file unreadable at {}: {err}", target.display());
                return IngestOutcome::Quarantined("worker_error".to_string());
            }
        };

        let item = CatalogItem {
            content_id: probed.content_id,
            title_id: probed.title_id,
            title: probed.title,
            app_type: probed.app_type,
            category: probed.category,
            version: probed.version,
            pubtoolinfo: probed.pubtoolinfo,
            system_ver: probed.system_ver,
            release_date: probed.release_date,
            pkg_path: target,
            pkg_size,
            pkg_mtime_ns,
            pkg_fingerprint: fingerprint,
            icon0_path: probed.icon0_path,
            pic0_path: probed.pic0_path,
            pic1_path: probed.pic1_path,
            sfo: probed.sfo,
            downloads: 0,
            created_at: String::new(),
            updated_at: String::new(),
        };

        match self.catalog.with_tx(|tx| CatalogDb::upsert(tx, &item)) {
            Ok(UpsertOutcome::Written) => IngestOutcome::Upserted,
            Ok(UpsertOutcome::Skipped) => IngestOutcome::Unchanged,
            Err(err) => {
                warn!(
                    "catalog upsert failed for {}: {err:#}",
                    item.pkg_path.display()
                );
                IngestOutcome::Quarantined("worker_error".to_string())
            }
        }
    }

    fn same_fingerprint(&self, existing: &Path, candidate_fingerprint: &str) -> bool {
        let Ok((size, mtime_ns)) = self.store.stat(existing) else {
            return false;
        };
        match fingerprint_pkg(existing, size, mtime_ns) {
            Ok(fingerprint) => fingerprint == candidate_fingerprint,
            Err(_) => false,
        }
    }

    fn quarantine(&self, path: &Path, reason: &str, detail: &str) -> IngestOutcome {
        warn!("quarantining {} ({reason}): {detail}", path.display());
        if let Err(err) = self.store.move_to_errors(path, reason) {
            warn!("failed to quarantine {}: {err:#}", path.display());
        }
        IngestOutcome::Quarantined(reason.to_string())
    }
}
