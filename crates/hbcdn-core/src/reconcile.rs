//! One reconcile cycle: diff, ingest, prune, export, persist.

use std::collections::{BTreeSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use hbcdn_domain::{build_delta, Snapshot};

use crate::catalog::CatalogDb;
use crate::config::OutputTarget;
use crate::export::OutputExporter;
use crate::ingest::{IngestOutcome, IngestWorker};
use crate::lock::ReconcileLock;
use crate::package_store::PackageStore;
use crate::probe::PackageProbe;
use crate::snapshot_store::SnapshotStore;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub failed: usize,
    pub exported_files: Vec<PathBuf>,
}

impl ReconcileResult {
    #[must_use]
    pub fn upserted(&self) -> usize {
        self.added + self.updated
    }
}

pub struct Reconciler {
    package_store: PackageStore,
    snapshot_store: SnapshotStore,
    catalog: CatalogDb,
    probe: Box<dyn PackageProbe>,
    exporters: Vec<Box<dyn OutputExporter>>,
    enabled_targets: Vec<OutputTarget>,
    lock_path: PathBuf,
    worker_count: usize,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        package_store: PackageStore,
        snapshot_store: SnapshotStore,
        catalog: CatalogDb,
        probe: Box<dyn PackageProbe>,
        exporters: Vec<Box<dyn OutputExporter>>,
        enabled_targets: Vec<OutputTarget>,
        lock_path: PathBuf,
        worker_count: usize,
    ) -> Self {
        Self {
            package_store,
            snapshot_store,
            catalog,
            probe,
            exporters,
            enabled_targets,
            lock_path,
            worker_count: worker_count.max(1),
        }
    }

    /// Run one cycle; never propagates an error to the scheduler.
    pub fn run_cycle(&self) -> ReconcileResult {
        match self.cycle() {
            Ok(result) => result,
            Err(err) => {
                error!("reconcile cycle failed: {err:#}");
                ReconcileResult::default()
            }
        }
    }

    fn cycle(&self) -> Result<ReconcileResult> {
        let Some(_lock) = ReconcileLock::try_acquire(&self.lock_path)? else {
            warn!("reconcile skipped: another cycle is still running");
            return Ok(ReconcileResult::default());
        };

        let previous = self.snapshot_store.load();
        let current = self.build_snapshot()?;
        let delta = build_delta(&previous, &current);

        let added_set: BTreeSet<&String> = delta.added.iter().collect();
        let mut candidates = delta.added.clone();
        candidates.extend(delta.updated.iter().cloned());
        candidates.sort();

        let outcomes = self.ingest_all(&candidates);
        let mut result = ReconcileResult::default();
        for (path, outcome) in &outcomes {
            match outcome {
                IngestOutcome::Upserted if added_set.contains(path) => result.added += 1,
                IngestOutcome::Upserted => result.updated += 1,
                IngestOutcome::Unchanged => result.unchanged += 1,
                IngestOutcome::Quarantined(_) => result.failed += 1,
            }
        }

        // Canonical moves changed paths; rebuild before pruning so the
        // catalog is matched against what is really on disk.
        let post_ingest = self.build_snapshot()?;
        let present: BTreeSet<String> = post_ingest.keys().cloned().collect();
        result.removed = self
            .catalog
            .with_tx(|tx| CatalogDb::delete_by_pkg_paths_not_in(tx, &present))
            .context("failed to prune the catalog")?;

        let export_ok = self.export_outputs(&mut result);

        if export_ok {
            self.snapshot_store
                .save(&post_ingest)
                .context("failed to persist the snapshot")?;
        } else {
            warn!("snapshot not persisted: at least one exporter failed; the next cycle retries");
        }

        info!(
            "reconcile done: added {}, updated {}, unchanged {}, removed {}, failed {}, exported {}",
            result.added,
            result.updated,
            result.unchanged,
            result.removed,
            result.failed,
            result.exported_files.len()
        );
        Ok(result)
    }

    fn build_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for path in self.package_store.scan_pkg_files()? {
            // Files may vanish between the walk and the stat.
            let Ok(stat) = self.package_store.stat(&path) else {
                continue;
            };
            snapshot.insert(path.to_string_lossy().into_owned(), stat);
        }
        Ok(snapshot)
    }

    fn ingest_all(&self, candidates: &[String]) -> Vec<(String, IngestOutcome)> {
        if candidates.is_empty() {
            return Vec::new();
        }
        if self.worker_count <= 1 || candidates.len() == 1 {
            return candidates
                .iter()
                .map(|path| (path.clone(), self.ingest_one(path)))
                .collect();
        }

        let queue: Mutex<VecDeque<String>> =
            Mutex::new(candidates.iter().cloned().collect());
        let outcomes: Mutex<Vec<(String, IngestOutcome)>> =
            Mutex::new(Vec::with_capacity(candidates.len()));

        thread::scope(|scope| {
            for _ in 0..self.worker_count.min(candidates.len()) {
                scope.spawn(|| loop {
                    let Some(path) = queue.lock().expect("ingest queue").pop_front() else {
                        break;
                    };
                    let outcome = self.ingest_one(&path);
                    outcomes
                        .lock()
                        .expect("ingest outcomes")
                        .push((path, outcome));
                });
            }
        });

        outcomes.into_inner().expect("ingest outcomes")
    }

    /// A panicking worker must not abort the pool; it becomes a quarantine
    /// decision like any other fault.
    fn ingest_one(&self, path: &str) -> IngestOutcome {
        let worker = IngestWorker::new(&self.package_store, &self.catalog, self.probe.as_ref());
        match catch_unwind(AssertUnwindSafe(|| worker.ingest(std::path::Path::new(path)))) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!("ingest worker panicked on {path}");
                IngestOutcome::Quarantined("worker_error".to_string())
            }
        }
    }

    /// Export enabled targets in configured order, then clean up every
    /// disabled one. Returns false when any exporter failed.
    fn export_outputs(&self, result: &mut ReconcileResult) -> bool {
        let items = match self.catalog.list_items() {
            Ok(items) => items,
            Err(err) => {
                error!("failed to list catalog items for export: {err:#}");
                return false;
            }
        };

        let mut export_ok = true;
        for target in &self.enabled_targets {
            let Some(exporter) = self
                .exporters
                .iter()
                .find(|exporter| exporter.target() == *target)
            else {
                warn!("output target not registered: {target}");
                continue;
            };
            match exporter.export(&items) {
                Ok(files) => {
                    info!("exported {target}: {} files", files.len());
                    result.exported_files.extend(files);
                }
                Err(err) => {
                    error!("export failed for {target}: {err:#}");
                    export_ok = false;
                }
            }
        }

        for exporter in &self.exporters {
            if self.enabled_targets.contains(&exporter.target()) {
                continue;
            }
            match exporter.cleanup() {
                Ok(removed) if removed.is_empty() => {}
                Ok(removed) => info!(
                    "removed {} stale files of disabled target {}",
                    removed.len(),
                    exporter.target()
                ),
                Err(err) => {
                    error!("cleanup failed for {}: {err:#}", exporter.target());
                    export_ok = false;
                }
            }
        }
        export_ok
    }
}
