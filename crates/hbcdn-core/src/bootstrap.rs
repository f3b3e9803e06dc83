//! Startup wiring: layout, schema files, component construction.
//!
//! Everything that can make the process exit non-zero happens here, before
//! the scheduler starts. After `Services::bootstrap` returns, faults are
//! per-cycle or per-file, never fatal.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

use crate::api::ApiContext;
use crate::catalog::CatalogDb;
use crate::config::AppConfig;
use crate::export::{FpkgiJsonExporter, OutputExporter, StoreDbExporter};
use crate::package_store::PackageStore;
use crate::probe::PkgtoolProbe;
use crate::reconcile::Reconciler;
use crate::snapshot_store::SnapshotStore;

pub struct Services {
    pub config: AppConfig,
    pub package_store: PackageStore,
    pub catalog: CatalogDb,
    store_ddl: String,
}

impl Services {
    /// Prepare the data directory and validate every bootstrap input.
    pub fn bootstrap(config: AppConfig) -> Result<Self> {
        let package_store = PackageStore::new(config.paths.clone());
        package_store.ensure_layout()?;
        package_store.ensure_public_index(&config.init_dir.join("index.html"))?;

        let catalog_ddl = read_schema(&config.init_dir.join("catalog_db.sql"))?;
        let store_ddl = read_schema(&config.init_dir.join("store_db.sql"))?;

        let catalog = CatalogDb::new(config.paths.catalog_db_path.clone());
        catalog.init_schema(&catalog_ddl)?;

        if which::which(&config.pkgtool_path).is_err() && !config.pkgtool_path.exists() {
            warn!(
                "pkgtool not found at {}; probes will quarantine until it is installed",
                config.pkgtool_path.display()
            );
        }

        debug!("bootstrap complete under {}", config.paths.data_dir.display());
        Ok(Self {
            config,
            package_store,
            catalog,
            store_ddl,
        })
    }

    /// All known exporters; the reconciler decides which are enabled.
    fn exporters(&self) -> Vec<Box<dyn OutputExporter>> {
        vec![
            Box::new(StoreDbExporter::new(
                self.config.paths.store_db_path.clone(),
                self.store_ddl.clone(),
                self.config.base_url(),
                self.config.paths.share_dir.clone(),
            )),
            Box::new(FpkgiJsonExporter::new(
                self.config.paths.fpkgi_share_dir.clone(),
                self.config.base_url(),
                self.config.paths.share_dir.clone(),
            )),
        ]
    }

    #[must_use]
    pub fn build_reconciler(&self) -> Reconciler {
        let probe = PkgtoolProbe::new(
            self.config.pkgtool_path.clone(),
            Duration::from_secs(self.config.user.pkgtool_timeout_seconds),
            self.config.paths.media_dir.clone(),
        );
        Reconciler::new(
            self.package_store.clone(),
            SnapshotStore::new(self.config.paths.snapshot_path.clone()),
            self.catalog.clone(),
            Box::new(probe),
            self.exporters(),
            self.config.user.output_targets.clone(),
            self.config.paths.lock_path.clone(),
            self.config.user.watcher_pkg_preprocess_workers,
        )
    }

    #[must_use]
    pub fn api_context(&self) -> ApiContext {
        ApiContext {
            catalog: self.catalog.clone(),
            store_db_path: self.config.paths.store_db_path.clone(),
            base_url: self.config.base_url(),
            share_dir: self.config.paths.share_dir.clone(),
        }
    }
}

fn read_schema(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!("schema file not found: {}", path.display());
    }
    let sql = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema file {}", path.display()))?;
    let sql = sql.trim().to_string();
    if sql.is_empty() {
        bail!("schema file is empty: {}", path.display());
    }
    Ok(sql)
}
