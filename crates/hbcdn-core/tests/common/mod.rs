#![allow(dead_code)]
//! Shared fixture for reconcile/API integration tests.
//!
//! PKGs are plain text files of `KEY=VALUE` lines; the stub probe reads them
//! directly, so whole cycles run without the external tool.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tempfile::TempDir;

use hbcdn_core::api::ApiContext;
use hbcdn_core::catalog::CatalogDb;
use hbcdn_core::config::OutputTarget;
use hbcdn_core::export::{FpkgiJsonExporter, OutputExporter, StoreDbExporter};
use hbcdn_core::package_store::PackageStore;
use hbcdn_core::paths::RuntimePaths;
use hbcdn_core::probe::PackageProbe;
use hbcdn_core::reconcile::Reconciler;
use hbcdn_core::snapshot_store::SnapshotStore;
use hbcdn_domain::{AppType, ContentId, ParamSfoSnapshot, ProbeError, ProbeResult};

pub const BASE_URL: &str = "http://127.0.0.1";
pub const CATALOG_DDL: &str = include_str!("../../../../init/catalog_db.sql");
pub const STORE_DDL: &str = include_str!("../../../../init/store_db.sql");

pub struct StubProbe;

impl PackageProbe for StubProbe {
    fn probe(&self, pkg_path: &Path) -> Result<ProbeResult, ProbeError> {
        let raw = fs::read(pkg_path)
            .map_err(|err| ProbeError::Failed(format!("unreadable pkg: {err}")))?;
        let text = String::from_utf8_lossy(&raw).into_owned();

        let mut fields = BTreeMap::new();
        for line in text.lines() {
            if let Some((key, value)) = line.split_once('=') {
                fields.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        if fields.contains_key("SFO_MISSING") {
            return Err(ProbeError::SfoMissing);
        }

        let content_id = fields
            .get("CONTENT_ID")
            .ok_or_else(|| ProbeError::InvalidMetadata("CONTENT_ID is missing".to_string()))
            .and_then(|value| {
                ContentId::parse(value)
                    .map_err(|err| ProbeError::InvalidMetadata(err.to_string()))
            })?;
        let category = fields
            .get("CATEGORY")
            .cloned()
            .ok_or_else(|| ProbeError::InvalidMetadata("CATEGORY is missing".to_string()))?;

        let pubtoolinfo = fields.get("PUBTOOLINFO").cloned().unwrap_or_default();
        let release_date = pubtoolinfo
            .split(',')
            .find_map(|part| part.trim().strip_prefix("c_date="))
            .filter(|raw| raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()))
            .map(|raw| format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8]))
            .unwrap_or_default();

        Ok(ProbeResult {
            app_type: AppType::from_category(&category),
            title_id: fields.get("TITLE_ID").cloned().unwrap_or_default(),
            title: fields.get("TITLE").cloned().unwrap_or_default(),
            version: fields
                .get("VERSION")
                .cloned()
                .unwrap_or_else(|| "01.00".to_string()),
            system_ver: fields.get("SYSTEM_VER").cloned().unwrap_or_default(),
            category,
            pubtoolinfo,
            release_date,
            sfo: ParamSfoSnapshot::new(fields, raw),
            icon0_path: None,
            pic0_path: None,
            pic1_path: None,
            content_id,
        })
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub paths: RuntimePaths,
    pub store: PackageStore,
    pub catalog: CatalogDb,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let paths = RuntimePaths::under(&dir.path().join("data"));
        let store = PackageStore::new(paths.clone());
        store.ensure_layout().expect("layout");
        let catalog = CatalogDb::new(paths.catalog_db_path.clone());
        catalog.init_schema(CATALOG_DDL).expect("schema");
        Self {
            dir,
            paths,
            store,
            catalog,
        }
    }

    pub fn exporters(&self) -> Vec<Box<dyn OutputExporter>> {
        vec![
            Box::new(StoreDbExporter::new(
                self.paths.store_db_path.clone(),
                STORE_DDL.to_string(),
                BASE_URL.to_string(),
                self.paths.share_dir.clone(),
            )),
            Box::new(FpkgiJsonExporter::new(
                self.paths.fpkgi_share_dir.clone(),
                BASE_URL.to_string(),
                self.paths.share_dir.clone(),
            )),
        ]
    }

    pub fn reconciler(&self, targets: Vec<OutputTarget>, workers: usize) -> Reconciler {
        Reconciler::new(
            self.store.clone(),
            SnapshotStore::new(self.paths.snapshot_path.clone()),
            self.catalog.clone(),
            Box::new(StubProbe),
            self.exporters(),
            targets,
            self.paths.lock_path.clone(),
            workers,
        )
    }

    pub fn api_context(&self) -> ApiContext {
        ApiContext {
            catalog: self.catalog.clone(),
            store_db_path: self.paths.store_db_path.clone(),
            base_url: BASE_URL.to_string(),
            share_dir: self.paths.share_dir.clone(),
        }
    }

    pub fn write_pkg(&self, relative: &str, fields: &[(&str, &str)]) -> std::path::PathBuf {
        let path = self.paths.pkg_root.join(relative);
        fs::create_dir_all(path.parent().expect("parent")).expect("pkg dir");
        let body: String = fields
            .iter()
            .map(|(key, value)| format!("{key}={value}\n"))
            .collect();
        fs::write(&path, body).expect("write pkg");
        path
    }
}

pub fn game_fields<'a>(content_id: &'a str, version: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("CONTENT_ID", content_id),
        ("TITLE_ID", "CUSA00001"),
        ("TITLE", "My Test"),
        ("CATEGORY", "GD"),
        ("VERSION", version),
        ("PUBTOOLINFO", "c_date=20250101"),
        ("SYSTEM_VER", "0x05050000"),
    ]
}
