//! Output exporters.
//!
//! Each exporter owns a closed set of managed files, replaces them atomically
//! on export, and can remove the whole set when its target is disabled.

use std::path::{Path, PathBuf};

use anyhow::Result;

use hbcdn_domain::CatalogItem;

use crate::config::OutputTarget;

mod fpkgi;
mod store_db;

pub use fpkgi::FpkgiJsonExporter;
pub use store_db::StoreDbExporter;

pub trait OutputExporter: Send + Sync {
    fn target(&self) -> OutputTarget;

    /// Produce/overwrite every output for `items`; returns the written files.
    fn export(&self, items: &[CatalogItem]) -> Result<Vec<PathBuf>>;

    /// Remove every managed file that currently exists.
    fn cleanup(&self) -> Result<Vec<PathBuf>>;

    /// The closed set of files this exporter may ever touch.
    fn managed_files(&self) -> Vec<PathBuf>;
}

/// Publish a path as a CDN URL.
///
/// Paths under the share directory become `base_url/<relative>`; anything
/// outside falls through as its raw string rather than being dropped.
#[must_use]
pub fn cdn_url(base_url: &str, share_dir: &Path, path: &Path) -> String {
    match path.strip_prefix(share_dir) {
        Ok(relative) => {
            let joined = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            format!("{}/{joined}", base_url.trim_end_matches('/'))
        }
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

pub(crate) fn cleanup_unmanaged(managed: &[PathBuf], keep: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for path in managed {
        if keep.contains(path) || !path.exists() {
            continue;
        }
        std::fs::remove_file(path)
            .map_err(|err| anyhow::anyhow!("failed to remove {}: {err}", path.display()))?;
        removed.push(path.clone());
    }
    Ok(removed)
}
