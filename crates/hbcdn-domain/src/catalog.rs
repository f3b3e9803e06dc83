//! Canonical catalog rows.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::app_type::AppType;
use crate::content_id::ContentId;
use crate::hash::canonical_md5;
use crate::sfo::ParamSfoSnapshot;

/// One canonical catalog row; identity is `(content_id, app_type, version)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogItem {
    pub content_id: ContentId,
    pub title_id: String,
    pub title: String,
    pub app_type: AppType,
    pub category: String,
    pub version: String,
    pub pubtoolinfo: String,
    pub system_ver: String,
    pub release_date: String,
    pub pkg_path: PathBuf,
    pub pkg_size: u64,
    pub pkg_mtime_ns: i64,
    pub pkg_fingerprint: String,
    pub icon0_path: Option<PathBuf>,
    pub pic0_path: Option<PathBuf>,
    pub pic1_path: Option<PathBuf>,
    pub sfo: ParamSfoSnapshot,
    pub downloads: i64,
    pub created_at: String,
    pub updated_at: String,
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl CatalogItem {
    /// Stable content hash over every exported column.
    ///
    /// Timestamps and the download counter are excluded, so re-ingesting an
    /// unchanged package produces the same hash and the repository can skip
    /// the write entirely.
    #[must_use]
    pub fn row_md5(&self) -> String {
        let value = json!({
            "content_id": self.content_id.as_str(),
            "title_id": self.title_id,
            "title": self.title,
            "app_type": self.app_type.as_str(),
            "category": self.category,
            "version": self.version,
            "pubtoolinfo": self.pubtoolinfo,
            "system_ver": self.system_ver,
            "release_date": self.release_date,
            "pkg_path": path_str(&self.pkg_path),
            "pkg_size": self.pkg_size,
            "pkg_mtime_ns": self.pkg_mtime_ns,
            "pkg_fingerprint": self.pkg_fingerprint,
            "icon0_path": self.icon0_path.as_deref().map(path_str),
            "pic0_path": self.pic0_path.as_deref().map(path_str),
            "pic1_path": self.pic1_path.as_deref().map(path_str),
            "sfo_fields": self.sfo.fields,
            "sfo_hash": self.sfo.hash,
        });
        canonical_md5(&value)
    }
}
