//! On-disk layout rooted at the data directory.

use std::path::{Path, PathBuf};

use hbcdn_domain::AppType;

/// Every directory and well-known file the service touches.
///
/// Built once at startup; all components receive paths from here instead of
/// deriving their own.
#[derive(Clone, Debug)]
pub struct RuntimePaths {
    pub data_dir: PathBuf,
    pub share_dir: PathBuf,
    pub hb_store_share_dir: PathBuf,
    pub hb_store_update_dir: PathBuf,
    pub fpkgi_share_dir: PathBuf,
    pub pkg_root: PathBuf,
    pub media_dir: PathBuf,
    pub app_dir: PathBuf,
    pub game_dir: PathBuf,
    pub dlc_dir: PathBuf,
    pub pkg_update_dir: PathBuf,
    pub save_dir: PathBuf,
    pub unknown_dir: PathBuf,
    pub internal_dir: PathBuf,
    pub catalog_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub errors_dir: PathBuf,
    pub catalog_db_path: PathBuf,
    pub store_db_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub lock_path: PathBuf,
    pub public_index_path: PathBuf,
    pub settings_path: PathBuf,
}

impl RuntimePaths {
    #[must_use]
    pub fn under(data_dir: &Path) -> Self {
        let data_dir = data_dir.to_path_buf();
        let share_dir = data_dir.join("share");
        let pkg_root = share_dir.join("pkg");
        let hb_store_share_dir = share_dir.join("hb-store");
        let internal_dir = data_dir.join("internal");
        let catalog_dir = internal_dir.join("catalog");
        let cache_dir = internal_dir.join("cache");
        Self {
            hb_store_update_dir: hb_store_share_dir.join("update"),
            fpkgi_share_dir: share_dir.join("fpkgi"),
            media_dir: pkg_root.join("_media"),
            app_dir: pkg_root.join("app"),
            game_dir: pkg_root.join("game"),
            dlc_dir: pkg_root.join("dlc"),
            pkg_update_dir: pkg_root.join("update"),
            save_dir: pkg_root.join("save"),
            unknown_dir: pkg_root.join("_unknown"),
            logs_dir: internal_dir.join("logs"),
            errors_dir: internal_dir.join("errors"),
            catalog_db_path: catalog_dir.join("catalog.db"),
            store_db_path: hb_store_share_dir.join("store.db"),
            snapshot_path: catalog_dir.join("pkgs-snapshot.json"),
            lock_path: cache_dir.join("reconcile.lock"),
            public_index_path: share_dir.join("index.html"),
            settings_path: internal_dir.join("settings.toml"),
            hb_store_share_dir,
            pkg_root,
            share_dir,
            catalog_dir,
            cache_dir,
            internal_dir,
            data_dir,
        }
    }

    /// Canonical directory bound to an app type.
    #[must_use]
    pub fn dir_for(&self, app_type: AppType) -> &Path {
        match app_type {
            AppType::App => &self.app_dir,
            AppType::Game => &self.game_dir,
            AppType::Dlc => &self.dlc_dir,
            AppType::Update => &self.pkg_update_dir,
            AppType::Save => &self.save_dir,
            AppType::Unknown => &self.unknown_dir,
        }
    }

    /// Every directory `ensure_layout` creates, parents first.
    #[must_use]
    pub fn all_dirs(&self) -> Vec<&Path> {
        vec![
            &self.data_dir,
            &self.share_dir,
            &self.hb_store_share_dir,
            &self.hb_store_update_dir,
            &self.fpkgi_share_dir,
            &self.pkg_root,
            &self.media_dir,
            &self.app_dir,
            &self.game_dir,
            &self.dlc_dir,
            &self.pkg_update_dir,
            &self.save_dir,
            &self.unknown_dir,
            &self.internal_dir,
            &self.catalog_dir,
            &self.cache_dir,
            &self.logs_dir,
            &self.errors_dir,
        ]
    }
}
