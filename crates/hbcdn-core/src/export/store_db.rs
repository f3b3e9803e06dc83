//! SQLite store database consumed by the HB-Store client.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, TransactionBehavior};
use serde_json::json;
use tracing::debug;

use hbcdn_domain::hash::canonical_md5;
use hbcdn_domain::CatalogItem;

use super::{cdn_url, cleanup_unmanaged, OutputExporter};
use crate::config::OutputTarget;

pub struct StoreDbExporter {
    db_path: PathBuf,
    ddl: String,
    base_url: String,
    share_dir: PathBuf,
}

impl StoreDbExporter {
    #[must_use]
    pub fn new(db_path: PathBuf, ddl: String, base_url: String, share_dir: PathBuf) -> Self {
        Self {
            db_path,
            ddl,
            base_url,
            share_dir,
        }
    }

    fn url_for(&self, path: &Path) -> String {
        cdn_url(&self.base_url, &self.share_dir, path)
    }

    fn optional_url(&self, path: Option<&Path>) -> Option<String> {
        path.map(|path| self.url_for(path))
    }

    fn insert_item(&self, tx: &rusqlite::Transaction<'_>, item: &CatalogItem) -> Result<()> {
        let package = self.url_for(&item.pkg_path);
        let image = self.optional_url(item.icon0_path.as_deref());
        let picpath = self.optional_url(item.pic0_path.as_deref());
        let main_menu_pic = self.optional_url(item.pic1_path.as_deref());
        let size = fs::metadata(&item.pkg_path).map_or(0, |metadata| metadata.len());
        let apptype = item.app_type.display_name();

        let row_md5 = canonical_md5(&json!({
            "content_id": item.content_id.as_str(),
            "id": item.title_id,
            "name": item.title,
            "desc": Option::<String>::None,
            "image": image,
            "package": package,
            "version": item.version,
            "picpath": picpath,
            "desc_1": Option::<String>::None,
            "desc_2": Option::<String>::None,
            "ReviewStars": Option::<String>::None,
            "Size": size,
            "Author": Option::<String>::None,
            "apptype": apptype,
            "pv": Option::<String>::None,
            "main_icon_path": picpath,
            "main_menu_pic": main_menu_pic,
            "releaseddate": item.release_date,
            "number_of_downloads": item.downloads,
            "github": Option::<String>::None,
            "video": Option::<String>::None,
            "twitter": Option::<String>::None,
            "md5": Option::<String>::None,
        }));

        tx.execute(
            "INSERT INTO homebrews (
                content_id, id, name, \"desc\", image, package, version, picpath,
                desc_1, desc_2, ReviewStars, Size, Author, apptype, pv,
                main_icon_path, main_menu_pic, releaseddate, number_of_downloads,
                github, video, twitter, md5, row_md5
            ) VALUES (
                ?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7,
                NULL, NULL, NULL, ?8, NULL, ?9, NULL,
                ?10, ?11, ?12, ?13,
                NULL, NULL, NULL, NULL, ?14
            )
            ON CONFLICT(content_id) DO UPDATE SET
                id = excluded.id,
                name = excluded.name,
                \"desc\" = excluded.\"desc\",
                image = excluded.image,
                package = excluded.package,
                version = excluded.version,
                picpath = excluded.picpath,
                desc_1 = excluded.desc_1,
                desc_2 = excluded.desc_2,
                ReviewStars = excluded.ReviewStars,
                Size = excluded.Size,
                Author = excluded.Author,
                apptype = excluded.apptype,
                pv = excluded.pv,
                main_icon_path = excluded.main_icon_path,
                main_menu_pic = excluded.main_menu_pic,
                releaseddate = excluded.releaseddate,
                number_of_downloads = excluded.number_of_downloads,
                github = excluded.github,
                video = excluded.video,
                twitter = excluded.twitter,
                md5 = excluded.md5,
                row_md5 = excluded.row_md5",
            params![
                item.content_id.as_str(),
                item.title_id,
                item.title,
                image,
                package,
                item.version,
                picpath,
                i64::try_from(size).unwrap_or(i64::MAX),
                apptype,
                picpath,
                main_menu_pic,
                item.release_date,
                item.downloads,
                row_md5,
            ],
        )?;
        Ok(())
    }
}

impl OutputExporter for StoreDbExporter {
    fn target(&self) -> OutputTarget {
        OutputTarget::HbStore
    }

    /// Rebuild the database at a sibling `.tmp` path and rename it over the
    /// target, so readers always see either the old or the new file.
    fn export(&self, items: &[CatalogItem]) -> Result<Vec<PathBuf>> {
        if let Some(parent) = self.db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let tmp = self.db_path.with_extension("db.tmp");
        if tmp.exists() {
            fs::remove_file(&tmp)
                .with_context(|| format!("failed to remove stale {}", tmp.display()))?;
        }

        {
            let mut conn = Connection::open(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            conn.execute_batch(&self.ddl)
                .context("failed to apply the store-db schema")?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .context("failed to start the store-db transaction")?;
            tx.execute("DELETE FROM homebrews", [])?;
            for item in items {
                self.insert_item(&tx, item)?;
            }
            tx.commit()?;
        }

        fs::rename(&tmp, &self.db_path).with_context(|| {
            format!("failed to move {} to {}", tmp.display(), self.db_path.display())
        })?;
        debug!("store db rebuilt with {} rows", items.len());
        Ok(vec![self.db_path.clone()])
    }

    fn cleanup(&self) -> Result<Vec<PathBuf>> {
        cleanup_unmanaged(&self.managed_files(), &[])
    }

    fn managed_files(&self) -> Vec<PathBuf> {
        vec![self.db_path.clone()]
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use hbcdn_domain::{AppType, ContentId, ParamSfoSnapshot};
    use tempfile::tempdir;

    use super::*;

    const DDL: &str = include_str!("../../../../init/store_db.sql");

    fn item(share: &Path, content_id: &str) -> CatalogItem {
        let pkg_path = share
            .join("pkg/game")
            .join(format!("{content_id}.pkg"));
        CatalogItem {
            content_id: ContentId::parse(content_id).expect("content id"),
            title_id: "CUSA00001".to_string(),
            title: "My Test".to_string(),
            app_type: AppType::Game,
            category: "GD".to_string(),
            version: "01.00".to_string(),
            pubtoolinfo: "c_date=20250101".to_string(),
            system_ver: "0x05050000".to_string(),
            release_date: "2025-01-01".to_string(),
            pkg_path,
            pkg_size: 5,
            pkg_mtime_ns: 100,
            pkg_fingerprint: "fp".to_string(),
            icon0_path: Some(share.join("pkg/_media").join(format!("{content_id}_icon0.png"))),
            pic0_path: None,
            pic1_path: None,
            sfo: ParamSfoSnapshot::new(BTreeMap::new(), b"sfo".to_vec()),
            downloads: 3,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn exporter(share: &Path) -> StoreDbExporter {
        StoreDbExporter::new(
            share.join("hb-store/store.db"),
            DDL.to_string(),
            "http://127.0.0.1".to_string(),
            share.to_path_buf(),
        )
    }

    #[test]
    fn export_publishes_urls_and_sizes() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let content_id = "UP0000-TEST00000_00-TEST000000000001";
        let item = item(&share, content_id);
        fs::create_dir_all(item.pkg_path.parent().expect("parent"))?;
        fs::write(&item.pkg_path, b"12345")?;

        let exporter = exporter(&share);
        let written = exporter.export(std::slice::from_ref(&item))?;
        assert_eq!(written, vec![share.join("hb-store/store.db")]);

        let conn = Connection::open(share.join("hb-store/store.db"))?;
        let (id, package, image, apptype, size, downloads, md5, row_md5): (
            String,
            String,
            String,
            String,
            i64,
            i64,
            Option<String>,
            String,
        ) = conn.query_row(
            "SELECT id, package, image, apptype, Size, number_of_downloads, md5, row_md5
             FROM homebrews",
            [],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            },
        )?;
        assert_eq!(id, "CUSA00001");
        assert_eq!(
            package,
            format!("http://127.0.0.1/pkg/game/{content_id}.pkg")
        );
        assert_eq!(
            image,
            format!("http://127.0.0.1/pkg/_media/{content_id}_icon0.png")
        );
        assert_eq!(apptype, "Game");
        assert_eq!(size, 5);
        assert_eq!(downloads, 3);
        assert_eq!(md5, None);
        assert_eq!(row_md5.len(), 32);
        Ok(())
    }

    #[test]
    fn export_replaces_previous_contents() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let exporter = exporter(&share);

        let item = item(&share, "UP0000-TEST00000_00-TEST000000000001");
        exporter.export(std::slice::from_ref(&item))?;
        exporter.export(&[])?;

        let conn = Connection::open(share.join("hb-store/store.db"))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM homebrews", [], |row| row.get(0))?;
        assert_eq!(count, 0);
        assert!(!share.join("hb-store/store.db.tmp").exists());
        Ok(())
    }

    #[test]
    fn cleanup_removes_the_database() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let exporter = exporter(&share);

        exporter.export(&[])?;
        assert!(share.join("hb-store/store.db").exists());

        let removed = exporter.cleanup()?;
        assert_eq!(removed, vec![share.join("hb-store/store.db")]);
        assert!(!share.join("hb-store/store.db").exists());
        assert!(exporter.cleanup()?.is_empty());
        Ok(())
    }

    #[test]
    fn missing_pkg_file_exports_zero_size() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let exporter = exporter(&share);

        let item = item(&share, "UP0000-TEST00000_00-TEST000000000002");
        exporter.export(std::slice::from_ref(&item))?;

        let conn = Connection::open(share.join("hb-store/store.db"))?;
        let size: i64 = conn.query_row("SELECT Size FROM homebrews", [], |row| row.get(0))?;
        assert_eq!(size, 0);
        Ok(())
    }
}
