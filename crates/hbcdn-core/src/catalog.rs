//! Transactional store of canonical catalog rows.
//!
//! Single writer: each ingest worker and the reconciler open their own
//! connection and commit independently; readers (exports, API) never write.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use hbcdn_domain::{AppType, CatalogItem, ContentId, ParamSfoSnapshot};

/// Result of one upsert; `Skipped` is the content-hash idempotence path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Written,
    Skipped,
}

/// Minimal projection used by the download API to pick the best row.
#[derive(Clone, Debug)]
pub struct DownloadRow {
    pub content_id: String,
    pub app_type: AppType,
    pub version: String,
    pub updated_at: String,
    pub pkg_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct CatalogDb {
    path: PathBuf,
}

impl CatalogDb {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&self.path)
            .with_context(|| format!("failed to open catalog at {}", self.path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL for the catalog")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys for the catalog")?;
        conn.busy_timeout(Duration::from_secs(10))
            .context("failed to set busy timeout for the catalog")?;
        Ok(conn)
    }

    pub fn init_schema(&self, ddl: &str) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(ddl)
            .context("failed to apply the catalog schema")?;
        Ok(())
    }

    /// Run `f` inside one immediate transaction (a unit of work).
    pub fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start a catalog transaction")?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Insert or update one row keyed by `(content_id, app_type, version)`.
    ///
    /// When the stored `row_md5` matches the incoming one the write is skipped
    /// entirely: no column changes, no `updated_at` bump. `created_at` is
    /// preserved on update.
    pub fn upsert(tx: &rusqlite::Transaction<'_>, item: &CatalogItem) -> Result<UpsertOutcome> {
        let row_md5 = item.row_md5();
        let existing: Option<String> = tx
            .query_row(
                "SELECT row_md5 FROM catalog_items \
                 WHERE content_id = ?1 AND app_type = ?2 AND version = ?3",
                params![item.content_id.as_str(), item.app_type.as_str(), item.version],
                |row| row.get(0),
            )
            .optional()?;
        if existing.as_deref() == Some(row_md5.as_str()) {
            return Ok(UpsertOutcome::Skipped);
        }

        let now = now_utc_seconds();
        let sfo_json = serde_json::to_string(&item.sfo.fields)
            .context("failed to serialize SFO fields")?;
        tx.execute(
            "INSERT INTO catalog_items (
                content_id, title_id, title, app_type, category, version,
                pubtoolinfo, system_ver, release_date, pkg_path,
                pkg_size, pkg_mtime_ns, pkg_fingerprint,
                icon0_path, pic0_path, pic1_path,
                sfo_json, sfo_raw, sfo_hash, row_md5,
                downloads, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20,
                0, ?21, ?21
            )
            ON CONFLICT(content_id, app_type, version) DO UPDATE SET
                title_id = excluded.title_id,
                title = excluded.title,
                category = excluded.category,
                pubtoolinfo = excluded.pubtoolinfo,
                system_ver = excluded.system_ver,
                release_date = excluded.release_date,
                pkg_path = excluded.pkg_path,
                pkg_size = excluded.pkg_size,
                pkg_mtime_ns = excluded.pkg_mtime_ns,
                pkg_fingerprint = excluded.pkg_fingerprint,
                icon0_path = excluded.icon0_path,
                pic0_path = excluded.pic0_path,
                pic1_path = excluded.pic1_path,
                sfo_json = excluded.sfo_json,
                sfo_raw = excluded.sfo_raw,
                sfo_hash = excluded.sfo_hash,
                row_md5 = excluded.row_md5,
                updated_at = excluded.updated_at",
            params![
                item.content_id.as_str(),
                item.title_id,
                item.title,
                item.app_type.as_str(),
                item.category,
                item.version,
                item.pubtoolinfo,
                item.system_ver,
                item.release_date,
                path_str(&item.pkg_path),
                i64::try_from(item.pkg_size).unwrap_or(i64::MAX),
                item.pkg_mtime_ns,
                item.pkg_fingerprint,
                item.icon0_path.as_deref().map(path_str),
                item.pic0_path.as_deref().map(path_str),
                item.pic1_path.as_deref().map(path_str),
                sfo_json,
                item.sfo.raw,
                item.sfo.hash,
                row_md5,
                now,
            ],
        )?;
        Ok(UpsertOutcome::Written)
    }

    /// Every row, ordered by `(app_type, content_id, version)`.
    pub fn list_items(&self) -> Result<Vec<CatalogItem>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT content_id, title_id, title, app_type, category, version,
                    pubtoolinfo, system_ver, release_date, pkg_path,
                    pkg_size, pkg_mtime_ns, pkg_fingerprint,
                    icon0_path, pic0_path, pic1_path,
                    sfo_json, sfo_raw, sfo_hash,
                    downloads, created_at, updated_at
             FROM catalog_items
             ORDER BY app_type, content_id, version",
        )?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            match parse_row(row) {
                Ok(item) => items.push(item),
                Err(err) => tracing::warn!("skipping unreadable catalog row: {err}"),
            }
        }
        Ok(items)
    }

    /// Delete every row whose `pkg_path` is not in `present_paths`; an empty
    /// set deletes everything.
    pub fn delete_by_pkg_paths_not_in(
        tx: &rusqlite::Transaction<'_>,
        present_paths: &BTreeSet<String>,
    ) -> Result<usize> {
        if present_paths.is_empty() {
            let deleted = tx.execute("DELETE FROM catalog_items", [])?;
            return Ok(deleted);
        }
        let placeholders = vec!["?"; present_paths.len()].join(",");
        let sql = format!("DELETE FROM catalog_items WHERE pkg_path NOT IN ({placeholders})");
        let deleted = tx.execute(&sql, params_from_iter(present_paths.iter()))?;
        Ok(deleted)
    }

    /// Rows for one title id, as needed by the download resolver.
    pub fn rows_for_title(&self, title_id: &str) -> Result<Vec<DownloadRow>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT content_id, app_type, version, updated_at, pkg_path
             FROM catalog_items WHERE title_id = ?1",
        )?;
        let rows = stmt.query_map(params![title_id], |row| {
            Ok(DownloadRow {
                content_id: row.get(0)?,
                app_type: AppType::parse(&row.get::<_, String>(1)?),
                version: row.get(2)?,
                updated_at: row.get(3)?,
                pkg_path: PathBuf::from(row.get::<_, String>(4)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Bump the download counter for every row of a title; returns the new
    /// highest count (0 when the title is unknown).
    pub fn increment_download_count(&self, title_id: &str) -> Result<i64> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE catalog_items SET downloads = downloads + 1 WHERE title_id = ?1",
            params![title_id],
        )?;
        Ok(max_downloads(&conn, title_id)?)
    }

    pub fn get_download_count(&self, title_id: &str) -> Result<i64> {
        let conn = self.connection()?;
        Ok(max_downloads(&conn, title_id)?)
    }
}

fn max_downloads(conn: &Connection, title_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(downloads), 0) FROM catalog_items WHERE title_id = ?1",
        params![title_id],
        |row| row.get(0),
    )
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Current UTC time, second precision, RFC 3339.
pub(crate) fn now_utc_seconds() -> String {
    let now = OffsetDateTime::now_utc()
        .replace_nanosecond(0)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn parse_row(row: &rusqlite::Row<'_>) -> Result<CatalogItem> {
    let content_id: String = row.get(0)?;
    let app_type: String = row.get(3)?;
    let sfo_json: String = row.get(16)?;
    let fields = serde_json::from_str::<Value>(&sfo_json)
        .ok()
        .and_then(|value| match value {
            Value::Object(map) => Some(
                map.into_iter()
                    .map(|(k, v)| {
                        let text = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, text)
                    })
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();
    let raw: Vec<u8> = row.get(17)?;
    let hash: String = row.get(18)?;

    Ok(CatalogItem {
        content_id: ContentId::parse(&content_id)?,
        title_id: row.get(1)?,
        title: row.get(2)?,
        app_type: AppType::parse(&app_type),
        category: row.get(4)?,
        version: row.get(5)?,
        pubtoolinfo: row.get(6)?,
        system_ver: row.get(7)?,
        release_date: row.get(8)?,
        pkg_path: PathBuf::from(row.get::<_, String>(9)?),
        pkg_size: u64::try_from(row.get::<_, i64>(10)?).unwrap_or(0),
        pkg_mtime_ns: row.get(11)?,
        pkg_fingerprint: row.get(12)?,
        icon0_path: row.get::<_, Option<String>>(13)?.map(PathBuf::from),
        pic0_path: row.get::<_, Option<String>>(14)?.map(PathBuf::from),
        pic1_path: row.get::<_, Option<String>>(15)?.map(PathBuf::from),
        sfo: ParamSfoSnapshot {
            fields,
            raw,
            hash,
        },
        downloads: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}
