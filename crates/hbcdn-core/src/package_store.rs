//! Ownership of the on-disk PKG tree: enumeration, stat, canonical placement,
//! quarantine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;
use walkdir::WalkDir;

use hbcdn_domain::{AppType, ContentId};

use crate::paths::RuntimePaths;

/// Errors the ingest pipeline matches on when placing a package.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    #[error("canonical target already occupied: {0}")]
    Conflict(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug)]
pub struct PackageStore {
    paths: RuntimePaths,
}

impl PackageStore {
    #[must_use]
    pub fn new(paths: RuntimePaths) -> Self {
        Self { paths }
    }

    /// Idempotent creation of every directory in the layout.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in self.paths.all_dirs() {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    /// Copy the bundled index page into the share root once; an existing file
    /// is never overwritten.
    pub fn ensure_public_index(&self, source: &Path) -> Result<()> {
        if self.paths.public_index_path.exists() || !source.exists() {
            return Ok(());
        }
        fs::copy(source, &self.paths.public_index_path).with_context(|| {
            format!(
                "failed to copy {} to {}",
                source.display(),
                self.paths.public_index_path.display()
            )
        })?;
        Ok(())
    }

    /// Recursive walk of the PKG root collecting `*.pkg` files
    /// (case-insensitive), excluding the media tree, sorted by absolute path.
    pub fn scan_pkg_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.paths.pkg_root)
            .into_iter()
            .filter_entry(|entry| entry.path() != self.paths.media_dir);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    debug!("skipping unreadable entry during scan: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let is_pkg = entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pkg"));
            if is_pkg {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// `(size_bytes, mtime_ns)` for one file; errors when the file is gone.
    pub fn stat(&self, path: &Path) -> io::Result<(u64, i64)> {
        let metadata = fs::metadata(path)?;
        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
            .and_then(|duration| i64::try_from(duration.as_nanos()).ok())
            .unwrap_or(0);
        Ok((metadata.len(), mtime_ns))
    }

    /// Move a package to `<type dir>/<content_id>.pkg`.
    ///
    /// Already-canonical sources are returned as-is; an occupied target is a
    /// `Conflict` the caller resolves via fingerprints.
    pub fn move_to_canonical(
        &self,
        source: &Path,
        app_type: AppType,
        content_id: &ContentId,
    ) -> Result<PathBuf, PlaceError> {
        let target = self
            .paths
            .dir_for(app_type)
            .join(format!("{content_id}.pkg"));
        if source == target {
            return Ok(target);
        }
        if target.exists() {
            return Err(PlaceError::Conflict(target));
        }
        fs::rename(source, &target)?;
        debug!(
            "placed {} at {}",
            source.display(),
            target.display()
        );
        Ok(target)
    }

    /// Quarantine a package under the errors directory as
    /// `<stem>.<reason>.<rand>.pkg`; never overwrites.
    pub fn move_to_errors(&self, source: &Path, reason: &str) -> Result<PathBuf> {
        let stem = source
            .file_stem()
            .map_or_else(|| "package".to_string(), |s| s.to_string_lossy().into_owned());
        let reason = sanitize_reason(reason);

        fs::create_dir_all(&self.paths.errors_dir)
            .with_context(|| format!("failed to create {}", self.paths.errors_dir.display()))?;

        let mut rng = rand::thread_rng();
        loop {
            let suffix: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(8)
                .map(|b| (b as char).to_ascii_lowercase())
                .collect();
            let target = self
                .paths
                .errors_dir
                .join(format!("{stem}.{reason}.{suffix}.pkg"));
            if target.exists() {
                continue;
            }
            fs::rename(source, &target).with_context(|| {
                format!(
                    "failed to quarantine {} as {}",
                    source.display(),
                    target.display()
                )
            })?;
            return Ok(target);
        }
    }
}

fn sanitize_reason(reason: &str) -> String {
    let cleaned: String = reason
        .chars()
        .map(|ch| {
            let ch = ch.to_ascii_lowercase();
            if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "error".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn store(root: &Path) -> PackageStore {
        let store = PackageStore::new(RuntimePaths::under(root));
        store.ensure_layout().expect("layout");
        store
    }

    #[test]
    fn scan_ignores_media_and_sorts() -> Result<()> {
        let dir = tempdir()?;
        let store = store(dir.path());
        let paths = RuntimePaths::under(dir.path());

        fs::write(paths.game_dir.join("B.pkg"), b"pkg")?;
        fs::write(paths.app_dir.join("A.PKG"), b"pkg")?;
        fs::write(paths.media_dir.join("ignored.pkg"), b"pkg")?;
        fs::write(paths.game_dir.join("notes.txt"), b"text")?;

        let files = store.scan_pkg_files()?;
        assert_eq!(
            files,
            vec![paths.app_dir.join("A.PKG"), paths.game_dir.join("B.pkg")]
        );
        Ok(())
    }

    #[test]
    fn stat_reports_size_and_mtime() -> Result<()> {
        let dir = tempdir()?;
        let store = store(dir.path());
        let paths = RuntimePaths::under(dir.path());

        let pkg = paths.app_dir.join("A.pkg");
        fs::write(&pkg, b"12345")?;

        let (size, mtime_ns) = store.stat(&pkg)?;
        assert_eq!(size, 5);
        assert!(mtime_ns > 0);
        assert!(store.stat(&paths.app_dir.join("missing.pkg")).is_err());
        Ok(())
    }

    #[test]
    fn move_to_canonical_places_and_detects_conflicts() -> Result<()> {
        let dir = tempdir()?;
        let store = store(dir.path());
        let paths = RuntimePaths::under(dir.path());
        let content_id =
            ContentId::parse("UP0000-TEST00000_00-TEST000000000001").expect("content id");

        let source = paths.pkg_root.join("incoming.pkg");
        fs::write(&source, b"pkg")?;

        let target = store
            .move_to_canonical(&source, AppType::Game, &content_id)
            .expect("move");
        assert_eq!(
            target,
            paths.game_dir.join("UP0000-TEST00000_00-TEST000000000001.pkg")
        );
        assert!(!source.exists());

        // Moving the canonical file onto itself is a no-op.
        let same = store
            .move_to_canonical(&target, AppType::Game, &content_id)
            .expect("self move");
        assert_eq!(same, target);
        assert!(target.exists());

        let other = paths.pkg_root.join("other.pkg");
        fs::write(&other, b"different")?;
        match store.move_to_canonical(&other, AppType::Game, &content_id) {
            Err(PlaceError::Conflict(existing)) => assert_eq!(existing, target),
            other => panic!("expected conflict, got {other:?}"),
        }
        assert!(other.exists());
        Ok(())
    }

    #[test]
    fn quarantine_sanitizes_reason_and_keeps_both_files() -> Result<()> {
        let dir = tempdir()?;
        let store = store(dir.path());
        let paths = RuntimePaths::under(dir.path());

        let first = paths.pkg_root.join("bad.pkg");
        let second = paths.pkg_root.join("bad2.pkg");
        fs::write(&first, b"a")?;
        fs::write(&second, b"b")?;

        let quarantined = store.move_to_errors(&first, "Invalid Metadata!")?;
        let name = quarantined.file_name().expect("name").to_string_lossy().into_owned();
        assert!(name.starts_with("bad.invalid_metadata_."));
        assert!(name.ends_with(".pkg"));
        assert!(quarantined.starts_with(&paths.errors_dir));

        let also = store.move_to_errors(&second, "invalid_metadata_")?;
        assert_ne!(quarantined, also);
        Ok(())
    }
}
