//! Category-partitioned JSON files consumed by the FPKGi client.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{json, Map, Value};

use hbcdn_domain::{json_ascii, AppType, CatalogItem};

use super::{cdn_url, cleanup_unmanaged, OutputExporter};
use crate::config::OutputTarget;

const BYTES_PER_MB: u64 = 1024 * 1024;
const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// Fixed file set; every stem is written each cycle, most with an empty
/// payload.
const MANAGED_STEMS: [&str; 14] = [
    "APPS", "DEMOS", "DLC", "EMULATORS", "GAMES", "HOMEBREW", "PS1", "PS2", "PS5", "PSP",
    "SAVES", "THEMES", "UNKNOWN", "UPDATES",
];

fn stem_for(app_type: AppType) -> &'static str {
    match app_type {
        AppType::App => "APPS",
        AppType::Dlc => "DLC",
        AppType::Game => "GAMES",
        AppType::Save => "SAVES",
        AppType::Update => "UPDATES",
        AppType::Unknown => "UNKNOWN",
    }
}

pub struct FpkgiJsonExporter {
    output_dir: PathBuf,
    base_url: String,
    share_dir: PathBuf,
}

impl FpkgiJsonExporter {
    #[must_use]
    pub fn new(output_dir: PathBuf, base_url: String, share_dir: PathBuf) -> Self {
        Self {
            output_dir,
            base_url,
            share_dir,
        }
    }

    fn entry(&self, item: &CatalogItem) -> Value {
        let cover_url = item
            .icon0_path
            .as_deref()
            .map(|path| cdn_url(&self.base_url, &self.share_dir, path))
            .unwrap_or_default();
        json!({
            "title_id": item.title_id,
            "region": item.content_id.region().as_str(),
            "name": item.title,
            "version": item.version,
            "release": format_release(&item.release_date),
            "size": format_size(item.pkg_size),
            "min_fw": normalize_min_fw(&item.system_ver),
            "cover_url": cover_url,
        })
    }
}

impl OutputExporter for FpkgiJsonExporter {
    fn target(&self) -> OutputTarget {
        OutputTarget::Fpkgi
    }

    fn export(&self, items: &[CatalogItem]) -> Result<Vec<PathBuf>> {
        let mut grouped: BTreeMap<&str, Map<String, Value>> = MANAGED_STEMS
            .iter()
            .map(|stem| (*stem, Map::new()))
            .collect();
        for item in items {
            let pkg_url = cdn_url(&self.base_url, &self.share_dir, &item.pkg_path);
            grouped
                .entry(stem_for(item.app_type))
                .or_default()
                .insert(pkg_url, self.entry(item));
        }

        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("failed to create {}", self.output_dir.display()))?;

        let mut exported = Vec::new();
        for (stem, data) in grouped {
            let destination = self.output_dir.join(format!("{stem}.json"));
            let rendered = json_ascii::to_string_pretty(&json!({ "DATA": data }));
            let tmp = destination.with_extension("json.tmp");
            fs::write(&tmp, rendered)
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            fs::rename(&tmp, &destination).with_context(|| {
                format!("failed to move {} to {}", tmp.display(), destination.display())
            })?;
            exported.push(destination);
        }

        // All stems are produced above, but the managed set stays the source
        // of truth for what may linger from older runs.
        cleanup_unmanaged(&self.managed_files(), &exported)?;
        Ok(exported)
    }

    fn cleanup(&self) -> Result<Vec<PathBuf>> {
        cleanup_unmanaged(&self.managed_files(), &[])
    }

    fn managed_files(&self) -> Vec<PathBuf> {
        MANAGED_STEMS
            .iter()
            .map(|stem| self.output_dir.join(format!("{stem}.json")))
            .collect()
    }
}

/// `YYYY-MM-DD` to `MM-DD-YYYY`; blank when the input does not parse.
fn format_release(value: &str) -> String {
    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() == 3
        && parts[0].len() == 4
        && parts[1].len() == 2
        && parts[2].len() == 2
        && parts.iter().all(|part| part.bytes().all(|b| b.is_ascii_digit()))
    {
        format!("{}-{}-{}", parts[1], parts[2], parts[0])
    } else {
        String::new()
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < BYTES_PER_MB {
        format!("{bytes} B")
    } else if bytes < BYTES_PER_GB {
        format!("{:.2} MB", bytes as f64 / BYTES_PER_MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / BYTES_PER_GB as f64)
    }
}

fn byte_to_decimal(pair: &[u8]) -> Option<u32> {
    let high = (pair[0] as char).to_digit(16)?;
    let low = (pair[1] as char).to_digit(16)?;
    if high <= 9 && low <= 9 {
        Some(high * 10 + low)
    } else {
        Some(high * 16 + low)
    }
}

fn decode_system_ver_hex(hex_value: &str) -> Option<String> {
    let bytes = hex_value.as_bytes();
    let major = byte_to_decimal(&bytes[0..2])?;
    let minor = byte_to_decimal(&bytes[2..4])?;
    let patch = byte_to_decimal(&bytes[4..6])?;
    if patch != 0 {
        Some(format!("{major}.{minor:02}.{patch:02}"))
    } else {
        Some(format!("{major}.{minor:02}"))
    }
}

fn is_dotted_version(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    (2..=3).contains(&parts.len())
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
}

/// Decode `SYSTEM_VER` into the firmware string FPKGi expects.
///
/// Dotted values pass through; 8-hex-digit values decode pairwise, each pair
/// read as decimal when both nibbles are, hex otherwise; long decimal values
/// decode via their hex rendering.
fn normalize_min_fw(value: &str) -> String {
    let raw = value.trim();
    if raw.is_empty() {
        return String::new();
    }
    if is_dotted_version(raw) {
        return raw.to_string();
    }

    let hex_value = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if hex_value.len() == 8 && hex_value.bytes().all(|b| b.is_ascii_hexdigit()) {
        if let Some(decoded) = decode_system_ver_hex(hex_value) {
            return decoded;
        }
    }

    if raw.len() > 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(numeric) = raw.parse::<u64>() {
            let rendered = format!("{numeric:08X}");
            let tail = &rendered[rendered.len() - 8..];
            if let Some(decoded) = decode_system_ver_hex(tail) {
                return decoded;
            }
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap as FieldMap;
    use std::path::Path;

    use hbcdn_domain::{ContentId, ParamSfoSnapshot};
    use tempfile::tempdir;

    use super::*;

    fn item(content_id: &str, app_type: AppType, share: &Path) -> CatalogItem {
        CatalogItem {
            content_id: ContentId::parse(content_id).expect("content id"),
            title_id: "CUSA00001".to_string(),
            title: "My Test".to_string(),
            app_type,
            category: "GD".to_string(),
            version: "01.00".to_string(),
            pubtoolinfo: "c_date=20250101".to_string(),
            system_ver: "0x05050000".to_string(),
            release_date: "2025-01-01".to_string(),
            pkg_path: share
                .join("pkg")
                .join(app_type.dir_name())
                .join(format!("{content_id}.pkg")),
            pkg_size: 2048,
            pkg_mtime_ns: 100,
            pkg_fingerprint: "fp".to_string(),
            icon0_path: Some(share.join("pkg/_media").join(format!("{content_id}_icon0.png"))),
            pic0_path: None,
            pic1_path: None,
            sfo: ParamSfoSnapshot::new(FieldMap::new(), b"sfo".to_vec()),
            downloads: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn exports_all_fourteen_stems() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let exporter = FpkgiJsonExporter::new(
            share.join("fpkgi"),
            "http://127.0.0.1".to_string(),
            share.clone(),
        );

        let items = vec![item(
            "UP0000-TEST00000_00-TEST000000000001",
            AppType::Game,
            &share,
        )];
        let exported = exporter.export(&items)?;
        assert_eq!(exported.len(), MANAGED_STEMS.len());

        let games: Value = serde_json::from_str(&fs::read_to_string(
            share.join("fpkgi").join("GAMES.json"),
        )?)?;
        let data = games["DATA"].as_object().expect("object");
        assert_eq!(data.len(), 1);
        let entry = data
            .get("http://127.0.0.1/pkg/game/UP0000-TEST00000_00-TEST000000000001.pkg")
            .expect("entry keyed by pkg url");
        assert_eq!(entry["region"], "USA");
        assert_eq!(entry["release"], "01-01-2025");
        assert_eq!(entry["min_fw"], "5.05");
        assert_eq!(entry["size"], "2048 B");
        assert_eq!(
            entry["cover_url"],
            "http://127.0.0.1/pkg/_media/UP0000-TEST00000_00-TEST000000000001_icon0.png"
        );

        for stem in MANAGED_STEMS.iter().filter(|stem| **stem != "GAMES") {
            let value: Value = serde_json::from_str(&fs::read_to_string(
                share.join("fpkgi").join(format!("{stem}.json")),
            )?)?;
            assert_eq!(value, json!({"DATA": {}}), "stem {stem} should be empty");
        }
        Ok(())
    }

    #[test]
    fn consecutive_exports_are_byte_identical() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let exporter =
            FpkgiJsonExporter::new(share.join("fpkgi"), "http://127.0.0.1".to_string(), share.clone());
        let items = vec![item(
            "UP0000-TEST00000_00-TEST000000000001",
            AppType::Game,
            &share,
        )];

        exporter.export(&items)?;
        let first = fs::read(share.join("fpkgi").join("GAMES.json"))?;
        exporter.export(&items)?;
        let second = fs::read(share.join("fpkgi").join("GAMES.json"))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn cleanup_removes_only_managed_files() -> Result<()> {
        let dir = tempdir()?;
        let share = dir.path().join("share");
        let exporter =
            FpkgiJsonExporter::new(share.join("fpkgi"), "http://127.0.0.1".to_string(), share.clone());

        exporter.export(&[])?;
        let unrelated = share.join("fpkgi").join("notes.txt");
        fs::write(&unrelated, b"keep me")?;

        let removed = exporter.cleanup()?;
        assert_eq!(removed.len(), MANAGED_STEMS.len());
        assert!(unrelated.exists());
        for stem in MANAGED_STEMS {
            assert!(!share.join("fpkgi").join(format!("{stem}.json")).exists());
        }
        Ok(())
    }

    #[test]
    fn size_formatting_at_the_boundaries() {
        assert_eq!(format_size(BYTES_PER_MB - 1), "1048575 B");
        assert_eq!(format_size(BYTES_PER_MB), "1.00 MB");
        assert_eq!(format_size(BYTES_PER_GB - 1), "1024.00 MB");
        assert_eq!(format_size(BYTES_PER_GB), "1.00 GB");
    }

    #[test]
    fn min_fw_decoding_matches_the_contract() {
        assert_eq!(normalize_min_fw("0x05050000"), "5.05");
        assert_eq!(normalize_min_fw("0x09000000"), "9.00");
        assert_eq!(normalize_min_fw(""), "");
        assert_eq!(normalize_min_fw("5.05"), "5.05");
        assert_eq!(normalize_min_fw("05050800"), "5.05.08");
        assert_eq!(normalize_min_fw("0x0A010000"), "10.01");
        assert_eq!(normalize_min_fw("not-a-version"), "not-a-version");
    }

    #[test]
    fn release_parse_failures_are_blank() {
        assert_eq!(format_release("2025-01-01"), "01-01-2025");
        assert_eq!(format_release("20250101"), "");
        assert_eq!(format_release(""), "");
    }
}
