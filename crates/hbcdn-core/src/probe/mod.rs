//! PKG metadata extraction port.
//!
//! The reconciliation core only depends on the [`PackageProbe`] trait; the
//! production implementation shells out to the external `pkgtool` binary and
//! parses its textual output.

use std::collections::BTreeMap;
use std::path::Path;

use hbcdn_domain::{ProbeError, ProbeResult};

mod pkgtool;

pub use pkgtool::PkgtoolProbe;

pub trait PackageProbe: Send + Sync {
    fn probe(&self, pkg_path: &Path) -> Result<ProbeResult, ProbeError>;
}

/// One row of `pkg_listentries` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct PkgEntry {
    pub index: String,
    pub name: String,
}

impl PkgEntry {
    /// Entry names drift between `PARAM.SFO` and `PARAM_SFO` across tool
    /// versions; compare on the underscore form.
    pub(crate) fn normalized_name(&self) -> String {
        self.name.to_ascii_lowercase().replace('.', "_")
    }
}

/// Parse the entry table: the header line and short rows are skipped; column
/// 4 is the entry index and the name follows an optional numeric id column.
pub(crate) fn parse_entry_table(output: &str) -> Vec<PkgEntry> {
    let mut entries = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("Offset") {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        let name = if parts.len() >= 6 && parts[4].bytes().all(|b| b.is_ascii_digit()) {
            parts[5]
        } else {
            parts[4]
        };
        entries.push(PkgEntry {
            index: parts[3].to_string(),
            name: name.to_string(),
        });
    }
    entries
}

/// Parse `sfo_listentries` output: `NAME : TYPE = VALUE` per line.
pub(crate) fn parse_sfo_listing(output: &str) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    for line in output.lines() {
        if !line.contains(" : ") {
            continue;
        }
        let Some((left, value)) = line.split_once(" = ") else {
            continue;
        };
        let name = left.split(" : ").next().unwrap_or_default().trim();
        if name.is_empty() {
            continue;
        }
        fields.insert(name.to_string(), value.trim().to_string());
    }
    fields
}

/// `c_date=YYYYMMDD` inside PUBTOOLINFO, reshaped to `YYYY-MM-DD`.
pub(crate) fn release_date_from_pubtoolinfo(pubtoolinfo: &str) -> String {
    for part in pubtoolinfo.split(',') {
        if let Some(raw) = part.trim().strip_prefix("c_date=") {
            let raw = raw.trim();
            if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
                return format!("{}-{}-{}", &raw[0..4], &raw[4..6], &raw[6..8]);
            }
            return String::new();
        }
    }
    String::new()
}
