//! Contract between the reconciliation core and the external PKG prober.

use std::path::PathBuf;

use crate::app_type::AppType;
use crate::content_id::ContentId;
use crate::sfo::ParamSfoSnapshot;

/// Structured metadata extracted from one PKG.
#[derive(Clone, Debug)]
pub struct ProbeResult {
    pub content_id: ContentId,
    pub title_id: String,
    pub title: String,
    pub category: String,
    pub version: String,
    pub pubtoolinfo: String,
    pub system_ver: String,
    pub app_type: AppType,
    pub release_date: String,
    pub sfo: ParamSfoSnapshot,
    pub icon0_path: Option<PathBuf>,
    pub pic0_path: Option<PathBuf>,
    pub pic1_path: Option<PathBuf>,
}

/// Probe failure modes the pipeline distinguishes; each maps onto a
/// quarantine reason.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("probe tool failed: {0}")]
    Failed(String),
    #[error("PKG carries no PARAM.SFO entry")]
    SfoMissing,
    #[error("PARAM.SFO metadata invalid: {0}")]
    InvalidMetadata(String),
    #[error("probe exceeded the {0}s deadline")]
    Timeout(u64),
}

impl ProbeError {
    #[must_use]
    pub fn quarantine_reason(&self) -> &'static str {
        match self {
            ProbeError::Failed(_) => "probe_failed",
            ProbeError::SfoMissing => "sfo_missing",
            ProbeError::InvalidMetadata(_) => "invalid_metadata",
            ProbeError::Timeout(_) => "timeout",
        }
    }
}
