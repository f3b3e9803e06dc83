//! `pkgtool` subprocess gateway.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use hbcdn_domain::text::normalize_text;
use hbcdn_domain::{AppType, ContentId, ParamSfoSnapshot, ProbeError, ProbeResult};

use super::{parse_entry_table, parse_sfo_listing, release_date_from_pubtoolinfo, PackageProbe};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_VERSION: &str = "01.00";

/// Media entries extracted beside the PKG tree, keyed by `content_id`.
const MEDIA_ENTRIES: [(&str, &str); 3] = [
    ("icon0_png", "icon0"),
    ("pic0_png", "pic0"),
    ("pic1_png", "pic1"),
];

pub struct PkgtoolProbe {
    tool_path: PathBuf,
    timeout: Duration,
    media_dir: PathBuf,
}

impl PkgtoolProbe {
    #[must_use]
    pub fn new(tool_path: PathBuf, timeout: Duration, media_dir: PathBuf) -> Self {
        Self {
            tool_path,
            timeout,
            media_dir,
        }
    }

    /// Run one tool invocation under the probe deadline, capturing stdout.
    fn run_tool(&self, args: &[&OsStr], deadline: Instant) -> Result<String, ProbeError> {
        if Instant::now() >= deadline {
            return Err(ProbeError::Timeout(self.timeout.as_secs()));
        }

        let mut child = Command::new(&self.tool_path)
            .args(args)
            .env("DOTNET_SYSTEM_GLOBALIZATION_INVARIANT", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                ProbeError::Failed(format!(
                    "failed to start {}: {err}",
                    self.tool_path.display()
                ))
            })?;

        let mut stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| ProbeError::Failed("stdout pipe missing".to_string()))?;
        let mut stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| ProbeError::Failed("stderr pipe missing".to_string()))?;
        let stdout_reader = thread::spawn(move || {
            let mut buffer = String::new();
            let _ = stdout_pipe.read_to_string(&mut buffer);
            buffer
        });
        let stderr_reader = thread::spawn(move || {
            let mut buffer = String::new();
            let _ = stderr_pipe.read_to_string(&mut buffer);
            buffer
        });

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ProbeError::Timeout(self.timeout.as_secs()));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(err) => {
                    let _ = child.kill();
                    return Err(ProbeError::Failed(format!("failed to wait for tool: {err}")));
                }
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();
        if !status.success() {
            let detail = if stderr.trim().is_empty() {
                stdout
            } else {
                stderr
            };
            return Err(ProbeError::Failed(format!(
                "{} exited with {status}: {}",
                self.tool_path.display(),
                truncate(detail.trim(), 400)
            )));
        }
        Ok(stdout)
    }

    /// Extract one media entry into `_media/<content_id>_<tag>.png`.
    fn extract_media(
        &self,
        pkg_path: &Path,
        index: &str,
        content_id: &ContentId,
        tag: &str,
        deadline: Instant,
    ) -> Option<PathBuf> {
        let target = self.media_dir.join(format!("{content_id}_{tag}.png"));
        let tmp = target.with_extension("png.tmp");
        if let Err(err) = fs::create_dir_all(&self.media_dir) {
            warn!("failed to create {}: {err}", self.media_dir.display());
            return None;
        }

        let args: Vec<OsString> = vec![
            OsString::from("pkg_extractentry"),
            pkg_path.as_os_str().to_owned(),
            OsString::from(index),
            tmp.clone().into(),
        ];
        let args: Vec<&OsStr> = args.iter().map(OsString::as_os_str).collect();
        match self.run_tool(&args, deadline) {
            Ok(_) => match fs::rename(&tmp, &target) {
                Ok(()) => Some(target),
                Err(err) => {
                    warn!("failed to place {}: {err}", target.display());
                    let _ = fs::remove_file(&tmp);
                    None
                }
            },
            Err(err) => {
                debug!("skipping {tag} for {}: {err}", pkg_path.display());
                let _ = fs::remove_file(&tmp);
                None
            }
        }
    }
}

impl PackageProbe for PkgtoolProbe {
    fn probe(&self, pkg_path: &Path) -> Result<ProbeResult, ProbeError> {
        let deadline = Instant::now() + self.timeout;

        let listing = self.run_tool(
            &[OsStr::new("pkg_listentries"), pkg_path.as_os_str()],
            deadline,
        )?;
        let entries = parse_entry_table(&listing);

        let sfo_entry = entries
            .iter()
            .find(|entry| entry.normalized_name().contains("param_sfo"))
            .ok_or(ProbeError::SfoMissing)?;

        let scratch = tempfile::tempdir()
            .map_err(|err| ProbeError::Failed(format!("failed to create scratch dir: {err}")))?;
        let sfo_path = scratch.path().join("PARAM.SFO");
        self.run_tool(
            &[
                OsStr::new("pkg_extractentry"),
                pkg_path.as_os_str(),
                OsStr::new(&sfo_entry.index),
                sfo_path.as_os_str(),
            ],
            deadline,
        )?;
        let raw = fs::read(&sfo_path)
            .map_err(|err| ProbeError::Failed(format!("failed to read extracted SFO: {err}")))?;

        let sfo_listing = self.run_tool(
            &[OsStr::new("sfo_listentries"), sfo_path.as_os_str()],
            deadline,
        )?;
        let fields = parse_sfo_listing(&sfo_listing);

        let content_id = fields
            .get("CONTENT_ID")
            .ok_or_else(|| ProbeError::InvalidMetadata("CONTENT_ID is missing".to_string()))
            .and_then(|raw| {
                ContentId::parse(raw)
                    .map_err(|err| ProbeError::InvalidMetadata(err.to_string()))
            })?;
        let category = fields
            .get("CATEGORY")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| ProbeError::InvalidMetadata("CATEGORY is missing".to_string()))?;
        let app_type = AppType::from_category(&category);

        let title = normalize_text(fields.get("TITLE").map_or("", String::as_str));
        let title_id = fields
            .get("TITLE_ID")
            .map_or(String::new(), |raw| raw.trim().to_string());
        let version = match fields.get("VERSION").map(|raw| raw.trim()) {
            Some(raw) if !raw.is_empty() => raw.to_string(),
            _ => DEFAULT_VERSION.to_string(),
        };
        let system_ver = fields
            .get("SYSTEM_VER")
            .map_or(String::new(), |raw| raw.trim().to_string());
        let pubtoolinfo = fields
            .get("PUBTOOLINFO")
            .map_or(String::new(), |raw| raw.trim().to_string());
        let release_date = release_date_from_pubtoolinfo(&pubtoolinfo);

        let mut media: [Option<PathBuf>; 3] = [None, None, None];
        for (slot, (entry_name, tag)) in MEDIA_ENTRIES.iter().enumerate() {
            let Some(entry) = entries
                .iter()
                .find(|entry| entry.normalized_name() == *entry_name)
            else {
                continue;
            };
            media[slot] = self.extract_media(pkg_path, &entry.index, &content_id, tag, deadline);
        }
        let [icon0_path, pic0_path, pic1_path] = media;

        Ok(ProbeResult {
            content_id,
            title_id,
            title,
            category,
            version,
            pubtoolinfo,
            system_ver,
            app_type,
            release_date,
            sfo: ParamSfoSnapshot::new(fields, raw),
            icon0_path,
            pic0_path,
            pic1_path,
        })
    }
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
