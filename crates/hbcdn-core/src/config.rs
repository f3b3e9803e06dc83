use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::paths::RuntimePaths;
use crate::scheduler;

/// Published output surfaces; order in the config is the export order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutputTarget {
    HbStore,
    Fpkgi,
}

impl OutputTarget {
    pub const ALL: [OutputTarget; 2] = [OutputTarget::HbStore, OutputTarget::Fpkgi];

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hb-store" => Ok(OutputTarget::HbStore),
            "fpkgi" => Ok(OutputTarget::Fpkgi),
            other => bail!("unknown output target {other:?} (expected hb-store or fpkgi)"),
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputTarget::HbStore => "hb-store",
            OutputTarget::Fpkgi => "fpkgi",
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Values the operator controls, resolved once at startup.
#[derive(Clone, Debug)]
pub struct UserSettings {
    pub server_ip: String,
    pub server_port: u16,
    pub enable_tls: bool,
    pub api_host: String,
    pub api_port: u16,
    pub log_level: String,
    pub watcher_periodic_scan_seconds: u64,
    pub watcher_cron_expression: String,
    pub watcher_pkg_preprocess_workers: usize,
    pub pkgtool_timeout_seconds: u64,
    pub output_targets: Vec<OutputTarget>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            server_ip: "127.0.0.1".to_string(),
            server_port: 80,
            enable_tls: false,
            api_host: "127.0.0.1".to_string(),
            api_port: 18191,
            log_level: "info".to_string(),
            watcher_periodic_scan_seconds: 30,
            watcher_cron_expression: String::new(),
            watcher_pkg_preprocess_workers: 1,
            pkgtool_timeout_seconds: 300,
            output_targets: vec![OutputTarget::HbStore, OutputTarget::Fpkgi],
        }
    }
}

/// Optional settings file contents; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    server_ip: Option<String>,
    server_port: Option<u16>,
    enable_tls: Option<bool>,
    api_host: Option<String>,
    api_port: Option<u16>,
    log_level: Option<String>,
    watcher_periodic_scan_seconds: Option<u64>,
    watcher_cron_expression: Option<String>,
    watcher_pkg_preprocess_workers: Option<usize>,
    pkgtool_timeout_seconds: Option<u64>,
    output_targets: Option<Vec<String>>,
}

/// Immutable bootstrap configuration: user settings plus the path layout.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub user: UserSettings,
    pub paths: RuntimePaths,
    pub init_dir: PathBuf,
    pub pkgtool_path: PathBuf,
}

impl AppConfig {
    /// Resolves configuration from the process environment and the optional
    /// settings file (environment wins).
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let data_dir = absolute(Path::new(snapshot.var("HBCDN_DATA_DIR").unwrap_or("./data")))?;
        let init_dir = absolute(Path::new(snapshot.var("HBCDN_INIT_DIR").unwrap_or("./init")))?;
        let paths = RuntimePaths::under(&data_dir);

        let settings_file = snapshot
            .var("HBCDN_SETTINGS_FILE")
            .map_or_else(|| paths.settings_path.clone(), PathBuf::from);
        let file = load_file_settings(&settings_file)?;
        let user = resolve_user_settings(&file, snapshot)?;

        let pkgtool_path = PathBuf::from(snapshot.var("PKGTOOL_PATH").unwrap_or("pkgtool"));

        Ok(Self {
            user,
            paths,
            init_dir,
            pkgtool_path,
        })
    }

    /// Public base every exported URL is joined against.
    #[must_use]
    pub fn base_url(&self) -> String {
        let (scheme, default_port) = if self.user.enable_tls {
            ("https", 443)
        } else {
            ("http", 80)
        };
        if self.user.server_port == default_port {
            format!("{scheme}://{}", self.user.server_ip)
        } else {
            format!("{scheme}://{}:{}", self.user.server_ip, self.user.server_port)
        }
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = env::current_dir().context("failed to resolve the current directory")?;
    Ok(cwd.join(path))
}

fn load_file_settings(path: &Path) -> Result<FileSettings> {
    if !path.exists() {
        return Ok(FileSettings::default());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file {}", path.display()))?;
    toml_edit::de::from_str(&raw)
        .with_context(|| format!("malformed settings file {}", path.display()))
}

fn resolve_user_settings(file: &FileSettings, env: &EnvSnapshot) -> Result<UserSettings> {
    let defaults = UserSettings::default();

    let server_ip = env
        .var("SERVER_IP")
        .map(str::to_string)
        .or_else(|| file.server_ip.clone())
        .unwrap_or(defaults.server_ip);

    let server_port = match env.var("SERVER_PORT") {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("SERVER_PORT must be a port number, got {raw:?}"))?,
        None => file.server_port.unwrap_or(defaults.server_port),
    };
    if server_port == 0 {
        bail!("SERVER_PORT must be between 1 and 65535");
    }

    let enable_tls = match env.var("ENABLE_TLS") {
        Some(raw) => parse_bool(raw),
        None => file.enable_tls.unwrap_or(defaults.enable_tls),
    };

    let api_host = env
        .var("HBCDN_API_HOST")
        .map(str::to_string)
        .or_else(|| file.api_host.clone())
        .unwrap_or(defaults.api_host);

    let api_port = match env.var("HBCDN_API_PORT") {
        Some(raw) => raw
            .trim()
            .parse::<u16>()
            .with_context(|| format!("HBCDN_API_PORT must be a port number, got {raw:?}"))?,
        None => file.api_port.unwrap_or(defaults.api_port),
    };

    let log_level = normalize_log_level(
        env.var("LOG_LEVEL")
            .map(str::to_string)
            .or_else(|| file.log_level.clone())
            .unwrap_or(defaults.log_level)
            .as_str(),
    )?;

    let watcher_periodic_scan_seconds = positive_u64(
        "WATCHER_PERIODIC_SCAN_SECONDS",
        env.var("WATCHER_PERIODIC_SCAN_SECONDS"),
        file.watcher_periodic_scan_seconds,
        defaults.watcher_periodic_scan_seconds,
    )?;

    let watcher_cron_expression = env
        .var("WATCHER_CRON_EXPRESSION")
        .map(str::to_string)
        .or_else(|| file.watcher_cron_expression.clone())
        .unwrap_or_default()
        .trim()
        .to_string();
    if !watcher_cron_expression.is_empty() {
        scheduler::parse_cron(&watcher_cron_expression)
            .context("WATCHER_CRON_EXPRESSION is not a valid 5-field cron expression")?;
    }

    let watcher_pkg_preprocess_workers = usize::try_from(positive_u64(
        "WATCHER_PKG_PREPROCESS_WORKERS",
        env.var("WATCHER_PKG_PREPROCESS_WORKERS"),
        file.watcher_pkg_preprocess_workers.map(|v| v as u64),
        defaults.watcher_pkg_preprocess_workers as u64,
    )?)
    .context("WATCHER_PKG_PREPROCESS_WORKERS is out of range")?;

    let pkgtool_timeout_seconds = positive_u64(
        "PKGTOOL_TIMEOUT_SECONDS",
        env.var("PKGTOOL_TIMEOUT_SECONDS"),
        file.pkgtool_timeout_seconds,
        defaults.pkgtool_timeout_seconds,
    )?;

    let output_targets = match env.var("OUTPUT_TARGETS") {
        Some(raw) => parse_targets(raw.split(','))?,
        None => match &file.output_targets {
            Some(values) => parse_targets(values.iter().map(String::as_str))?,
            None => defaults.output_targets,
        },
    };

    Ok(UserSettings {
        server_ip,
        server_port,
        enable_tls,
        api_host,
        api_port,
        log_level,
        watcher_periodic_scan_seconds,
        watcher_cron_expression,
        watcher_pkg_preprocess_workers,
        pkgtool_timeout_seconds,
        output_targets,
    })
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn normalize_log_level(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "debug" | "info" | "warning" | "error" => Ok(normalized),
        "warn" => Ok("warning".to_string()),
        other => bail!("LOG_LEVEL must be one of debug, info, warning, error; got {other:?}"),
    }
}

fn positive_u64(name: &str, env_value: Option<&str>, file_value: Option<u64>, default: u64) -> Result<u64> {
    let value = match env_value {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be an integer, got {raw:?}"))?,
        None => file_value.unwrap_or(default),
    };
    if value == 0 {
        bail!("{name} must be at least 1");
    }
    Ok(value)
}

fn parse_targets<'a>(values: impl Iterator<Item = &'a str>) -> Result<Vec<OutputTarget>> {
    let mut targets = Vec::new();
    for raw in values {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let target = OutputTarget::parse(raw)?;
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
    Ok(targets)
}
