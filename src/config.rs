//! Configuration loading for the `bookfetch` binary.
//!
//! Values are layered: CLI flag > environment > config file > default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use bookfetch_core::acquisition::{MAX_WORKERS, MIN_WORKERS, SchedulerConfig};
use bookfetch_core::archive::{ArchiveSettings, DEFAULT_BASE_URL};

/// Environment variable holding the archive account key.
pub const ENV_SECRET_KEY: &str = "BOOKFETCH_SECRET_KEY";
/// Environment variable overriding the download directory.
pub const ENV_DOWNLOAD_DIR: &str = "BOOKFETCH_DOWNLOAD_DIR";
/// Environment variable overriding the database path.
pub const ENV_DATABASE: &str = "BOOKFETCH_DATABASE";

const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_DATABASE_PATH: &str = "bookfetch.db";

/// Values read from `config.toml`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub download_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub archive_base_url: Option<String>,
    pub secret_key: Option<String>,
    pub batch_size: Option<usize>,
    pub workers: Option<usize>,
    pub idle_interval_secs: Option<u64>,
    pub dispatch_interval_secs: Option<u64>,
    pub failed_retention_hours: Option<u64>,
    pub stale_job_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub download_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
}

/// Fully resolved settings used to build the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub download_dir: PathBuf,
    pub database_path: PathBuf,
    pub secret_key: Option<String>,
    pub archive: ArchiveSettings,
    pub scheduler: SchedulerConfig,
}

impl RuntimeConfig {
    /// Layers CLI values, environment, and file config over defaults.
    ///
    /// `env_lookup` is consulted for the `BOOKFETCH_*` variables; pass
    /// [`process_env`] outside tests.
    pub fn resolve(
        cli: &CliOverrides,
        file: Option<&FileConfig>,
        env_lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let file = file.cloned().unwrap_or_default();

        let download_dir = cli
            .download_dir
            .clone()
            .or_else(|| env_lookup(ENV_DOWNLOAD_DIR).map(PathBuf::from))
            .or(file.download_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
        let database_path = cli
            .database_path
            .clone()
            .or_else(|| env_lookup(ENV_DATABASE).map(PathBuf::from))
            .or(file.database_path)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
        let secret_key = env_lookup(ENV_SECRET_KEY).or(file.secret_key);

        let mut archive = ArchiveSettings::with_base_url(
            file.archive_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        );
        if let Some(secs) = file.request_timeout_secs {
            archive.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.download_timeout_secs {
            archive.download_timeout = Duration::from_secs(secs);
        }

        let mut scheduler = SchedulerConfig::default();
        if let Some(n) = file.batch_size {
            scheduler.batch_size = n;
        }
        if let Some(n) = file.workers {
            scheduler.workers = n;
        }
        if let Some(secs) = file.idle_interval_secs {
            scheduler.idle_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.dispatch_interval_secs {
            scheduler.dispatch_interval = Duration::from_secs(secs);
        }
        if let Some(hours) = file.failed_retention_hours {
            scheduler.failed_book_retention = Duration::from_secs(hours * 3600);
        }
        if let Some(secs) = file.stale_job_timeout_secs {
            scheduler.stale_job_timeout = Duration::from_secs(secs);
        }

        Self {
            download_dir,
            database_path,
            secret_key,
            archive,
            scheduler,
        }
    }

    /// Rejects scheduler settings and timeouts that cannot work together.
    ///
    /// A job is only treated as stalled once it has been idle longer than the
    /// slowest possible acquisition: a metadata request, a resolver request,
    /// and the file transfer.
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        let longest_job = self.archive.request_timeout * 2 + self.archive.download_timeout;
        if self.scheduler.stale_job_timeout <= longest_job {
            bail!(
                "stale_job_timeout_secs ({}) must exceed 2 * request_timeout_secs + download_timeout_secs ({})",
                self.scheduler.stale_job_timeout.as_secs(),
                longest_job.as_secs()
            );
        }
        Ok(())
    }
}

/// Reads a non-empty variable from the process environment.
#[must_use]
pub fn process_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/bookfetch/config.toml`
/// 2. `$HOME/.config/bookfetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("bookfetch")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("bookfetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is skipped when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<Option<FileConfig>> {
    if let Some(path) = explicit {
        return load_file_config(path).map(Some);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path).map(Some),
        _ => Ok(None),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "download_dir" => {
                cfg.download_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "database_path" => {
                cfg.database_path = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "archive_base_url" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                if url::Url::parse(&parsed).is_err() {
                    bail!("Invalid `archive_base_url` on line {line_no}: '{parsed}' is not a URL");
                }
                cfg.archive_base_url = Some(parsed);
            }
            "secret_key" => {
                cfg.secret_key = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "batch_size" => {
                let n = parse_in_range(value, 1, 100).with_context(invalid)?;
                cfg.batch_size = Some(to_usize(n)?);
            }
            "workers" => {
                let n = parse_in_range(value, MIN_WORKERS as u64, MAX_WORKERS as u64)
                    .with_context(invalid)?;
                cfg.workers = Some(to_usize(n)?);
            }
            "idle_interval_secs" => {
                cfg.idle_interval_secs = Some(parse_in_range(value, 1, 3600).with_context(invalid)?);
            }
            "dispatch_interval_secs" => {
                cfg.dispatch_interval_secs =
                    Some(parse_in_range(value, 0, 3600).with_context(invalid)?);
            }
            "failed_retention_hours" => {
                cfg.failed_retention_hours =
                    Some(parse_in_range(value, 1, 24 * 365).with_context(invalid)?);
            }
            "stale_job_timeout_secs" => {
                cfg.stale_job_timeout_secs =
                    Some(parse_in_range(value, 60, 86_400).with_context(invalid)?);
            }
            "request_timeout_secs" => {
                cfg.request_timeout_secs =
                    Some(parse_in_range(value, 1, 3600).with_context(invalid)?);
            }
            "download_timeout_secs" => {
                cfg.download_timeout_secs =
                    Some(parse_in_range(value, 1, 86_400).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    Ok(cfg)
}

fn to_usize(n: u64) -> Result<usize> {
    usize::try_from(n).map_err(|_| anyhow::anyhow!("Integer value out of range for usize"))
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_in_range(raw_value: &str, min: u64, max: u64) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < i128::from(min) || value > i128::from(max) {
        bail!("{value} is out of range. Expected range: {min}..={max}");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}
