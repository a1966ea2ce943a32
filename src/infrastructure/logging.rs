//! Logging system configuration and initialization
//!
//! - Console output goes to stderr so stdout stays free for result lines
//! - Optional non-blocking file output, one file per run, rotated on startup
//! - Timestamps in a configurable fixed offset (default UTC-3, Brasília)
//! - Noisy HTTP/HTML dependencies are held at `warn` unless TRACE is requested

#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Active log file name; earlier runs are renamed with a timestamp suffix
pub const LOG_FILE_NAME: &str = "parcel-consult.log";

// Keeps the non-blocking writers alive for the whole process
static LOG_GUARDS: Lazy<Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>>> =
    Lazy::new(|| Mutex::new(Vec::new()));

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Formats timestamps in a fixed UTC offset
#[derive(Debug, Clone, Copy)]
struct OffsetTimeFormatter {
    offset: FixedOffset,
}

impl OffsetTimeFormatter {
    fn from_hours(hours: i32) -> Self {
        Self {
            offset: fixed_offset(hours),
        }
    }
}

impl FormatTime for OffsetTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Utc::now().with_timezone(&self.offset);
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S%.3f %:z"))
    }
}

fn fixed_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours.saturating_mul(3600)).unwrap_or_else(|| Utc.fix())
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

fn resolve_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(get_log_directory)
}

/// Rename the previous run's log file with its modification time
fn rotate_existing_log_file(log_dir: &Path, utc_offset_hours: i32) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path)
        .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());

    let datetime: chrono::DateTime<Utc> = file_time.into();
    let local = datetime.with_timezone(&fixed_offset(utc_offset_hours));
    let file_stem = LOG_FILE_NAME.trim_end_matches(".log");
    let mut rotated = log_dir.join(format!("{}.{}.log", file_stem, local.format("%Y%m%dT%H%M%S")));
    let mut suffix = 1;
    while rotated.exists() {
        rotated = log_dir.join(format!("{}.{}-{}.log", file_stem, local.format("%Y%m%dT%H%M%S"), suffix));
        suffix += 1;
    }

    std::fs::rename(&log_file_path, &rotated).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            rotated.display(),
            e
        )
    })?;

    Ok(Some(rotated))
}

/// Keep only the newest `max_files` log files; returns how many were removed
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.ends_with(".log"));
        if !path.is_file() || !is_log {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            log_files.push((path, modified));
        }
    }

    // 최신 파일 먼저
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let keep = max_files as usize;
    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to remove old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}

/// Build the level filter. `RUST_LOG` wins when it is set.
fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in ["reqwest=warn", "hyper=warn", "hyper_util=warn", "rustls=warn", "html5ever=warn", "selectors=warn"] {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    for (module, level) in &config.module_filters {
        filter = filter.add_directive(
            format!("{}={}", module, level)
                .parse()
                .with_context(|| format!("Invalid module filter: {}={}", module, level))?,
        );
    }

    Ok(filter)
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// RUST_LOG="debug,reqwest=debug" parcel-consult consult --input codes.txt
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let timer = OffsetTimeFormatter::from_hours(config.utc_offset_hours);
    let log_dir = resolve_log_directory(config);
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut rotated = None;
    let mut removed = 0;

    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        rotated = rotate_existing_log_file(&log_dir, config.utc_offset_hours)?;
        removed = cleanup_old_logs(&log_dir, config.max_files)?;

        let (file_writer, file_guard) = non_blocking(rolling::never(&log_dir, LOG_FILE_NAME));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry is poisoned"))?
            .push(file_guard);

        if config.json_format {
            layers.push(
                fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(timer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .boxed(),
            );
        } else {
            layers.push(
                fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(timer)
                    .with_target(false)
                    .with_ansi(false)
                    .boxed(),
            );
        }
    }

    if config.console_output {
        layers.push(
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(timer)
                .with_target(false)
                .boxed(),
        );
    }

    Registry::default()
        .with(layers)
        .with(build_env_filter(config)?)
        .try_init()
        .map_err(|e| anyhow!("Failed to install global subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
        if let Some(path) = rotated {
            info!("Rotated previous log file to: {:?}", path);
        }
        if removed > 0 {
            info!("Removed {} old log files (keeping {})", removed, config.max_files);
        }
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== parcel-consult ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
}
