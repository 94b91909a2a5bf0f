// ==========================================
// Logging setup and log-file retention
// ==========================================
// tracing + tracing-subscriber, level from RUST_LOG (default: info),
// optionally mirrored to an append-only file
// ==========================================

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::IcingError;

/// Days of log history kept by `prune_log_file` when nothing else is configured.
pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 3;

/// Initialises logging.
///
/// # Environment
/// - RUST_LOG: filter (default: info), e.g. `RUST_LOG=icemon_service=debug`
///
/// When `log_file` is given, events are also appended there without ANSI
/// colours. Each line starts with an RFC 3339 timestamp, which is what
/// `prune_log_file` keys on.
pub fn init(log_file: Option<&Path>) -> Result<(), IcingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| IcingError::ConfigLoadError(format!("log file {}: {}", path.display(), e)))?;
            Some(fmt::layer().with_ansi(false).with_target(true).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(false).with_line_number(true))
        .with(file_layer)
        .try_init()
        .map_err(|e| IcingError::ConfigLoadError(format!("logging already initialised: {}", e)))
}

/// Verbose logging for tests; safe to call repeatedly.
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Leading timestamp of a log line, if it has one.
///
/// Accepts the RFC 3339 stamp written by `init` and the older
/// `YYYY-MM-DD HH:MM:SS,mmm - ...` style.
fn line_timestamp(line: &str) -> Option<NaiveDateTime> {
    let first = line.split_whitespace().next()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(first) {
        return Some(dt.naive_utc());
    }
    let head = line.split(" - ").next()?;
    NaiveDateTime::parse_from_str(head.trim(), "%Y-%m-%d %H:%M:%S,%3f")
        .or_else(|_| NaiveDateTime::parse_from_str(head.trim(), "%Y-%m-%d %H:%M:%S"))
        .ok()
}

/// Drops lines older than `days_to_keep` days before `now`.
///
/// Lines without a recognisable leading timestamp (continuations, panics)
/// are kept. A missing file is not an error. Returns the number of lines
/// removed.
pub fn prune_log_file(path: &Path, days_to_keep: i64, now: DateTime<Utc>) -> Result<usize, IcingError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(IcingError::persistence(format!("{}: {}", path.display(), e))),
    };
    let cutoff = now.naive_utc() - Duration::days(days_to_keep);

    let mut kept = String::with_capacity(text.len());
    let mut removed = 0;
    for line in text.lines() {
        match line_timestamp(line) {
            Some(ts) if ts < cutoff => removed += 1,
            _ => {
                kept.push_str(line);
                kept.push('\n');
            }
        }
    }

    if removed > 0 {
        fs::write(path, kept).map_err(|e| IcingError::persistence(format!("{}: {}", path.display(), e)))?;
    }
    Ok(removed)
}
