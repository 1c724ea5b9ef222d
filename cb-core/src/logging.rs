//! Structured logging with `tracing`.
//!
//! Console output goes to stderr so `--format json` stays parseable on
//! stdout. The log file rotates daily and can be written as JSON lines for
//! shipping to a collector.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::CbResult;

pub const LOG_FILE_PREFIX: &str = "cleanbiz.log";

/// HTTP and pool internals stay at warn unless asked for explicitly.
const QUIET_TARGETS: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls", "r2d2"];

/// `RUST_LOG` when set, otherwise `level` with the noisy dependencies quieted.
pub fn build_filter(level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = level.trim().parse::<LevelFilter>().unwrap_or(LevelFilter::INFO);
    let mut directives = vec![level.to_string().to_lowercase()];
    directives.extend(QUIET_TARGETS.iter().map(|t| format!("{t}=warn")));
    EnvFilter::try_new(directives.join(",")).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: compact console output plus a daily
/// rotating file under `log_dir`.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes the file writer.
pub fn init_logging(level: &str, log_dir: &Path, json_output: bool) -> CbResult<LogGuard> {
    std::fs::create_dir_all(log_dir)?;

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, LOG_FILE_PREFIX));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    let file = if json_output {
        fmt::layer()
            .with_writer(writer)
            .json()
            .with_current_span(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| crate::error::CbError::Internal(format!("logging already initialized: {e}")))?;

    tracing::info!(level, dir = %log_dir.display(), json = json_output, "logging initialized");
    Ok(LogGuard { _guard: guard })
}

/// Keeps the non-blocking file writer alive.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Console-only logging for tests. Safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::registry()
        .with(build_filter("debug"))
        .with(fmt::layer().with_test_writer().compact())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_accepts_plain_levels() {
        let filter = build_filter("debug").to_string().to_lowercase();
        if std::env::var("RUST_LOG").is_err() {
            assert!(filter.contains("debug"));
            assert!(filter.contains("reqwest=warn"));
        }
    }

    #[test]
    fn test_bad_level_falls_back_to_info() {
        if std::env::var("RUST_LOG").is_err() {
            assert!(build_filter("loud").to_string().to_lowercase().contains("info"));
        }
    }

    #[test]
    fn test_test_logging_is_idempotent() {
        init_test_logging();
        init_test_logging();
    }
}
