//! Shared logging setup for Strata binaries.
//!
//! Two layers: stderr for operators, a daily-rolling file under the state
//! home for forensics. Filtering follows `RUST_LOG` when set.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "strata=info,strata_coordinator=info,strata_worker=info";

/// Resolve the Strata home directory.
///
/// Priority: `STRATA_HOME`, then `~/.strata`, then `./.strata`.
pub fn strata_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("STRATA_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|home| home.join(".strata"))
        .unwrap_or_else(|| PathBuf::from(".").join(".strata"))
}

/// Initialize tracing for a binary. Returns the guard keeping the file
/// writer alive; hold it for the process lifetime.
pub fn init_logging(app_name: &str) -> Result<WorkerGuard> {
    let log_dir = strata_home().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, format!("{}.log", app_name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_respects_override() {
        std::env::set_var("STRATA_HOME", "/tmp/strata-test-home");
        assert_eq!(strata_home(), PathBuf::from("/tmp/strata-test-home"));
        std::env::remove_var("STRATA_HOME");
    }
}
