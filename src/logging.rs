//! Tracing setup for the command-line client.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the binary or the embedding application.

use std::path::Path;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{Result, SyncError};

/// Map a `-v` count to a level name (0=warn, 1=info, 2=debug, 3+=trace).
#[must_use]
pub const fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a global text subscriber writing to stderr or, if given, to
/// `log_file` (appended).
///
/// `RUST_LOG` overrides the verbosity-derived filter.
///
/// # Errors
///
/// Returns `IoOpen` if the log file cannot be opened and `Config` if a global
/// subscriber is already installed.
pub fn init_logging(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chunksync={level}")));

    let layer = fmt::layer()
        .with_target(true)
        .with_file(verbosity >= 2)
        .with_line_number(verbosity >= 2);

    let installed = match log_file {
        None => tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .try_init(),
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| SyncError::open(path, e))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.with_writer(file).with_ansi(false))
                .try_init()
        }
    };
    installed.map_err(|e| SyncError::Config(format!("logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(level_for(0), "warn");
        assert_eq!(level_for(1), "info");
        assert_eq!(level_for(2), "debug");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn second_init_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("sync.log");
        // Another test may already own the global subscriber; either way the
        // second call must fail.
        let _ = init_logging(2, Some(&log));
        let err = init_logging(2, None).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn unopenable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = init_logging(0, Some(&dir.path().join("no/such/dir.log"))).unwrap_err();
        assert!(matches!(err, SyncError::IoOpen { .. }));
    }
}
