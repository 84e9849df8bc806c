//! Logging initialization.
//!
//! Human-readable lines go to stderr so stdout stays free for the server's
//! own output. When a log directory is given, the same events are also
//! appended to `forgeup.log` through a non-blocking writer; keep the
//! returned guard alive until exit so buffered lines are flushed.
//!
//! `RUST_LOG` overrides the default filter.

use std::path::Path;

use time::macros::format_description;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub use tracing_appender::non_blocking::WorkerGuard;

/// Log file name inside the log directory.
pub const LOG_FILE: &str = "forgeup.log";

/// Filter directive used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "forgeup=debug,forgeup_cli=debug"
    } else {
        "forgeup=info,forgeup_cli=info"
    }
}

/// Install the global subscriber.
///
/// Safe to call more than once; later calls leave the first subscriber in
/// place and return `None`.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
    };

    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = OffsetTime::new(
        offset,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    );

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false)
        .with_filter(filter());

    let (file_layer, guard) = match log_dir.and_then(open_log_dir) {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        guard
    } else {
        None
    }
}

fn open_log_dir(dir: &Path) -> Option<tracing_appender::rolling::RollingFileAppender> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("forgeup: cannot create log directory {}: {}", dir.display(), e);
        return None;
    }
    Some(tracing_appender::rolling::never(dir, LOG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(false), "forgeup=info,forgeup_cli=info");
        assert!(default_directive(true).contains("forgeup=debug"));
    }

    #[test]
    fn test_open_log_dir_creates_directory() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("logs/nested");

        assert!(open_log_dir(&dir).is_some());
        assert!(dir.is_dir());
    }
}
