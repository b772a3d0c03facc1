//! Process-wide tracing subscriber for binaries.
//!
//! `RUST_LOG` selects the filter (default `info`). With `LOG_DIR` set, logs go to a
//! daily rolling file `<LOG_DIR>/<app>.log`; otherwise to stderr.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Installs the global subscriber. Keep the returned guard alive for the whole
/// process so buffered file output is flushed on exit.
///
/// Returns `None` when logging to stderr or when a subscriber was already set.
pub fn init_tracing(app_name: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match std::env::var_os("LOG_DIR").filter(|d| !d.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{app_name}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_filter(filter),
                )
                .try_init()
                .ok()
                .map(|_| guard)
        }
        None => {
            let _ = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(filter),
                )
                .try_init();
            None
        }
    }
}
