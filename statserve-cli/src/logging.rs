use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Output shape for the process's tracing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// Flattened single-line JSON, suitable for log aggregation.
    Raw,
    /// Human-readable, suitable for a terminal.
    Pretty,
}

/// Picks [`LogMode::Pretty`] when stdout is a terminal, [`LogMode::Raw`]
/// otherwise (e.g. under a process supervisor or in CI).
pub fn default_log_mode() -> LogMode {
    if std::io::stdout().is_terminal() {
        LogMode::Pretty
    } else {
        LogMode::Raw
    }
}

/// Initializes the global `tracing` subscriber.
///
/// When `STATSERVE_LOG_DIR` is set, events are additionally written to
/// a daily-rolling file in that directory via a non-blocking appender;
/// the returned guard must be kept alive for the life of the process
/// or buffered events are dropped on exit.
pub fn init_logging(mode: LogMode) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(dir) = std::env::var("STATSERVE_LOG_DIR") {
        let file_appender = tracing_appender::rolling::daily(dir, "statserve.log");
        let (writer, guard) = tracing_appender::non_blocking(file_appender);
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_writer(writer);
        subscriber.init();
        return Some(guard);
    }

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match mode {
        LogMode::Raw => subscriber.json().flatten_event(true).init(),
        LogMode::Pretty => subscriber.pretty().init(),
    }
    None
}
