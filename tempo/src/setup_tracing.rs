use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, filter::EnvFilter, fmt};

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::PanicHookInfo;

/// Env var switching the logs to human readable text at debug level.
const ENV_DEBUG: &str = "TEMPO_DEBUG";

/// Message carried by a panic payload, when it is a string.
fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

/// Routes panics to `tracing`, so a panic ends up in the same (JSON) log stream as everything else
/// instead of as raw text on stderr. The backtrace is only attached when RUST_BACKTRACE asked for it.
fn report_panic(panic_info: &PanicHookInfo<'_>) {
    let backtrace = Backtrace::capture();
    let location = panic_info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
    let message = panic_message(panic_info.payload()).unwrap_or("<non-string panic payload>");

    if backtrace.status() == BacktraceStatus::Captured {
        tracing::error!(?location, %backtrace, "Panic: {message}");
    } else {
        tracing::error!(?location, "Panic: {message}");
    }
}

/// Installs the global subscriber. RUST_LOG can be used to set the log level, the default is
/// `info`. Logs are written to stderr, stdout carries the event stream.
pub fn register() {
    let debug_mode = std::env::var(ENV_DEBUG).is_ok_and(|v| v.to_lowercase() == "true");
    let default_log_level = if debug_mode { "debug" } else { "info" };

    let filter = EnvFilter::builder()
        .with_default_directive(default_log_level.parse().unwrap_or(Level::INFO.into()))
        .from_env_lossy(); // Read RUST_LOG environment variable

    let layer = if debug_mode {
        // Text format
        fmt::layer().with_writer(std::io::stderr).boxed()
    } else {
        // JSON format, flattened
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .flatten_event(true)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .init();

    std::panic::set_hook(Box::new(report_panic));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let literal: Box<dyn Any + Send> = Box::new("index out of bounds");
        assert_eq!(panic_message(literal.as_ref()), Some("index out of bounds"));

        let formatted: Box<dyn Any + Send> = Box::new(format!("bad lag {}", 5));
        assert_eq!(panic_message(formatted.as_ref()), Some("bad lag 5"));

        let other: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(other.as_ref()), None);
    }
}
