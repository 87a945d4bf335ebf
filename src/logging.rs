//! Logging and tracing setup.
//!
//! Parsers and the edit engine emit `tracing` events; binaries and tests
//! install a subscriber once through the functions here.

use std::sync::Once;
use tracing::info;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

static INIT: Once = Once::new();

/// Default directive when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Output format for the global subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per event, current span included
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber in `format`. Only the first call in a process has any effect.
pub fn init_with(format: LogFormat) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter());
        let base = fmt::layer()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        // try_init: a test harness or host binary may already own the global subscriber
        let installed = match format {
            LogFormat::Pretty => registry.with(base).try_init(),
            LogFormat::Json => registry.with(base.json().with_current_span(true)).try_init(),
        };
        if installed.is_ok() {
            info!(?format, "machoscope tracing initialized");
        }
    });
}

pub fn init_tracing() {
    init_with(LogFormat::Pretty);
}

pub fn init_tracing_json() {
    init_with(LogFormat::Json);
}

/// Info-level span, e.g. `span_trace!("apply_edit", edit_id = 3)`
#[macro_export]
macro_rules! span_trace {
    ($name:expr) => {
        tracing::info_span!($name)
    };
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}

/// Log an error at `error` level and hand it back
#[macro_export]
macro_rules! log_error {
    ($err:expr) => {{
        let e = $err;
        tracing::error!(error = %e, "Operation failed");
        e
    }};
    ($err:expr, $msg:expr) => {{
        let e = $err;
        tracing::error!(error = %e, message = $msg, "Operation failed");
        e
    }};
}
