//! Tracing initialisation for hosts that embed the scheduler.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! (the global subscriber can only be set once per process).

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directives specific to the scheduler; takes precedence over `RUST_LOG`.
pub const ENV_LOG: &str = "HYDRATION_LOG";
/// Set to `json` for newline-delimited JSON output.
pub const ENV_LOG_FORMAT: &str = "HYDRATION_LOG_FORMAT";

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON log lines.
/// * `level`: verbosity when neither `HYDRATION_LOG` nor `RUST_LOG` is set.
pub fn init_tracing(json: bool, level: Level) {
    let filter = env_filter(level);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Like [`init_tracing`], choosing the format from `HYDRATION_LOG_FORMAT`.
pub fn init_tracing_from_env(level: Level) {
    init_tracing(json_requested(std::env::var(ENV_LOG_FORMAT).ok().as_deref()), level);
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn json_requested(format: Option<&str>) -> bool {
    matches!(format, Some(value) if value.trim().eq_ignore_ascii_case("json"))
}
