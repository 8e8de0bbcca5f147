//! Logging setup for Parley Server.
//!
//! `RUST_LOG` controls the filter (default:
//! `info,parley_server=debug,parley_signal=debug`). Output is pretty-printed
//! for local use or one JSON object per line for log collectors.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogFormat;

const DEFAULT_FILTER: &str = "info,parley_server=debug,parley_signal=debug";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    match format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(false);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .pretty();

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt_layer)
                .try_init()?;
        }
    }

    tracing::info!(format = %format, "Telemetry initialized");
    Ok(())
}
