//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `PARLEY_BIND_ADDR`: Listen address. Default: `0.0.0.0:8000`
//! - `PARLEY_OUTBOUND_BUFFER`: Per-connection outbound queue length. Default: `256`
//! - `PARLEY_CALL_TIMEOUT_SECS`: Unanswered call expiry, `0` disables. Default: `60`
//! - `PARLEY_ROOM_TIMEOUT_SECS`: Lonely room expiry, `0` disables. Default: `1800`
//! - `PARLEY_SWEEP_INTERVAL_SECS`: Expiry sweep period. Default: `5`
//! - `PARLEY_REPORT_UNDELIVERABLE`: Report relays to offline users. Default: `false`
//! - `PARLEY_CORS_ORIGINS`: Comma-separated allowed origins. Default: permissive
//! - `PARLEY_LOG_FORMAT`: `pretty` or `json`. Default: `pretty`
//!
//! Command-line flags (`--bind`, `--log-json`) override the environment.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use parley_signal::RouterOptions;
use thiserror::Error;
use tracing::info;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: &str, reason: impl ToString) -> Self {
        Self::InvalidValue {
            name,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Parse a format name. Unknown names fall back to `Pretty`.
    pub fn from_name(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP/WebSocket listen address
    pub bind_addr: SocketAddr,
    /// Capacity of each connection's outbound channel
    pub outbound_buffer: usize,
    /// Unanswered call expiry (`None` = never)
    pub call_timeout: Option<Duration>,
    /// Single-occupant room expiry (`None` = never)
    pub room_timeout: Option<Duration>,
    /// How often the expiry sweep runs
    pub sweep_interval: Duration,
    /// Answer relays to unconnected users with an error event
    pub report_undeliverable_relay: bool,
    /// Allowed CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            outbound_buffer: 256,
            call_timeout: Some(Duration::from_secs(60)),
            room_timeout: Some(Duration::from_secs(1800)),
            sweep_interval: Duration::from_secs(5),
            report_undeliverable_relay: false,
            cors_origins: Vec::new(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load server configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load server configuration through a variable lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = match var("PARLEY_BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid("PARLEY_BIND_ADDR", &raw, e))?,
            None => defaults.bind_addr,
        };

        let outbound_buffer = match var("PARLEY_OUTBOUND_BUFFER") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(0) => {
                    return Err(ConfigError::invalid(
                        "PARLEY_OUTBOUND_BUFFER",
                        &raw,
                        "must be at least 1",
                    ))
                }
                Ok(n) => n,
                Err(e) => return Err(ConfigError::invalid("PARLEY_OUTBOUND_BUFFER", &raw, e)),
            },
            None => defaults.outbound_buffer,
        };

        let call_timeout = match var("PARLEY_CALL_TIMEOUT_SECS") {
            Some(raw) => parse_timeout("PARLEY_CALL_TIMEOUT_SECS", &raw)?,
            None => defaults.call_timeout,
        };

        let room_timeout = match var("PARLEY_ROOM_TIMEOUT_SECS") {
            Some(raw) => parse_timeout("PARLEY_ROOM_TIMEOUT_SECS", &raw)?,
            None => defaults.room_timeout,
        };

        let sweep_interval = match var("PARLEY_SWEEP_INTERVAL_SECS") {
            Some(raw) => match parse_timeout("PARLEY_SWEEP_INTERVAL_SECS", &raw)? {
                Some(interval) => interval,
                None => {
                    return Err(ConfigError::invalid(
                        "PARLEY_SWEEP_INTERVAL_SECS",
                        &raw,
                        "must be at least 1",
                    ))
                }
            },
            None => defaults.sweep_interval,
        };

        let report_undeliverable_relay = var("PARLEY_REPORT_UNDELIVERABLE")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(defaults.report_undeliverable_relay);

        let cors_origins = var("PARLEY_CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_format = var("PARLEY_LOG_FORMAT")
            .map(|v| LogFormat::from_name(&v))
            .unwrap_or(defaults.log_format);

        Ok(Self {
            bind_addr,
            outbound_buffer,
            call_timeout,
            room_timeout,
            sweep_interval,
            report_undeliverable_relay,
            cors_origins,
            log_format,
        })
    }

    /// Options for the session router.
    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            report_undeliverable_relay: self.report_undeliverable_relay,
            call_timeout: self.call_timeout,
            room_timeout: self.room_timeout,
        }
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Bind address: {}", self.bind_addr);
        info!("Outbound buffer per connection: {}", self.outbound_buffer);
        match self.call_timeout {
            Some(t) => info!("Call timeout: {}s", t.as_secs()),
            None => info!("Call timeout: disabled"),
        }
        match self.room_timeout {
            Some(t) => info!("Room timeout: {}s", t.as_secs()),
            None => info!("Room timeout: disabled"),
        }
        info!("Sweep interval: {}s", self.sweep_interval.as_secs());
        info!(
            "Undeliverable relays: {}",
            if self.report_undeliverable_relay {
                "reported"
            } else {
                "dropped"
            }
        );
        if self.cors_origins.is_empty() {
            info!("CORS: permissive");
        } else {
            info!("CORS origins: {}", self.cors_origins.join(", "));
        }
        info!("Log format: {}", self.log_format);
    }

    /// Create a test configuration with short timeouts.
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            outbound_buffer: 16,
            call_timeout: Some(Duration::from_secs(5)),
            room_timeout: Some(Duration::from_secs(5)),
            sweep_interval: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

/// Parse a whole number of seconds; `0` means disabled.
fn parse_timeout(name: &'static str, raw: &str) -> Result<Option<Duration>, ConfigError> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ConfigError::invalid(name, raw, e))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
