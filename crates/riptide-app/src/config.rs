//! Environment-driven configuration for the daemon.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use riptide_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};

use crate::error::{AppError, AppResult};
use crate::registry::RegistrySettings;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7070";
const DEFAULT_DATABASE_URL: &str = "sqlite://riptide.db?mode=rwc";
const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;
const DEFAULT_FLUSH_EVERY: u32 = 5;
const DEFAULT_SIMULATED_RATE: u64 = 1024 * 1024;

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Socket the HTTP surface binds to.
    pub bind_addr: SocketAddr,
    /// sqlx connection string for the session store.
    pub database_url: String,
    /// Directory sessions download into when the caller names none.
    pub download_root: PathBuf,
    /// Token accepted on the push channel.
    pub api_token: String,
    /// Period between progress samples.
    pub sample_interval: Duration,
    /// Persist counters on every Nth sample.
    pub flush_every: u32,
    /// Log output format.
    pub log_format: LogFormat,
    /// Default log level when `RUST_LOG` is unset.
    pub log_level: String,
    /// Bytes per second the built-in engine downloads.
    pub simulated_rate: u64,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value fails to parse.
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is missing or a value fails to parse.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let bind_raw = read("RIPTIDE_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| AppError::invalid("bind_addr", "unparseable", &bind_raw))?;

        let api_token = read("RIPTIDE_API_TOKEN").ok_or(AppError::MissingEnv {
            name: "RIPTIDE_API_TOKEN",
        })?;

        let sample_interval_ms = parse_number(
            read("RIPTIDE_SAMPLE_INTERVAL_MS"),
            "sample_interval_ms",
            DEFAULT_SAMPLE_INTERVAL_MS,
        )?;
        if sample_interval_ms == 0 {
            return Err(AppError::invalid("sample_interval_ms", "zero", "0"));
        }

        let flush_every = parse_number(read("RIPTIDE_FLUSH_EVERY"), "flush_every", DEFAULT_FLUSH_EVERY)?;
        if flush_every == 0 {
            return Err(AppError::invalid("flush_every", "zero", "0"));
        }

        let log_format = read("RIPTIDE_LOG_FORMAT")
            .map_or_else(LogFormat::infer, |label| LogFormat::from_label(&label));

        Ok(Self {
            bind_addr,
            database_url: read("RIPTIDE_DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            download_root: PathBuf::from(
                read("RIPTIDE_DOWNLOAD_DIR").unwrap_or_else(|| DEFAULT_DOWNLOAD_DIR.to_string()),
            ),
            api_token,
            sample_interval: Duration::from_millis(sample_interval_ms),
            flush_every,
            log_format,
            log_level: read("RIPTIDE_LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            simulated_rate: parse_number(
                read("RIPTIDE_SIMULATED_RATE"),
                "simulated_rate",
                DEFAULT_SIMULATED_RATE,
            )?,
        })
    }

    /// Registry settings derived from this configuration.
    #[must_use]
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            download_root: self.download_root.clone(),
            sample_interval: self.sample_interval,
            flush_every: self.flush_every,
        }
    }
}

fn parse_number<T>(raw: Option<String>, field: &'static str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
{
    raw.map_or(Ok(default), |value| {
        value
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::invalid(field, "not_a_number", &value))
    })
}
