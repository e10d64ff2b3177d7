//! Server configuration loaded from environment variables with defaults.

use encore_core::settings::EngineSettings;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `PostgreSQL` URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Maximum pooled connections
    pub database_max_connections: u32,
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// How long in-flight requests may run after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Prometheus exporter address; no exporter when unset
    pub metrics_addr: Option<SocketAddr>,
    /// Engine tuning
    pub engine: EngineSettings,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = EngineSettings::default();

        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: var(&lookup, "DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: var(&lookup, "PORT").unwrap_or(8080),
            shutdown_timeout: Duration::from_secs(var(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(30)),
            metrics_addr: var(&lookup, "METRICS_ADDR"),
            engine: EngineSettings {
                confirmation_window: var(&lookup, "CONFIRMATION_WINDOW_SECS")
                    .map_or(defaults.confirmation_window, Duration::from_secs),
                skip_retention: var::<u64>(&lookup, "SKIP_RETENTION_MINUTES").map_or(
                    defaults.skip_retention,
                    |minutes| Duration::from_secs(minutes.saturating_mul(60)),
                ),
                max_conflict_retries: var(&lookup, "MAX_CONFLICT_RETRIES")
                    .unwrap_or(defaults.max_conflict_retries),
                change_feed_capacity: var::<usize>(&lookup, "CHANGE_FEED_CAPACITY")
                    .filter(|&capacity| capacity > 0)
                    .unwrap_or(defaults.change_feed_capacity),
                ..defaults
            },
        }
    }

    /// Address to bind the HTTP listener to.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key)?;
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value = %value, "Ignoring unparseable configuration value");
    }
    parsed
}
