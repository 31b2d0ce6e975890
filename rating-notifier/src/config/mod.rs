//! Application configuration.
//!
//! Values are resolved in order: built-in defaults, an optional TOML file, then
//! `APP_*` environment variables (a `.env` file is loaded into the environment by
//! `main` before this runs). The result is validated once at startup.

use std::path::Path;
use std::time::Duration;

use resilience::{CircuitBreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::delivery::RetryPredicate;
use crate::logging::LogFormat;
use crate::notification::NotificationServiceConfig;
use crate::{Error, Result};

/// Minimum cleanup interval and maximum age, in seconds.
pub const MIN_CLEANUP_SECS: u64 = 60;

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
    pub enable_cors: bool,
    /// Request body size limit in bytes.
    pub body_limit: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8081,
            enable_cors: true,
            body_limit: 64 * 1024,
        }
    }
}

/// Store cleanup sweep settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupSettings {
    pub interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for CleanupSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            max_age_secs: 60 * 60,
        }
    }
}

/// Producer-side delivery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Base URL of a remote notification service. When unset, rating events are
    /// written to the local store.
    pub base_url: Option<String>,
    /// Per-request HTTP timeout.
    pub timeout_ms: u64,
    /// Upper bound for one delivery, retries included.
    pub delivery_timeout_secs: u64,
    /// How long shutdown waits for in-flight deliveries before cancelling them.
    pub shutdown_grace_secs: u64,
    pub retry_policy: RetryPredicate,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: 5_000,
            delivery_timeout_secs: 30,
            shutdown_grace_secs: 10,
            retry_policy: RetryPredicate::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl DeliverySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive; `RUST_LOG` takes precedence.
    pub filter: Option<String>,
    pub format: LogFormat,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    /// Retry policy of the notification store-write path.
    pub retry: RetryConfig,
    /// Breaker protecting the notification store.
    pub circuit_breaker: CircuitBreakerConfig,
    pub cleanup: CleanupSettings,
    pub delivery: DeliverySettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Load defaults, merge the TOML file at `path` if given, apply `APP_*`
    /// environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file; missing sections and fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    pub fn from_toml(raw: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Apply `APP_*` overrides from `lookup`.
    ///
    /// Supported keys:
    /// - `APP_SERVER_PORT`, `APP_BIND_ADDRESS`
    /// - `APP_NOTIFICATION_BASE_URL`
    /// - `APP_LOG_FILTER`, `APP_LOG_FORMAT`
    /// - `APP_CLEANUP_INTERVAL_SECS`, `APP_CLEANUP_MAX_AGE_SECS`
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("APP_SERVER_PORT") {
            self.server.port = parse_env("APP_SERVER_PORT", &port)?;
        }
        if let Some(bind_address) = get("APP_BIND_ADDRESS") {
            self.server.bind_address = bind_address.trim().to_string();
        }
        if let Some(base_url) = get("APP_NOTIFICATION_BASE_URL") {
            self.delivery.base_url = Some(base_url.trim().to_string());
        }
        if let Some(filter) = get("APP_LOG_FILTER") {
            self.logging.filter = Some(filter);
        }
        if let Some(format) = get("APP_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Some(interval) = get("APP_CLEANUP_INTERVAL_SECS") {
            self.cleanup.interval_secs = parse_env("APP_CLEANUP_INTERVAL_SECS", &interval)?;
        }
        if let Some(max_age) = get("APP_CLEANUP_MAX_AGE_SECS") {
            self.cleanup.max_age_secs = parse_env("APP_CLEANUP_MAX_AGE_SECS", &max_age)?;
        }

        debug!("Applied environment overrides");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::config("server.port: must be at least 1"));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(Error::config("server.bind_address: cannot be blank"));
        }

        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        self.delivery.retry.validate()?;
        self.delivery.circuit_breaker.validate()?;

        if self.cleanup.interval_secs < MIN_CLEANUP_SECS {
            return Err(Error::config(format!(
                "cleanup.interval_secs: must be at least {MIN_CLEANUP_SECS}"
            )));
        }
        if self.cleanup.max_age_secs < MIN_CLEANUP_SECS {
            return Err(Error::config(format!(
                "cleanup.max_age_secs: must be at least {MIN_CLEANUP_SECS}"
            )));
        }

        if let Some(base_url) = &self.delivery.base_url {
            let url = Url::parse(base_url)
                .map_err(|e| Error::config(format!("delivery.base_url: {e}")))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::config("delivery.base_url: must be an http(s) URL"));
            }
        }
        if self.delivery.timeout_ms == 0 {
            return Err(Error::config("delivery.timeout_ms: must be greater than 0"));
        }
        if self.delivery.delivery_timeout_secs == 0 {
            return Err(Error::config(
                "delivery.delivery_timeout_secs: must be greater than 0",
            ));
        }

        // Every attempt may run to its HTTP timeout; the whole loop must finish before
        // the delivery deadline cancels it.
        let budget = self
            .delivery
            .timeout()
            .checked_mul(self.delivery.retry.max_attempts)
            .and_then(|total| total.checked_add(self.delivery.retry.max_total_delay()));
        match budget {
            Some(budget) if budget <= self.delivery.delivery_timeout() => {}
            Some(budget) => {
                return Err(Error::config(format!(
                    "delivery.delivery_timeout_secs: {}s is shorter than the worst-case retry budget of {}ms",
                    self.delivery.delivery_timeout_secs,
                    budget.as_millis()
                )));
            }
            None => {
                return Err(Error::config("delivery.timeout_ms: retry budget overflows"));
            }
        }

        Ok(())
    }

    /// Runtime configuration of the notification service.
    pub fn notification_service_config(&self) -> NotificationServiceConfig {
        NotificationServiceConfig {
            retry: self.retry.clone(),
            circuit_breaker: self.circuit_breaker.clone(),
            cleanup_interval: Duration::from_secs(self.cleanup.interval_secs),
            max_age: Duration::from_secs(self.cleanup.max_age_secs),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("{key}: invalid value '{value}': {e}")))
}
