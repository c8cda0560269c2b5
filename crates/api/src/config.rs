//! Process configuration read from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use atelie_infra::fulfillment::DEFAULT_CONFLICT_RETRIES;
use atelie_infra::rate_limit::RateLimitPolicy;
use atelie_observability::LogFormat;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("{name} must be set when {because}")]
    Missing {
        name: &'static str,
        because: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    Memory,
    Redis,
}

impl std::str::FromStr for RateLimitBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(RateLimitBackend::Memory),
            "redis" => Ok(RateLimitBackend::Redis),
            other => Err(format!("unknown backend '{other}' (expected memory or redis)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub rate_limit_backend: RateLimitBackend,
    pub redis_url: String,
    pub rate_limit: RateLimitPolicy,
    pub stock_conflict_retries: u32,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            use_persistent_stores: false,
            database_url: None,
            rate_limit_backend: RateLimitBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            rate_limit: RateLimitPolicy::default(),
            stock_conflict_retries: DEFAULT_CONFLICT_RETRIES,
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any variable source.
    ///
    /// Unset and empty variables fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let use_persistent_stores = parse_or(&get, "USE_PERSISTENT_STORES", defaults.use_persistent_stores)?;
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing {
                name: "DATABASE_URL",
                because: "USE_PERSISTENT_STORES=true",
            });
        }

        let max_requests = parse_or(&get, "RATE_LIMIT_REQUESTS", defaults.rate_limit.max_requests)?;
        let window_secs: u64 = parse_or(&get, "RATE_LIMIT_WINDOW_SECS", defaults.rate_limit.window.as_secs())?;
        if window_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "RATE_LIMIT_WINDOW_SECS",
                message: "window must be at least one second".to_string(),
            });
        }

        Ok(Self {
            bind_addr: parse_or(&get, "BIND_ADDR", defaults.bind_addr)?,
            use_persistent_stores,
            database_url,
            rate_limit_backend: parse_or(&get, "RATE_LIMIT_BACKEND", defaults.rate_limit_backend)?,
            redis_url: get("REDIS_URL").unwrap_or(defaults.redis_url),
            rate_limit: RateLimitPolicy::new(max_requests, Duration::from_secs(window_secs)),
            stock_conflict_retries: parse_or(&get, "STOCK_CONFLICT_RETRIES", defaults.stock_conflict_retries)?,
            log_format: parse_or(&get, "LOG_FORMAT", defaults.log_format)?,
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(config(&[]).unwrap(), AppConfig::default());
    }

    #[test]
    fn reads_every_variable() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/atelie"),
            ("RATE_LIMIT_BACKEND", "redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("RATE_LIMIT_REQUESTS", "10"),
            ("RATE_LIMIT_WINDOW_SECS", "5"),
            ("STOCK_CONFLICT_RETRIES", "7"),
            ("LOG_FORMAT", "pretty"),
        ])
        .unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:3000".parse().unwrap());
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/atelie"));
        assert_eq!(cfg.rate_limit_backend, RateLimitBackend::Redis);
        assert_eq!(cfg.redis_url, "redis://cache:6379");
        assert_eq!(cfg.rate_limit, RateLimitPolicy::new(10, Duration::from_secs(5)));
        assert_eq!(cfg.stock_conflict_retries, 7);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
    }

    #[test]
    fn persistent_stores_need_a_database_url() {
        let err = config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing { name: "DATABASE_URL", .. }));
    }

    #[test]
    fn malformed_values_name_the_variable() {
        let err = config(&[("RATE_LIMIT_REQUESTS", "lots")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RATE_LIMIT_REQUESTS", .. }));

        let err = config(&[("RATE_LIMIT_WINDOW_SECS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "RATE_LIMIT_WINDOW_SECS", .. }));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config(&[("BIND_ADDR", "  "), ("RATE_LIMIT_BACKEND", "")]).unwrap();
        assert_eq!(cfg.bind_addr, AppConfig::default().bind_addr);
        assert_eq!(cfg.rate_limit_backend, RateLimitBackend::Memory);
    }
}
