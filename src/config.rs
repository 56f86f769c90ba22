//! Store configuration, loaded from environment variables.

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment variable is empty: {0}")]
    EmptyValue(String),
}

#[derive(Clone)]
pub struct StoreConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Pool size.
    pub max_connections: u32,
    /// Rows buffered between the database and an order cursor.
    pub cursor_buffer: usize,
    /// Deadline applied to a single order write.
    pub put_timeout: Duration,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl StoreConfig {
    pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
    pub const DEFAULT_CURSOR_BUFFER: usize = 64;
    pub const DEFAULT_PUT_TIMEOUT: Duration = Duration::from_millis(5000);
    pub const DEFAULT_METRICS_PORT: u16 = 9090;

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: Self::DEFAULT_MAX_CONNECTIONS,
            cursor_buffer: Self::DEFAULT_CURSOR_BUFFER,
            put_timeout: Self::DEFAULT_PUT_TIMEOUT,
            metrics_port: Self::DEFAULT_METRICS_PORT,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `DATABASE_URL` is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?;
        if database_url.trim().is_empty() {
            return Err(ConfigError::EmptyValue("DATABASE_URL".to_string()));
        }

        let mut config = Self::new(database_url);
        config.max_connections = parse_or(
            &lookup,
            "ORDER_STORE_MAX_CONNECTIONS",
            Self::DEFAULT_MAX_CONNECTIONS,
        );
        config.cursor_buffer = parse_or(
            &lookup,
            "ORDER_STORE_CURSOR_BUFFER",
            Self::DEFAULT_CURSOR_BUFFER,
        )
        .max(1);
        config.put_timeout = Duration::from_millis(parse_or(
            &lookup,
            "ORDER_STORE_PUT_TIMEOUT_MS",
            Self::DEFAULT_PUT_TIMEOUT.as_millis() as u64,
        ));
        config.metrics_port = parse_or(
            &lookup,
            "ORDER_STORE_METRICS_PORT",
            Self::DEFAULT_METRICS_PORT,
        );

        Ok(config)
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("cursor_buffer", &self.cursor_buffer)
            .field("put_timeout", &self.put_timeout)
            .field("metrics_port", &self.metrics_port)
            .finish()
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Unparseable setting, using default");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/orders")])).unwrap();

        assert_eq!(config.max_connections, 5);
        assert_eq!(config.cursor_buffer, 64);
        assert_eq!(config.put_timeout, Duration::from_secs(5));
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/orders"),
            ("ORDER_STORE_MAX_CONNECTIONS", "12"),
            ("ORDER_STORE_CURSOR_BUFFER", "0"),
            ("ORDER_STORE_PUT_TIMEOUT_MS", "250"),
            ("ORDER_STORE_METRICS_PORT", "not-a-port"),
        ]))
        .unwrap();

        assert_eq!(config.max_connections, 12);
        assert_eq!(config.cursor_buffer, 1);
        assert_eq!(config.put_timeout, Duration::from_millis(250));
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn test_database_url_is_required() {
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[])).unwrap_err(),
            ConfigError::MissingEnvVar("DATABASE_URL".to_string())
        );
        assert_eq!(
            StoreConfig::from_lookup(lookup(&[("DATABASE_URL", " ")])).unwrap_err(),
            ConfigError::EmptyValue("DATABASE_URL".to_string())
        );
    }

    #[test]
    fn test_debug_redacts_url() {
        let config = StoreConfig::new("postgres://user:secret@db/orders");
        assert!(!format!("{:?}", config).contains("secret"));
    }
}
