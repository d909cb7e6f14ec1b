//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// SMTP settings for mailing one-time passcodes. Absent when `SMTP_HOST` is unset,
/// in which case codes are only written to the log.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Secret the message cipher key is derived from. Never logged.
    pub encryption_key: String,
    pub uploads_dir: PathBuf,
    pub cors_origin: String,
    pub cookie_secure: bool,
    pub realtime_channel_capacity: usize,
    pub smtp: Option<SmtpConfig>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("log_level", &self.log_level)
            .field("uploads_dir", &self.uploads_dir)
            .field("cors_origin", &self.cors_origin)
            .field("cookie_secure", &self.cookie_secure)
            .field("realtime_channel_capacity", &self.realtime_channel_capacity)
            .field("smtp_enabled", &self.smtp.is_some())
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };

        // --- Load Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:4500".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = required("DATABASE_URL")?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Message Store ---
        let encryption_key = required("ENCRYPTION_KEY")?;

        let uploads_dir = lookup("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./uploads"));

        // --- Web & Realtime Settings ---
        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3001".to_string());
        let cookie_secure = lookup("COOKIE_SECURE")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);

        let capacity_str = lookup("REALTIME_CHANNEL_CAPACITY").unwrap_or_else(|| "64".to_string());
        let realtime_channel_capacity = capacity_str
            .parse::<usize>()
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "REALTIME_CHANNEL_CAPACITY".to_string(),
                    format!("'{}' is not a positive integer", capacity_str),
                )
            })?;

        // --- Load SMTP Settings (as optional) ---
        let smtp = match lookup("SMTP_HOST").filter(|h| !h.trim().is_empty()) {
            Some(host) => {
                let port_str = lookup("SMTP_PORT").unwrap_or_else(|| "465".to_string());
                let port = port_str.parse::<u16>().map_err(|e| {
                    ConfigError::InvalidValue("SMTP_PORT".to_string(), e.to_string())
                })?;
                let username = required("SMTP_USERNAME")?;
                Some(SmtpConfig {
                    host,
                    port,
                    password: required("SMTP_PASSWORD")?,
                    from_address: lookup("EMAIL_FROM").unwrap_or_else(|| username.clone()),
                    username,
                })
            }
            None => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            encryption_key,
            uploads_dir,
            cors_origin,
            cookie_secure,
            realtime_channel_capacity,
            smtp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn minimal_environment_uses_defaults() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/chat"),
            ("ENCRYPTION_KEY", "s3cret"),
        ])
        .unwrap();

        assert_eq!(config.bind_address.port(), 4500);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.uploads_dir, PathBuf::from("./uploads"));
        assert_eq!(config.realtime_channel_capacity, 64);
        assert!(config.smtp.is_none());
        assert!(!config.cookie_secure);
    }

    #[test]
    fn encryption_key_is_required() {
        let err = load(&[("DATABASE_URL", "postgres://localhost/chat")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "ENCRYPTION_KEY"));

        let blank = load(&[
            ("DATABASE_URL", "postgres://localhost/chat"),
            ("ENCRYPTION_KEY", "  "),
        ]);
        assert!(blank.is_err());
    }

    #[test]
    fn smtp_requires_credentials_once_host_is_set() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/chat"),
            ("ENCRYPTION_KEY", "s3cret"),
            ("SMTP_HOST", "smtp.example.com"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "SMTP_USERNAME"));

        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/chat"),
            ("ENCRYPTION_KEY", "s3cret"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "bot@example.com"),
            ("SMTP_PASSWORD", "pw"),
        ])
        .unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.from_address, "bot@example.com");
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/chat"),
            ("ENCRYPTION_KEY", "s3cret"),
            ("REALTIME_CHANNEL_CAPACITY", "0"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "REALTIME_CHANNEL_CAPACITY"));

        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/chat"),
            ("ENCRYPTION_KEY", "s3cret"),
            ("BIND_ADDRESS", "not-an-address"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "BIND_ADDRESS"));
    }
}
