//! Environment-driven configuration
//!
//! All process configuration comes from environment variables (a local
//! `.env` file is honored). Values are grouped per concern and validated at
//! load; no other process-wide state exists.

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    pub workers: WorkerConfig,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
    /// Audit records older than this many days are purged by the
    /// maintenance job.
    pub audit_retention_days: i64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub ssl_mode: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub addr: String,
    pub password: String,
    pub db_index: u8,
}

impl CacheConfig {
    pub fn url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}/{}", self.addr, self.db_index)
        } else {
            format!("redis://:{}@{}/{}", self.password, self.addr, self.db_index)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub count: usize,
    pub queue_size: usize,
    pub shutdown_timeout_secs: u64,
}

/// Consumed by the external rate limiter, surfaced here so the whole
/// environment is enumerated in one place.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub global_rps: f64,
    pub global_burst: u32,
    pub banking_rps: f64,
    pub banking_burst: u32,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub rotation: String,
    pub use_json: bool,
}

impl Config {
    /// Load from the environment, honoring a `.env` file when present.
    pub fn load() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            tracing::debug!(".env file not found, using environment variables only");
        }

        let config = Self {
            database: DatabaseConfig {
                host: get_env("DB_HOST", "localhost"),
                port: get_env_parsed("DB_PORT", 5432),
                user: get_env("DB_USER", "postgres"),
                password: get_env("DB_PASSWORD", "postgres"),
                name: get_env("DB_NAME", "ledgerd"),
                ssl_mode: get_env("DB_SSLMODE", "disable"),
            },
            cache: CacheConfig {
                addr: get_env("CACHE_ADDR", "127.0.0.1:6379"),
                password: get_env("CACHE_PASSWORD", ""),
                db_index: get_env_parsed("CACHE_DB", 0),
            },
            server: ServerConfig {
                host: get_env("SERVER_HOST", "0.0.0.0"),
                port: get_env_parsed("SERVER_PORT", 8080),
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", "change-me-to-a-32-character-secret!!"),
            },
            workers: WorkerConfig {
                count: get_env_parsed("WORKER_COUNT", 5),
                queue_size: get_env_parsed("QUEUE_SIZE", 100),
                shutdown_timeout_secs: get_env_parsed("SHUTDOWN_TIMEOUT_SECS", 30),
            },
            rate_limit: RateLimitConfig {
                global_rps: get_env_parsed("RATE_LIMIT_GLOBAL_RPS", 10.0),
                global_burst: get_env_parsed("RATE_LIMIT_GLOBAL_BURST", 20),
                banking_rps: get_env_parsed("RATE_LIMIT_BANKING_RPS", 5.0),
                banking_burst: get_env_parsed("RATE_LIMIT_BANKING_BURST", 10),
            },
            log: LogConfig {
                level: get_env("LOG_LEVEL", "info"),
                dir: get_env("LOG_DIR", "./logs"),
                file: get_env("LOG_FILE", "ledgerd.log"),
                rotation: get_env("LOG_ROTATION", "daily"),
                use_json: get_env_parsed("LOG_JSON", false),
            },
            audit_retention_days: get_env_parsed("AUDIT_RETENTION_DAYS", 90),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.user.is_empty() {
            return Err(ConfigError::Invalid("DB_USER is required".to_string()));
        }
        if self.database.name.is_empty() {
            return Err(ConfigError::Invalid("DB_NAME is required".to_string()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("SERVER_PORT must be nonzero".to_string()));
        }
        if self.workers.count == 0 {
            return Err(ConfigError::Invalid(
                "WORKER_COUNT must be at least 1".to_string(),
            ));
        }
        if self.workers.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "QUEUE_SIZE must be at least 1".to_string(),
            ));
        }
        if self.jwt.secret.len() < 32 {
            tracing::warn!("JWT secret is shorter than 32 characters");
        }
        Ok(())
    }
}

fn get_env(key: &str, fallback: &str) -> String {
    env::var(key).unwrap_or_else(|_| fallback.to_string())
}

fn get_env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}
