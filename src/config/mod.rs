//! Configuration management
//!
//! Configuration is loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with defaults. The signing secret has
//! no default: [`Config::validate`] rejects a configuration without one, so
//! the service refuses to start instead of signing with an empty key.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session backend configuration
    #[serde(default)]
    pub cache: CacheConfig,
    /// Token and session configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (for cookie-based auth)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Domain attribute of the token cookies (omitted when unset)
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Mark token cookies `Secure`
    #[serde(default)]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            cookie_domain: None,
            secure_cookies: false,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration (user directory)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/market.db".to_string()
}

/// Session backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Backend driver (memory or redis)
    #[serde(default)]
    pub driver: CacheDriver,
    /// Redis connection URL (required for the redis driver)
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Upper bound for a single backend operation, in milliseconds
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            driver: CacheDriver::default(),
            redis_url: None,
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

fn default_op_timeout_ms() -> u64 {
    3000
}

/// Session backend driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheDriver {
    /// In-memory store (default)
    #[default]
    Memory,
    /// Redis
    Redis,
}

/// Token and session configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing secret
    #[serde(default)]
    pub secret: String,
    /// `iss` claim written into and required from every token
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Access token lifetime in minutes
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: u64,
    /// Refresh token lifetime in minutes
    #[serde(default = "default_refresh_ttl_minutes")]
    pub refresh_ttl_minutes: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("access_ttl_minutes", &self.access_ttl_minutes)
            .field("refresh_ttl_minutes", &self.refresh_ttl_minutes)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: default_issuer(),
            access_ttl_minutes: default_access_ttl_minutes(),
            refresh_ttl_minutes: default_refresh_ttl_minutes(),
        }
    }
}

fn default_issuer() -> String {
    "http://localhost:8080".to_string()
}

fn default_access_ttl_minutes() -> u64 {
    15
}

fn default_refresh_ttl_minutes() -> u64 {
    1440
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - MARKET_SERVER_HOST
    /// - MARKET_SERVER_PORT
    /// - MARKET_SERVER_CORS_ORIGIN
    /// - MARKET_SERVER_COOKIE_DOMAIN
    /// - MARKET_SERVER_SECURE_COOKIES
    /// - MARKET_DATABASE_URL
    /// - MARKET_CACHE_DRIVER
    /// - MARKET_CACHE_REDIS_URL
    /// - MARKET_CACHE_OP_TIMEOUT_MS
    /// - MARKET_AUTH_SECRET
    /// - MARKET_AUTH_ISSUER
    /// - MARKET_AUTH_ACCESS_TTL_MINUTES
    /// - MARKET_AUTH_REFRESH_TTL_MINUTES
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("MARKET_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("MARKET_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("MARKET_SERVER_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }
        if let Ok(domain) = std::env::var("MARKET_SERVER_COOKIE_DOMAIN") {
            self.server.cookie_domain = Some(domain);
        }
        if let Ok(secure) = std::env::var("MARKET_SERVER_SECURE_COOKIES") {
            match secure.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.server.secure_cookies = true,
                "0" | "false" | "no" => self.server.secure_cookies = false,
                _ => {} // Ignore invalid values
            }
        }

        // Database configuration
        if let Ok(url) = std::env::var("MARKET_DATABASE_URL") {
            self.database.url = url;
        }

        // Session backend configuration
        if let Ok(driver) = std::env::var("MARKET_CACHE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "memory" => self.cache.driver = CacheDriver::Memory,
                "redis" => self.cache.driver = CacheDriver::Redis,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(redis_url) = std::env::var("MARKET_CACHE_REDIS_URL") {
            self.cache.redis_url = Some(redis_url);
        }
        if let Ok(timeout) = std::env::var("MARKET_CACHE_OP_TIMEOUT_MS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.cache.op_timeout_ms = timeout;
            }
        }

        // Auth configuration
        if let Ok(secret) = std::env::var("MARKET_AUTH_SECRET") {
            self.auth.secret = secret;
        }
        if let Ok(issuer) = std::env::var("MARKET_AUTH_ISSUER") {
            self.auth.issuer = issuer;
        }
        if let Ok(ttl) = std::env::var("MARKET_AUTH_ACCESS_TTL_MINUTES") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.auth.access_ttl_minutes = ttl;
            }
        }
        if let Ok(ttl) = std::env::var("MARKET_AUTH_REFRESH_TTL_MINUTES") {
            if let Ok(ttl) = ttl.parse::<u64>() {
                self.auth.refresh_ttl_minutes = ttl;
            }
        }
    }

    /// Check values that have no safe default
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.secret must be set (config.yml or MARKET_AUTH_SECRET)".to_string(),
            ));
        }
        if self.auth.access_ttl_minutes == 0 || self.auth.refresh_ttl_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "token lifetimes must be at least one minute".to_string(),
            ));
        }
        let now = chrono::Utc::now();
        for (name, minutes) in [
            ("auth.access_ttl_minutes", self.auth.access_ttl_minutes),
            ("auth.refresh_ttl_minutes", self.auth.refresh_ttl_minutes),
        ] {
            if crate::services::token::expiry_after(now, minutes).is_err() {
                return Err(ConfigError::ValidationError(format!(
                    "{} is too large to issue tokens with",
                    name
                )));
            }
        }
        if self.cache.driver == CacheDriver::Redis && self.cache.redis_url.is_none() {
            return Err(ConfigError::ValidationError(
                "cache.redis_url is required when cache.driver is redis".to_string(),
            ));
        }
        if self.cache.op_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "cache.op_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
const ENV_KEYS: &[&str] = &[
    "MARKET_SERVER_HOST",
    "MARKET_SERVER_PORT",
    "MARKET_SERVER_CORS_ORIGIN",
    "MARKET_SERVER_COOKIE_DOMAIN",
    "MARKET_SERVER_SECURE_COOKIES",
    "MARKET_DATABASE_URL",
    "MARKET_CACHE_DRIVER",
    "MARKET_CACHE_REDIS_URL",
    "MARKET_CACHE_OP_TIMEOUT_MS",
    "MARKET_AUTH_SECRET",
    "MARKET_AUTH_ISSUER",
    "MARKET_AUTH_ACCESS_TTL_MINUTES",
    "MARKET_AUTH_REFRESH_TTL_MINUTES",
];
