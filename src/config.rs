use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STRICT_REQUESTS: u32 = 10;
const DEFAULT_STRICT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_LENIENT_REQUESTS: u32 = 60;
const DEFAULT_LENIENT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_NAMESPACE: &str = "storefront:rl";
const DEFAULT_PRICE_TOLERANCE: i64 = 1000;
const DEFAULT_ORDER_CODE_ATTEMPTS: u32 = 3;
const DEFAULT_PAYOS_BASE_URL: &str = "https://api-merchant.payos.vn";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;

/// Throttling tiers for the money-moving and read endpoints
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    /// Requests allowed per strict window (order creation, link issuance)
    #[serde(default = "default_strict_requests")]
    #[validate(range(min = 1))]
    pub strict_requests: u32,

    #[serde(default = "default_strict_window_secs")]
    #[validate(range(min = 1))]
    pub strict_window_secs: u64,

    /// Requests allowed per lenient window (order lookup)
    #[serde(default = "default_lenient_requests")]
    #[validate(range(min = 1))]
    pub lenient_requests: u32,

    #[serde(default = "default_lenient_window_secs")]
    #[validate(range(min = 1))]
    pub lenient_window_secs: u64,

    /// Keep counters in Redis so every instance shares them
    #[serde(default)]
    pub use_redis: bool,

    #[serde(default = "default_rate_limit_namespace")]
    pub namespace: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            strict_requests: DEFAULT_STRICT_REQUESTS,
            strict_window_secs: DEFAULT_STRICT_WINDOW_SECS,
            lenient_requests: DEFAULT_LENIENT_REQUESTS,
            lenient_window_secs: DEFAULT_LENIENT_WINDOW_SECS,
            use_redis: false,
            namespace: default_rate_limit_namespace(),
        }
    }
}

/// Order creation policy
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct OrderSettings {
    /// Largest accepted gap between the claimed and server-computed total, in minor units
    #[serde(default = "default_price_tolerance")]
    #[validate(range(min = 0))]
    pub price_tolerance: i64,

    /// Attempts at generating a fresh order code when the unique index rejects one
    #[serde(default = "default_order_code_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub order_code_max_attempts: u32,

    #[serde(default = "default_payment_method")]
    pub default_payment_method: String,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            price_tolerance: DEFAULT_PRICE_TOLERANCE,
            order_code_max_attempts: DEFAULT_ORDER_CODE_ATTEMPTS,
            default_payment_method: default_payment_method(),
        }
    }
}

/// PayOS merchant credentials
#[derive(Clone, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PayosSettings {
    #[serde(default = "default_payos_base_url")]
    #[validate(url)]
    pub base_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub api_key: String,

    /// HMAC key for request signing and webhook verification
    #[serde(default)]
    pub checksum_key: String,

    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,
}

impl Default for PayosSettings {
    fn default() -> Self {
        Self {
            base_url: default_payos_base_url(),
            client_id: String::new(),
            api_key: String::new(),
            checksum_key: String::new(),
            timeout_secs: DEFAULT_GATEWAY_TIMEOUT_SECS,
        }
    }
}

impl PayosSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl std::fmt::Debug for PayosSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayosSettings")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field("api_key", &"<redacted>")
            .field("checksum_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL (rate-limit counters)
    pub redis_url: String,

    /// JWT secret key shared with the identity provider
    #[validate(length(min = 32), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default)]
    pub jwt_issuer: Option<String>,

    #[serde(default)]
    pub jwt_audience: Option<String>,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Comma-separated list of allowed CORS origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Per-request timeout applied by the HTTP stack
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    #[validate]
    pub orders: OrderSettings,

    #[serde(default)]
    #[validate]
    pub payos: PayosSettings,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Gateway credentials are optional in development so the service can boot without them.
    pub fn validate_additional_constraints(&self) -> Result<(), ValidationError> {
        if !self.is_development() && self.payos.checksum_key.trim().is_empty() {
            let mut err = ValidationError::new("payos.checksum_key");
            err.message = Some("payos.checksum_key is required outside development".into());
            return Err(err);
        }
        if self.is_production() && self.cors_allowed_origins.is_none() {
            let mut err = ValidationError::new("cors_allowed_origins");
            err.message = Some("cors_allowed_origins must be set in production".into());
            return Err(err);
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Configuration constraint violated: {0}")]
    Constraint(ValidationError),
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_strict_requests() -> u32 {
    DEFAULT_STRICT_REQUESTS
}

fn default_strict_window_secs() -> u64 {
    DEFAULT_STRICT_WINDOW_SECS
}

fn default_lenient_requests() -> u32 {
    DEFAULT_LENIENT_REQUESTS
}

fn default_lenient_window_secs() -> u64 {
    DEFAULT_LENIENT_WINDOW_SECS
}

fn default_rate_limit_namespace() -> String {
    DEFAULT_RATE_LIMIT_NAMESPACE.to_string()
}

fn default_price_tolerance() -> i64 {
    DEFAULT_PRICE_TOLERANCE
}

fn default_order_code_attempts() -> u32 {
    DEFAULT_ORDER_CODE_ATTEMPTS
}

fn default_payment_method() -> String {
    "payos".to_string()
}

fn default_payos_base_url() -> String {
    DEFAULT_PAYOS_BASE_URL.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    DEFAULT_GATEWAY_TIMEOUT_SECS
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    const DISALLOWED: [&str; 3] = ["your-secret-key", "default-secret-key", "changeme"];
    if DISALLOWED
        .iter()
        .any(|&bad| trimmed.eq_ignore_ascii_case(bad))
    {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some("JWT secret must be overridden with a secure random value".into());
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_checkout={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default and must come from a file or APP__JWT_SECRET.
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET.");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint violated: {:?}", e);
        AppConfigError::Constraint(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
