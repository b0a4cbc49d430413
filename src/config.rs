use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
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
const DEFAULT_CURRENCY: &str = "CLP";
const DEFAULT_DELIVERY_SURCHARGE: i64 = 3000;
/// Public integration environment of the card gateway.
const DEFAULT_GATEWAY_BASE_URL: &str = "https://webpay3gint.transbank.cl";
const DEFAULT_GATEWAY_COMMERCE_CODE: &str = "597055555532";
const DEFAULT_GATEWAY_API_KEY: &str =
    "579B532A7440BB0C9079DED94D31EA1615BACEB56610332264630D42D0A36B1C";
const DEFAULT_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
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

    /// CORS: comma-separated list of allowed origins
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS outside development
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,

    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Per-request timeout applied to the HTTP router
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1))]
    pub request_timeout_secs: u64,

    /// Store currency; amounts are whole units of it
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,

    /// Flat surcharge added to home-delivery (envio) orders
    #[serde(default = "default_delivery_surcharge")]
    #[validate(range(min = 0))]
    pub delivery_surcharge: i64,

    /// Card gateway REST base URL
    #[serde(default = "default_gateway_base_url")]
    #[validate(url)]
    pub gateway_base_url: String,

    /// Commerce code sent as `Tbk-Api-Key-Id`
    #[serde(default = "default_gateway_commerce_code")]
    #[validate(length(min = 1))]
    pub gateway_commerce_code: String,

    /// Secret sent as `Tbk-Api-Key-Secret`
    #[serde(default = "default_gateway_api_key")]
    #[validate(length(min = 1))]
    pub gateway_api_key: String,

    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1))]
    pub gateway_timeout_secs: u64,

    /// Where the gateway sends web shoppers back (the web commit endpoint)
    #[serde(default = "default_payment_return_url")]
    #[validate(url)]
    pub payment_return_url: String,

    /// Return URL intercepted by the mobile web view; defaults to `payment_return_url`
    #[serde(default)]
    #[validate(url)]
    pub mobile_return_url: Option<String>,

    /// Storefront page shown after a successful web payment
    #[serde(default = "default_web_success_url")]
    #[validate(url)]
    pub web_success_url: String,

    /// Storefront page shown after a failed or aborted web payment
    #[serde(default = "default_web_failure_url")]
    #[validate(url)]
    pub web_failure_url: String,

    /// Push relay endpoint; push delivery is disabled when unset
    #[serde(default = "default_push_endpoint")]
    #[validate(url)]
    pub push_endpoint: Option<String>,

    /// Transactional email API; email delivery is disabled when unset
    #[serde(default)]
    #[validate(url)]
    pub email_api_url: Option<String>,

    #[serde(default)]
    pub email_api_key: Option<String>,

    #[serde(default = "default_email_from")]
    #[validate(email)]
    pub email_from: String,

    #[serde(default = "default_notification_timeout_secs")]
    #[validate(range(min = 1))]
    pub notification_timeout_secs: u64,

    /// Directory holding one JSON blob per cart key
    #[serde(default = "default_cart_store_dir")]
    #[validate(length(min = 1))]
    pub cart_store_dir: String,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            currency: default_currency(),
            delivery_surcharge: default_delivery_surcharge(),
            gateway_base_url: default_gateway_base_url(),
            gateway_commerce_code: default_gateway_commerce_code(),
            gateway_api_key: default_gateway_api_key(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            payment_return_url: default_payment_return_url(),
            mobile_return_url: None,
            web_success_url: default_web_success_url(),
            web_failure_url: default_web_failure_url(),
            push_endpoint: default_push_endpoint(),
            email_api_url: None,
            email_api_key: None,
            email_from: default_email_from(),
            notification_timeout_secs: default_notification_timeout_secs(),
            cart_store_dir: default_cart_store_dir(),
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn delivery_surcharge(&self) -> Decimal {
        Decimal::from(self.delivery_surcharge)
    }

    pub fn mobile_return_url(&self) -> &str {
        self.mobile_return_url
            .as_deref()
            .unwrap_or(&self.payment_return_url)
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}
fn default_request_timeout_secs() -> u64 {
    30
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_delivery_surcharge() -> i64 {
    DEFAULT_DELIVERY_SURCHARGE
}

fn default_gateway_base_url() -> String {
    DEFAULT_GATEWAY_BASE_URL.to_string()
}

fn default_gateway_commerce_code() -> String {
    DEFAULT_GATEWAY_COMMERCE_CODE.to_string()
}

fn default_gateway_api_key() -> String {
    DEFAULT_GATEWAY_API_KEY.to_string()
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_payment_return_url() -> String {
    format!("http://localhost:{}/api/v1/payments/commit", DEFAULT_PORT)
}

fn default_web_success_url() -> String {
    "http://localhost:3000/pedido/exito".to_string()
}

fn default_web_failure_url() -> String {
    "http://localhost:3000/pedido/fallido".to_string()
}

fn default_push_endpoint() -> Option<String> {
    Some(DEFAULT_PUSH_ENDPOINT.to_string())
}

fn default_email_from() -> String {
    "pedidos@localhost.localdomain".to_string()
}

fn default_notification_timeout_secs() -> u64 {
    5
}

fn default_cart_store_dir() -> String {
    "data/carts".to_string()
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

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("bakery_orders={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. `config/default.toml`
/// 3. `config/{RUN_ENV}.toml`
/// 4. Environment variables (`APP__*`)
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

    let config = base_builder(Path::new(CONFIG_DIR), &run_env)?
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    finish(config)
}

fn base_builder(
    dir: &Path,
    run_env: &str,
) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    let default_file = dir.join("default");
    let env_file = dir.join(run_env);

    Ok(Config::builder()
        .set_default("database_url", "sqlite://bakery.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", i64::from(DEFAULT_PORT))?
        .set_default("environment", run_env)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&default_file.to_string_lossy()).required(false))
        .add_source(File::with_name(&env_file.to_string_lossy()).required(false)))
}

fn finish(config: Config) -> Result<AppConfig, AppConfigError> {
    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
