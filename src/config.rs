use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_JWT_EXPIRATION_SECS: usize = 3600;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;
const DEFAULT_ADVISORY_TIMEOUT_MS: u64 = 8_000;
const DEFAULT_ADVISORY_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_CURRENCY: &str = "eur";

/// Payment collaborator configuration (Stripe-style checkout sessions).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct PaymentConfig {
    /// Secret API key used for session creation
    pub secret_key: String,

    /// Shared secret used to verify webhook signatures
    pub webhook_secret: String,

    /// Maximum age of a signed webhook timestamp before rejection
    #[serde(default = "default_webhook_tolerance")]
    pub webhook_tolerance_secs: u64,

    /// Base URL of the payment API
    #[serde(default = "default_payment_api_base")]
    pub api_base: String,

    /// Browser redirect target after a completed payment
    #[validate(url)]
    pub success_url: String,

    /// Browser redirect target after an abandoned payment
    #[validate(url)]
    pub cancel_url: String,

    #[serde(default = "default_currency")]
    pub currency: String,
}

/// Generative-AI collaborator configuration. The advisory service is
/// best-effort; a missing key only disables suggestions, it never blocks
/// checkout.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AdvisoryConfig {
    pub api_key: String,

    #[serde(default = "default_advisory_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_advisory_model")]
    pub model: String,

    /// Bounded wait applied to every advisory call
    #[serde(default = "default_advisory_timeout_ms")]
    pub timeout_ms: u64,
}

/// Application configuration with validation.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// JWT signing secret
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration time in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: usize,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to create missing tables on startup (dev/test convenience)
    #[serde(default)]
    pub auto_migrate: bool,

    #[validate]
    pub payment: PaymentConfig,

    #[validate]
    pub advisory: AdvisoryConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_jwt_expiration() -> usize {
    DEFAULT_JWT_EXPIRATION_SECS
}
fn default_webhook_tolerance() -> u64 {
    DEFAULT_WEBHOOK_TOLERANCE_SECS
}
fn default_payment_api_base() -> String {
    "https://api.stripe.com".to_string()
}
fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}
fn default_advisory_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_advisory_model() -> String {
    DEFAULT_ADVISORY_MODEL.to_string()
}
fn default_advisory_timeout_ms() -> u64 {
    DEFAULT_ADVISORY_TIMEOUT_MS
}

impl AppConfig {
    /// Loads configuration from `config/default`, an environment-specific
    /// overlay, and `STUDIO__`-prefixed environment variables, then
    /// validates it.
    pub fn load() -> Result<Self, ConfigError> {
        let run_env = env::var("RUN_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

        let cfg: AppConfig = Config::builder()
            .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
            .add_source(File::with_name(&format!("{CONFIG_DIR}/{run_env}")).required(false))
            .add_source(Environment::with_prefix("STUDIO").separator("__"))
            .build()?
            .try_deserialize()?;

        cfg.validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

        Ok(cfg)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
