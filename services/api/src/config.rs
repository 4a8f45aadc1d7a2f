//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use storybook_core::RetryPolicy;
use tracing::Level;

const DEFAULT_TEXT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const DEFAULT_IMAGE_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub stories_dir: PathBuf,
    pub gemini_api_key: String,
    pub text_model: String,
    pub image_model: String,
    pub text_api_base: String,
    pub image_api_base: String,
    pub integrate_text_in_image: bool,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff: Duration,
    /// Upper bound on a single outbound model request.
    pub request_timeout: Duration,
    /// Sessions not seen for this long are dropped.
    pub session_idle_timeout: Duration,
    pub cors_origin: String,
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
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server Settings ---
        let bind_address = parse_var("BIND_ADDRESS", &var_or("BIND_ADDRESS", "0.0.0.0:3000"))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let stories_dir = PathBuf::from(var_or("STORIES_DIR", ".data/stories"));
        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        // --- Generative Service Settings ---
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;
        let text_model = var_or("TEXT_MODEL", "gemini-2.5-pro");
        let image_model = var_or("IMAGE_MODEL", "gemini-2.5-flash-image-preview");
        let text_api_base = var_or("TEXT_API_BASE", DEFAULT_TEXT_API_BASE);
        let image_api_base = var_or("IMAGE_API_BASE", DEFAULT_IMAGE_API_BASE);
        let integrate_text_in_image =
            parse_bool("INTEGRATE_TEXT_IN_IMAGE", &var_or("INTEGRATE_TEXT_IN_IMAGE", "true"))?;

        // --- Retry Settings ---
        let retry_max_attempts: u32 =
            parse_var("RETRY_MAX_ATTEMPTS", &var_or("RETRY_MAX_ATTEMPTS", "3"))?;
        if retry_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "RETRY_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let backoff_ms: u64 =
            parse_var("RETRY_INITIAL_BACKOFF_MS", &var_or("RETRY_INITIAL_BACKOFF_MS", "500"))?;
        let request_timeout_secs: u64 =
            parse_var("REQUEST_TIMEOUT_SECS", &var_or("REQUEST_TIMEOUT_SECS", "120"))?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "REQUEST_TIMEOUT_SECS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        // --- Session Settings ---
        let session_idle_secs: u64 = parse_var(
            "SESSION_IDLE_TIMEOUT_SECS",
            &var_or("SESSION_IDLE_TIMEOUT_SECS", "86400"),
        )?;

        Ok(Self {
            bind_address,
            log_level,
            stories_dir,
            gemini_api_key,
            text_model,
            image_model,
            text_api_base,
            image_api_base,
            integrate_text_in_image,
            retry_max_attempts,
            retry_initial_backoff: Duration::from_millis(backoff_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
            session_idle_timeout: Duration::from_secs(session_idle_secs),
            cors_origin,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            initial_backoff: self.retry_initial_backoff,
            ..RetryPolicy::default()
        }
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}
