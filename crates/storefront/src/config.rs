//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `EC_SPACE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `EC_SPACE_BASE_URL` - Public URL for the storefront
//! - `EC_SPACE_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `EC_SPACE_HOST` - Bind address (default: 127.0.0.1)
//! - `EC_SPACE_PORT` - Listen port (default: 8080)
//! - `EC_SPACE_SIGNUP_CREDITS` - Credits granted to new accounts (default: 10000.00)
//! - `EC_SPACE_MAX_TOPUP` - Largest single top-up (default: 1000000.00)
//! - `EC_SPACE_LOCK_TIMEOUT_MS` - Row lock wait limit inside checkout (default: 5000)
//! - `EC_SPACE_CHECKOUT_TIMEOUT_MS` - Whole-checkout deadline (default: 15000)
//! - `EC_SPACE_CART_CLEAR` - `whole` or `submitted` (default: whole)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use ec_space_core::Credits;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which cart lines a successful checkout removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CartClearPolicy {
    /// Delete every cart line of the account.
    #[default]
    Whole,
    /// Delete only the lines whose items were part of the order.
    Submitted,
}

impl FromStr for CartClearPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whole" => Ok(Self::Whole),
            "submitted" => Ok(Self::Submitted),
            other => Err(format!("expected 'whole' or 'submitted', got '{other}'")),
        }
    }
}

/// Tunables for the checkout transaction.
#[derive(Debug, Clone, Copy)]
pub struct CheckoutConfig {
    /// How long a checkout waits for a single row lock.
    pub lock_timeout: Duration,
    /// Deadline for the whole unit of work.
    pub timeout: Duration,
    /// Cart lines removed on success.
    pub cart_clear: CartClearPolicy,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5_000),
            timeout: Duration::from_millis(15_000),
            cart_clear: CartClearPolicy::Whole,
        }
    }
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Credits granted on registration
    pub signup_credits: Credits,
    /// Upper bound for a single top-up request
    pub max_topup: Credits,
    /// Checkout transaction tunables
    pub checkout: CheckoutConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production", "staging")
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("EC_SPACE_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("EC_SPACE_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("EC_SPACE_PORT", "8080")?;
        let base_url = get_required_env("EC_SPACE_BASE_URL")?;
        let session_secret = get_validated_secret("EC_SPACE_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "EC_SPACE_SESSION_SECRET")?;

        let signup_credits = parse_env_or_default::<Credits>("EC_SPACE_SIGNUP_CREDITS", "10000.00")?;
        let max_topup = parse_env_or_default::<Credits>("EC_SPACE_MAX_TOPUP", "1000000.00")?;

        let checkout = CheckoutConfig {
            lock_timeout: Duration::from_millis(parse_env_or_default::<u64>(
                "EC_SPACE_LOCK_TIMEOUT_MS",
                "5000",
            )?),
            timeout: Duration::from_millis(parse_env_or_default::<u64>(
                "EC_SPACE_CHECKOUT_TIMEOUT_MS",
                "15000",
            )?),
            cart_clear: parse_env_or_default::<CartClearPolicy>("EC_SPACE_CART_CLEAR", "whole")?,
        };

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            signup_credits,
            max_topup,
            checkout,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env_or_default::<f32>("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env_or_default::<f32>(
                "SENTRY_TRACES_SAMPLE_RATE",
                "0.0",
            )?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether the storefront is served over HTTPS (enables secure cookies).
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config(base_url: &str) -> StorefrontConfig {
        StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 8080,
            base_url: base_url.to_string(),
            session_secret: SecretString::from("x".repeat(32)),
            signup_credits: "10000.00".parse().unwrap(),
            max_topup: "1000000.00".parse().unwrap(),
            checkout: CheckoutConfig::default(),
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("changeme-please-now", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_too_short() {
        let secret = SecretString::from("short");
        assert!(validate_session_secret(&secret, "TEST_SESSION").is_err());
    }

    #[test]
    fn test_cart_clear_policy_parse() {
        assert_eq!("whole".parse::<CartClearPolicy>(), Ok(CartClearPolicy::Whole));
        assert_eq!(" Submitted ".parse::<CartClearPolicy>(), Ok(CartClearPolicy::Submitted));
        assert!("some".parse::<CartClearPolicy>().is_err());
    }

    #[test]
    fn test_checkout_defaults() {
        let checkout = CheckoutConfig::default();
        assert_eq!(checkout.lock_timeout, Duration::from_secs(5));
        assert_eq!(checkout.timeout, Duration::from_secs(15));
        assert_eq!(checkout.cart_clear, CartClearPolicy::Whole);
    }

    #[test]
    fn test_socket_addr_and_secure_flag() {
        let config = test_config("http://localhost:8080");
        assert_eq!(config.socket_addr().port(), 8080);
        assert!(!config.is_secure());
        assert!(test_config("https://shop.example").is_secure());
    }
}
