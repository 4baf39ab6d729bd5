//! Configuration module for Ferry Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::signing::SigningClientConfig;
use crate::upload::plan::{DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
        return s.to_string();
    };
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);
    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub signing: SigningConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Configuration with default upload settings for `endpoint`
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            signing: SigningConfig {
                endpoint: endpoint.into(),
                token: None,
                timeout_seconds: default_signing_timeout(),
            },
            upload: UploadConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.signing.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Signing endpoint must be configured".into(),
            ));
        }

        if !is_valid_http_url(&self.signing.endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid signing endpoint '{}': must start with http:// or https://",
                self.signing.endpoint
            )));
        }

        if self.signing.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "signing.timeout_seconds must be greater than 0".into(),
            ));
        }

        self.upload.validate()
    }
}

/// Signing service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// URL the sign requests are posted to
    pub endpoint: String,
    /// Bearer token sent with every sign request
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_signing_timeout")]
    pub timeout_seconds: u64,
}

impl SigningConfig {
    pub fn client_config(&self) -> SigningClientConfig {
        SigningClientConfig {
            endpoint: self.endpoint.clone(),
            token: self.token.clone().filter(|t| !t.is_empty()),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

fn default_signing_timeout() -> u64 {
    60
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_compress_threshold")]
    pub compress_threshold: u64,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
    #[serde(default = "default_part_size")]
    pub part_size: u64,
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
    /// Abort the remote session when a multipart upload fails
    #[serde(default)]
    pub abort_on_failure: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            compress_threshold: default_compress_threshold(),
            multipart_threshold: default_multipart_threshold(),
            part_size: default_part_size(),
            concurrent_parts: default_concurrent_parts(),
            progress_interval_ms: default_progress_interval_ms(),
            show_progress: default_show_progress(),
            abort_on_failure: false,
            retry: RetryConfig::default(),
        }
    }
}

impl UploadConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.part_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.part_size must be greater than 0".into(),
            ));
        }
        if self.concurrent_parts == 0 {
            return Err(ConfigError::ValidationError(
                "upload.concurrent_parts must be at least 1".into(),
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "upload.progress_interval_ms must be greater than 0".into(),
            ));
        }
        self.retry.validate()
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

fn default_compress_threshold() -> u64 {
    crate::compress::DEFAULT_COMPRESS_THRESHOLD
}

fn default_multipart_threshold() -> u64 {
    DEFAULT_MULTIPART_THRESHOLD
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE
}

fn default_concurrent_parts() -> usize {
    5
}

fn default_progress_interval_ms() -> u64 {
    500
}

fn default_show_progress() -> bool {
    true
}

/// Part retry policy.
///
/// `max_attempts = 1` means a failed part fails the upload immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "upload.retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ConfigError::ValidationError(format!(
                "upload.retry.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Backoff before attempt `attempt + 1`, doubling from `base_delay_ms`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(20);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}
