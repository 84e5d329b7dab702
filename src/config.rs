use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub housekeeping: HousekeepingConfig,
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub data_dir: String,
    /// Reverse proxies in front of the server. Each one appends a hop to
    /// `X-Forwarded-For`; 0 means the socket peer is the caller.
    pub trusted_proxy_hops: usize,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub pin_code: String,
}

// Keep the PIN out of debug logs
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("pin_code", &"******")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub timeout_ms: u64,
    pub url: String,
}

/// Per-source request budgets for the PIN and chat endpoints
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub chat_max_requests: u32,
    pub chat_window_seconds: u64,
    pub pin_max_requests: u32,
    pub pin_window_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct HousekeepingConfig {
    pub attempt_retention_days: i64,
    pub cleanup_interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            data_dir: "./data".to_string(),
            trusted_proxy_hops: 0,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            chat_max_requests: 60,
            chat_window_seconds: 60,
            pin_max_requests: 5,
            pin_window_seconds: 15 * 60,
        }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        Self {
            attempt_retention_days: 30,
            cleanup_interval_seconds: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn chat_window(&self) -> Duration {
        Duration::from_secs(self.chat_window_seconds)
    }

    pub fn pin_window(&self) -> Duration {
        Duration::from_secs(self.pin_window_seconds)
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pin_code = lookup("PIN_CODE")
            .ok_or_else(|| ConfigError::ValidationError("PIN_CODE is required".to_string()))?;
        let webhook_url = lookup("WEBHOOK_URL")
            .ok_or_else(|| ConfigError::ValidationError("WEBHOOK_URL is required".to_string()))?;

        let server_defaults = ServerConfig::default();
        let housekeeping_defaults = HousekeepingConfig::default();
        let rate_limit_defaults = RateLimitConfig::default();

        let config = Config {
            auth: AuthConfig {
                pin_code: pin_code.trim().to_string(),
            },
            housekeeping: HousekeepingConfig {
                attempt_retention_days: parse_or(
                    &lookup,
                    "ATTEMPT_RETENTION_DAYS",
                    housekeeping_defaults.attempt_retention_days,
                )?,
                cleanup_interval_seconds: parse_or(
                    &lookup,
                    "CLEANUP_INTERVAL_SECONDS",
                    housekeeping_defaults.cleanup_interval_seconds,
                )?,
            },
            rate_limit: RateLimitConfig {
                chat_max_requests: parse_or(
                    &lookup,
                    "CHAT_RATE_LIMIT_MAX",
                    rate_limit_defaults.chat_max_requests,
                )?,
                chat_window_seconds: parse_or(
                    &lookup,
                    "CHAT_RATE_LIMIT_WINDOW_SECONDS",
                    rate_limit_defaults.chat_window_seconds,
                )?,
                pin_max_requests: parse_or(
                    &lookup,
                    "PIN_RATE_LIMIT_MAX",
                    rate_limit_defaults.pin_max_requests,
                )?,
                pin_window_seconds: parse_or(
                    &lookup,
                    "PIN_RATE_LIMIT_WINDOW_SECONDS",
                    rate_limit_defaults.pin_window_seconds,
                )?,
            },
            server: ServerConfig {
                bind_address: lookup("BIND_ADDRESS").unwrap_or(server_defaults.bind_address),
                data_dir: lookup("DATA_DIR").unwrap_or(server_defaults.data_dir),
                trusted_proxy_hops: match lookup("TRUST_PROXY") {
                    Some(raw) => parse_proxy_hops(&raw)?,
                    None => server_defaults.trusted_proxy_hops,
                },
            },
            webhook: WebhookConfig {
                timeout_ms: parse_or(&lookup, "WEBHOOK_TIMEOUT_MS", 15_000)?,
                url: webhook_url.trim().to_string(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let pin = &self.auth.pin_code;
        if pin.len() != 6 || !pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::ValidationError(
                "PIN_CODE must be exactly 6 digits".to_string(),
            ));
        }

        let url = url::Url::parse(&self.webhook.url).map_err(|e| {
            ConfigError::ValidationError(format!("WEBHOOK_URL is not a valid URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(format!(
                "WEBHOOK_URL must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.webhook.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "WEBHOOK_TIMEOUT_MS must be greater than 0".to_string(),
            ));
        }
        if self.housekeeping.cleanup_interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "CLEANUP_INTERVAL_SECONDS must be greater than 0".to_string(),
            ));
        }
        if self.housekeeping.attempt_retention_days <= 0 {
            return Err(ConfigError::ValidationError(
                "ATTEMPT_RETENTION_DAYS must be greater than 0".to_string(),
            ));
        }

        let limits = &self.rate_limit;
        if limits.chat_max_requests == 0 || limits.pin_max_requests == 0 {
            return Err(ConfigError::ValidationError(
                "Rate limit maximums must be greater than 0".to_string(),
            ));
        }
        if limits.chat_window_seconds == 0 || limits.pin_window_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "Rate limit windows must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// `true`/`false` for one proxy or none, or an explicit hop count
fn parse_proxy_hops(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim() {
        "true" => Ok(1),
        "false" => Ok(0),
        other => other.parse().map_err(|_| {
            ConfigError::ValidationError(format!("TRUST_PROXY has an invalid value: '{raw}'"))
        }),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}
