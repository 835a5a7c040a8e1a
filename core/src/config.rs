use chrono::TimeDelta;

use crate::error::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.example.com";
pub const DEFAULT_API_KEY: &str = "your-api-key-here";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 100;
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
pub const USER_AGENT: &str = concat!("apibridge-mcp/", env!("CARGO_PKG_VERSION"));

// Keeps second counts inside what `TimeDelta::seconds` accepts.
const MAX_DURATION_SECS: u64 = i32::MAX as u64;

/// Settings for the outbound request path.
#[derive(Clone)]
pub struct BridgeConfig {
    pub api_base_url: String,
    pub api_key: String,
    pub cache_ttl_secs: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            rate_limit_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            rate_limit_window_secs: RATE_LIMIT_WINDOW_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(&self.api_base_url).map_err(|e| {
            ConfigError::InvalidBaseUrl {
                url: self.api_base_url.clone(),
                reason: e.to_string(),
            }
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: self.api_base_url.clone(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if self.rate_limit_requests == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        if self.rate_limit_window_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "rate_limit_window_secs",
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration {
                field: "request_timeout_secs",
            });
        }
        Ok(())
    }

    /// Zero disables caching: every entry is already stale when read.
    pub fn cache_ttl(&self) -> TimeDelta {
        seconds(self.cache_ttl_secs)
    }

    pub fn rate_limit_window(&self) -> TimeDelta {
        seconds(self.rate_limit_window_secs)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }

    /// `{base}/{endpoint}` with slashes at the seam collapsed to one.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

fn seconds(secs: u64) -> TimeDelta {
    TimeDelta::seconds(secs.min(MAX_DURATION_SECS) as i64)
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &"<redacted>")
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache_ttl(), TimeDelta::seconds(300));
        assert_eq!(config.rate_limit_window(), TimeDelta::seconds(60));
        assert_eq!(config.request_timeout().as_secs(), 30);
        assert!(config.user_agent.starts_with("apibridge-mcp/"));
    }

    #[test]
    fn endpoint_url_strips_leading_slashes() {
        let config = BridgeConfig {
            api_base_url: "https://api.test/v2/".to_string(),
            ..BridgeConfig::default()
        };
        assert_eq!(config.endpoint_url("//users/1"), "https://api.test/v2/users/1");
        assert_eq!(config.endpoint_url("health"), "https://api.test/v2/health");
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let bad_url = BridgeConfig {
            api_base_url: "not a url".to_string(),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            bad_url.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let ftp = BridgeConfig {
            api_base_url: "ftp://files.test".to_string(),
            ..BridgeConfig::default()
        };
        assert!(matches!(
            ftp.validate(),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let no_budget = BridgeConfig {
            rate_limit_requests: 0,
            ..BridgeConfig::default()
        };
        assert_eq!(no_budget.validate(), Err(ConfigError::ZeroRateLimit));
    }

    #[test]
    fn debug_output_hides_api_key() {
        let config = BridgeConfig {
            api_key: "secret-token".to_string(),
            ..BridgeConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted>"));
    }
}
