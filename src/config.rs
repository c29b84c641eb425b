//! Configuration system for the feed client
//!
//! Configuration is read from a TOML file with a `[feed]` section (endpoint and
//! credential source) and an optional `[session]` section (lifecycle tuning).
//! Every session field has a default, so a minimal file only names where the
//! API key comes from.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Production feed endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://ws-v4.fcsapi.com/ws";

/// Environment variable consulted for the API key when none is set inline
pub const DEFAULT_API_KEY_ENV: &str = "FCS_API_KEY";

/// Query parameter carrying the credential on the session URL
pub const CREDENTIAL_QUERY_PARAM: &str = "access_key";

/// Main client configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FeedConfig {
    #[serde(default)]
    pub feed: FeedSection,
    #[serde(default)]
    pub session: SessionSettings,
}

/// Feed section - endpoint and credential source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedSection {
    /// WebSocket endpoint, `ws://` or `wss://`
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Inline API key. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Environment variable containing the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// Session lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSettings {
    /// Minutes in the background before the connection is suspended (0 disables)
    #[serde(default = "default_suspend_timeout_mins")]
    pub suspend_timeout_mins: u64,
    /// Fixed delay between automatic reconnect attempts
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Automatic reconnect attempts allowed before giving up
    #[serde(default = "default_reconnect_limit")]
    pub reconnect_limit: u32,
    /// Period of the application-level heartbeat
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            suspend_timeout_mins: default_suspend_timeout_mins(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_limit: default_reconnect_limit(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
        }
    }
}

impl SessionSettings {
    pub fn suspend_timeout(&self) -> Duration {
        Duration::from_secs(self.suspend_timeout_mins.saturating_mul(60))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_suspend_timeout_mins() -> u64 {
    3
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_reconnect_limit() -> u32 {
    5
}

fn default_heartbeat_interval_secs() -> u64 {
    25
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl FeedConfig {
    /// Configuration with an inline credential and default everything else
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            feed: FeedSection {
                api_key: Some(api_key.into()),
                ..FeedSection::default()
            },
            session: SessionSettings::default(),
        }
    }

    /// Load configuration from a TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FeedConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override the endpoint
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.feed.endpoint = endpoint.into();
        self
    }

    /// Override the session settings
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Check field consistency without touching the environment
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_endpoint(&self.feed.endpoint)?;

        if self.session.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.feed.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "api_key_env must name an environment variable".to_string(),
            ));
        }

        Ok(())
    }

    /// Resolve the credential: inline key first, then the named environment variable.
    /// Empty values count as absent.
    pub fn credential(&self) -> Option<String> {
        self.feed
            .api_key
            .clone()
            .or_else(|| std::env::var(&self.feed.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }

    /// Build the session URL with the credential embedded as a query parameter
    pub fn session_url(&self, credential: &str) -> Result<Url, ConfigError> {
        let mut url = parse_endpoint(&self.feed.endpoint)?;
        url.query_pairs_mut()
            .append_pair(CREDENTIAL_QUERY_PARAM, credential);
        Ok(url)
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(endpoint).map_err(|_| ConfigError::InvalidEndpoint(endpoint.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ConfigError::InvalidEndpoint(format!(
            "{endpoint} (unsupported scheme '{other}', expected ws or wss)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml_content = r#"
[feed]
api_key_env = "MY_FEED_KEY"
"#;

        let config = FeedConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.feed.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.feed.api_key_env, "MY_FEED_KEY");
        assert_eq!(config.session, SessionSettings::default());
        assert_eq!(config.session.suspend_timeout_mins, 3);
        assert_eq!(config.session.reconnect_delay_ms, 3000);
        assert_eq!(config.session.reconnect_limit, 5);
        assert_eq!(config.session.heartbeat_interval_secs, 25);
    }

    #[test]
    fn test_empty_config_is_valid() {
        let config = FeedConfig::from_toml_str("").unwrap();
        assert_eq!(config, FeedConfig::default());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[feed]
endpoint = "ws://localhost:9000/ws"
api_key = "inline-key"

[session]
suspend_timeout_mins = 0
reconnect_delay_ms = 500
reconnect_limit = 2
heartbeat_interval_secs = 10
"#;

        let config = FeedConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.feed.endpoint, "ws://localhost:9000/ws");
        assert_eq!(config.credential().as_deref(), Some("inline-key"));
        assert_eq!(config.session.suspend_timeout(), Duration::ZERO);
        assert_eq!(config.session.reconnect_delay(), Duration::from_millis(500));
        assert_eq!(config.session.heartbeat_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_suspend_timeout_converts_minutes() {
        let settings = SessionSettings::default();
        assert_eq!(settings.suspend_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_rejects_non_websocket_endpoint() {
        let toml_content = r#"
[feed]
endpoint = "https://example.com/ws"
"#;
        let result = FeedConfig::from_toml_str(toml_content);
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_rejects_unparseable_endpoint() {
        let config = FeedConfig::new("key").with_endpoint("not a url");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_rejects_zero_heartbeat() {
        let config = FeedConfig::new("key").with_session(SessionSettings {
            heartbeat_interval_secs: 0,
            ..SessionSettings::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_session_url_embeds_credential() {
        let config = FeedConfig::new("demo");
        let url = config.session_url("demo").unwrap();
        assert_eq!(url.as_str(), "wss://ws-v4.fcsapi.com/ws?access_key=demo");
    }

    #[test]
    fn test_session_url_keeps_existing_query() {
        let config = FeedConfig::new("k").with_endpoint("ws://localhost:9000/ws?region=eu");
        let url = config.session_url("k").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:9000/ws?region=eu&access_key=k");
    }

    #[test]
    fn test_credential_from_environment() {
        let mut config = FeedConfig::default();
        config.feed.api_key_env = "FCS_FEED_CONFIG_TEST_KEY".to_string();

        std::env::set_var("FCS_FEED_CONFIG_TEST_KEY", "from-env");
        assert_eq!(config.credential().as_deref(), Some("from-env"));

        std::env::remove_var("FCS_FEED_CONFIG_TEST_KEY");
        assert_eq!(config.credential(), None);
    }

    #[test]
    fn test_blank_inline_key_counts_as_missing() {
        let mut config = FeedConfig::new("   ");
        config.feed.api_key_env = "FCS_FEED_CONFIG_UNSET_KEY".to_string();
        assert_eq!(config.credential(), None);
    }

    #[test]
    fn test_inline_key_is_not_serialized() {
        let config = FeedConfig::new("super-secret");
        let rendered = toml::to_string(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("api_key_env"));
    }
}
