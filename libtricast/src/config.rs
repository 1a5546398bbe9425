//! Configuration management for Tricast
//!
//! The config file holds one optional section per platform. A missing section
//! means the credentials for that platform are absent. Each adapter receives
//! its own section by value at construction and never reads the environment
//! afterwards.

use secrecy::{ExposeSecret, SecretBox};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::PlatformKind;

/// Credential value that never shows up in `Debug` output or logs
#[derive(Deserialize)]
#[serde(from = "String")]
pub struct Secret(SecretBox<str>);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Only call this when the value goes into a request
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for Secret {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    pub twitter: Option<TwitterConfig>,
    pub instagram: Option<InstagramConfig>,
    pub linkedin: Option<LinkedInConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsConfig {
    /// Platforms used when the caller names none
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Twitter credentials
///
/// The four OAuth 1.0a values give user context (read and write). A bearer
/// token alone gives read-only app context, which also needs `username` to
/// know whose profile and posts to read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TwitterConfig {
    pub api_key: Option<Secret>,
    pub api_secret: Option<Secret>,
    pub access_token: Option<Secret>,
    pub access_token_secret: Option<Secret>,
    pub bearer_token: Option<Secret>,
    pub username: Option<String>,
    /// API root override for proxies and test servers
    pub base_url: Option<String>,
}

/// Instagram Graph API credentials
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramConfig {
    pub access_token: Secret,
    /// Instagram Business or Creator account id; not the Facebook user id
    /// the token belongs to
    pub business_account_id: Option<String>,
    pub base_url: Option<String>,
}

/// LinkedIn credentials
#[derive(Debug, Clone, Deserialize)]
pub struct LinkedInConfig {
    pub access_token: Secret,
    /// Member id used for `urn:li:person:{id}`; looked up when absent
    pub person_id: Option<String>,
    pub base_url: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Whether a credential section exists for the platform
    pub fn has_credentials(&self, platform: PlatformKind) -> bool {
        match platform {
            PlatformKind::Twitter => self.twitter.is_some(),
            PlatformKind::Instagram => self.instagram.is_some(),
            PlatformKind::LinkedIn => self.linkedin.is_some(),
        }
    }

    /// Platforms that have a credential section, in stable order
    pub fn configured_platforms(&self) -> Vec<PlatformKind> {
        PlatformKind::ALL
            .into_iter()
            .filter(|p| self.has_credentials(*p))
            .collect()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("TRICAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("tricast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_CONFIG: &str = r#"
[http]
timeout_secs = 10

[defaults]
platforms = ["twitter", "li"]

[twitter]
api_key = "key"
api_secret = "secret"
access_token = "token"
access_token_secret = "token-secret"

[instagram]
access_token = "ig-token"
business_account_id = "17841400000000000"

[linkedin]
access_token = "li-token"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();

        assert_eq!(config.http.timeout(), Duration::from_secs(10));
        assert_eq!(config.defaults.platforms, vec!["twitter", "li"]);

        let twitter = config.twitter.as_ref().unwrap();
        assert_eq!(twitter.api_key.as_ref().unwrap().expose(), "key");
        assert!(twitter.bearer_token.is_none());

        let instagram = config.instagram.as_ref().unwrap();
        assert_eq!(
            instagram.business_account_id.as_deref(),
            Some("17841400000000000")
        );

        let linkedin = config.linkedin.as_ref().unwrap();
        assert!(linkedin.person_id.is_none());

        assert_eq!(config.configured_platforms(), PlatformKind::ALL.to_vec());
    }

    #[test]
    fn test_empty_config_has_no_credentials() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.configured_platforms().is_empty());
        assert!(!config.has_credentials(PlatformKind::Twitter));
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ig-token"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_parse_error() {
        let result = Config::from_toml_str("[twitter\napi_key = 1");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config"));
    }

    #[test]
    fn test_instagram_requires_token() {
        let result = Config::from_toml_str("[instagram]\nbusiness_account_id = \"1\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_path() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL_CONFIG.as_bytes()).unwrap();

        let config = Config::load_from_path(file.path()).unwrap();
        assert!(config.linkedin.is_some());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load_from_path(Path::new("/nonexistent/tricast/config.toml"));
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file"));
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        std::env::set_var("TRICAST_CONFIG", "/tmp/tricast-test/config.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("TRICAST_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/tricast-test/config.toml"));
    }
}
