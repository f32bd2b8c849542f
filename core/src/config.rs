//! Client configuration.
//!
//! The host supplies the API token and base URL once; the client never
//! mutates them afterwards.

use std::fmt;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "https://api.teamup.com";
pub const DEFAULT_TZ: &str = "America/London";

pub const ENV_API_TOKEN: &str = "TEAMUP_API_TOKEN";
pub const ENV_BASE_URL: &str = "TEAMUP_BASE_URL";
pub const ENV_TZ: &str = "TEAMUP_TZ";

#[derive(Clone, PartialEq, Eq)]
pub struct TeamUpConfig {
    api_token: String,
    base_url: String,
    default_tz: String,
}

impl TeamUpConfig {
    pub fn new(api_token: impl Into<String>, base_url: &str) -> Self {
        Self {
            api_token: api_token.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_tz: DEFAULT_TZ.to_string(),
        }
    }

    pub fn with_default_tz(mut self, tz: impl Into<String>) -> Self {
        self.default_tz = tz.into();
        self
    }

    /// Read `TEAMUP_API_TOKEN`, `TEAMUP_BASE_URL` and `TEAMUP_TZ`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_token = lookup(ENV_API_TOKEN)
            .filter(|token| !token.is_empty())
            .ok_or(ConfigError::Missing(ENV_API_TOKEN))?;
        let base_url = lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let config = Self::new(api_token, &base_url);

        Ok(match lookup(ENV_TZ) {
            Some(tz) if !tz.is_empty() => config.with_default_tz(tz),
            _ => config,
        })
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_tz(&self) -> &str {
        &self.default_tz
    }
}

impl fmt::Debug for TeamUpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TeamUpConfig")
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("default_tz", &self.default_tz)
            .finish()
    }
}
