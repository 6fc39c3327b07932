use std::env;
use std::fmt;

pub const DEFAULT_API_BASE: &str = "https://api.stability.ai";
pub const API_KEY_ENV: &str = "STABILITY_API_KEY";
pub const API_BASE_ENV: &str = "STABILITY_API_BASE";

/// Connection settings for the image service.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    api_base: String,
    api_key: Option<String>,
}

impl ClientConfig {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: normalize_base(&api_base.into()),
            api_key: api_key
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            non_empty_env(API_BASE_ENV).unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            non_empty_env(API_KEY_ENV),
        )
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let api_key = api_key.into();
        let trimmed = api_key.trim();
        self.api_key = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = normalize_base(&api_base.into());
        self
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, None)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn normalize_base(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_API_BASE.to_string();
    }
    trimmed.to_string()
}

/// Reads an environment variable, treating blank values as unset.
pub fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
