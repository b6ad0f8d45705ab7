//! Client configuration
//!
//! Values come from `DROPLITE_*` environment variables with defaults that
//! match a local development server; the console binary layers its flags on
//! top.

use crate::error::{ClientError, ClientResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://localhost:8080";
pub const DEFAULT_API_KEY: &str = "dev-api-key-123456";
/// Largest file the server accepts (100 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 4;
pub const DEFAULT_TASK_RETENTION_SECS: u64 = 60;

/// Which authorization scheme requests carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CredentialConfig {
    ApiKey { key: String },
    Bearer { token: Option<String> },
}

impl Default for CredentialConfig {
    fn default() -> Self {
        CredentialConfig::ApiKey {
            key: DEFAULT_API_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base: String,
    pub credential: CredentialConfig,
    pub max_upload_bytes: u64,
    pub max_concurrent_uploads: usize,
    pub task_retention_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            credential: CredentialConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            task_retention_secs: DEFAULT_TASK_RETENTION_SECS,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. `DROPLITE_AUTH` picks the scheme
    /// explicitly; otherwise a session token selects bearer auth.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = ClientConfig::default();

        if let Some(base) = get("DROPLITE_API_BASE") {
            config.api_base = base.trim_end_matches('/').to_string();
        }

        let api_key = get("DROPLITE_API_KEY");
        let token = get("DROPLITE_SESSION_TOKEN");
        let strategy = get("DROPLITE_AUTH").unwrap_or_else(|| {
            if token.is_some() {
                "bearer".to_string()
            } else {
                "api_key".to_string()
            }
        });
        config.credential = build_credential_config(&strategy, api_key, token)?;

        if let Some(value) = get("DROPLITE_MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_number("DROPLITE_MAX_UPLOAD_BYTES", &value)?;
        }
        if let Some(value) = get("DROPLITE_MAX_CONCURRENT_UPLOADS") {
            config.max_concurrent_uploads =
                parse_number("DROPLITE_MAX_CONCURRENT_UPLOADS", &value)?;
        }
        if let Some(value) = get("DROPLITE_TASK_RETENTION_SECS") {
            config.task_retention_secs = parse_number("DROPLITE_TASK_RETENTION_SECS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.api_base.trim().is_empty() {
            return Err(ClientError::Config("API base URL is required".to_string()));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(ClientError::Config(
                "max_concurrent_uploads must be at least 1".to_string(),
            ));
        }
        if let CredentialConfig::ApiKey { key } = &self.credential {
            if key.trim().is_empty() {
                return Err(ClientError::Config("API key must not be empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }
}

pub fn build_credential_config(
    strategy: &str,
    api_key: Option<String>,
    token: Option<String>,
) -> ClientResult<CredentialConfig> {
    match strategy {
        "api_key" | "apikey" => Ok(CredentialConfig::ApiKey {
            key: api_key.unwrap_or_else(|| DEFAULT_API_KEY.to_string()),
        }),
        "bearer" | "session" => Ok(CredentialConfig::Bearer { token }),
        other => Err(ClientError::Config(format!(
            "Unsupported auth strategy: {}",
            other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> ClientResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ClientError::Config(format!("{} must be a number, got {:?}", name, value)))
}
