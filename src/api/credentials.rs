//! Authorization header providers
//!
//! Deployments authenticate either with a static API key or with a bearer
//! session token. Both sit behind [`CredentialProvider`], chosen once from
//! [`CredentialConfig`] when the client is built.

use crate::config::CredentialConfig;
use crate::error::{ClientError, ClientResult};
use std::sync::{Arc, PoisonError, RwLock};

pub trait CredentialProvider: Send + Sync {
    /// Value for the `Authorization` header of the next request.
    fn authorization(&self) -> ClientResult<String>;

    /// Scheme name, for logging.
    fn scheme(&self) -> &'static str;
}

/// `Authorization: ApiKey <key>`
#[derive(Debug, Clone)]
pub struct ApiKeyCredential {
    key: String,
}

impl ApiKeyCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl CredentialProvider for ApiKeyCredential {
    fn authorization(&self) -> ClientResult<String> {
        Ok(format!("ApiKey {}", self.key))
    }

    fn scheme(&self) -> &'static str {
        "ApiKey"
    }
}

/// `Authorization: Bearer <token>` for an externally managed session.
///
/// The session owner swaps the token through [`BearerCredential::set_token`];
/// requests made while no session is active fail with
/// [`ClientError::MissingCredential`] before anything is sent.
#[derive(Debug, Default)]
pub struct BearerCredential {
    token: RwLock<Option<String>>,
}

impl BearerCredential {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

impl CredentialProvider for BearerCredential {
    fn authorization(&self) -> ClientResult<String> {
        let token = self.token.read().unwrap_or_else(PoisonError::into_inner);
        match token.as_deref() {
            Some(token) if !token.is_empty() => Ok(format!("Bearer {}", token)),
            _ => Err(ClientError::MissingCredential),
        }
    }

    fn scheme(&self) -> &'static str {
        "Bearer"
    }
}

pub fn provider_from_config(config: &CredentialConfig) -> Arc<dyn CredentialProvider> {
    match config {
        CredentialConfig::ApiKey { key } => Arc::new(ApiKeyCredential::new(key.clone())),
        CredentialConfig::Bearer { token } => Arc::new(BearerCredential::new(token.clone())),
    }
}
