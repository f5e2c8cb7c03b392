//! Outbound request authentication.
//!
//! Built-in schemes are a closed enum; anything else plugs in through [`CustomAuthenticator`]
//! and the [`AuthenticatorRegistry`].

mod oauth2;
mod registry;
mod token_cache;

pub use oauth2::{OAuth2ClientCredentials, OAuth2Settings};
pub use registry::{AuthConfig, AuthFactory, AuthTypeInfo, AuthenticatorRegistry, ConfigKey};
pub use token_cache::TokenCache;

use crate::error::Result;
use async_trait::async_trait;
use base64::Engine as _;
use std::fmt;
use std::sync::Arc;

/// Headers and query pairs an authenticator contributes to one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInjection {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl AuthInjection {
    #[must_use]
    pub fn header(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: vec![(name.into(), value.into())],
            query: Vec::new(),
        }
    }

    #[must_use]
    pub fn query(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            headers: Vec::new(),
            query: vec![(name.into(), value.into())],
        }
    }
}

/// Extension point for authentication schemes that are not built in.
#[async_trait]
pub trait CustomAuthenticator: Send + Sync + fmt::Debug {
    fn type_id(&self) -> &str;

    /// Produce the headers/query pairs for the next request.
    async fn injection(&self, client: &reqwest::Client) -> Result<AuthInjection>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
}

#[derive(Debug, Clone)]
pub enum Authenticator {
    ApiKey {
        name: String,
        value: String,
        location: ApiKeyLocation,
    },
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    CustomHeader {
        name: String,
        value: String,
    },
    OAuth2(Arc<OAuth2ClientCredentials>),
    Custom(Arc<dyn CustomAuthenticator>),
}

impl Authenticator {
    #[must_use]
    pub fn type_id(&self) -> &str {
        match self {
            Self::ApiKey { .. } => "api_key",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
            Self::CustomHeader { .. } => "custom_header",
            Self::OAuth2(_) => "oauth2",
            Self::Custom(custom) => custom.type_id(),
        }
    }

    /// Bearer token already sitting in a cache, without triggering a fetch.
    #[must_use]
    pub fn cached_bearer(&self) -> Option<String> {
        match self {
            Self::OAuth2(source) => source.cache().get_token(),
            _ => None,
        }
    }

    /// Header names this authenticator writes; their values are redacted in dry runs.
    #[must_use]
    pub fn sensitive_headers(&self) -> Vec<String> {
        match self {
            Self::ApiKey {
                name,
                location: ApiKeyLocation::Header,
                ..
            }
            | Self::CustomHeader { name, .. } => vec![name.clone()],
            _ => Vec::new(),
        }
    }

    /// Resolve what this authenticator adds to the outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HttpToolsError::Authentication`] when a token cannot be obtained.
    pub async fn injection(&self, client: &reqwest::Client) -> Result<AuthInjection> {
        Ok(match self {
            Self::ApiKey {
                name,
                value,
                location: ApiKeyLocation::Header,
            } => AuthInjection::header(name.clone(), value.clone()),
            Self::ApiKey {
                name,
                value,
                location: ApiKeyLocation::Query,
            } => AuthInjection::query(name.clone(), value.clone()),
            Self::Basic { username, password } => {
                let encoded = base64::engine::general_purpose::STANDARD
                    .encode(format!("{username}:{password}"));
                AuthInjection::header("Authorization", format!("Basic {encoded}"))
            }
            Self::Bearer { token } => {
                AuthInjection::header("Authorization", format!("Bearer {token}"))
            }
            Self::CustomHeader { name, value } => {
                AuthInjection::header(name.clone(), value.clone())
            }
            Self::OAuth2(source) => {
                let token = source.access_token(client).await?;
                AuthInjection::header("Authorization", format!("Bearer {token}"))
            }
            Self::Custom(custom) => custom.injection(client).await?,
        })
    }
}
