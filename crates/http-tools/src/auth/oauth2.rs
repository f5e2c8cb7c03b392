//! OAuth2 client-credentials token source.

use super::token_cache::TokenCache;
use crate::error::{HttpToolsError, Result};
use crate::safety::truncate_body;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;
const EXPIRY_SKEW: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Settings {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
    pub audience: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Fetches and caches client-credentials tokens. One instance is shared by every call that uses
/// the same authentication config.
#[derive(Debug)]
pub struct OAuth2ClientCredentials {
    settings: OAuth2Settings,
    cache: TokenCache,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl OAuth2ClientCredentials {
    #[must_use]
    pub fn new(settings: OAuth2Settings) -> Self {
        Self {
            settings,
            cache: TokenCache::new(),
            refresh_gate: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &OAuth2Settings {
        &self.settings
    }

    #[must_use]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Return a valid access token, fetching a new one when the cached one is missing or expired.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Authentication`] if the token endpoint is unreachable, answers
    /// non-2xx, or returns a body without `access_token`.
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        if let Some(token) = self.cache.get_token() {
            return Ok(token);
        }

        let _gate = self.refresh_gate.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cache.get_token() {
            return Ok(token);
        }

        let (token, lifetime) = self.fetch(client).await?;
        self.cache.set_token(token.clone(), lifetime);
        Ok(token)
    }

    async fn fetch(&self, client: &reqwest::Client) -> Result<(String, Duration)> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];
        if let Some(scope) = self.settings.scope.as_deref() {
            form.push(("scope", scope));
        }
        if let Some(audience) = self.settings.audience.as_deref() {
            form.push(("audience", audience));
        }

        debug!(token_url = %self.settings.token_url, "requesting oauth2 token");
        let response = client
            .post(&self.settings.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                HttpToolsError::Authentication(format!(
                    "token request failed: {}",
                    crate::safety::sanitize_reqwest_error(&e)
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpToolsError::Authentication(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                truncate_body(&text, MAX_ERROR_BODY_CHARS)
            )));
        }

        let payload: TokenResponse = response.json().await.map_err(|e| {
            HttpToolsError::Authentication(format!("token response invalid: {e}"))
        })?;
        if payload.access_token.is_empty() {
            return Err(HttpToolsError::Authentication(
                "token response has an empty access_token".to_string(),
            ));
        }

        let expires_in =
            Duration::from_secs(payload.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS));
        Ok((payload.access_token, effective_lifetime(expires_in)))
    }
}

/// Shave a little off long-lived tokens so they are refreshed before the server rejects them.
fn effective_lifetime(expires_in: Duration) -> Duration {
    if expires_in > EXPIRY_SKEW * 2 {
        expires_in - EXPIRY_SKEW
    } else {
        expires_in
    }
}
