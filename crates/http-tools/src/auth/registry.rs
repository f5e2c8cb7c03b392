use super::{ApiKeyLocation, Authenticator, CustomAuthenticator, OAuth2ClientCredentials, OAuth2Settings};
use crate::error::{HttpToolsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// `{type, settings}` as it appears in a build config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type")]
    pub auth_type: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(auth_type: impl Into<String>) -> Self {
        Self {
            auth_type: auth_type.into(),
            settings: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    fn setting(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.setting(key).map(str::to_string).ok_or_else(|| {
            HttpToolsError::Config(format!(
                "authentication '{}' requires setting '{key}'",
                self.auth_type
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigKey {
    pub key: String,
    pub description: String,
    pub required: bool,
}

impl ConfigKey {
    fn required(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            required: true,
        }
    }

    fn optional(key: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            required: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTypeInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub type_id: String,
    pub config_keys: Vec<ConfigKey>,
}

pub type AuthFactory = Arc<dyn Fn(&AuthConfig) -> Result<Authenticator> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    info: AuthTypeInfo,
    factory: AuthFactory,
}

/// Authenticator types known to a process. Built once at startup and passed to whatever needs
/// to construct authenticators.
#[derive(Clone, Default)]
pub struct AuthenticatorRegistry {
    entries: BTreeMap<String, Entry>,
    aliases: HashMap<String, String>,
}

impl fmt::Debug for AuthenticatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatorRegistry")
            .field("types", &self.entries.keys().collect::<Vec<_>>())
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl AuthenticatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register(
            AuthTypeInfo {
                name: "API Key".to_string(),
                description: "Static API key sent as a header or query parameter".to_string(),
                type_id: "api_key".to_string(),
                config_keys: vec![
                    ConfigKey::required("apiKey", "The API key value"),
                    ConfigKey::optional(
                        "paramName",
                        "Header or query parameter name (default X-API-Key)",
                    ),
                    ConfigKey::optional("location", "'header' (default) or 'query'"),
                ],
            },
            Arc::new(|config: &AuthConfig| -> Result<Authenticator> {
                let location = match config.setting("location").map(str::to_ascii_lowercase) {
                    None => ApiKeyLocation::Header,
                    Some(l) if l == "header" => ApiKeyLocation::Header,
                    Some(l) if l == "query" => ApiKeyLocation::Query,
                    Some(other) => {
                        return Err(HttpToolsError::Config(format!(
                            "api_key location must be 'header' or 'query', got '{other}'"
                        )));
                    }
                };
                Ok(Authenticator::ApiKey {
                    name: config.setting("paramName").unwrap_or("X-API-Key").to_string(),
                    value: config.require("apiKey")?,
                    location,
                })
            }),
        );

        registry.register(
            AuthTypeInfo {
                name: "Basic".to_string(),
                description: "HTTP Basic authentication".to_string(),
                type_id: "basic".to_string(),
                config_keys: vec![
                    ConfigKey::required("username", "User name"),
                    ConfigKey::required("password", "Password"),
                ],
            },
            Arc::new(|config: &AuthConfig| -> Result<Authenticator> {
                Ok(Authenticator::Basic {
                    username: config.require("username")?,
                    password: config.require("password")?,
                })
            }),
        );

        registry.register(
            AuthTypeInfo {
                name: "Bearer Token".to_string(),
                description: "Static bearer token in the Authorization header".to_string(),
                type_id: "bearer".to_string(),
                config_keys: vec![ConfigKey::required("token", "The bearer token")],
            },
            Arc::new(|config: &AuthConfig| -> Result<Authenticator> {
                Ok(Authenticator::Bearer {
                    token: config.require("token")?,
                })
            }),
        );

        registry.register(
            AuthTypeInfo {
                name: "Custom Header".to_string(),
                description: "Arbitrary header carrying a credential".to_string(),
                type_id: "custom_header".to_string(),
                config_keys: vec![
                    ConfigKey::required("headerName", "Header name"),
                    ConfigKey::required("headerValue", "Header value"),
                ],
            },
            Arc::new(|config: &AuthConfig| -> Result<Authenticator> {
                Ok(Authenticator::CustomHeader {
                    name: config.require("headerName")?,
                    value: config.require("headerValue")?,
                })
            }),
        );

        registry.register(
            AuthTypeInfo {
                name: "OAuth2 Client Credentials".to_string(),
                description: "OAuth2 client-credentials grant with a cached access token"
                    .to_string(),
                type_id: "oauth2".to_string(),
                config_keys: vec![
                    ConfigKey::required("tokenUrl", "Token endpoint URL"),
                    ConfigKey::required("clientId", "Client id"),
                    ConfigKey::required("clientSecret", "Client secret"),
                    ConfigKey::optional("scope", "Space-separated scopes"),
                    ConfigKey::optional("audience", "Token audience"),
                ],
            },
            Arc::new(|config: &AuthConfig| -> Result<Authenticator> {
                let settings = OAuth2Settings {
                    token_url: config.require("tokenUrl")?,
                    client_id: config.require("clientId")?,
                    client_secret: config.require("clientSecret")?,
                    scope: config.setting("scope").map(str::to_string),
                    audience: config.setting("audience").map(str::to_string),
                };
                Ok(Authenticator::OAuth2(Arc::new(
                    OAuth2ClientCredentials::new(settings),
                )))
            }),
        );

        registry.alias("apikey", "api_key");
        registry.alias("header", "custom_header");
        registry.alias("oauth2_client_credentials", "oauth2");
        registry
    }

    /// Register (or replace) an authenticator type.
    pub fn register(&mut self, info: AuthTypeInfo, factory: AuthFactory) {
        let key = info.type_id.to_ascii_lowercase();
        self.entries.insert(key, Entry { info, factory });
    }

    /// Register a custom type whose instances are [`Authenticator::Custom`].
    pub fn register_custom<F>(&mut self, info: AuthTypeInfo, build: F)
    where
        F: Fn(&AuthConfig) -> Result<Arc<dyn CustomAuthenticator>> + Send + Sync + 'static,
    {
        self.register(
            info,
            Arc::new(move |config: &AuthConfig| build(config).map(Authenticator::Custom)),
        );
    }

    pub fn alias(&mut self, alias: &str, type_id: &str) {
        self.aliases
            .insert(alias.to_ascii_lowercase(), type_id.to_ascii_lowercase());
    }

    fn entry(&self, auth_type: &str) -> Option<&Entry> {
        let key = auth_type.trim().to_ascii_lowercase();
        let key = self.aliases.get(&key).cloned().unwrap_or(key);
        self.entries.get(&key)
    }

    /// Build an authenticator, checking every required setting first.
    ///
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] for an unknown type or missing required settings.
    pub fn create(&self, config: &AuthConfig) -> Result<Authenticator> {
        let entry = self.entry(&config.auth_type).ok_or_else(|| {
            HttpToolsError::Config(format!(
                "unknown authentication type '{}' (available: {})",
                config.auth_type,
                self.entries.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;

        let missing: Vec<&str> = entry
            .info
            .config_keys
            .iter()
            .filter(|k| k.required && config.setting(&k.key).is_none())
            .map(|k| k.key.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(HttpToolsError::Config(format!(
                "authentication '{}' is missing required settings: {}",
                entry.info.type_id,
                missing.join(", ")
            )));
        }

        (entry.factory)(config)
    }

    /// Registered types, sorted by type id.
    #[must_use]
    pub fn list_available(&self) -> Vec<AuthTypeInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthInjection;
    use async_trait::async_trait;

    #[test]
    fn builtins_are_listed_in_type_order() {
        let ids: Vec<String> = AuthenticatorRegistry::with_builtins()
            .list_available()
            .into_iter()
            .map(|i| i.type_id)
            .collect();
        assert_eq!(
            ids,
            vec!["api_key", "basic", "bearer", "custom_header", "oauth2"]
        );
    }

    #[test]
    fn create_reports_every_missing_required_key() {
        let registry = AuthenticatorRegistry::with_builtins();
        let err = registry
            .create(&AuthConfig::new("oauth2").with("tokenUrl", "http://x/token"))
            .expect_err("missing client credentials");
        let msg = err.to_string();
        assert!(msg.contains("clientId"), "{msg}");
        assert!(msg.contains("clientSecret"), "{msg}");
    }

    #[test]
    fn aliases_and_case_are_accepted() {
        let registry = AuthenticatorRegistry::with_builtins();
        let auth = registry
            .create(&AuthConfig::new("ApiKey").with("apiKey", "k"))
            .expect("api key");
        match auth {
            Authenticator::ApiKey {
                name,
                value,
                location,
            } => {
                assert_eq!(name, "X-API-Key");
                assert_eq!(value, "k");
                assert_eq!(location, ApiKeyLocation::Header);
            }
            other => panic!("unexpected authenticator: {other:?}"),
        }

        let auth = registry
            .create(
                &AuthConfig::new("header")
                    .with("headerName", "X-Token")
                    .with("headerValue", "v"),
            )
            .expect("custom header");
        assert_eq!(auth.type_id(), "custom_header");
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let err = AuthenticatorRegistry::with_builtins()
            .create(&AuthConfig::new("kerberos"))
            .expect_err("unknown type");
        assert!(matches!(err, HttpToolsError::Config(_)));
    }

    #[derive(Debug)]
    struct Signed;

    #[async_trait]
    impl CustomAuthenticator for Signed {
        fn type_id(&self) -> &str {
            "signed"
        }

        async fn injection(&self, _client: &reqwest::Client) -> Result<AuthInjection> {
            Ok(AuthInjection::header("X-Signature", "sig"))
        }
    }

    #[tokio::test]
    async fn custom_types_can_be_registered() {
        let mut registry = AuthenticatorRegistry::with_builtins();
        registry.register_custom(
            AuthTypeInfo {
                name: "Signed".to_string(),
                description: "Request signing".to_string(),
                type_id: "signed".to_string(),
                config_keys: Vec::new(),
            },
            |_config| Ok(Arc::new(Signed) as Arc<dyn CustomAuthenticator>),
        );

        let auth = registry
            .create(&AuthConfig::new("signed"))
            .expect("custom authenticator");
        assert_eq!(auth.type_id(), "signed");
        let injection = auth
            .injection(&reqwest::Client::new())
            .await
            .expect("injection");
        assert_eq!(
            injection.headers,
            vec![("X-Signature".to_string(), "sig".to_string())]
        );
        assert_eq!(registry.list_available().len(), 6);
    }
}
