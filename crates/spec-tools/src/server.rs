//! A compiled registry bound to a request binder and an HTTP executor.

use crate::config::BuildConfig;
use crate::error::Result;
use crate::loader::load_registry;
use crate::registry::ToolRegistry;
use rmcp::model::{CallToolResult, ErrorData, JsonObject, Prompt, Resource, Tool};
use specbridge_http_tools::executor::default_user_agent;
use specbridge_http_tools::{
    AuthenticatorRegistry, ExecutorConfig, HttpExecutor, HttpToolsError, RequestBinder,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cheap to clone; every clone shares the registry, the HTTP client and the token cache.
#[derive(Debug, Clone)]
pub struct ToolServer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    registry: Arc<ToolRegistry>,
    binder: RequestBinder,
    executor: HttpExecutor,
}

impl ToolServer {
    /// Wire an already compiled registry to the call-time runtime described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the authentication settings are invalid or the HTTP client cannot be
    /// built.
    pub fn new(
        config: &BuildConfig,
        registry: impl Into<Arc<ToolRegistry>>,
        authenticators: &AuthenticatorRegistry,
    ) -> Result<Self> {
        let executor = build_executor(config, authenticators)?;
        Ok(Self::assemble(config, registry.into(), executor))
    }

    /// Load the spec named by `config`, compile it, and wire the result. The spec is fetched
    /// with the same HTTP client that later serves tool calls.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid authentication settings or a compilation failure. A spec
    /// that cannot be loaded yields a server with zero tools.
    pub async fn from_config(
        config: &BuildConfig,
        authenticators: &AuthenticatorRegistry,
    ) -> Result<Self> {
        let executor = build_executor(config, authenticators)?;
        let registry = load_registry(config, executor.client()).await?;
        Ok(Self::assemble(config, Arc::new(registry), executor))
    }

    fn assemble(config: &BuildConfig, registry: Arc<ToolRegistry>, executor: HttpExecutor) -> Self {
        let binder = RequestBinder::new(registry.base_url())
            .with_server_headers(config.server_headers.clone())
            .with_default_path_parameters(config.default_path_parameters.clone())
            .with_user_agent(user_agent(config));
        Self {
            inner: Arc::new(Inner {
                registry,
                binder,
                executor,
            }),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        self.inner.registry.list_mcp_tools()
    }

    #[must_use]
    pub fn list_resources(&self) -> Vec<Resource> {
        self.inner.registry.list_mcp_resources()
    }

    #[must_use]
    pub fn list_prompts(&self) -> Vec<Prompt> {
        self.inner.registry.list_mcp_prompts()
    }

    /// Bind `arguments` to the named tool and execute it.
    ///
    /// # Errors
    ///
    /// Returns `INVALID_PARAMS` for an unknown tool, missing required parameters or values
    /// that do not fit their schema; `INTERNAL_ERROR` for remote, transport, authentication
    /// and cancellation failures.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: JsonObject,
        cancel: &CancellationToken,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let Some(tool) = self.inner.registry.get(name) else {
            return Err(HttpToolsError::ToolNotFound(name.to_string()).into());
        };

        tracing::debug!(tool = %name, "Calling tool");
        let executor = &self.inner.executor;
        let prepared = self
            .inner
            .binder
            .bind(tool, arguments, executor.authenticator())?;
        executor
            .execute(tool, &prepared, cancel)
            .await
            .map_err(|e| {
                tracing::debug!(tool = %name, error = %e, "Tool call failed");
                e.into()
            })
    }
}

fn user_agent(config: &BuildConfig) -> String {
    config.user_agent.clone().unwrap_or_else(default_user_agent)
}

fn build_executor(
    config: &BuildConfig,
    authenticators: &AuthenticatorRegistry,
) -> Result<HttpExecutor> {
    let authenticator = config
        .authentication
        .as_ref()
        .map(|auth| authenticators.create(auth))
        .transpose()?;
    let executor_config = ExecutorConfig {
        timeout: config.timeout(),
        user_agent: user_agent(config),
    };
    Ok(HttpExecutor::new(&executor_config, authenticator)?)
}
