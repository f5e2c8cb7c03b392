//! HTTP round-trip for bound tool calls.

use crate::auth::Authenticator;
use crate::binder::{PreparedRequest, upsert_header, value_to_string};
use crate::error::{HttpToolsError, Result};
use crate::model::ToolInfo;
use crate::safety::redact_url;
use base64::Engine as _;
use mime::Mime;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use rmcp::model::{CallToolResult, Content};
use serde_json::{Value, json};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[must_use]
pub fn default_user_agent() -> String {
    format!("specbridge/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// `None` disables the client timeout.
    pub timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_TIMEOUT),
            user_agent: default_user_agent(),
        }
    }
}

/// Owns the shared HTTP client and the authenticator used for every call.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
    authenticator: Option<Authenticator>,
}

impl HttpExecutor {
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &ExecutorConfig, authenticator: Option<Authenticator>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| HttpToolsError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            authenticator,
        })
    }

    #[must_use]
    pub fn with_client(client: Client, authenticator: Option<Authenticator>) -> Self {
        Self {
            client,
            authenticator,
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_ref()
    }

    /// Send `request` (or describe it, for dry runs) and normalize the response.
    ///
    /// # Errors
    ///
    /// - [`HttpToolsError::RemoteHttp`] for non-2xx responses.
    /// - [`HttpToolsError::Transport`] for network failures and timeouts.
    /// - [`HttpToolsError::Authentication`] if the authenticator cannot produce credentials.
    /// - [`HttpToolsError::Cancelled`] if `cancel` fires first.
    pub async fn execute(
        &self,
        tool: &ToolInfo,
        request: &PreparedRequest,
        cancel: &CancellationToken,
    ) -> Result<CallToolResult> {
        if request.dry_run {
            return Ok(self.describe(request));
        }

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(HttpToolsError::Cancelled),
            r = self.send(request) => r?,
        };
        normalize_response(tool, response)
    }

    fn describe(&self, request: &PreparedRequest) -> CallToolResult {
        let extra = self
            .authenticator
            .as_ref()
            .map(Authenticator::sensitive_headers)
            .unwrap_or_default();
        let description = request.describe(&extra);
        let text =
            serde_json::to_string_pretty(&description).unwrap_or_else(|_| description.to_string());
        CallToolResult::success(vec![Content::text(text)])
    }

    async fn send(&self, request: &PreparedRequest) -> Result<RawResponse> {
        let mut query = request.query.clone();
        let mut headers = request.headers.clone();

        // Authentication goes last so it wins over anything the call supplied.
        if let Some(auth) = &self.authenticator {
            let injection = auth.injection(&self.client).await?;
            for (k, v) in injection.headers {
                upsert_header(&mut headers, &k, v);
            }
            query.extend(injection.query);
        }

        let url = crate::binder::build_url(&request.url, &query)?;
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            HttpToolsError::Runtime(format!("Invalid HTTP method: {}", request.method))
        })?;

        debug!(method = %method, url = %redact_url(&url), "sending tool request");
        let mut builder = self
            .client
            .request(method, url)
            .headers(header_map(&headers)?);
        if let Some(body) = &request.body {
            builder = apply_body(builder, body, request.content_type.as_deref())?;
        }

        let response = builder.send().await?;
        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(RawResponse {
            status,
            content_type,
            bytes,
        })
    }
}

struct RawResponse {
    status: reqwest::StatusCode,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        let name = HeaderName::from_bytes(k.as_bytes())
            .map_err(|e| HttpToolsError::Runtime(format!("Invalid header name '{k}': {e}")))?;
        let value = HeaderValue::from_str(v)
            .map_err(|e| HttpToolsError::Runtime(format!("Invalid value for header '{k}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn is_json_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return true;
    };
    ct.parse::<Mime>().is_ok_and(|m| {
        m.subtype() == mime::JSON || m.suffix().is_some_and(|s| s == mime::JSON)
    })
}

fn body_fields<'a>(body: &'a Value, encoding: &str) -> Result<&'a serde_json::Map<String, Value>> {
    body.as_object().ok_or_else(|| {
        HttpToolsError::Runtime(format!("{encoding} body must be a JSON object"))
    })
}

fn apply_body(
    builder: reqwest::RequestBuilder,
    body: &Value,
    content_type: Option<&str>,
) -> Result<reqwest::RequestBuilder> {
    let essence = content_type
        .and_then(|ct| ct.parse::<Mime>().ok())
        .map(|m| m.essence_str().to_ascii_lowercase());

    match essence.as_deref() {
        Some("application/x-www-form-urlencoded") => {
            let pairs: Vec<(String, String)> = body_fields(body, "form-urlencoded")?
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect();
            Ok(builder.form(&pairs))
        }
        Some("multipart/form-data") => {
            let mut form = reqwest::multipart::Form::new();
            for (k, v) in body_fields(body, "multipart")? {
                form = form.text(k.clone(), value_to_string(v));
            }
            Ok(builder.multipart(form))
        }
        _ if is_json_content_type(content_type) => {
            let builder = match content_type {
                Some(ct) => builder.header(reqwest::header::CONTENT_TYPE, ct),
                None => builder,
            };
            Ok(builder.json(body))
        }
        _ => {
            let ct = content_type.unwrap_or("application/octet-stream");
            let payload = match body {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Ok(builder
                .header(reqwest::header::CONTENT_TYPE, ct)
                .body(payload))
        }
    }
}

fn is_image_content_type(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return false;
    };
    let Ok(m) = ct.parse::<Mime>() else {
        return false;
    };
    m.type_() == mime::IMAGE
}

fn normalize_response(tool: &ToolInfo, response: RawResponse) -> Result<CallToolResult> {
    let RawResponse {
        status,
        content_type,
        bytes,
    } = response;

    if !status.is_success() {
        let body = String::from_utf8_lossy(&bytes).into_owned();
        warn!(tool = %tool.name, status = status.as_u16(), "remote API returned an error");
        return Err(HttpToolsError::RemoteHttp {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            body,
        });
    }

    if is_image_content_type(content_type.as_deref()) {
        let mime_type = content_type.unwrap_or_else(|| "image/*".to_string());
        let b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        return Ok(CallToolResult {
            content: vec![Content::image(b64, mime_type)],
            structured_content: None,
            is_error: Some(false),
            meta: None,
        });
    }

    let text = String::from_utf8_lossy(&bytes).into_owned();
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    if tool.metadata.advertises_output_schema() {
        let structured = json!({ "body": body });
        // Clients that ignore `structured_content` still get the same data as text.
        let text =
            serde_json::to_string_pretty(&structured).unwrap_or_else(|_| structured.to_string());
        return Ok(CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        });
    }

    let text = match &body {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    };
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{ApiKeyLocation, OAuth2ClientCredentials, OAuth2Settings};
    use crate::binder::RequestBinder;
    use crate::model::{ParamLocation, Parameter, ServerInfo, ToolMetadata};
    use crate::schema::{NormalizedSchema, SchemaType};
    use serde_json::Map;
    use specbridge_test_support::{TINY_PNG, spawn_echo_server, spawn_token_endpoint};
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn tool(method: &str, url: &str, parameters: Vec<Parameter>) -> ToolInfo {
        ToolInfo {
            name: "echo_op".to_string(),
            url: url.to_string(),
            method: method.to_string(),
            content_type: None,
            parameters,
            metadata: ToolMetadata {
                name: "echo_op".to_string(),
                description: "[echo] op".to_string(),
                input_schema: json!({"type": "object"}),
                response_schema: NormalizedSchema::empty_object(),
                tags: BTreeSet::new(),
                server_info: ServerInfo::default(),
            },
        }
    }

    fn body_tool(content_type: &str) -> ToolInfo {
        let mut t = tool(
            "POST",
            "/pets",
            vec![
                Parameter::new("body", ParamLocation::Body)
                    .required(true)
                    .with_schema(NormalizedSchema::empty_object())
                    .with_content_type(content_type),
            ],
        );
        t.content_type = Some(content_type.to_string());
        t
    }

    fn args(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    fn first_text(result: &CallToolResult) -> Value {
        let v = serde_json::to_value(result).expect("CallToolResult serializes");
        let text = v
            .get("content")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .expect("content[0].text")
            .to_string();
        serde_json::from_str(&text).unwrap_or(Value::String(text))
    }

    async fn call(
        executor: &HttpExecutor,
        base_url: &str,
        tool: &ToolInfo,
        arguments: Value,
    ) -> Result<CallToolResult> {
        let prepared = RequestBinder::new(base_url).bind(
            tool,
            args(arguments),
            executor.authenticator(),
        )?;
        executor
            .execute(tool, &prepared, &CancellationToken::new())
            .await
    }

    #[tokio::test]
    async fn json_body_is_sent_as_json() {
        let server = spawn_echo_server().await.expect("echo server");
        let executor = HttpExecutor::new(&ExecutorConfig::default(), None).expect("executor");

        let result = call(
            &executor,
            &server.base_url,
            &body_tool("application/json"),
            json!({"body": {"name": "Rex"}}),
        )
        .await
        .expect("call");
        let echoed = first_text(&result);
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/pets");
        assert_eq!(echoed["body"], r#"{"name":"Rex"}"#);
        assert_eq!(echoed["contentType"], "application/json");

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn form_and_multipart_bodies_use_raw_values() {
        let server = spawn_echo_server().await.expect("echo server");
        let executor = HttpExecutor::new(&ExecutorConfig::default(), None).expect("executor");

        let result = call(
            &executor,
            &server.base_url,
            &body_tool("application/x-www-form-urlencoded"),
            json!({"body": {"name": "Rex", "age": 3}}),
        )
        .await
        .expect("form call");
        let echoed = first_text(&result);
        assert_eq!(echoed["contentType"], "application/x-www-form-urlencoded");
        let body = echoed["body"].as_str().unwrap_or_default();
        assert!(body.contains("name=Rex"), "{body}");
        assert!(body.contains("age=3"), "{body}");

        let result = call(
            &executor,
            &server.base_url,
            &body_tool("multipart/form-data"),
            json!({"body": {"name": "Rex"}}),
        )
        .await
        .expect("multipart call");
        let echoed = first_text(&result);
        let ct = echoed["contentType"].as_str().unwrap_or_default();
        assert!(ct.starts_with("multipart/form-data; boundary="), "{ct}");
        let body = echoed["body"].as_str().unwrap_or_default();
        assert!(body.contains("name=\"name\""), "{body}");
        assert!(body.contains("Rex"), "{body}");

        let err = call(
            &executor,
            &server.base_url,
            &body_tool("application/x-www-form-urlencoded"),
            json!({"body": "name=Rex"}),
        )
        .await
        .expect_err("string form body");
        assert!(matches!(err, HttpToolsError::Runtime(_)));

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn query_api_key_and_path_are_sent() {
        let server = spawn_echo_server().await.expect("echo server");
        let executor = HttpExecutor::new(
            &ExecutorConfig::default(),
            Some(Authenticator::ApiKey {
                name: "key".to_string(),
                value: "s3cret".to_string(),
                location: ApiKeyLocation::Query,
            }),
        )
        .expect("executor");

        let t = tool(
            "GET",
            "/pets/{petId}",
            vec![
                Parameter::new("petId", ParamLocation::Path),
                Parameter::new("limit", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Integer)),
            ],
        );
        let result = call(&executor, &server.base_url, &t, json!({"petId": "42", "limit": 5}))
            .await
            .expect("call");
        let echoed = first_text(&result);
        assert_eq!(echoed["path"], "/pets/42");
        assert_eq!(echoed["query"], "limit=5&key=s3cret");
        let ua = echoed["headers"]["user-agent"].as_str().unwrap_or_default();
        assert!(ua.starts_with("specbridge/"), "{ua}");

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn oauth_token_is_fetched_and_sent_as_bearer() {
        let server = spawn_echo_server().await.expect("echo server");
        let endpoint = spawn_token_endpoint(3600).await.expect("token endpoint");
        let source = Arc::new(OAuth2ClientCredentials::new(OAuth2Settings {
            token_url: endpoint.token_url(),
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            scope: None,
            audience: None,
        }));
        let executor = HttpExecutor::new(
            &ExecutorConfig::default(),
            Some(Authenticator::OAuth2(source)),
        )
        .expect("executor");
        let t = tool("GET", "/me", Vec::new());

        for _ in 0..2 {
            let result = call(&executor, &server.base_url, &t, json!({}))
                .await
                .expect("call");
            assert_eq!(first_text(&result)["headers"]["authorization"], "Bearer token-1");
        }
        assert_eq!(endpoint.hits(), 1);

        endpoint.server.shutdown().await.expect("shutdown token endpoint");
        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn non_success_status_is_a_remote_error_with_body() {
        let server = spawn_echo_server().await.expect("echo server");
        let executor = HttpExecutor::new(&ExecutorConfig::default(), None).expect("executor");

        let err = call(
            &executor,
            &server.base_url,
            &tool("GET", "/status/404/pets", Vec::new()),
            json!({}),
        )
        .await
        .expect_err("404");
        match err {
            HttpToolsError::RemoteHttp { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("/status/404/pets"), "{body}");
            }
            other => panic!("unexpected error: {other}"),
        }

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn image_responses_become_image_content() {
        let server = spawn_echo_server().await.expect("echo server");
        let executor = HttpExecutor::new(&ExecutorConfig::default(), None).expect("executor");

        let result = call(
            &executor,
            &server.base_url,
            &tool("GET", "/image", Vec::new()),
            json!({}),
        )
        .await
        .expect("call");
        let v = serde_json::to_value(&result).expect("serializes");
        let first = &v["content"][0];
        assert_eq!(first["type"], "image");
        assert_eq!(first["mimeType"], "image/png");
        assert_eq!(
            first["data"],
            base64::engine::general_purpose::STANDARD.encode(TINY_PNG)
        );

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn structured_content_follows_the_advertised_schema() {
        let server = spawn_echo_server().await.expect("echo server");
        let executor = HttpExecutor::new(&ExecutorConfig::default(), None).expect("executor");

        let mut t = tool("GET", "/pets", Vec::new());
        t.metadata.response_schema.properties.insert(
            "method".to_string(),
            NormalizedSchema::of_type(SchemaType::String),
        );
        let result = call(&executor, &server.base_url, &t, json!({}))
            .await
            .expect("call");
        let structured = result.structured_content.expect("structured content");
        assert_eq!(structured["body"]["method"], "GET");

        server.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn dry_run_does_not_send_and_redacts_credentials() {
        let executor = HttpExecutor::new(
            &ExecutorConfig::default(),
            Some(Authenticator::CustomHeader {
                name: "X-Secret".to_string(),
                value: "hunter2".to_string(),
            }),
        )
        .expect("executor");
        let t = tool(
            "DELETE",
            "/pets/{petId}",
            vec![
                Parameter::new("petId", ParamLocation::Path),
                Parameter::new("X-Secret", ParamLocation::Header),
            ],
        );
        // Port 9 (discard) is never contacted in a dry run.
        let result = call(
            &executor,
            "http://127.0.0.1:9",
            &t,
            json!({"petId": "1", "X-Secret": "inline", "dry_run": true}),
        )
        .await
        .expect("dry run");
        let described = first_text(&result);
        assert_eq!(described["method"], "DELETE");
        assert_eq!(described["url"], "http://127.0.0.1:9/pets/1");
        assert_eq!(described["headers"]["X-Secret"], "***");
        assert_eq!(described["dryRun"], true);
    }

    #[tokio::test]
    async fn cancelled_calls_report_cancellation() {
        let executor = HttpExecutor::new(&ExecutorConfig::default(), None).expect("executor");
        let t = tool("GET", "/slow", Vec::new());
        let prepared = RequestBinder::new("http://127.0.0.1:9")
            .bind(&t, Map::new(), None)
            .expect("bind");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = executor
            .execute(&t, &prepared, &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, HttpToolsError::Cancelled));
    }

    #[test]
    fn json_detection_covers_suffixes() {
        assert!(is_json_content_type(None));
        assert!(is_json_content_type(Some("application/json; charset=utf-8")));
        assert!(is_json_content_type(Some("application/vnd.api+json")));
        assert!(!is_json_content_type(Some("text/plain")));
    }
}
