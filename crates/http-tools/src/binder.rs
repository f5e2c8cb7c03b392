//! Call-time argument binding.
//!
//! Arguments go through five stages: collect (fold in `kwargs`, consume `dry_run`), validate
//! (every required parameter present), coerce (schema types), place (path, query, header, body)
//! and finalize (URL, bearer token, `User-Agent`).

use crate::auth::Authenticator;
use crate::error::{ConversionFailure, HttpToolsError, Result};
use crate::kwargs::parse_kwargs;
use crate::model::{ParamLocation, Parameter, ToolInfo};
use crate::safety::{is_sensitive_header, redact_header_value};
use crate::schema::{NormalizedSchema, SchemaType};
use serde_json::{Map, Number, Value, json};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

pub const KWARGS_ARGUMENT: &str = "kwargs";
pub const DRY_RUN_ARGUMENT: &str = "dry_run";
const PATH_SEGMENT_EXPECTATION: &str = "path value without '.' or '..' segments";

/// A fully resolved request, ready to send (or to describe, for dry runs).
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: String,
    /// Absolute URL without the query string.
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub content_type: Option<String>,
    pub dry_run: bool,
}

impl PreparedRequest {
    /// # Errors
    ///
    /// Returns [`HttpToolsError::Runtime`] if the resolved URL does not parse.
    pub fn full_url(&self) -> Result<Url> {
        build_url(&self.url, &self.query)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// JSON description used for dry runs. Credential-bearing header values are redacted.
    #[must_use]
    pub fn describe(&self, extra_sensitive: &[String]) -> Value {
        let mut headers = Map::new();
        for (name, value) in &self.headers {
            let shown = if is_sensitive_header(name, extra_sensitive) {
                redact_header_value(value)
            } else {
                value.clone()
            };
            headers.insert(name.clone(), Value::String(shown));
        }
        let url = self
            .full_url()
            .map_or_else(|_| self.url.clone(), |u| u.to_string());
        json!({
            "method": self.method,
            "url": url,
            "query": self.query,
            "headers": headers,
            "body": self.body,
            "contentType": self.content_type,
            "dryRun": true,
        })
    }
}

/// Join base URL, resolved path and query pairs.
///
/// # Errors
///
/// Returns [`HttpToolsError::Runtime`] if the result is not a valid absolute URL.
pub fn build_url(base_and_path: &str, query: &[(String, String)]) -> Result<Url> {
    let mut url = Url::parse(base_and_path)
        .map_err(|e| HttpToolsError::Runtime(format!("Invalid URL '{base_and_path}': {e}")))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }
    Ok(url)
}

/// Substitute `{name}` placeholders: server defaults first, then call values.
#[must_use]
pub fn resolve_path(
    template: &str,
    defaults: &BTreeMap<String, String>,
    values: &[(String, String)],
) -> String {
    let mut path = template.to_string();
    for (name, value) in defaults {
        path = path.replace(&format!("{{{name}}}"), &escape_path_value(value));
    }
    for (name, value) in values {
        path = path.replace(&format!("{{{name}}}"), &escape_path_value(value));
    }
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    path
}

/// Path values go in verbatim; only characters that would end the path are escaped.
fn escape_path_value(value: &str) -> String {
    value.replace('?', "%3F").replace('#', "%23")
}

/// True when `value` contains a `.` or `..` segment, literal or percent-encoded. URL parsing
/// collapses those, so the request would leave the operation's path template.
#[must_use]
pub fn has_dot_segment(value: &str) -> bool {
    value.split(['/', '\\']).any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

/// Lenient truth parse: `true`, `1`, `yes`, `y` (any case); everything else is false.
#[must_use]
pub fn parse_bool_lenient(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "y"
    )
}

/// Per-registry binding context shared by every call.
#[derive(Debug, Clone, Default)]
pub struct RequestBinder {
    base_url: String,
    server_headers: BTreeMap<String, String>,
    default_path_parameters: BTreeMap<String, String>,
    user_agent: Option<String>,
}

impl RequestBinder {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_server_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.server_headers = headers;
        self
    }

    #[must_use]
    pub fn with_default_path_parameters(mut self, defaults: BTreeMap<String, String>) -> Self {
        self.default_path_parameters = defaults;
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bind `arguments` to `tool`.
    ///
    /// # Errors
    ///
    /// - [`HttpToolsError::MissingParameters`] listing every absent required parameter.
    /// - [`HttpToolsError::ParameterConversion`] listing every value that does not fit its
    ///   schema type.
    /// - [`HttpToolsError::Runtime`] if the resolved URL is invalid.
    pub fn bind(
        &self,
        tool: &ToolInfo,
        arguments: Map<String, Value>,
        authenticator: Option<&Authenticator>,
    ) -> Result<PreparedRequest> {
        let (arguments, dry_run) = collect(tool, arguments);
        self.validate(tool, &arguments)?;
        let coerced = coerce(tool, &arguments)?;
        let placed = place(tool, coerced);
        self.finalize(tool, placed, dry_run, authenticator)
    }

    fn validate(&self, tool: &ToolInfo, arguments: &Map<String, Value>) -> Result<()> {
        let missing: Vec<String> = tool
            .parameters
            .iter()
            .filter(|p| p.required && !arguments.contains_key(&p.name))
            .filter(|p| {
                !(p.location == ParamLocation::Path
                    && self.default_path_parameters.contains_key(&p.name))
            })
            .map(|p| p.name.clone())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(HttpToolsError::MissingParameters {
                missing,
                input_schema: tool.metadata.input_schema.clone(),
            })
        }
    }

    fn finalize(
        &self,
        tool: &ToolInfo,
        placed: Placed,
        dry_run: bool,
        authenticator: Option<&Authenticator>,
    ) -> Result<PreparedRequest> {
        let path = resolve_path(&tool.url, &self.default_path_parameters, &placed.path);
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        // Validate early so dry runs report bad URLs too.
        build_url(&url, &placed.query)?;

        let mut headers: Vec<(String, String)> = Vec::new();
        for (k, v) in &self.server_headers {
            upsert_header(&mut headers, k, v.clone());
        }
        for (k, v) in placed.headers {
            upsert_header(&mut headers, &k, v);
        }
        if let Some(token) = authenticator.and_then(Authenticator::cached_bearer)
            && !has_header(&headers, "authorization")
        {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        if let Some(ua) = &self.user_agent
            && !has_header(&headers, "user-agent")
        {
            headers.push(("User-Agent".to_string(), ua.clone()));
        }

        let content_type = placed.body.as_ref().and_then(|_| {
            placed
                .body_content_type
                .clone()
                .or_else(|| tool.content_type.clone())
        });

        Ok(PreparedRequest {
            method: tool.method.to_ascii_uppercase(),
            url,
            query: placed.query,
            headers,
            body: placed.body,
            content_type,
            dry_run,
        })
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Replace a header case-insensitively, or append it.
pub(crate) fn upsert_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    if let Some(slot) = headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
    {
        slot.1 = value;
    } else {
        headers.push((name.to_string(), value));
    }
}

fn collect(tool: &ToolInfo, mut arguments: Map<String, Value>) -> (Map<String, Value>, bool) {
    if tool.parameter(KWARGS_ARGUMENT).is_none()
        && let Some(raw) = arguments.remove(KWARGS_ARGUMENT)
    {
        let recovered = match raw {
            Value::String(s) => parse_kwargs(&s),
            Value::Object(map) => map,
            other => {
                debug!(tool = %tool.name, kind = ?other, "ignoring non-string kwargs");
                Map::new()
            }
        };
        for (k, v) in recovered {
            arguments.entry(k).or_insert(v);
        }
    }

    let dry_run = if tool.parameter(DRY_RUN_ARGUMENT).is_none() {
        match arguments.remove(DRY_RUN_ARGUMENT) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => parse_bool_lenient(&s),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        }
    } else {
        false
    };

    // Explicit nulls count as absent.
    arguments.retain(|_, v| !v.is_null());
    (arguments, dry_run)
}

fn coerce(tool: &ToolInfo, arguments: &Map<String, Value>) -> Result<Vec<(Parameter, Value)>> {
    let mut bound = Vec::new();
    let mut failures = Vec::new();

    for param in &tool.parameters {
        let Some(value) = arguments.get(&param.name) else {
            continue;
        };
        let coerced = match &param.schema {
            Some(schema) => coerce_value(value, schema),
            None => Some(value.clone()),
        };
        match coerced {
            Some(v)
                if param.location == ParamLocation::Path
                    && has_dot_segment(&value_to_string(&v)) =>
            {
                failures.push(ConversionFailure {
                    name: param.name.clone(),
                    expected: PATH_SEGMENT_EXPECTATION.to_string(),
                    value: value.clone(),
                });
            }
            Some(v) => bound.push((param.clone(), v)),
            None => failures.push(ConversionFailure {
                name: param.name.clone(),
                expected: param
                    .schema
                    .as_ref()
                    .map_or("any", |s| s.schema_type.as_str())
                    .to_string(),
                value: value.clone(),
            }),
        }
    }

    for name in arguments.keys() {
        if tool.parameter(name).is_none() {
            debug!(tool = %tool.name, argument = %name, "ignoring undeclared argument");
        }
    }

    if failures.is_empty() {
        Ok(bound)
    } else {
        Err(HttpToolsError::ParameterConversion { failures })
    }
}

/// Coerce `value` to the schema's type; `None` means it cannot be.
#[must_use]
pub fn coerce_value(value: &Value, schema: &NormalizedSchema) -> Option<Value> {
    match schema.schema_type {
        SchemaType::String => Some(match value {
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => other.clone(),
        }),
        SchemaType::Integer => coerce_integer(value),
        SchemaType::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        SchemaType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => Some(Value::Bool(parse_bool_lenient(s))),
            Value::Number(n) => Some(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            _ => None,
        },
        SchemaType::Array => {
            let items: Vec<Value> = match value {
                Value::Array(items) => items.clone(),
                Value::String(s) if s.trim_start().starts_with('[') => {
                    match serde_json::from_str::<Value>(s) {
                        Ok(Value::Array(items)) => items,
                        _ => vec![value.clone()],
                    }
                }
                other => vec![other.clone()],
            };
            match schema.items.as_deref() {
                Some(item_schema) => items
                    .iter()
                    .map(|item| coerce_value(item, item_schema))
                    .collect::<Option<Vec<_>>>()
                    .map(Value::Array),
                None => Some(Value::Array(items)),
            }
        }
        SchemaType::Object => match value {
            Value::Object(_) => Some(value.clone()),
            Value::String(s) => match serde_json::from_str::<Value>(s) {
                Ok(v @ Value::Object(_)) => Some(v),
                _ => None,
            },
            _ => None,
        },
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => float_to_integer(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Some(Value::Number(i.into()));
            }
            float_to_integer(s.parse::<f64>().ok()?)
        }
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn float_to_integer(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(Value::Number((f as i64).into()))
    } else {
        None
    }
}

#[derive(Debug, Default)]
struct Placed {
    path: Vec<(String, String)>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Value>,
    body_content_type: Option<String>,
}

fn place(tool: &ToolInfo, bound: Vec<(Parameter, Value)>) -> Placed {
    let mut placed = Placed::default();
    for (param, value) in bound {
        match param.location {
            ParamLocation::Path => placed.path.push((param.name, value_to_string(&value))),
            ParamLocation::Query => match value {
                Value::Array(items) => {
                    for item in items {
                        placed.query.push((param.name.clone(), value_to_string(&item)));
                    }
                }
                other => placed.query.push((param.name, value_to_string(&other))),
            },
            ParamLocation::Header => {
                let text = match &value {
                    Value::Array(items) => items
                        .iter()
                        .map(value_to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                    other => value_to_string(other),
                };
                upsert_header(&mut placed.headers, &param.name, text);
            }
            ParamLocation::Body => {
                if placed.body.is_some() {
                    debug!(tool = %tool.name, parameter = %param.name, "replacing earlier body value");
                }
                placed.body = Some(value);
                placed.body_content_type = param.content_type;
            }
        }
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{OAuth2ClientCredentials, OAuth2Settings};
    use crate::model::{ServerInfo, ToolMetadata};
    use std::sync::Arc;
    use std::time::Duration;

    fn string_schema() -> NormalizedSchema {
        NormalizedSchema::of_type(SchemaType::String)
    }

    fn tool(method: &str, url: &str, parameters: Vec<Parameter>) -> ToolInfo {
        ToolInfo {
            name: "petstore_op".to_string(),
            url: url.to_string(),
            method: method.to_string(),
            content_type: None,
            parameters,
            metadata: ToolMetadata {
                name: "petstore_op".to_string(),
                description: "[petstore] op".to_string(),
                input_schema: json!({"type": "object"}),
                response_schema: NormalizedSchema::empty_object(),
                tags: std::collections::BTreeSet::new(),
                server_info: ServerInfo::default(),
            },
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn get_pet_resolves_to_exact_url_without_query() {
        let tool = tool(
            "GET",
            "/pets/{petId}",
            vec![Parameter::new("petId", ParamLocation::Path).with_schema(string_schema())],
        );
        let prepared = RequestBinder::new("https://api.example.com/")
            .bind(&tool, args(json!({"petId": "42"})), None)
            .expect("bind");
        assert_eq!(prepared.method, "GET");
        assert_eq!(
            prepared.full_url().expect("url").as_str(),
            "https://api.example.com/pets/42"
        );
        assert!(prepared.query.is_empty());
    }

    #[test]
    fn missing_parameters_are_all_reported() {
        let tool = tool(
            "GET",
            "/owners/{ownerId}/pets/{petId}",
            vec![
                Parameter::new("ownerId", ParamLocation::Path),
                Parameter::new("petId", ParamLocation::Path),
                Parameter::new("verbose", ParamLocation::Query),
                Parameter::new("X-Trace", ParamLocation::Header).required(true),
            ],
        );
        let err = RequestBinder::new("https://api.example.com")
            .bind(&tool, args(json!({"petId": "1"})), None)
            .expect_err("missing");
        match err {
            HttpToolsError::MissingParameters { missing, .. } => {
                assert_eq!(missing, vec!["ownerId".to_string(), "X-Trace".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn default_path_parameters_satisfy_and_win() {
        let tool = tool(
            "GET",
            "/projects/{project}/items/{item}",
            vec![
                Parameter::new("project", ParamLocation::Path),
                Parameter::new("item", ParamLocation::Path),
            ],
        );
        let mut defaults = BTreeMap::new();
        defaults.insert("project".to_string(), "acme".to_string());
        let binder = RequestBinder::new("https://api.example.com")
            .with_default_path_parameters(defaults);

        let prepared = binder
            .bind(&tool, args(json!({"item": "7"})), None)
            .expect("bind");
        assert_eq!(prepared.url, "https://api.example.com/projects/acme/items/7");

        let prepared = binder
            .bind(&tool, args(json!({"project": "other", "item": "7"})), None)
            .expect("bind");
        assert_eq!(prepared.url, "https://api.example.com/projects/acme/items/7");
    }

    #[test]
    fn path_values_keep_slashes_verbatim() {
        let tool = tool(
            "GET",
            "/files/{path}",
            vec![Parameter::new("path", ParamLocation::Path)],
        );
        let prepared = RequestBinder::new("https://api.example.com")
            .bind(&tool, args(json!({"path": "docs/2024/report.txt"})), None)
            .expect("bind");
        assert_eq!(
            prepared.full_url().expect("url").path(),
            "/files/docs/2024/report.txt"
        );
    }

    fn files_tool() -> ToolInfo {
        tool(
            "GET",
            "/files/{path}",
            vec![Parameter::new("path", ParamLocation::Path).with_schema(string_schema())],
        )
    }

    fn bind_file_path(path: &str) -> Result<PreparedRequest> {
        RequestBinder::new("https://api.example.com").bind(
            &files_tool(),
            args(json!({ "path": path })),
            None,
        )
    }

    #[test]
    fn path_values_keep_special_characters_at_their_position() {
        let cases = [
            ("a b", "/files/a%20b"),
            ("50%off", "/files/50%off"),
            ("what?", "/files/what%3F"),
            ("a#b", "/files/a%23b"),
            ("v1.2/notes..txt", "/files/v1.2/notes..txt"),
            (".hidden", "/files/.hidden"),
        ];
        for (value, expected_path) in cases {
            let url = bind_file_path(value)
                .expect("bind")
                .full_url()
                .expect("url");
            assert_eq!(url.path(), expected_path, "{value}");
            assert_eq!(url.query(), None, "{value}");
            assert_eq!(url.fragment(), None, "{value}");
        }
    }

    #[test]
    fn path_values_with_dot_segments_are_rejected() {
        for value in [
            "docs/../secret.txt",
            "..",
            "a/./b",
            ".",
            "docs/%2e%2E/secret.txt",
            "docs\\..\\secret.txt",
        ] {
            match bind_file_path(value).expect_err(value) {
                HttpToolsError::ParameterConversion { failures } => {
                    assert_eq!(failures.len(), 1, "{value}");
                    assert_eq!(failures[0].name, "path");
                    assert_eq!(failures[0].value, json!(value));
                    assert!(failures[0].expected.contains(".."), "{value}");
                }
                other => panic!("unexpected error for {value}: {other}"),
            }
        }
    }

    #[test]
    fn rejected_path_values_are_batched_with_other_conversion_failures() {
        let tool = tool(
            "GET",
            "/files/{path}",
            vec![
                Parameter::new("path", ParamLocation::Path).with_schema(string_schema()),
                Parameter::new("limit", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Integer)),
            ],
        );
        let err = RequestBinder::new("https://api.example.com")
            .bind(&tool, args(json!({"path": "../etc", "limit": "many"})), None)
            .expect_err("conversion");
        match err {
            HttpToolsError::ParameterConversion { failures } => {
                let names: Vec<&str> = failures.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, ["path", "limit"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn dot_segments_are_detected_per_segment() {
        assert!(has_dot_segment(".."));
        assert!(has_dot_segment("a/%2E/b"));
        assert!(!has_dot_segment("..."));
        assert!(!has_dot_segment("a..b/c"));
        assert!(!has_dot_segment(""));
    }

    #[test]
    fn query_arrays_repeat_the_key_and_scalars_are_coerced() {
        let tool = tool(
            "GET",
            "/pets",
            vec![
                Parameter::new("tags", ParamLocation::Query).with_schema(NormalizedSchema {
                    items: Some(Box::new(string_schema())),
                    ..NormalizedSchema::of_type(SchemaType::Array)
                }),
                Parameter::new("limit", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Integer)),
                Parameter::new("active", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Boolean)),
            ],
        );
        let prepared = RequestBinder::new("https://api.example.com")
            .bind(
                &tool,
                args(json!({"tags": ["a", "b"], "limit": "10", "active": "Yes"})),
                None,
            )
            .expect("bind");
        assert_eq!(
            prepared.query,
            vec![
                ("tags".to_string(), "a".to_string()),
                ("tags".to_string(), "b".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("active".to_string(), "true".to_string()),
            ]
        );
    }

    #[test]
    fn conversion_failures_are_batched() {
        let tool = tool(
            "GET",
            "/pets",
            vec![
                Parameter::new("limit", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Integer)),
                Parameter::new("ratio", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Number)),
                Parameter::new("name", ParamLocation::Query).with_schema(string_schema()),
            ],
        );
        let err = RequestBinder::new("https://api.example.com")
            .bind(
                &tool,
                args(json!({"limit": "ten", "ratio": "half", "name": "rex"})),
                None,
            )
            .expect_err("conversion");
        match err {
            HttpToolsError::ParameterConversion { failures } => {
                let names: Vec<&str> = failures.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(names, vec!["limit", "ratio"]);
                assert_eq!(failures[0].expected, "integer");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn integer_coercion_rejects_fractions() {
        let schema = NormalizedSchema::of_type(SchemaType::Integer);
        assert_eq!(coerce_value(&json!(3.0), &schema), Some(json!(3)));
        assert_eq!(coerce_value(&json!(" 12 "), &schema), Some(json!(12)));
        assert_eq!(coerce_value(&json!(3.5), &schema), None);
        assert_eq!(coerce_value(&json!(true), &schema), None);
    }

    #[test]
    fn lenient_booleans() {
        for t in ["true", "TRUE", "1", "yes", "Y"] {
            assert!(parse_bool_lenient(t), "{t}");
        }
        for f in ["false", "0", "no", "nope", ""] {
            assert!(!parse_bool_lenient(f), "{f}");
        }
    }

    #[test]
    fn kwargs_string_is_folded_in_and_dry_run_consumed() {
        let tool = tool(
            "GET",
            "/pets/{petId}",
            vec![
                Parameter::new("petId", ParamLocation::Path),
                Parameter::new("limit", ParamLocation::Query)
                    .with_schema(NormalizedSchema::of_type(SchemaType::Integer)),
            ],
        );
        let prepared = RequestBinder::new("https://api.example.com")
            .bind(
                &tool,
                args(json!({"kwargs": "petId=5,limit=3", "dry_run": "true"})),
                None,
            )
            .expect("bind");
        assert!(prepared.dry_run);
        assert_eq!(prepared.url, "https://api.example.com/pets/5");
        assert_eq!(prepared.query, vec![("limit".to_string(), "3".to_string())]);
    }

    #[test]
    fn unparseable_kwargs_surface_as_missing_parameters() {
        let tool = tool(
            "GET",
            "/pets/{petId}",
            vec![Parameter::new("petId", ParamLocation::Path)],
        );
        let err = RequestBinder::new("https://api.example.com")
            .bind(&tool, args(json!({"kwargs": "??"})), None)
            .expect_err("missing");
        assert!(matches!(err, HttpToolsError::MissingParameters { .. }));
    }

    #[test]
    fn body_and_headers_are_placed_with_defaults() {
        let mut t = tool(
            "POST",
            "/pets",
            vec![
                Parameter::new("body", ParamLocation::Body)
                    .required(true)
                    .with_schema(NormalizedSchema::empty_object())
                    .with_content_type("application/json"),
                Parameter::new("X-Request-Id", ParamLocation::Header),
            ],
        );
        t.content_type = Some("application/json".to_string());
        let mut server_headers = BTreeMap::new();
        server_headers.insert("x-request-id".to_string(), "server".to_string());
        server_headers.insert("X-Tenant".to_string(), "t1".to_string());

        let prepared = RequestBinder::new("https://api.example.com")
            .with_server_headers(server_headers)
            .with_user_agent("specbridge-test")
            .bind(
                &t,
                args(json!({"body": {"name": "Rex"}, "X-Request-Id": "call"})),
                None,
            )
            .expect("bind");

        assert_eq!(prepared.body, Some(json!({"name": "Rex"})));
        assert_eq!(prepared.content_type.as_deref(), Some("application/json"));
        assert_eq!(prepared.header("X-Request-Id"), Some("call"));
        assert_eq!(prepared.header("x-tenant"), Some("t1"));
        assert_eq!(prepared.header("user-agent"), Some("specbridge-test"));
    }

    #[test]
    fn cached_oauth_token_is_attached_and_redacted_in_description() {
        let source = Arc::new(OAuth2ClientCredentials::new(OAuth2Settings {
            token_url: "http://127.0.0.1:9/token".to_string(),
            client_id: "c".to_string(),
            client_secret: "s".to_string(),
            scope: None,
            audience: None,
        }));
        source.cache().set_token("live-token", Duration::from_secs(60));
        let auth = Authenticator::OAuth2(source);

        let tool = tool("GET", "/pets", Vec::new());
        let prepared = RequestBinder::new("https://api.example.com")
            .bind(&tool, Map::new(), Some(&auth))
            .expect("bind");
        assert_eq!(prepared.header("authorization"), Some("Bearer live-token"));

        let described = prepared.describe(&auth.sensitive_headers());
        assert_eq!(described["headers"]["Authorization"], "Bearer ***");
        assert_eq!(described["url"], "https://api.example.com/pets");
        assert_eq!(described["dryRun"], true);
    }
}
