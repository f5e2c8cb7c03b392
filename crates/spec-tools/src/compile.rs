//! `compile(config, document) -> ToolRegistry`.
//!
//! Pure and synchronous: extraction, filtering, naming, overlay rewriting, resources and
//! prompts. Every `$ref` the document needs was prefetched by the loader.

use crate::config::{BuildConfig, MetadataOverlay, SpecKind, ToolOverlay};
use crate::error::Result;
use crate::extract::{self, BODY_PARAMETER, OperationInfo, OperationSet};
use crate::filter::OperationFilter;
use crate::loader::SpecDocument;
use crate::registry::{PromptInfo, ResourceInfo, ToolRegistry};
use crate::sanitize::{reserve_unique_name, sanitize_name, singularize};
use serde_json::{Map, Value, json};
use specbridge_http_tools::{ParamLocation, Parameter, ServerInfo, ToolInfo, ToolMetadata};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Compile with the filters named by `config` and no overlay.
///
/// # Errors
///
/// Returns [`crate::SpecToolsError::DuplicateOperation`] under the `fail` duplicate policy, or
/// [`crate::SpecToolsError::Config`] for an include or exclude pattern that does not compile.
pub fn compile(config: &BuildConfig, document: &SpecDocument) -> Result<ToolRegistry> {
    compile_with(config, document, None, &OperationFilter::from_config(config)?)
}

/// # Errors
///
/// See [`compile`].
pub fn compile_with_overlay(
    config: &BuildConfig,
    document: &SpecDocument,
    overlay: Option<&MetadataOverlay>,
) -> Result<ToolRegistry> {
    compile_with(config, document, overlay, &OperationFilter::from_config(config)?)
}

/// Compile with an explicit filter (for callers supplying their own path predicates).
///
/// # Errors
///
/// See [`compile`].
pub fn compile_with(
    config: &BuildConfig,
    document: &SpecDocument,
    overlay: Option<&MetadataOverlay>,
    filter: &OperationFilter,
) -> Result<ToolRegistry> {
    let mut ops = extract_operations(config, document)?;
    let extracted = ops.len();
    filter.apply(&mut ops);

    let server_info = ServerInfo {
        name: config.server_name.clone(),
        description: config.server_description.clone(),
    };
    let base_url = resolve_base_url(config, document);

    let overlays: BTreeMap<&str, &ToolOverlay> = overlay
        .map(|o| o.tools.iter().map(|t| (t.name.as_str(), t)).collect())
        .unwrap_or_default();
    let mut matched_overlays: HashSet<&str> = HashSet::new();

    let mut taken = HashSet::new();
    let mut compiled: Vec<(ToolInfo, &OperationInfo)> = Vec::with_capacity(ops.len());
    for op in ops.iter() {
        let mut tool = compile_operation(config, &server_info, op);
        if let Some(entry) = overlays.get(tool.name.as_str()) {
            matched_overlays.insert(entry.name.as_str());
            apply_overlay(&mut tool, entry);
        }
        let name = reserve_unique_name(&mut taken, &tool.name);
        tool.name.clone_from(&name);
        tool.metadata.name = name;
        compiled.push((tool, op));
    }

    for name in overlays.keys() {
        if !matched_overlays.contains(name) {
            tracing::warn!(
                server = %config.server_name,
                tool = %name,
                "Metadata overlay entry matches no compiled tool"
            );
        }
    }

    let resources = if config.generate_resources {
        build_resources(&config.server_name, &compiled)
    } else {
        Vec::new()
    };
    let prompts = if config.generate_prompts {
        build_prompts(&config.server_name, config.kind, &compiled)
    } else {
        Vec::new()
    };

    let tools: Vec<ToolInfo> = compiled.into_iter().map(|(tool, _)| tool).collect();
    tracing::info!(
        server = %config.server_name,
        kind = config.kind.tag(),
        operations = extracted,
        tools = tools.len(),
        resources = resources.len(),
        prompts = prompts.len(),
        "Compiled tools from spec"
    );

    Ok(ToolRegistry::new(
        server_info,
        base_url,
        tools,
        resources,
        prompts,
    ))
}

fn compile_operation(config: &BuildConfig, server_info: &ServerInfo, op: &OperationInfo) -> ToolInfo {
    let name = sanitize_name(&format!("{}_{}", config.server_name, op.operation_id));

    let text = [op.summary.as_deref(), op.description.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map_or_else(|| format!("Calls {} {}", op.method, op.path), str::to_string);
    let description = format!("[{}] {text}", config.server_name);

    let mut tags = op.tags.clone();
    tags.insert(config.server_name.clone());
    tags.insert(config.kind.tag().to_string());

    ToolInfo {
        name: name.clone(),
        url: op.path.clone(),
        method: op.method.clone(),
        content_type: op.content_type.clone(),
        parameters: op.parameters.clone(),
        metadata: ToolMetadata {
            name,
            description,
            input_schema: build_input_schema(&op.parameters),
            response_schema: op.response_schema.clone(),
            tags,
            server_info: server_info.clone(),
        },
    }
}

/// JSON-Schema object with one property per parameter; body parameters are always required.
#[must_use]
pub fn build_input_schema(parameters: &[Parameter]) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in parameters {
        let mut prop_schema = param
            .schema
            .as_ref()
            .map_or_else(|| json!({"type": "string"}), |s| s.to_json());
        if let (Some(desc), Some(obj)) = (&param.description, prop_schema.as_object_mut())
            && !obj.contains_key("description")
            && !desc.trim().is_empty()
        {
            obj.insert("description".to_string(), json!(desc));
        }
        properties.insert(param.name.clone(), prop_schema);

        if param.required || param.location == ParamLocation::Body {
            required.push(param.name.clone());
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn apply_overlay(tool: &mut ToolInfo, entry: &ToolOverlay) {
    if let Some(new_name) = entry.new_name.as_deref().filter(|n| !n.trim().is_empty()) {
        let name = sanitize_name(new_name);
        tool.name.clone_from(&name);
        tool.metadata.name = name;
    }
    if let Some(description) = &entry.description {
        tool.metadata.description.clone_from(description);
    }
    if let Some(tags) = &entry.tags {
        tool.metadata.tags = tags.iter().cloned().collect();
    }

    for param in &entry.parameters {
        let direct = tool.metadata.input_schema["properties"]
            .get_mut(param.name.as_str())
            .and_then(Value::as_object_mut);
        if let Some(slot) = direct {
            slot.insert("description".to_string(), json!(param.description));
            if let Some(p) = tool.parameters.iter_mut().find(|p| p.name == param.name) {
                p.description = Some(param.description.clone());
            }
            continue;
        }

        let nested = tool.metadata.input_schema["properties"]
            .get_mut(BODY_PARAMETER)
            .and_then(|body| body.get_mut("properties"))
            .and_then(|props| props.get_mut(param.name.as_str()))
            .and_then(Value::as_object_mut);
        if let Some(slot) = nested {
            slot.insert("description".to_string(), json!(param.description));
        } else {
            tracing::warn!(
                tool = %tool.name,
                parameter = %param.name,
                "Metadata overlay names a parameter the tool does not have"
            );
        }
    }
}

fn build_resources(server_name: &str, compiled: &[(ToolInfo, &OperationInfo)]) -> Vec<ResourceInfo> {
    let mut taken = HashSet::new();
    let mut out = Vec::new();
    for (tool, op) in compiled {
        if op.method != "GET" || op.has_body() {
            continue;
        }
        let noun = op
            .path
            .split('/')
            .filter(|segment| !segment.is_empty() && !segment.contains('{'))
            .next_back()
            .map_or_else(|| op.operation_id.clone(), singularize);
        let name = reserve_unique_name(&mut taken, &sanitize_name(&noun));
        out.push(ResourceInfo {
            name,
            uri: format!("{server_name}://{}", op.path.trim_start_matches('/')),
            tool_name: tool.name.clone(),
            mime_type: "application/json".to_string(),
            description: tool.metadata.description.clone(),
        });
    }
    out
}

fn build_prompts(
    server_name: &str,
    kind: SpecKind,
    compiled: &[(ToolInfo, &OperationInfo)],
) -> Vec<PromptInfo> {
    let mut by_tag: BTreeMap<&str, Vec<&ToolInfo>> = BTreeMap::new();
    for (tool, _) in compiled {
        for tag in &tool.metadata.tags {
            if tag != server_name && tag != kind.tag() {
                by_tag.entry(tag.as_str()).or_default().push(tool);
            }
        }
    }

    let mut taken = HashSet::new();
    by_tag
        .into_iter()
        .map(|(tag, tools)| {
            let name = reserve_unique_name(
                &mut taken,
                &sanitize_name(&format!("{server_name}_{tag}_guide")),
            );
            let mut text = format!("Tools for '{tag}' in {server_name}:\n");
            for tool in &tools {
                text.push_str(&format!("- {}: {}\n", tool.name, tool.metadata.description));
            }
            PromptInfo {
                name,
                description: format!("How to use the {tag} tools of {server_name}"),
                tag: tag.to_string(),
                text,
            }
        })
        .collect()
}

/// `apiBaseUrl`, else the document's own server / base URL. Empty when nothing usable exists.
#[must_use]
pub fn resolve_base_url(config: &BuildConfig, document: &SpecDocument) -> String {
    if let Some(base) = config.api_base_url.as_deref().filter(|b| !b.trim().is_empty()) {
        return base.trim().to_string();
    }

    let declared = match document {
        SpecDocument::OpenApi(doc) => doc.spec.servers.first().map(|server| {
            let mut url = server.url.clone();
            for (name, variable) in server.variables.iter().flatten() {
                url = url.replace(&format!("{{{name}}}"), &variable.default);
            }
            url
        }),
        SpecDocument::Discovery(doc) => doc.effective_base_url(),
    };
    let Some(declared) = declared.filter(|u| !u.trim().is_empty()) else {
        tracing::warn!(
            server = %config.server_name,
            "No base URL configured and none found in spec; calls will fail until apiBaseUrl is set"
        );
        return String::new();
    };

    if declared.starts_with("http://") || declared.starts_with("https://") {
        return declared;
    }

    // Relative server URLs resolve against the spec URL when the spec was fetched.
    if let Some(spec_url) = config
        .api_spec_url
        .as_deref()
        .and_then(|u| Url::parse(u).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        && let Ok(joined) = spec_url.join(&declared)
    {
        return joined.to_string();
    }

    tracing::warn!(
        server = %config.server_name,
        base_url = %declared,
        "Relative server URL cannot be resolved; set apiBaseUrl explicitly"
    );
    declared
}

fn extract_operations(config: &BuildConfig, document: &SpecDocument) -> Result<OperationSet> {
    match document {
        SpecDocument::OpenApi(doc) => extract::openapi::extract_operations(
            &doc.spec,
            &doc.root,
            &doc.docs,
            config.duplicate_operation_policy,
        ),
        SpecDocument::Discovery(doc) => {
            extract::discovery::extract_operations(doc, config.duplicate_operation_policy)
        }
    }
}
