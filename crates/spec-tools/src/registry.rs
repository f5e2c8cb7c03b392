//! Immutable registry of compiled tools.

use rmcp::model::{Annotated, JsonObject, Prompt, RawResource, Resource, Tool};
use serde::Serialize;
use serde_json::{Value, json};
use specbridge_http_tools::semantics::annotations_for_method;
use specbridge_http_tools::{ServerInfo, ToolInfo};
use std::collections::HashMap;
use std::sync::Arc;

/// A read-only view over one GET tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    pub name: String,
    /// `{server}://{path template}`.
    pub uri: String,
    /// Tool that reads the resource.
    pub tool_name: String,
    pub mime_type: String,
    pub description: String,
}

/// Usage guide for the tools sharing one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    pub name: String,
    pub description: String,
    pub tag: String,
    pub text: String,
}

/// Built once per configuration and never mutated; share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    server_info: ServerInfo,
    base_url: String,
    tools: Vec<ToolInfo>,
    index: HashMap<String, usize>,
    resources: Vec<ResourceInfo>,
    prompts: Vec<PromptInfo>,
}

impl ToolRegistry {
    /// Tool names must already be unique; a later duplicate is unreachable by name.
    #[must_use]
    pub fn new(
        server_info: ServerInfo,
        base_url: String,
        tools: Vec<ToolInfo>,
        resources: Vec<ResourceInfo>,
        prompts: Vec<PromptInfo>,
    ) -> Self {
        let mut index = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            index.entry(tool.name.clone()).or_insert(i);
        }
        Self {
            server_info,
            base_url,
            tools,
            index,
            resources,
            prompts,
        }
    }

    /// Registry with no tools (the result of a failed spec load).
    #[must_use]
    pub fn empty(server_info: ServerInfo) -> Self {
        Self {
            server_info,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolInfo] {
        &self.tools
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolInfo> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn resources(&self) -> &[ResourceInfo] {
        &self.resources
    }

    #[must_use]
    pub fn prompts(&self) -> &[PromptInfo] {
        &self.prompts
    }

    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// MCP `Tool` descriptors: input schema, wrapped output schema, method annotations.
    #[must_use]
    pub fn list_mcp_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|t| {
                let schema_obj = t
                    .metadata
                    .input_schema
                    .as_object()
                    .cloned()
                    .unwrap_or_else(JsonObject::new);
                let mut tool = Tool::new(
                    t.name.clone(),
                    t.metadata.description.clone(),
                    Arc::new(schema_obj),
                );
                if t.metadata.advertises_output_schema() {
                    tool.output_schema =
                        Some(wrap_body_output_schema(&t.metadata.response_schema.to_json()));
                }
                tool.annotations = Some(annotations_for_method(&t.method));
                tool
            })
            .collect()
    }

    #[must_use]
    pub fn list_mcp_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .map(|r| {
                let mut raw = RawResource::new(r.uri.clone(), r.name.clone());
                raw.description = Some(r.description.clone());
                raw.mime_type = Some(r.mime_type.clone());
                Annotated::new(raw, None)
            })
            .collect()
    }

    #[must_use]
    pub fn list_mcp_prompts(&self) -> Vec<Prompt> {
        self.prompts
            .iter()
            .map(|p| Prompt::new(p.name.clone(), Some(p.description.clone()), None))
            .collect()
    }

    #[must_use]
    pub fn prompt(&self, name: &str) -> Option<&PromptInfo> {
        self.prompts.iter().find(|p| p.name == name)
    }

    #[must_use]
    pub fn resource_by_uri(&self, uri: &str) -> Option<&ResourceInfo> {
        self.resources.iter().find(|r| r.uri == uri)
    }
}

/// MCP requires the root output schema to be an object.
fn wrap_body_output_schema(body_schema: &Value) -> Arc<JsonObject> {
    let wrapped = json!({
        "type": "object",
        "required": ["body"],
        "properties": {
            "body": body_schema.clone()
        }
    });

    let obj = wrapped.as_object().cloned().unwrap_or_else(JsonObject::new);
    Arc::new(obj)
}

#[cfg(test)]
mod tests {
    use super::*;
    use specbridge_http_tools::{NormalizedSchema, SchemaType, ToolMetadata};
    use std::collections::BTreeSet;

    fn tool(name: &str, method: &str, response: NormalizedSchema) -> ToolInfo {
        ToolInfo {
            name: name.to_string(),
            url: "/pets".to_string(),
            method: method.to_string(),
            content_type: None,
            parameters: Vec::new(),
            metadata: ToolMetadata {
                name: name.to_string(),
                description: format!("[petstore] {name}"),
                input_schema: json!({"type": "object", "properties": {}}),
                response_schema: response,
                tags: BTreeSet::new(),
                server_info: ServerInfo::default(),
            },
        }
    }

    fn registry() -> ToolRegistry {
        let mut pet = NormalizedSchema::empty_object();
        pet.properties.insert(
            "name".to_string(),
            NormalizedSchema::of_type(SchemaType::String),
        );
        ToolRegistry::new(
            ServerInfo {
                name: "petstore".to_string(),
                description: "Pets".to_string(),
            },
            "https://api.example.com".to_string(),
            vec![
                tool("petstore_getPet", "GET", pet),
                tool("petstore_deletePet", "DELETE", NormalizedSchema::empty_object()),
            ],
            vec![ResourceInfo {
                name: "pet".to_string(),
                uri: "petstore://pets".to_string(),
                tool_name: "petstore_getPet".to_string(),
                mime_type: "application/json".to_string(),
                description: "Pets".to_string(),
            }],
            vec![PromptInfo {
                name: "petstore_pets_guide".to_string(),
                description: "How to use the pets tools of petstore".to_string(),
                tag: "pets".to_string(),
                text: "Tools".to_string(),
            }],
        )
    }

    #[test]
    fn lookups_by_name() {
        let registry = registry();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("petstore_getPet").is_some());
        assert!(registry.get("nope").is_none());
        assert_eq!(registry.base_url(), "https://api.example.com");
        assert_eq!(registry.server_info().name, "petstore");
        assert!(registry.resource_by_uri("petstore://pets").is_some());
        assert!(registry.prompt("petstore_pets_guide").is_some());
    }

    #[test]
    fn output_schema_only_for_informative_responses() {
        let tools = registry().list_mcp_tools();
        let get = &tools[0];
        let output = get.output_schema.as_ref().expect("output schema");
        assert_eq!(output.get("required"), Some(&json!(["body"])));
        assert_eq!(
            output.get("properties").and_then(|p| p.get("body")).and_then(|b| b.get("type")),
            Some(&json!("object"))
        );
        assert_eq!(
            get.annotations.as_ref().and_then(|a| a.read_only_hint),
            Some(true)
        );

        let delete = &tools[1];
        assert!(delete.output_schema.is_none());
        assert_eq!(
            delete.annotations.as_ref().and_then(|a| a.destructive_hint),
            Some(true)
        );
    }

    #[test]
    fn resources_and_prompts_convert_to_protocol_types() {
        let registry = registry();
        let resources = registry.list_mcp_resources();
        assert_eq!(resources[0].raw.uri, "petstore://pets");
        assert_eq!(resources[0].raw.mime_type.as_deref(), Some("application/json"));
        let prompts = registry.list_mcp_prompts();
        assert_eq!(prompts[0].name, "petstore_pets_guide");
    }

    #[test]
    fn empty_registry_keeps_server_info() {
        let registry = ToolRegistry::empty(ServerInfo {
            name: "broken".to_string(),
            description: String::new(),
        });
        assert!(registry.is_empty());
        assert_eq!(registry.base_url(), "");
        assert_eq!(registry.server_info().name, "broken");
        assert!(registry.list_mcp_tools().is_empty());
    }
}
