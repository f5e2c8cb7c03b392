//! Typed view of a Google API Discovery document (the parts tool compilation needs).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub root_url: Option<String>,
    #[serde(default)]
    pub service_path: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Global query parameters (`fields`, `prettyPrint`, ...). Not exposed on tools.
    #[serde(default)]
    pub parameters: BTreeMap<String, DiscoverySchema>,
    #[serde(default)]
    pub schemas: BTreeMap<String, DiscoverySchema>,
    #[serde(default)]
    pub resources: BTreeMap<String, DiscoveryResource>,
    #[serde(default)]
    pub methods: BTreeMap<String, DiscoveryMethod>,
}

impl DiscoveryDocument {
    /// `baseUrl`, else `rootUrl + servicePath`.
    #[must_use]
    pub fn effective_base_url(&self) -> Option<String> {
        if let Some(base) = self.base_url.as_deref().filter(|b| !b.is_empty()) {
            return Some(base.to_string());
        }
        let root = self.root_url.as_deref().filter(|r| !r.is_empty())?;
        let service = self.service_path.as_deref().unwrap_or("");
        Some(format!(
            "{}/{}",
            root.trim_end_matches('/'),
            service.trim_start_matches('/')
        ))
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResource {
    #[serde(default)]
    pub methods: BTreeMap<String, DiscoveryMethod>,
    #[serde(default)]
    pub resources: BTreeMap<String, DiscoveryResource>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryMethod {
    #[serde(default)]
    pub id: Option<String>,
    pub path: String,
    #[serde(default)]
    pub flat_path: Option<String>,
    pub http_method: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, DiscoverySchema>,
    #[serde(default)]
    pub parameter_order: Vec<String>,
    #[serde(default)]
    pub request: Option<DiscoverySchema>,
    #[serde(default)]
    pub response: Option<DiscoverySchema>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Discovery "JSON schema" node; method parameters use the same shape plus `location`.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySchema {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub schema_type: Option<String>,
    #[serde(rename = "$ref", default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, DiscoverySchema>,
    #[serde(default)]
    pub items: Option<Box<DiscoverySchema>>,
    #[serde(default)]
    pub additional_properties: Option<Box<DiscoverySchema>>,
    #[serde(rename = "enum", default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub repeated: Option<bool>,
    #[serde(default)]
    pub location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_prefers_explicit_value() {
        let doc: DiscoveryDocument = serde_json::from_value(json!({
            "name": "drive",
            "rootUrl": "https://www.googleapis.com/",
            "servicePath": "drive/v3/",
        }))
        .expect("doc");
        assert_eq!(
            doc.effective_base_url().as_deref(),
            Some("https://www.googleapis.com/drive/v3/")
        );

        let doc = DiscoveryDocument {
            base_url: Some("https://example.com/api/".to_string()),
            ..doc
        };
        assert_eq!(
            doc.effective_base_url().as_deref(),
            Some("https://example.com/api/")
        );
    }

    #[test]
    fn parameters_keep_location_and_repetition() {
        let method: DiscoveryMethod = serde_json::from_value(json!({
            "path": "files/{fileId}",
            "httpMethod": "GET",
            "parameters": {
                "fileId": {"type": "string", "location": "path", "required": true},
                "spaces": {"type": "string", "location": "query", "repeated": true}
            },
            "parameterOrder": ["fileId"],
            "response": {"$ref": "File"}
        }))
        .expect("method");
        assert_eq!(method.parameters["fileId"].location.as_deref(), Some("path"));
        assert_eq!(method.parameters["spaces"].repeated, Some(true));
        assert_eq!(
            method.response.and_then(|r| r.reference).as_deref(),
            Some("File")
        );
    }
}
