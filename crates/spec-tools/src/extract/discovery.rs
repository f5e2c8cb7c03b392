//! Google Discovery resources/methods → [`OperationInfo`].

use super::{BODY_PARAMETER, OperationInfo, OperationSet, path_placeholders};
use crate::config::DuplicateOperationPolicy;
use crate::discovery::{DiscoveryDocument, DiscoveryMethod, DiscoverySchema};
use crate::error::Result;
use crate::sanitize::sanitize_name;
use crate::translate::{SchemaTranslator, SourceSchema};
use specbridge_http_tools::{NormalizedSchema, ParamLocation, Parameter, SchemaType};
use std::collections::BTreeSet;

const JSON: &str = "application/json";

/// Walk top-level methods, `resources[*].methods`, and one nested level of
/// `resources[*].resources[*].methods`.
///
/// # Errors
///
/// Returns an error only for duplicate operation ids under the `fail` policy.
pub fn extract_operations(
    doc: &DiscoveryDocument,
    policy: DuplicateOperationPolicy,
) -> Result<OperationSet> {
    let translator = SchemaTranslator::for_discovery(&doc.schemas);
    let mut ops = OperationSet::new(policy);

    let mut visit = |id: String, tag: Option<&str>, method: &DiscoveryMethod| -> Result<()> {
        match operation(&translator, &id, tag, method) {
            Ok(op) => ops.insert(op),
            Err(e) => {
                tracing::warn!(operation = %id, error = %e, "Skipping method that failed to compile");
                Ok(())
            }
        }
    };

    for (name, method) in &doc.methods {
        visit(name.clone(), None, method)?;
    }
    for (resource_name, resource) in &doc.resources {
        for (name, method) in &resource.methods {
            visit(format!("{resource_name}.{name}"), Some(resource_name.as_str()), method)?;
        }
        for (sub_name, sub) in &resource.resources {
            for (name, method) in &sub.methods {
                visit(
                    format!("{resource_name}.{sub_name}.{name}"),
                    Some(resource_name.as_str()),
                    method,
                )?;
            }
            if !sub.resources.is_empty() {
                tracing::debug!(
                    resource = %format!("{resource_name}.{sub_name}"),
                    "Resources nested deeper than one level are not extracted"
                );
            }
        }
    }

    Ok(ops)
}

fn operation(
    translator: &SchemaTranslator<'_>,
    id: &str,
    tag: Option<&str>,
    method: &DiscoveryMethod,
) -> Result<OperationInfo> {
    let path = effective_path(method);
    let placeholders = path_placeholders(&path);

    let mut parameters = Vec::new();
    for (name, schema) in ordered_parameters(method) {
        let location = match schema.location.as_deref() {
            Some("path") => ParamLocation::Path,
            _ => ParamLocation::Query,
        };
        if location == ParamLocation::Path && !placeholders.iter().any(|p| p == name) {
            continue;
        }
        parameters.push(parameter(translator, name, location, schema)?);
    }
    for placeholder in &placeholders {
        if !parameters.iter().any(|p| &p.name == placeholder) {
            parameters.push(
                Parameter::new(placeholder.clone(), ParamLocation::Path)
                    .with_schema(NormalizedSchema::of_type(SchemaType::String)),
            );
        }
    }

    let mut content_type = None;
    if let Some(request) = &method.request {
        let schema = translator.translate(SourceSchema::Discovery(request), SchemaType::Object)?;
        parameters.push(
            Parameter::new(BODY_PARAMETER, ParamLocation::Body)
                .required(true)
                .with_schema(schema)
                .with_content_type(JSON),
        );
        content_type = Some(JSON.to_string());
    }

    let response_schema = match &method.response {
        Some(response) => translator
            .translate(SourceSchema::Discovery(response), SchemaType::Object)
            .unwrap_or_else(|e| {
                tracing::warn!(
                    operation = %id,
                    error = %e,
                    "Response schema could not be translated; using an empty object"
                );
                NormalizedSchema::empty_object()
            }),
        None => NormalizedSchema::empty_object(),
    };

    Ok(OperationInfo {
        operation_id: sanitize_name(id),
        summary: None,
        description: method.description.clone(),
        path,
        method: method.http_method.to_ascii_uppercase(),
        parameters,
        response_schema,
        tags: tag.map(str::to_string).into_iter().collect::<BTreeSet<_>>(),
        content_type,
    })
}

/// `flatPath` for reserved-expansion paths when available, else the path with `{+x}` → `{x}`.
fn effective_path(method: &DiscoveryMethod) -> String {
    if method.path.contains('+')
        && let Some(flat) = method.flat_path.as_deref().filter(|f| !f.is_empty())
    {
        return flat.to_string();
    }
    method.path.replace("{+", "{")
}

/// `parameterOrder` first, then the remaining parameters by name.
fn ordered_parameters(method: &DiscoveryMethod) -> Vec<(&str, &DiscoverySchema)> {
    let mut out: Vec<(&str, &DiscoverySchema)> = method
        .parameter_order
        .iter()
        .filter_map(|name| {
            method
                .parameters
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
        })
        .collect();
    for (name, schema) in &method.parameters {
        if !method.parameter_order.contains(name) {
            out.push((name.as_str(), schema));
        }
    }
    out
}

fn parameter(
    translator: &SchemaTranslator<'_>,
    name: &str,
    location: ParamLocation,
    schema: &DiscoverySchema,
) -> Result<Parameter> {
    let item = translator.translate(SourceSchema::Discovery(schema), SchemaType::String)?;
    let translated = if schema.repeated == Some(true) {
        NormalizedSchema {
            items: Some(Box::new(NormalizedSchema {
                description: None,
                ..item
            })),
            ..NormalizedSchema::of_type(SchemaType::Array)
        }
        .with_description(schema.description.clone())
    } else {
        item
    };

    Ok(Parameter::new(name, location)
        .required(schema.required == Some(true) || location == ParamLocation::Path)
        .with_schema(translated)
        .with_description(schema.description.clone()))
}
