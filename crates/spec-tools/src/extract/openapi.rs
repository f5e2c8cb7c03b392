//! `OpenAPI` paths × methods → [`OperationInfo`].

use super::{BODY_PARAMETER, OperationInfo, OperationSet, fallback_operation_id};
use crate::config::DuplicateOperationPolicy;
use crate::error::Result;
use crate::resolver::{DocId, DocumentSet, RefResolver};
use crate::sanitize::sanitize_name;
use crate::translate::{SchemaTranslator, SourceSchema};
use openapiv3::{
    Content, MediaType, OpenAPI, Operation, Parameter as OpenApiParameter, ParameterSchemaOrContent,
    PathItem, ReferenceOr, StatusCode,
};
use specbridge_http_tools::{NormalizedSchema, ParamLocation, Parameter, SchemaType};
use std::collections::HashMap;

/// Request body media types we can serialize, in preference order.
pub const BODY_CONTENT_TYPES: [&str; 3] = [
    "application/json",
    "multipart/form-data",
    "application/x-www-form-urlencoded",
];

/// Walk every path and method of `spec`.
///
/// Operations that fail to translate are logged and skipped.
///
/// # Errors
///
/// Returns an error only for duplicate operation ids under the `fail` policy.
pub fn extract_operations(
    spec: &OpenAPI,
    root: &DocId,
    docs: &DocumentSet,
    policy: DuplicateOperationPolicy,
) -> Result<OperationSet> {
    let extractor = Extractor {
        resolver: RefResolver::new(docs),
        translator: SchemaTranslator::for_openapi(docs),
    };
    let mut ops = OperationSet::new(policy);

    for (path, item) in &spec.paths.paths {
        let (doc, item) = match extractor.resolver.resolve(root, item) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Skipping unresolvable path item");
                continue;
            }
        };

        for (method, operation) in operations(&item) {
            match extractor.operation(&doc, path, method, &item, operation) {
                Ok(op) => ops.insert(op)?,
                Err(e) => {
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        error = %e,
                        "Skipping operation that failed to compile"
                    );
                }
            }
        }
    }

    Ok(ops)
}

fn operations(item: &PathItem) -> impl Iterator<Item = (&'static str, &Operation)> {
    [
        ("GET", &item.get),
        ("PUT", &item.put),
        ("POST", &item.post),
        ("DELETE", &item.delete),
        ("OPTIONS", &item.options),
        ("HEAD", &item.head),
        ("PATCH", &item.patch),
        ("TRACE", &item.trace),
    ]
    .into_iter()
    .filter_map(|(method, op)| op.as_ref().map(|op| (method, op)))
}

struct Extractor<'a> {
    resolver: RefResolver<'a>,
    translator: SchemaTranslator<'a>,
}

impl Extractor<'_> {
    fn operation(
        &self,
        doc: &DocId,
        path: &str,
        method: &str,
        item: &PathItem,
        operation: &Operation,
    ) -> Result<OperationInfo> {
        let operation_id = operation
            .operation_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .map_or_else(|| fallback_operation_id(method, path), sanitize_name);

        let mut parameters = Vec::new();
        for (param_doc, param) in self.merge_parameters(doc, &item.parameters, &operation.parameters)? {
            if let Some(p) = self.parameter(&param_doc, &param)? {
                parameters.push(p);
            }
        }

        let mut content_type = None;
        if let Some(body) = &operation.request_body {
            let (body_doc, body) = self.resolver.resolve(doc, body)?;
            if let Some((mime, media)) = pick_body_media(&body.content) {
                let mut schema = self.media_schema(&body_doc, media, SchemaType::Object)?;
                let description = body.description.clone();
                if description.is_some() {
                    schema = schema.with_description(description.clone());
                }
                parameters.push(
                    Parameter::new(BODY_PARAMETER, ParamLocation::Body)
                        .required(true)
                        .with_schema(schema)
                        .with_description(description)
                        .with_content_type(mime),
                );
                content_type = Some(mime.to_string());
            } else {
                tracing::debug!(
                    operation = %operation_id,
                    "Request body has no supported content type; ignoring it"
                );
            }
        }

        let response_schema = match self.response_schema(doc, operation) {
            Ok(schema) => schema,
            Err(e) => {
                tracing::warn!(
                    operation = %operation_id,
                    error = %e,
                    "Response schema could not be translated; using an empty object"
                );
                NormalizedSchema::empty_object()
            }
        };

        Ok(OperationInfo {
            operation_id,
            summary: operation.summary.clone(),
            description: operation.description.clone(),
            path: path.to_string(),
            method: method.to_string(),
            parameters,
            response_schema,
            tags: operation.tags.iter().cloned().collect(),
            content_type,
        })
    }

    /// Path-item parameters first; operation parameters replace them on the same
    /// `(location, name)`.
    fn merge_parameters(
        &self,
        doc: &DocId,
        path_item_params: &[ReferenceOr<OpenApiParameter>],
        operation_params: &[ReferenceOr<OpenApiParameter>],
    ) -> Result<Vec<(DocId, OpenApiParameter)>> {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        struct Key {
            loc: &'static str,
            name: String,
        }

        fn key_for(p: &OpenApiParameter) -> Key {
            let loc = match p {
                OpenApiParameter::Path { .. } => "path",
                OpenApiParameter::Query { .. } => "query",
                OpenApiParameter::Header { .. } => "header",
                OpenApiParameter::Cookie { .. } => "cookie",
            };
            Key {
                loc,
                name: p.parameter_data_ref().name.clone(),
            }
        }

        let mut merged: Vec<(DocId, OpenApiParameter)> = Vec::new();
        let mut index: HashMap<Key, usize> = HashMap::new();

        for p in path_item_params {
            let (pdoc, rp) = self.resolver.resolve(doc, p)?;
            index.insert(key_for(&rp), merged.len());
            merged.push((pdoc, rp));
        }

        for p in operation_params {
            let (pdoc, rp) = self.resolver.resolve(doc, p)?;
            let k = key_for(&rp);
            if let Some(i) = index.get(&k).copied() {
                merged[i] = (pdoc, rp);
            } else {
                index.insert(k, merged.len());
                merged.push((pdoc, rp));
            }
        }

        Ok(merged)
    }

    fn parameter(&self, doc: &DocId, param: &OpenApiParameter) -> Result<Option<Parameter>> {
        let location = match param {
            OpenApiParameter::Path { .. } => ParamLocation::Path,
            OpenApiParameter::Query { .. } => ParamLocation::Query,
            OpenApiParameter::Header { .. } => ParamLocation::Header,
            OpenApiParameter::Cookie { parameter_data, .. } => {
                tracing::debug!(parameter = %parameter_data.name, "Skipping cookie parameter");
                return Ok(None);
            }
        };
        let data = param.parameter_data_ref();

        let schema = match &data.format {
            ParameterSchemaOrContent::Schema(schema) => self.translator.translate(
                SourceSchema::OpenApi { doc, schema },
                SchemaType::String,
            )?,
            ParameterSchemaOrContent::Content(content) => match content.first() {
                Some((_, media)) => self.media_schema(doc, media, SchemaType::String)?,
                None => NormalizedSchema::of_type(SchemaType::String),
            },
        };
        let schema = if schema.description.is_none() {
            schema.with_description(data.description.clone())
        } else {
            schema
        };

        Ok(Some(
            Parameter::new(data.name.clone(), location)
                .required(data.required || location == ParamLocation::Path)
                .with_schema(schema)
                .with_description(data.description.clone()),
        ))
    }

    fn media_schema(
        &self,
        doc: &DocId,
        media: &MediaType,
        fallback: SchemaType,
    ) -> Result<NormalizedSchema> {
        match &media.schema {
            Some(schema) => self
                .translator
                .translate(SourceSchema::OpenApi { doc, schema }, fallback),
            None => Ok(NormalizedSchema::of_type(fallback)),
        }
    }

    /// `200` response, first content entry; otherwise an empty object.
    fn response_schema(&self, doc: &DocId, operation: &Operation) -> Result<NormalizedSchema> {
        let Some(response) = operation.responses.responses.get(&StatusCode::Code(200)) else {
            return Ok(NormalizedSchema::empty_object());
        };
        let (response_doc, response) = self.resolver.resolve(doc, response)?;
        match response.content.first() {
            Some((_, media)) => self.media_schema(&response_doc, media, SchemaType::Object),
            None => Ok(NormalizedSchema::empty_object()),
        }
    }
}

/// First supported media type, matched on the essence (parameters such as `charset` ignored).
fn pick_body_media<'c>(
    content: &'c Content,
) -> Option<(&'static str, &'c MediaType)> {
    BODY_CONTENT_TYPES.iter().find_map(|wanted| {
        content
            .iter()
            .find(|(mime, _)| {
                mime.split(';')
                    .next()
                    .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(wanted))
            })
            .map(|(_, media)| (*wanted, media))
    })
}
