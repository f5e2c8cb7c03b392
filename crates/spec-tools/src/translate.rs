//! Provider schema → [`NormalizedSchema`].
//!
//! The only place that looks at source-specific schema fields. Recursion follows `properties`
//! and `items`; `$ref`s are resolved through the document set (`OpenAPI`) or the top-level
//! `schemas` map (Discovery). A reference that re-enters itself is reported as
//! [`SpecToolsError::SchemaCycle`].

use crate::discovery::DiscoverySchema;
use crate::error::{Result, SpecToolsError};
use crate::resolver::{DocId, DocumentSet, RefResolver, canonical_ref_key};
use openapiv3::{ReferenceOr, Schema, SchemaKind, Type};
use specbridge_http_tools::binder::value_to_string;
use specbridge_http_tools::{NormalizedSchema, SchemaType};
use std::collections::BTreeMap;

/// A schema node as it appears in the source document.
#[derive(Debug, Clone, Copy)]
pub enum SourceSchema<'a> {
    OpenApi {
        doc: &'a DocId,
        schema: &'a ReferenceOr<Schema>,
    },
    Discovery(&'a DiscoverySchema),
}

#[derive(Debug, Clone, Copy)]
pub struct SchemaTranslator<'a> {
    resolver: Option<RefResolver<'a>>,
    discovery_schemas: Option<&'a BTreeMap<String, DiscoverySchema>>,
}

impl<'a> SchemaTranslator<'a> {
    #[must_use]
    pub fn for_openapi(docs: &'a DocumentSet) -> Self {
        Self {
            resolver: Some(RefResolver::new(docs)),
            discovery_schemas: None,
        }
    }

    #[must_use]
    pub fn for_discovery(schemas: &'a BTreeMap<String, DiscoverySchema>) -> Self {
        Self {
            resolver: None,
            discovery_schemas: Some(schemas),
        }
    }

    /// Translate `source`; `fallback` is used where the source has no usable type.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::SchemaCycle`] for self-referencing schemas and
    /// [`SpecToolsError::Resolve`] for references that lead nowhere.
    pub fn translate(&self, source: SourceSchema<'_>, fallback: SchemaType) -> Result<NormalizedSchema> {
        let mut stack = Vec::new();
        match source {
            SourceSchema::OpenApi { doc, schema } => match schema {
                ReferenceOr::Item(item) => self.openapi_item(doc, item, fallback, &mut stack),
                ReferenceOr::Reference { reference } => {
                    self.openapi_ref(doc, reference, fallback, &mut stack)
                }
            },
            SourceSchema::Discovery(schema) => self.discovery(schema, fallback, &mut stack),
        }
    }

    fn openapi_ref(
        &self,
        doc: &DocId,
        reference: &str,
        fallback: SchemaType,
        stack: &mut Vec<String>,
    ) -> Result<NormalizedSchema> {
        let resolver = self.resolver.ok_or_else(|| {
            SpecToolsError::Resolve(format!("no document set to resolve '{reference}'"))
        })?;
        let key = canonical_ref_key(doc, reference)?;
        if stack.contains(&key) {
            return Err(SpecToolsError::SchemaCycle {
                reference: reference.to_string(),
            });
        }
        let (target_doc, schema) = resolver.resolve::<Schema>(
            doc,
            &ReferenceOr::Reference {
                reference: reference.to_string(),
            },
        )?;
        stack.push(key);
        let out = self.openapi_item(&target_doc, &schema, fallback, stack);
        stack.pop();
        out
    }

    fn openapi_boxed(
        &self,
        doc: &DocId,
        schema: &ReferenceOr<Box<Schema>>,
        fallback: SchemaType,
        stack: &mut Vec<String>,
    ) -> Result<NormalizedSchema> {
        match schema {
            ReferenceOr::Item(item) => self.openapi_item(doc, item, fallback, stack),
            ReferenceOr::Reference { reference } => self.openapi_ref(doc, reference, fallback, stack),
        }
    }

    fn openapi_any_of(
        &self,
        doc: &DocId,
        schema: &ReferenceOr<Schema>,
        fallback: SchemaType,
        stack: &mut Vec<String>,
    ) -> Result<NormalizedSchema> {
        match schema {
            ReferenceOr::Item(item) => self.openapi_item(doc, item, fallback, stack),
            ReferenceOr::Reference { reference } => self.openapi_ref(doc, reference, fallback, stack),
        }
    }

    fn openapi_item(
        &self,
        doc: &DocId,
        schema: &Schema,
        fallback: SchemaType,
        stack: &mut Vec<String>,
    ) -> Result<NormalizedSchema> {
        let description = schema.schema_data.description.clone();
        let out = match &schema.schema_kind {
            SchemaKind::Type(Type::String(s)) => NormalizedSchema {
                enum_values: s.enumeration.iter().flatten().cloned().collect(),
                ..NormalizedSchema::of_type(SchemaType::String)
            },
            SchemaKind::Type(Type::Number(n)) => NormalizedSchema {
                enum_values: n.enumeration.iter().flatten().map(f64::to_string).collect(),
                ..NormalizedSchema::of_type(SchemaType::Number)
            },
            SchemaKind::Type(Type::Integer(i)) => NormalizedSchema {
                enum_values: i.enumeration.iter().flatten().map(i64::to_string).collect(),
                ..NormalizedSchema::of_type(SchemaType::Integer)
            },
            SchemaKind::Type(Type::Boolean(b)) => NormalizedSchema {
                enum_values: b.enumeration.iter().flatten().map(bool::to_string).collect(),
                ..NormalizedSchema::of_type(SchemaType::Boolean)
            },
            SchemaKind::Type(Type::Array(a)) => {
                let items = match &a.items {
                    Some(items) => Some(Box::new(self.openapi_boxed(
                        doc,
                        items,
                        SchemaType::String,
                        stack,
                    )?)),
                    None => None,
                };
                NormalizedSchema {
                    items,
                    ..NormalizedSchema::of_type(SchemaType::Array)
                }
            }
            SchemaKind::Type(Type::Object(o)) => {
                let mut properties = BTreeMap::new();
                for (name, prop) in &o.properties {
                    properties.insert(
                        name.clone(),
                        self.openapi_boxed(doc, prop, SchemaType::String, stack)?,
                    );
                }
                NormalizedSchema {
                    properties,
                    required: o.required.clone(),
                    ..NormalizedSchema::of_type(SchemaType::Object)
                }
            }
            SchemaKind::AllOf { all_of } => self.merge_all_of(doc, all_of, fallback, stack)?,
            SchemaKind::OneOf { one_of: variants } | SchemaKind::AnyOf { any_of: variants } => {
                match variants.first() {
                    Some(first) => self.openapi_any_of(doc, first, fallback, stack)?,
                    None => NormalizedSchema::of_type(fallback),
                }
            }
            SchemaKind::Not { .. } => NormalizedSchema::of_type(fallback),
            SchemaKind::Any(any) => {
                if !any.all_of.is_empty() {
                    self.merge_all_of(doc, &any.all_of, fallback, stack)?
                } else if let Some(first) = any.one_of.first().or_else(|| any.any_of.first()) {
                    self.openapi_any_of(doc, first, fallback, stack)?
                } else {
                    let schema_type = any
                        .typ
                        .as_deref()
                        .and_then(SchemaType::parse)
                        .unwrap_or(if !any.properties.is_empty() {
                            SchemaType::Object
                        } else if any.items.is_some() {
                            SchemaType::Array
                        } else {
                            fallback
                        });
                    let mut out = NormalizedSchema::of_type(schema_type);
                    for (name, prop) in &any.properties {
                        out.properties.insert(
                            name.clone(),
                            self.openapi_boxed(doc, prop, SchemaType::String, stack)?,
                        );
                    }
                    if let Some(items) = &any.items {
                        out.items = Some(Box::new(self.openapi_boxed(
                            doc,
                            items,
                            SchemaType::String,
                            stack,
                        )?));
                    }
                    out.required.clone_from(&any.required);
                    out.enum_values = any.enumeration.iter().map(value_to_string).collect();
                    out
                }
            }
        };
        let description = description.or_else(|| out.description.clone());
        Ok(out.with_description(description))
    }

    fn merge_all_of(
        &self,
        doc: &DocId,
        parts: &[ReferenceOr<Schema>],
        fallback: SchemaType,
        stack: &mut Vec<String>,
    ) -> Result<NormalizedSchema> {
        let mut translated = Vec::with_capacity(parts.len());
        for part in parts {
            translated.push(self.openapi_any_of(doc, part, SchemaType::Object, stack)?);
        }
        if translated.len() == 1 {
            return Ok(translated.remove(0));
        }
        if translated.is_empty() {
            return Ok(NormalizedSchema::of_type(fallback));
        }

        let mut merged = NormalizedSchema::empty_object();
        for part in translated {
            if merged.description.is_none() {
                merged.description = part.description;
            }
            merged.properties.extend(part.properties);
            for r in part.required {
                if !merged.required.contains(&r) {
                    merged.required.push(r);
                }
            }
        }
        Ok(merged)
    }

    fn discovery(
        &self,
        schema: &DiscoverySchema,
        fallback: SchemaType,
        stack: &mut Vec<String>,
    ) -> Result<NormalizedSchema> {
        if let Some(reference) = &schema.reference {
            if stack.contains(reference) {
                return Err(SpecToolsError::SchemaCycle {
                    reference: reference.clone(),
                });
            }
            let target = self
                .discovery_schemas
                .and_then(|schemas| schemas.get(reference))
                .ok_or_else(|| {
                    SpecToolsError::Resolve(format!("schema '{reference}' is not defined"))
                })?;
            stack.push(reference.clone());
            let out = self.discovery(target, fallback, stack);
            stack.pop();
            // A description on the referencing node wins over the target's.
            return out.map(|s| match &schema.description {
                Some(d) => s.with_description(Some(d.clone())),
                None => s,
            });
        }

        let schema_type = schema
            .schema_type
            .as_deref()
            .and_then(SchemaType::parse)
            .unwrap_or(if schema.properties.is_empty() {
                fallback
            } else {
                SchemaType::Object
            });

        let mut out = NormalizedSchema::of_type(schema_type);
        for (name, prop) in &schema.properties {
            out.properties
                .insert(name.clone(), self.discovery(prop, SchemaType::String, stack)?);
            if prop.required == Some(true) {
                out.required.push(name.clone());
            }
        }
        if let Some(items) = &schema.items {
            out.items = Some(Box::new(self.discovery(items, SchemaType::String, stack)?));
        }
        out.enum_values.clone_from(&schema.enum_values);
        Ok(out.with_description(schema.description.clone()))
    }
}
