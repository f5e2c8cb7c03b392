//! Spec loading: read or fetch, verify, parse, normalize, and prefetch external `$ref`s.

use crate::compile::compile_with_overlay;
use crate::config::{BuildConfig, HashPolicy, SpecKind};
use crate::discovery::DiscoveryDocument;
use crate::error::{Result, SpecToolsError};
use crate::registry::ToolRegistry;
use crate::resolver::{DocId, DocumentSet, external_refs, parse_ref};
use openapiv3::OpenAPI;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use specbridge_http_tools::ServerInfo;
use specbridge_http_tools::safety::sanitize_reqwest_error;

/// Upper bound on documents pulled in through external `$ref`s.
const MAX_EXTERNAL_DOCS: usize = 64;

#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    pub spec: OpenAPI,
    /// Location of the root document; relative `$ref`s resolve against it.
    pub root: DocId,
    /// Root document plus every prefetched external document, as raw trees.
    pub docs: DocumentSet,
}

#[derive(Debug, Clone)]
pub enum SpecDocument {
    OpenApi(Box<OpenApiDocument>),
    Discovery(DiscoveryDocument),
}

/// Load the document named by `config`.
///
/// # Errors
///
/// Returns an error if the spec cannot be read, fetched, or parsed, or if its hash does not
/// match under [`HashPolicy::Fail`].
pub async fn load_document(config: &BuildConfig, client: &reqwest::Client) -> Result<SpecDocument> {
    config.validate()?;
    let location = config.spec_location();
    let root = DocId::parse(&location)?;

    tracing::info!(server = %config.server_name, spec = %location, "Loading spec");
    let content = read_document(&root, client).await?;
    verify_hash(config, &content)?;

    let (mut document, normalized) = parse(config.kind, &content, root)?;
    if let SpecDocument::OpenApi(doc) = &mut document {
        prefetch_external_refs(&mut doc.docs, &doc.root, client, normalized).await;
    }
    Ok(document)
}

/// Parse raw JSON/YAML into a document of `kind`. External `$ref`s are not fetched.
///
/// # Errors
///
/// Returns [`SpecToolsError::SpecParse`] if the text is not valid JSON/YAML or does not have
/// the shape of the requested document kind.
pub fn parse_document(kind: SpecKind, raw: &str, root: DocId) -> Result<SpecDocument> {
    parse(kind, raw, root).map(|(document, _)| document)
}

/// Also reports whether the 3.1 → 3.0 normalization ran.
fn parse(kind: SpecKind, raw: &str, root: DocId) -> Result<(SpecDocument, bool)> {
    let location = root.display();
    let mut tree = parse_tree(raw, &location)?;

    match kind {
        SpecKind::OpenApi => {
            let normalized = normalize_openapi_31(&mut tree);
            if normalized {
                tracing::debug!(spec = %location, "Normalized OpenAPI 3.1 document to 3.0");
            }
            let spec: OpenAPI =
                serde_json::from_value(tree.clone()).map_err(|e| SpecToolsError::SpecParse {
                    location: location.clone(),
                    message: e.to_string(),
                })?;
            let mut docs = DocumentSet::new();
            docs.insert(root.clone(), tree);
            Ok((
                SpecDocument::OpenApi(Box::new(OpenApiDocument { spec, root, docs })),
                normalized,
            ))
        }
        SpecKind::Discovery => {
            let doc: DiscoveryDocument =
                serde_json::from_value(tree).map_err(|e| SpecToolsError::SpecParse {
                    location,
                    message: e.to_string(),
                })?;
            Ok((SpecDocument::Discovery(doc), false))
        }
    }
}

/// Load and compile. A spec that cannot be loaded yields an empty registry (logged) so the
/// server can still start.
///
/// # Errors
///
/// Returns compilation errors ([`SpecToolsError::DuplicateOperation`] under the `fail` policy).
pub async fn load_registry(config: &BuildConfig, client: &reqwest::Client) -> Result<ToolRegistry> {
    let server_info = ServerInfo {
        name: config.server_name.clone(),
        description: config.server_description.clone(),
    };

    let document = match load_document(config, client).await {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(
                server = %config.server_name,
                error = %e,
                "Failed to load spec; starting with zero tools"
            );
            return Ok(ToolRegistry::empty(server_info));
        }
    };

    let overlay = match config.load_overlay() {
        Ok(overlay) => overlay,
        Err(e) => {
            tracing::warn!(server = %config.server_name, error = %e, "Ignoring metadata overlay");
            None
        }
    };

    compile_with_overlay(config, &document, overlay.as_ref())
}

async fn read_document(doc: &DocId, client: &reqwest::Client) -> Result<String> {
    match doc {
        DocId::File(path) => {
            std::fs::read_to_string(path).map_err(|e| SpecToolsError::SpecReadFile {
                path: path.display().to_string(),
                source: e,
            })
        }
        DocId::Url(url) => {
            let resp = client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| SpecToolsError::SpecFetch {
                    url: url.to_string(),
                    message: sanitize_reqwest_error(&e),
                })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(SpecToolsError::SpecFetch {
                    url: url.to_string(),
                    message: format!("HTTP {status}"),
                });
            }
            resp.text().await.map_err(|e| SpecToolsError::SpecReadBody {
                url: url.to_string(),
                message: sanitize_reqwest_error(&e),
            })
        }
    }
}

fn verify_hash(config: &BuildConfig, content: &str) -> Result<()> {
    let Some(expected_hash) = &config.spec_hash else {
        return Ok(());
    };
    let actual_hash = format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())));
    if actual_hash.eq_ignore_ascii_case(expected_hash) {
        return Ok(());
    }
    match config.spec_hash_policy {
        HashPolicy::Fail => Err(SpecToolsError::HashMismatch {
            expected: expected_hash.clone(),
            actual: actual_hash,
        }),
        HashPolicy::Warn => {
            tracing::warn!(
                server = %config.server_name,
                expected = %expected_hash,
                actual = %actual_hash,
                "Spec hash mismatch"
            );
            Ok(())
        }
        HashPolicy::Ignore => Ok(()),
    }
}

fn parse_tree(content: &str, location: &str) -> Result<Value> {
    serde_json::from_str(content)
        .or_else(|_| serde_yaml::from_str(content))
        .map_err(|e| SpecToolsError::SpecParse {
            location: location.to_string(),
            message: e.to_string(),
        })
}

/// Fetch every document reachable through external `$ref`s. Failures are logged; the
/// operations that need a missing document are skipped at compile time.
async fn prefetch_external_refs(
    docs: &mut DocumentSet,
    root: &DocId,
    client: &reqwest::Client,
    normalize: bool,
) {
    let mut worklist = vec![root.clone()];
    while let Some(current) = worklist.pop() {
        let Some(value) = docs.get(&current) else {
            continue;
        };
        let mut targets = Vec::new();
        for reference in external_refs(value) {
            match parse_ref(&current, &reference) {
                Ok((target, _)) if !docs.contains(&target) && !targets.contains(&target) => {
                    targets.push(target);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(reference = %reference, error = %e, "Bad $ref"),
            }
        }

        for target in targets {
            if docs.len() >= MAX_EXTERNAL_DOCS {
                tracing::warn!(
                    limit = MAX_EXTERNAL_DOCS,
                    "Too many external $ref documents; not fetching more"
                );
                return;
            }
            let location = target.display();
            let loaded = match read_document(&target, client).await {
                Ok(content) => parse_tree(&content, &location),
                Err(e) => Err(e),
            };
            match loaded {
                Ok(mut tree) => {
                    if normalize {
                        normalize_schemas(&mut tree, false);
                    }
                    docs.insert(target.clone(), tree);
                    worklist.push(target);
                }
                Err(e) => {
                    tracing::warn!(document = %location, error = %e, "Failed to load $ref document");
                }
            }
        }
    }
}

/// Rewrite an `OpenAPI` 3.1 tree into the 3.0 shape `openapiv3` understands. Returns whether
/// anything was done.
pub fn normalize_openapi_31(doc: &mut Value) -> bool {
    let is_31 = doc
        .get("openapi")
        .and_then(Value::as_str)
        .is_some_and(|v| v.starts_with("3.1"));
    if !is_31 {
        return false;
    }
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("openapi".to_string(), json!("3.0.3"));
        obj.entry("paths").or_insert_with(|| json!({}));
        obj.remove("webhooks");
        obj.remove("jsonSchemaDialect");
    }
    normalize_schemas(doc, false);
    true
}

/// `names` marks maps keyed by user-chosen names (`properties`, `schemas`), whose keys must
/// not be read as schema keywords.
fn normalize_schemas(value: &mut Value, names: bool) {
    match value {
        Value::Object(map) => {
            if !names {
                rewrite_schema_keywords(map);
            }
            for (key, child) in map.iter_mut() {
                let child_names = !names
                    && matches!(key.as_str(), "properties" | "patternProperties" | "schemas");
                normalize_schemas(child, child_names);
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_schemas(item, false);
            }
        }
        _ => {}
    }
}

fn rewrite_schema_keywords(map: &mut serde_json::Map<String, Value>) {
    if let Some(Value::Array(types)) = map.get("type").cloned() {
        let nullable = types.iter().any(|t| t == "null");
        match types.into_iter().find(|t| t != "null") {
            Some(first) => {
                map.insert("type".to_string(), first);
            }
            None => {
                map.remove("type");
            }
        }
        if nullable {
            map.insert("nullable".to_string(), json!(true));
        }
    }

    if let Some(value) = map.remove("const") {
        map.insert("enum".to_string(), json!([value]));
    }

    for (exclusive, bound) in [
        ("exclusiveMinimum", "minimum"),
        ("exclusiveMaximum", "maximum"),
    ] {
        if let Some(limit) = map.get(exclusive).filter(|v| v.is_number()).cloned() {
            map.insert(bound.to_string(), limit);
            map.insert(exclusive.to_string(), json!(true));
        }
    }

    map.remove("$schema");
    if map.get("examples").is_some_and(Value::is_array) {
        map.remove("examples");
    }
}
