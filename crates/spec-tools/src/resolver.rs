//! `OpenAPI` `$ref` resolver.
//!
//! The `openapiv3` crate models `$ref`s using `ReferenceOr<T>` but does not resolve them. The
//! loader prefetches every document reachable through `$ref`s into a [`DocumentSet`], so
//! resolution here is synchronous and compilation never touches the network.
//!
//! Supported forms:
//! - Local refs (`#/...`)
//! - File refs (`./common.yaml#/...`, `/abs/path/spec.yaml#/...`, `file:///...#/...`)
//! - URL refs (`https://example.com/common.yaml#/...`)
//!
//! Resolution is **relative to the document that contains the `$ref`**, so callers always pass
//! the current document id.

use crate::error::{Result, SpecToolsError};
use openapiv3::ReferenceOr;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
}

impl DocId {
    /// Parse a root spec location into a document identifier (URL or file path).
    ///
    /// # Errors
    ///
    /// Returns an error if the location is an invalid URL or invalid file URL.
    pub fn parse(spec_location: &str) -> Result<Self> {
        if spec_location.starts_with("http://") || spec_location.starts_with("https://") {
            let url = Url::parse(spec_location).map_err(|e| {
                SpecToolsError::Config(format!("Invalid spec URL '{spec_location}': {e}"))
            })?;
            Ok(DocId::Url(strip_fragment(url)))
        } else if spec_location.starts_with("file://") {
            let url = Url::parse(spec_location).map_err(|e| {
                SpecToolsError::Config(format!("Invalid spec file URL '{spec_location}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                SpecToolsError::Config(format!(
                    "Invalid file URL (cannot convert to path): {spec_location}"
                ))
            })?;
            Ok(DocId::File(canonicalize_best_effort(path)))
        } else {
            Ok(DocId::File(canonicalize_best_effort(PathBuf::from(
                spec_location,
            ))))
        }
    }

    #[must_use]
    pub fn display(&self) -> String {
        match self {
            DocId::Url(u) => u.to_string(),
            DocId::File(p) => p.display().to_string(),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Parsed documents keyed by location: the root spec plus everything it references.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    docs: HashMap<DocId, Arc<Value>>,
}

impl DocumentSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: DocId, doc: Value) {
        self.docs.insert(id, Arc::new(doc));
    }

    #[must_use]
    pub fn get(&self, id: &DocId) -> Option<&Value> {
        self.docs.get(id).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn contains(&self, id: &DocId) -> bool {
        self.docs.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefResolver<'a> {
    docs: &'a DocumentSet,
}

impl<'a> RefResolver<'a> {
    #[must_use]
    pub fn new(docs: &'a DocumentSet) -> Self {
        Self { docs }
    }

    /// Follow `r` (and any chain of `$ref`s it lands on) to an item.
    ///
    /// Returns the item together with the document it was found in; nested `$ref`s inside the
    /// item resolve against that document.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::SchemaCycle`] for a reference chain that loops, and
    /// [`SpecToolsError::Resolve`] when a target is missing or has the wrong shape.
    pub fn resolve<T>(&self, current_doc: &DocId, r: &ReferenceOr<T>) -> Result<(DocId, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut visited: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut reference = match r {
            ReferenceOr::Item(item) => return Ok((doc, item.clone())),
            ReferenceOr::Reference { reference } => reference.clone(),
        };

        loop {
            if !visited.insert(canonical_ref_key(&doc, &reference)?) {
                return Err(SpecToolsError::SchemaCycle { reference });
            }
            let (target_doc, value) = self.lookup(&doc, &reference)?;
            let next: ReferenceOr<T> = serde_json::from_value(value).map_err(|e| {
                SpecToolsError::Resolve(format!(
                    "'{reference}' in {} has an unexpected shape: {e}",
                    target_doc.display()
                ))
            })?;
            doc = target_doc;
            match next {
                ReferenceOr::Item(item) => return Ok((doc, item)),
                ReferenceOr::Reference { reference: r } => reference = r,
            }
        }
    }

    fn lookup(&self, current_doc: &DocId, reference: &str) -> Result<(DocId, Value)> {
        let (target_doc, pointer) = parse_ref(current_doc, reference)?;
        let Some(root) = self.docs.get(&target_doc) else {
            return Err(SpecToolsError::Resolve(format!(
                "'{reference}' needs {}, which was not loaded",
                target_doc.display()
            )));
        };
        let value = match pointer.as_deref() {
            None => root,
            Some(ptr) => root.pointer(ptr).ok_or_else(|| {
                SpecToolsError::Resolve(format!(
                    "'{reference}': {} has nothing at '{ptr}'",
                    target_doc.display()
                ))
            })?,
        };
        Ok((target_doc, value.clone()))
    }
}

/// Split a `$ref` into its target document (relative to `current_doc`) and JSON pointer.
pub(crate) fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
    let (doc_part, fragment) = reference.split_once('#').unwrap_or((reference, ""));
    let pointer = match fragment {
        "" => None,
        f if f.starts_with('/') => Some(f.to_string()),
        _ => {
            return Err(SpecToolsError::Resolve(format!(
                "'{reference}': only JSON pointer fragments ('#/...') are supported"
            )));
        }
    };
    Ok((resolve_doc(current_doc, doc_part)?, pointer))
}

pub(crate) fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
    if doc_part.is_empty() {
        return Ok(current_doc.clone());
    }

    if doc_part.starts_with("http://") || doc_part.starts_with("https://") {
        let url = Url::parse(doc_part)
            .map_err(|e| SpecToolsError::Resolve(format!("bad $ref URL '{doc_part}': {e}")))?;
        return Ok(DocId::Url(strip_fragment(url)));
    }

    if doc_part.starts_with("file://") {
        let url = Url::parse(doc_part).map_err(|e| {
            SpecToolsError::Resolve(format!("bad $ref file URL '{doc_part}': {e}"))
        })?;
        let path = url.to_file_path().map_err(|()| {
            SpecToolsError::Resolve(format!("bad $ref file URL (not a path): {doc_part}"))
        })?;
        return Ok(DocId::File(canonicalize_best_effort(path)));
    }

    match current_doc {
        DocId::Url(base) => {
            let joined = base.join(doc_part).map_err(|e| {
                SpecToolsError::Resolve(format!(
                    "failed to resolve relative $ref '{doc_part}' against base {base}: {e}"
                ))
            })?;
            Ok(DocId::Url(strip_fragment(joined)))
        }
        DocId::File(base) => {
            // Absolute paths should remain absolute.
            let resolved = if Path::new(doc_part).is_absolute() {
                PathBuf::from(doc_part)
            } else {
                base.parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(doc_part)
            };
            Ok(DocId::File(canonicalize_best_effort(resolved)))
        }
    }
}

pub(crate) fn canonical_ref_key(current_doc: &DocId, reference: &str) -> Result<String> {
    let (target_doc, pointer) = parse_ref(current_doc, reference)?;
    let mut key = match &target_doc {
        DocId::Url(u) => format!("url:{u}"),
        DocId::File(p) => format!("file:{}", p.display()),
    };
    if let Some(ptr) = pointer {
        key.push('#');
        key.push_str(&ptr);
    }
    Ok(key)
}

/// Every non-local `$ref` string in `value`, in document order.
#[must_use]
pub fn external_refs(value: &Value) -> Vec<String> {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(r)) = map.get("$ref")
                    && !r.starts_with('#')
                {
                    out.push(r.clone());
                }
                for v in map.values() {
                    walk(v, out);
                }
            }
            Value::Array(items) => {
                for v in items {
                    walk(v, out);
                }
            }
            _ => {}
        }
    }

    let mut out = Vec::new();
    walk(value, &mut out);
    out
}
