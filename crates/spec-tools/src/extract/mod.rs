//! Operation extraction: one [`OperationInfo`] per spec operation.

pub mod discovery;
pub mod openapi;

use crate::config::DuplicateOperationPolicy;
use crate::error::{Result, SpecToolsError};
use crate::sanitize::sanitize_name;
use serde::Serialize;
use specbridge_http_tools::{NormalizedSchema, Parameter};
use std::collections::{BTreeSet, HashMap};

/// Name of the synthetic parameter carrying the request payload.
pub const BODY_PARAMETER: &str = "body";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInfo {
    /// Sanitized operation id; unique within an [`OperationSet`].
    pub operation_id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Raw path template (`/pets/{petId}`).
    pub path: String,
    /// Uppercase HTTP verb.
    pub method: String,
    pub parameters: Vec<Parameter>,
    pub response_schema: NormalizedSchema,
    pub tags: BTreeSet<String>,
    /// Content type of the body parameter, if any.
    pub content_type: Option<String>,
}

impl OperationInfo {
    #[must_use]
    pub fn has_body(&self) -> bool {
        self.parameters
            .iter()
            .any(|p| p.location == specbridge_http_tools::ParamLocation::Body)
    }
}

/// Extracted operations in document order, keyed by operation id.
#[derive(Debug, Clone, Default)]
pub struct OperationSet {
    ops: Vec<OperationInfo>,
    index: HashMap<String, usize>,
    policy: DuplicateOperationPolicy,
}

impl OperationSet {
    #[must_use]
    pub fn new(policy: DuplicateOperationPolicy) -> Self {
        Self {
            ops: Vec::new(),
            index: HashMap::new(),
            policy,
        }
    }

    /// Add an operation. A repeated id replaces the earlier entry in place, or fails under
    /// [`DuplicateOperationPolicy::Fail`].
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::DuplicateOperation`] under the `fail` policy.
    pub fn insert(&mut self, op: OperationInfo) -> Result<()> {
        let Some(&i) = self.index.get(&op.operation_id) else {
            self.index.insert(op.operation_id.clone(), self.ops.len());
            self.ops.push(op);
            return Ok(());
        };

        let first = format!("{} {}", self.ops[i].method, self.ops[i].path);
        let second = format!("{} {}", op.method, op.path);
        match self.policy {
            DuplicateOperationPolicy::Fail => Err(SpecToolsError::DuplicateOperation {
                operation_id: op.operation_id,
                first,
                second,
            }),
            DuplicateOperationPolicy::Overwrite => {
                tracing::warn!(
                    operation = %op.operation_id,
                    replaced = %first,
                    by = %second,
                    "Duplicate operation id; keeping the later operation"
                );
                self.ops[i] = op;
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn get(&self, operation_id: &str) -> Option<&OperationInfo> {
        self.index.get(operation_id).map(|&i| &self.ops[i])
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OperationInfo> {
        self.ops.iter()
    }

    /// Keep only operations matching `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&OperationInfo) -> bool) {
        self.ops.retain(|op| keep(op));
        self.index = self
            .ops
            .iter()
            .enumerate()
            .map(|(i, op)| (op.operation_id.clone(), i))
            .collect();
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<OperationInfo> {
        self.ops
    }
}

/// `{METHOD}_{lastPathSegment}`, sanitized; used when a spec omits the operation id.
#[must_use]
pub fn fallback_operation_id(method: &str, path: &str) -> String {
    let last = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    sanitize_name(&format!("{}_{last}", method.to_ascii_uppercase()))
}

/// Placeholder names in a path template, without reserved-expansion markers (`{+name}`).
pub(crate) fn path_placeholders(template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = after[..end].trim_start_matches('+');
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
        rest = &after[end + 1..];
    }
    out
}
