//! Operation filtering by path.
//!
//! Four independent, AND-combined filters applied in a fixed order:
//! exclusion predicate, inclusion predicate, excluded substrings, included substrings.

use crate::config::BuildConfig;
use crate::error::{Result, SpecToolsError};
use crate::extract::OperationSet;
use regex::Regex;
use std::fmt;
use std::sync::Arc;

pub type PathPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Clone, Default)]
pub struct OperationFilter {
    /// Operations whose path matches are dropped.
    pub exclude_predicate: Option<PathPredicate>,
    /// Operations whose path does not match are dropped.
    pub include_predicate: Option<PathPredicate>,
    pub excluded_paths: Vec<String>,
    pub included_paths: Vec<String>,
}

impl fmt::Debug for OperationFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationFilter")
            .field("exclude_predicate", &self.exclude_predicate.is_some())
            .field("include_predicate", &self.include_predicate.is_some())
            .field("excluded_paths", &self.excluded_paths)
            .field("included_paths", &self.included_paths)
            .finish()
    }
}

impl OperationFilter {
    /// Filters named by the build config; glob patterns become predicates.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::Config`] for a pattern that cannot be compiled.
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        let compile = |pattern: &Option<String>| {
            pattern
                .as_deref()
                .map(|p| PathGlob::new(p).map(glob_predicate))
                .transpose()
        };
        Ok(Self {
            exclude_predicate: compile(&config.exclude_pattern)?,
            include_predicate: compile(&config.include_pattern)?,
            excluded_paths: config.excluded_paths.clone(),
            included_paths: config.included_paths.clone(),
        })
    }

    #[must_use]
    pub fn with_exclude_predicate(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.exclude_predicate = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn with_include_predicate(
        mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.include_predicate = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn allows(&self, path: &str) -> bool {
        if let Some(exclude) = &self.exclude_predicate
            && exclude(path)
        {
            return false;
        }
        if let Some(include) = &self.include_predicate
            && !include(path)
        {
            return false;
        }

        let lower = path.to_lowercase();
        if self
            .excluded_paths
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
        {
            return false;
        }
        if !self.included_paths.is_empty()
            && !self
                .included_paths
                .iter()
                .any(|p| lower.contains(&p.to_lowercase()))
        {
            return false;
        }
        true
    }

    pub fn apply(&self, ops: &mut OperationSet) {
        let before = ops.len();
        ops.retain(|op| self.allows(&op.path));
        let dropped = before - ops.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = ops.len(), "Filtered operations by path");
        }
    }
}

fn glob_predicate(glob: PathGlob) -> PathPredicate {
    Arc::new(move |path: &str| glob.matches(path))
}

/// A path glob from the build config: `*` matches any run of characters (including `/`),
/// `?` exactly one character, everything else itself. Matching is anchored and
/// case-sensitive.
#[derive(Debug, Clone)]
pub struct PathGlob {
    pattern: String,
    regex: Regex,
}

impl PathGlob {
    /// # Errors
    ///
    /// Returns [`SpecToolsError::Config`] if the translated pattern is rejected by the regex
    /// engine (for example, when it exceeds the compiled size limit).
    pub fn new(pattern: &str) -> Result<Self> {
        let mut translated = String::with_capacity(pattern.len() + 8);
        translated.push_str("^(?s:");
        for ch in pattern.chars() {
            match ch {
                '*' => translated.push_str(".*"),
                '?' => translated.push('.'),
                other => translated.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        translated.push_str(")$");
        let regex = Regex::new(&translated).map_err(|e| {
            SpecToolsError::Config(format!("invalid path pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecKind;

    fn lists(excluded: &[&str], included: &[&str]) -> OperationFilter {
        OperationFilter {
            excluded_paths: excluded.iter().map(ToString::to_string).collect(),
            included_paths: included.iter().map(ToString::to_string).collect(),
            ..OperationFilter::default()
        }
    }

    #[test]
    fn empty_filter_allows_everything() {
        assert!(OperationFilter::default().allows("/anything"));
    }

    #[test]
    fn exclusion_is_independent_of_inclusion() {
        let filter = lists(&["/pets"], &["/pets/{id}"]);
        assert!(!filter.allows("/pets/{id}"), "excluded by substring");
        assert!(!filter.allows("/store"), "fails inclusion");

        let filter = lists(&["/admin"], &["/pets/{id}"]);
        assert!(filter.allows("/pets/{id}"));
        assert!(!filter.allows("/admin/pets/{id}"));
    }

    #[test]
    fn substring_lists_ignore_case() {
        let filter = lists(&["/Internal"], &[]);
        assert!(!filter.allows("/v1/INTERNAL/health"));
        let filter = lists(&[], &["PETS"]);
        assert!(filter.allows("/pets"));
    }

    #[test]
    fn predicates_and_lists_are_both_enforced() {
        let filter = lists(&["/legacy"], &[])
            .with_include_predicate(|p| p.starts_with("/v2"))
            .with_exclude_predicate(|p| p.ends_with("/debug"));
        assert!(filter.allows("/v2/pets"));
        assert!(!filter.allows("/v1/pets"));
        assert!(!filter.allows("/v2/pets/debug"));
        assert!(!filter.allows("/v2/legacy/pets"));
    }

    #[test]
    fn config_patterns_become_glob_predicates() {
        let mut config = BuildConfig::new(SpecKind::OpenApi, "petstore");
        config.exclude_pattern = Some("/admin/*".to_string());
        config.include_pattern = Some("/*/pets*".to_string());
        let filter = OperationFilter::from_config(&config).expect("filter");
        assert!(filter.allows("/v1/pets/{id}"));
        assert!(!filter.allows("/admin/pets"));
        assert!(!filter.allows("/v1/store"));
    }

    fn glob(pattern: &str) -> PathGlob {
        PathGlob::new(pattern).expect("glob")
    }

    #[test]
    fn glob_wildcards_span_segments_and_single_characters() {
        assert!(glob("/pets/*").matches("/pets/42"));
        assert!(glob("/pets/*").matches("/pets/{petId}/photos"));
        assert!(glob("/pet?").matches("/pets"));
        assert!(!glob("/pets/?").matches("/pets/42"));
        assert!(glob("*/orders/*/items").matches("/v1/orders/{orderId}/items"));
        assert!(glob("*").matches(""));
    }

    #[test]
    fn glob_is_anchored_and_case_sensitive() {
        assert!(!glob("/pets").matches("/pets/{petId}"));
        assert!(!glob("/pets").matches("/v1/pets"));
        assert!(!glob("/Pets/*").matches("/pets/42"));
    }

    #[test]
    fn glob_treats_regex_and_template_characters_literally() {
        assert!(glob("/pets/{petId}").matches("/pets/{petId}"));
        assert!(!glob("/pets/{petId}").matches("/pets/42"));
        assert!(glob("/v1.0/*").matches("/v1.0/pets"));
        assert!(!glob("/v1.0/*").matches("/v100/pets"));
        assert!(glob("/search+(x)").matches("/search+(x)"));
    }

    #[test]
    fn glob_keeps_its_source_pattern() {
        assert_eq!(glob("/admin/*").as_str(), "/admin/*");
    }

    #[test]
    fn excluding_glob_drops_matching_operations_only() {
        let mut config = BuildConfig::new(SpecKind::OpenApi, "petstore");
        config.exclude_pattern = Some("*/internal/*".to_string());
        let filter = OperationFilter::from_config(&config).expect("filter");
        assert!(!filter.allows("/v1/internal/health"));
        assert!(filter.allows("/v1/internal"));
        assert!(filter.allows("/v1/pets"));
    }
}
