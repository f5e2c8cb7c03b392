use crate::error::{Result, SpecToolsError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use specbridge_http_tools::AuthConfig;
use specbridge_http_tools::executor::DEFAULT_TIMEOUT;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which document format the build consumes.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SpecKind {
    #[default]
    OpenApi,
    Discovery,
}

impl SpecKind {
    /// Tag literal added to every tool compiled from this kind of document.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::OpenApi => "openapi",
            Self::Discovery => "google_api",
        }
    }
}

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail the load if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

/// What to do when two operations end up with the same sanitized id.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateOperationPolicy {
    /// Later operation replaces the earlier one (logged).
    #[default]
    Overwrite,
    Fail,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Build configuration for one spec-backed tool server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(rename = "type", default)]
    pub kind: SpecKind,

    pub server_name: String,

    #[serde(default)]
    pub server_description: String,

    /// Spec location when fetched over HTTP(S).
    #[serde(default)]
    pub api_spec_url: Option<String>,

    /// Spec location on disk.
    #[serde(default)]
    pub api_spec_path: Option<PathBuf>,

    /// Override the base URL derived from the spec.
    #[serde(default)]
    pub api_base_url: Option<String>,

    /// Drop operations whose path contains any of these (case-insensitive).
    #[serde(default)]
    pub excluded_paths: Vec<String>,

    /// Keep only operations whose path contains one of these (case-insensitive).
    #[serde(default)]
    pub included_paths: Vec<String>,

    /// Glob (`*`, `?`) over the path; matching operations are dropped.
    #[serde(default)]
    pub exclude_pattern: Option<String>,

    /// Glob (`*`, `?`) over the path; non-matching operations are dropped.
    #[serde(default)]
    pub include_pattern: Option<String>,

    #[serde(default)]
    pub server_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub default_path_parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub authentication: Option<AuthConfig>,

    #[serde(default)]
    pub generate_resources: bool,

    #[serde(default)]
    pub generate_prompts: bool,

    #[serde(default)]
    pub metadata_file: Option<PathBuf>,

    /// Optional spec hash (`sha256:<hex>`) for version detection.
    #[serde(default)]
    pub spec_hash: Option<String>,

    #[serde(default)]
    pub spec_hash_policy: HashPolicy,

    #[serde(default)]
    pub duplicate_operation_policy: DuplicateOperationPolicy,

    /// HTTP client timeout in seconds; 0 disables it.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub user_agent: Option<String>,
}

impl BuildConfig {
    /// Minimal config; everything else takes its default.
    #[must_use]
    pub fn new(kind: SpecKind, server_name: impl Into<String>) -> Self {
        Self {
            kind,
            server_name: server_name.into(),
            server_description: String::new(),
            api_spec_url: None,
            api_spec_path: None,
            api_base_url: None,
            excluded_paths: Vec::new(),
            included_paths: Vec::new(),
            exclude_pattern: None,
            include_pattern: None,
            server_headers: BTreeMap::new(),
            default_path_parameters: BTreeMap::new(),
            authentication: None,
            generate_resources: false,
            generate_prompts: false,
            metadata_file: None,
            spec_hash: None,
            spec_hash_policy: HashPolicy::default(),
            duplicate_operation_policy: DuplicateOperationPolicy::default(),
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }

    /// Read a config file (JSON or YAML). Relative `apiSpecPath`/`metadataFile` entries are
    /// resolved against the config file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails [`Self::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SpecToolsError::Config(format!("failed to read config '{}': {e}", path.display()))
        })?;
        let mut config: Self = parse_json_or_yaml(&content).map_err(|message| {
            SpecToolsError::Config(format!("invalid config '{}': {message}", path.display()))
        })?;

        if let Some(dir) = path.parent() {
            config.api_spec_path = config.api_spec_path.map(|p| relative_to(dir, p));
            config.metadata_file = config.metadata_file.map(|p| relative_to(dir, p));
        }
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`SpecToolsError::Config`] for an empty server name or when not exactly one of
    /// `apiSpecUrl` / `apiSpecPath` is set.
    pub fn validate(&self) -> Result<()> {
        if self.server_name.trim().is_empty() {
            return Err(SpecToolsError::Config(
                "serverName must not be empty".to_string(),
            ));
        }
        match (&self.api_spec_url, &self.api_spec_path) {
            (Some(_), Some(_)) => Err(SpecToolsError::Config(
                "set only one of apiSpecUrl and apiSpecPath".to_string(),
            )),
            (None, None) => Err(SpecToolsError::Config(
                "one of apiSpecUrl or apiSpecPath is required".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Human-readable spec location (URL or path).
    #[must_use]
    pub fn spec_location(&self) -> String {
        match (&self.api_spec_url, &self.api_spec_path) {
            (Some(url), _) => url.clone(),
            (None, Some(path)) => path.display().to_string(),
            (None, None) => String::new(),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    /// Load the metadata overlay named by `metadataFile`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SpecToolsError::Metadata`] if the file cannot be read or parsed.
    pub fn load_overlay(&self) -> Result<Option<MetadataOverlay>> {
        let Some(path) = &self.metadata_file else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path).map_err(|e| SpecToolsError::Metadata {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let overlay = parse_json_or_yaml(&content).map_err(|message| SpecToolsError::Metadata {
            path: path.display().to_string(),
            message,
        })?;
        Ok(Some(overlay))
    }
}

fn relative_to(dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_absolute() || dir.as_os_str().is_empty() {
        path
    } else {
        dir.join(path)
    }
}

fn parse_json_or_yaml<T: DeserializeOwned>(content: &str) -> std::result::Result<T, String> {
    match serde_json::from_str(content) {
        Ok(v) => Ok(v),
        Err(json_err) => serde_yaml::from_str(content)
            .map_err(|yaml_err| format!("not valid JSON ({json_err}) or YAML ({yaml_err})")),
    }
}

/// Externally supplied renames and description rewrites, applied after compilation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataOverlay {
    #[serde(default)]
    pub tools: Vec<ToolOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ToolOverlay {
    /// Compiled tool name this entry applies to (before any rename).
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub parameters: Vec<ParameterOverlay>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ParameterOverlay {
    pub name: String,
    pub description: String,
}
