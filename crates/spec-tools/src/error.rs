//! Error types for `specbridge-spec-tools`.

use specbridge_http_tools::HttpToolsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpecToolsError {
    /// Invalid or contradictory build configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("failed to read spec body from '{url}': {message}")]
    SpecReadBody { url: String, message: String },

    #[error("failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse spec from '{location}': {message}")]
    SpecParse { location: String, message: String },

    #[error("spec hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// A `$ref` that cannot be followed (missing document, bad pointer, wrong shape).
    #[error("unresolved reference: {0}")]
    Resolve(String),

    #[error("cyclic schema reference: {reference}")]
    SchemaCycle { reference: String },

    #[error("duplicate operation id '{operation_id}' ({first} and {second})")]
    DuplicateOperation {
        operation_id: String,
        first: String,
        second: String,
    },

    #[error("failed to load metadata overlay '{path}': {message}")]
    Metadata { path: String, message: String },

    #[error(transparent)]
    Http(#[from] HttpToolsError),
}

pub type Result<T> = std::result::Result<T, SpecToolsError>;
