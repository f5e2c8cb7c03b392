//! Build-time side of specbridge: turns an `OpenAPI` 3.x or Google Discovery document into an
//! immutable registry of callable tools.
//!
//! Pipeline: load ([`loader`]) → extract operations ([`extract`]) → filter ([`filter`]) →
//! compile ([`compile`]) → [`ToolRegistry`]. Call-time work (binding, auth, HTTP) lives in
//! `specbridge-http-tools`; [`ToolServer`] ties the two together.

pub mod compile;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod filter;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod sanitize;
pub mod server;
pub mod translate;

pub use compile::{compile, compile_with, compile_with_overlay};
pub use config::{BuildConfig, DuplicateOperationPolicy, HashPolicy, MetadataOverlay, SpecKind};
pub use error::{Result, SpecToolsError};
pub use filter::{OperationFilter, PathGlob};
pub use loader::{SpecDocument, load_document, load_registry, parse_document};
pub use registry::{PromptInfo, ResourceInfo, ToolRegistry};
pub use sanitize::sanitize_name;
pub use server::ToolServer;
