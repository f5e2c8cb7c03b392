//! Call-time runtime for spec-derived HTTP tools.
//!
//! Holds the compiled tool model shared with `specbridge-spec-tools`, plus everything that runs
//! per invocation: argument binding, authentication, and the HTTP round-trip. Nothing in here
//! knows about `OpenAPI` or Discovery documents.

pub mod auth;
pub mod binder;
pub mod error;
pub mod executor;
pub mod kwargs;
pub mod model;
pub mod safety;
pub mod schema;
pub mod semantics;

pub use auth::{AuthConfig, Authenticator, AuthenticatorRegistry};
pub use binder::{PreparedRequest, RequestBinder};
pub use error::{HttpToolsError, Result};
pub use executor::{ExecutorConfig, HttpExecutor};
pub use model::{ParamLocation, Parameter, ServerInfo, ToolInfo, ToolMetadata};
pub use schema::{NormalizedSchema, SchemaType};
