//! # jsreg-schema - Schema Registry
//!
//! Compiles JSON Schemas into reusable validation pipelines.
//!
//! A [`SchemaRegistry`] owns everything a pipeline needs:
//!
//! - an engine (`jsonschema` by default, see [`validate`]) that evaluates
//!   schema keywords;
//! - a [`RemoteSchemaCache`] that fetches and keeps documents named by
//!   external `$ref`s;
//! - ordered pre and post transform sets, each a [`JsonVisitor`] walked over
//!   the data by [`visit_json`];
//! - the registered [`SchemaFormat`]s.
//!
//! ```no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use jsreg_schema::{RegistryConfig, SchemaRegistry};
//! use serde_json::json;
//!
//! let registry = SchemaRegistry::new(RegistryConfig::default())?;
//! let validator = registry
//!     .compile(json!({"type": "object", "properties": {"name": {"type": "string"}}}))
//!     .await?;
//! let result = validator.validate(json!({})).await?;
//! assert!(result.success);
//! assert_eq!(result.data, json!({"name": null}));
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Policy
//!
//! - Depends only on `jsreg-core` internally.
//! - Registries share nothing: each one has its own cache and transforms.
//! - Locks are never held across an `.await`.

pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod format;
pub mod registry;
pub mod resolver;
pub mod transforms;
pub mod validate;
pub mod visitor;

pub use config::{ConfigError, RegistryConfig, SchemaDraft};
pub use engine::{
    DocumentSet, SchemaEngine, ValidationOutcome, ValidationReport, ValidatorContext, Violation,
};
pub use error::{
    CompileError, EngineError, FetchError, PipelineError, ReferenceError, RegistryError,
    TransformError,
};
pub use fetch::RemoteSchemaCache;
pub use format::{FormatCheck, SchemaFormat, SchemaFormatter};
pub use registry::{SchemaRegistry, SchemaValidator, SchemaValidatorResult, Stage};
pub use resolver::{collect_references, resolve, ResolvedReference, ResourceReferences};
pub use transforms::{ADD_UNDEFINED_DEFAULTS, INSERT_SCHEMA_DEFAULTS};
pub use validate::JsonSchemaEngine;
pub use visitor::{async_visitor_fn, visit_json, visitor_fn, JsonVisitor, Visit};
