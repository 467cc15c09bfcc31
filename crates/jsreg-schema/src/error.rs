//! # Error Types
//!
//! Every failure the registry can report, grouped by the phase that raises
//! it. Callers distinguish three outcomes:
//!
//! - the schema could not be compiled or fetched ([`CompileError`]);
//! - a transform failed while running the pipeline ([`PipelineError`]);
//! - the data does not conform. This is not an error: the pipeline returns
//!   a result with `success: false` and the violation list.

use jsreg_core::{JsonPointer, OrderError};
use thiserror::Error;

use crate::registry::Stage;

/// Error while fetching a remote schema document.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The URI could not be parsed as an absolute URL.
    #[error("invalid schema URI '{uri}': {reason}")]
    InvalidUri {
        /// The URI as given.
        uri: String,
        /// Parser message.
        reason: String,
    },

    /// Transport failure while sending the request or reading the body.
    #[error("HTTP error fetching {uri}: {source}")]
    Http {
        /// The requested URI.
        uri: String,
        /// Underlying client error.
        source: reqwest::Error,
    },

    /// The server answered with a non-success status code.
    #[error("Request failed. Status Code: {status} ({uri})")]
    Status {
        /// The requested URI.
        uri: String,
        /// HTTP status code (always >= 300).
        status: u16,
    },

    /// The body was not valid JSON.
    #[error("invalid JSON in schema fetched from {uri}: {source}")]
    Parse {
        /// The requested URI.
        uri: String,
        /// Parser error.
        source: serde_json::Error,
    },
}

/// Failure reported by a [`SchemaEngine`](crate::engine::SchemaEngine)
/// while compiling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Compilation needs documents that are not available locally.
    /// The registry fetches them and compiles again.
    #[error("missing referenced schemas: {}", .0.join(", "))]
    MissingReferences(Vec<String>),

    /// The schema is malformed or uses an unsupported construct.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
}

/// A `$ref` that does not point at anything known to the context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    /// The document part names no document ingested at compile time.
    #[error("reference '{reference}' names an unknown document")]
    UnknownDocument {
        /// The full reference.
        reference: String,
    },

    /// The fragment does not exist in the target document.
    #[error("reference '{reference}' has no target for fragment '#{fragment}'")]
    UnknownFragment {
        /// The full reference.
        reference: String,
        /// The fragment part, without `#`.
        fragment: String,
    },
}

/// Error returned by [`SchemaRegistry::compile`](crate::SchemaRegistry::compile).
#[derive(Error, Debug)]
pub enum CompileError {
    /// The engine rejected the schema. Never retried.
    #[error("failed to compile schema: {reason}")]
    InvalidSchema {
        /// Engine message.
        reason: String,
    },

    /// A `$ref` declared by the schema cannot be resolved.
    #[error("unresolved reference '{reference}': {reason}")]
    UnresolvedReference {
        /// The offending reference.
        reference: String,
        /// Why resolution failed.
        reason: String,
    },

    /// A referenced remote document could not be fetched.
    #[error("failed to fetch referenced schema: {0}")]
    Fetch(#[from] FetchError),
}

/// Error raised by a transform visitor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The visitor rejected the value.
    #[error("transform failed at '{pointer}': {reason}")]
    Failed {
        /// Location of the node being visited.
        pointer: String,
        /// Visitor message.
        reason: String,
    },

    /// A `$ref` met while walking the value could not be resolved.
    #[error("cannot resolve reference '{reference}' at '{pointer}'")]
    UnresolvedReference {
        /// The offending reference.
        reference: String,
        /// Location of the node being visited.
        pointer: String,
    },
}

impl TransformError {
    /// Convenience constructor for visitor implementations.
    pub fn failed(pointer: &JsonPointer, reason: impl Into<String>) -> Self {
        Self::Failed {
            pointer: pointer.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error returned while running a compiled pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The registered transforms cannot be ordered.
    #[error("cannot order transforms: {0}")]
    Order(#[from] OrderError),

    /// A transform failed; the remaining transforms of the stage were skipped.
    #[error("{stage} transform '{transform}' failed: {source}")]
    Transform {
        /// The stage that was running.
        stage: Stage,
        /// Name of the failing transform.
        transform: String,
        /// The visitor's error.
        source: TransformError,
    },
}

/// Error constructing a registry or registering an extension.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    /// A transform registration was rejected.
    #[error("transform registration rejected: {0}")]
    Order(#[from] OrderError),
}
