//! # Validator Engine Interface
//!
//! The registry does not evaluate schema keywords itself. It talks to an
//! engine through two traits:
//!
//! - [`SchemaEngine`] compiles a schema into a [`ValidatorContext`], or
//!   reports which referenced documents it still needs.
//! - [`ValidatorContext`] validates values and exposes the tables needed to
//!   resolve `$ref`s: the fragments of its own document and the external
//!   documents ingested while compiling.
//!
//! An engine may answer validation synchronously or defer it (for example
//! when a format check is asynchronous). Both forms are carried by
//! [`ValidationOutcome`] and normalized into one future by
//! [`ValidationOutcome::resolve`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::error::EngineError;
use crate::format::SchemaFormat;

/// Documents available to the engine, keyed by normalized absolute URI.
pub type DocumentSet = HashMap<String, Arc<Value>>;

/// A single violated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// JSON Pointer path to the violating value in the instance.
    pub instance_path: String,
    /// JSON Pointer path within the schema that triggered the error.
    pub schema_path: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.instance_path, self.message)
    }
}

impl From<jsonschema::ValidationError<'_>> for Violation {
    fn from(err: jsonschema::ValidationError<'_>) -> Self {
        Self {
            instance_path: err.instance_path.to_string(),
            schema_path: err.schema_path.to_string(),
            message: err.to_string(),
        }
    }
}

/// The result of validating one value: every violation, in engine order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    /// A report built from the given violations.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Returns true when nothing was violated.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the number of violations.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Returns true if there are no violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns a slice of all violations.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Append a violation.
    pub fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Violations rendered as `"<path> <message>"`.
    pub fn errors(&self) -> Vec<String> {
        self.violations.iter().map(Violation::to_string).collect()
    }

    /// Consumes self and returns the inner Vec.
    pub fn into_inner(self) -> Vec<Violation> {
        self.violations
    }
}

/// A validation answer that is either available now or still pending.
pub enum ValidationOutcome {
    /// The engine answered synchronously.
    Ready(ValidationReport),
    /// The answer depends on asynchronous checks.
    Deferred(BoxFuture<'static, ValidationReport>),
}

impl ValidationOutcome {
    /// Await the report regardless of which form the engine chose.
    pub async fn resolve(self) -> ValidationReport {
        match self {
            Self::Ready(report) => report,
            Self::Deferred(pending) => pending.await,
        }
    }

    /// Returns true if the outcome still has to be awaited.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl fmt::Debug for ValidationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(report) => f.debug_tuple("Ready").field(report).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// The compiled form of one schema document.
pub trait ValidatorContext: Send + Sync + fmt::Debug {
    /// The document this context was compiled from.
    fn schema(&self) -> &Value;

    /// Validate `instance` against [`ValidatorContext::schema`].
    fn validate(&self, instance: &Value) -> ValidationOutcome;

    /// Look up a fragment (the text after `#`) within this document.
    /// The empty fragment is the whole document.
    fn fragment(&self, fragment: &str) -> Option<Value>;

    /// Look up an external document by reference (without fragment),
    /// resolved against this document's base URI.
    fn document(&self, reference: &str) -> Option<Arc<dyn ValidatorContext>>;
}

/// A schema compiler.
pub trait SchemaEngine: Send + Sync + fmt::Debug {
    /// Compile `schema`, resolving external references only from
    /// `documents`.
    ///
    /// # Errors
    ///
    /// [`EngineError::MissingReferences`] when compilation needs documents
    /// that are not in `documents`; [`EngineError::InvalidSchema`] for
    /// anything else.
    fn compile(
        &self,
        schema: &Value,
        documents: &DocumentSet,
    ) -> Result<Arc<dyn ValidatorContext>, EngineError>;

    /// Register a named string format for schemas compiled afterwards.
    fn add_format(&self, format: SchemaFormat);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(path: &str, message: &str) -> Violation {
        Violation {
            instance_path: path.to_string(),
            schema_path: String::new(),
            message: message.to_string(),
        }
    }

    #[test]
    fn errors_render_path_then_message() {
        let report = ValidationReport::from_violations(vec![
            violation("/a", "1 is not of type \"string\""),
            violation("", "\"b\" is a required property"),
        ]);
        assert_eq!(
            report.errors(),
            vec![
                "/a 1 is not of type \"string\"".to_string(),
                " \"b\" is a required property".to_string(),
            ]
        );
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn deferred_outcome_resolves_to_its_report() {
        let outcome = ValidationOutcome::Deferred(Box::pin(async {
            ValidationReport::from_violations(vec![violation("/x", "bad")])
        }));
        assert!(outcome.is_deferred());
        let report = outcome.resolve().await;
        assert_eq!(report.len(), 1);
    }

    #[tokio::test]
    async fn ready_outcome_resolves_without_suspending() {
        let report = ValidationOutcome::Ready(ValidationReport::default()).resolve().await;
        assert!(report.is_valid());
    }
}
