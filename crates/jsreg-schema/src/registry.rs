//! # Schema Registry
//!
//! The orchestrator. A [`SchemaRegistry`] owns an engine, a remote schema
//! cache and two ordered transform sets, and compiles schemas into reusable
//! [`SchemaValidator`] pipelines.
//!
//! ## Compilation
//!
//! 1. Compile against the documents already cached. Schemas without
//!    external references never touch the network.
//! 2. If the engine reports missing documents, fetch all of them
//!    concurrently and compile again. A document that is still missing
//!    after it was fetched is an unresolved reference.
//! 3. Check that every `$ref` of the schema resolves, each against the
//!    resource that declares it, before handing out the pipeline.
//!
//! ## Pipeline
//!
//! `pre transforms -> validate -> post transforms`. Post transforms run only
//! on valid data. Transforms registered after `compile` still apply to the
//! pipelines it returned.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use futures_util::future::try_join_all;
use jsreg_core::{OrderError, OrderedSet};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::config::RegistryConfig;
use crate::engine::{SchemaEngine, ValidatorContext};
use crate::error::{CompileError, EngineError, PipelineError, ReferenceError, RegistryError};
use crate::fetch::RemoteSchemaCache;
use crate::format::SchemaFormat;
use crate::resolver::{self, collect_references, split_reference};
use crate::transforms::{AddUndefinedDefaults, InsertSchemaDefaults};
use crate::validate::JsonSchemaEngine;
use crate::visitor::{visit_json, JsonVisitor};

type TransformSet = Arc<RwLock<OrderedSet<Arc<dyn JsonVisitor>>>>;

/// Which transform set a transform belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Runs before validation.
    Pre,
    /// Runs after successful validation.
    Post,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("pre"),
            Self::Post => f.write_str("post"),
        }
    }
}

/// Compiles schemas into validation pipelines.
pub struct SchemaRegistry {
    config: RegistryConfig,
    engine: Arc<dyn SchemaEngine>,
    cache: Arc<RemoteSchemaCache>,
    pre: TransformSet,
    post: TransformSet,
}

impl fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("cached_documents", &self.cache.len())
            .field("pre", &self.pre.read().names())
            .field("post", &self.post.read().names())
            .finish()
    }
}

impl SchemaRegistry {
    /// A registry using the `jsonschema` engine.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Client`] if the HTTP client cannot be built.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let engine = Arc::new(JsonSchemaEngine::new(&config));
        Self::with_engine(config, engine)
    }

    /// A registry using `engine`.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::new`].
    pub fn with_engine(
        config: RegistryConfig,
        engine: Arc<dyn SchemaEngine>,
    ) -> Result<Self, RegistryError> {
        let cache = Arc::new(RemoteSchemaCache::new(&config)?);
        let registry = Self {
            config,
            engine,
            cache,
            pre: Arc::new(RwLock::new(OrderedSet::new())),
            post: Arc::new(RwLock::new(OrderedSet::new())),
        };

        if registry.config.fill_undefined_properties {
            registry.add_post_transform(Arc::new(AddUndefinedDefaults), &[])?;
        }
        if registry.config.use_defaults {
            registry.add_pre_transform(Arc::new(InsertSchemaDefaults), &[])?;
        }
        Ok(registry)
    }

    /// A `jsonschema`-backed registry with `formats` registered up front.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::new`].
    pub fn with_formats(
        config: RegistryConfig,
        formats: impl IntoIterator<Item = SchemaFormat>,
    ) -> Result<Self, RegistryError> {
        let registry = Self::new(config)?;
        for format in formats {
            registry.add_format(format);
        }
        Ok(registry)
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The remote document cache owned by this registry.
    pub fn cache(&self) -> &RemoteSchemaCache {
        &self.cache
    }

    /// Register a transform to run before validation, after every transform
    /// named in `dependencies`.
    ///
    /// # Errors
    ///
    /// [`OrderError::DuplicateItem`] when a pre transform with the same name
    /// exists, [`OrderError::Cycle`] when the dependencies close a cycle.
    pub fn add_pre_transform(
        &self,
        visitor: Arc<dyn JsonVisitor>,
        dependencies: &[&str],
    ) -> Result<(), OrderError> {
        add_transform(&self.pre, Stage::Pre, visitor, dependencies)
    }

    /// Register a transform to run after successful validation.
    ///
    /// # Errors
    ///
    /// See [`SchemaRegistry::add_pre_transform`].
    pub fn add_post_transform(
        &self,
        visitor: Arc<dyn JsonVisitor>,
        dependencies: &[&str],
    ) -> Result<(), OrderError> {
        add_transform(&self.post, Stage::Post, visitor, dependencies)
    }

    /// Names of the transforms of `stage`, in the order they will run.
    ///
    /// # Errors
    ///
    /// [`OrderError::UnknownDependency`] if a dependency was never registered.
    pub fn transform_order(&self, stage: Stage) -> Result<Vec<String>, OrderError> {
        let set = self.stage(stage).read();
        Ok(set
            .ordered_with_names()?
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect())
    }

    /// Register a string format for schemas compiled from now on.
    pub fn add_format(&self, format: SchemaFormat) {
        self.engine.add_format(format);
    }

    /// Make `document` available under `uri` without fetching it.
    pub fn add_schema(&self, uri: &str, document: Value) {
        self.cache.insert(uri, document);
    }

    fn stage(&self, stage: Stage) -> &TransformSet {
        match stage {
            Stage::Pre => &self.pre,
            Stage::Post => &self.post,
        }
    }

    /// Compile `schema` into a pipeline.
    ///
    /// # Errors
    ///
    /// - [`CompileError::InvalidSchema`] if the engine rejects the schema.
    /// - [`CompileError::Fetch`] if a referenced document cannot be fetched.
    /// - [`CompileError::UnresolvedReference`] if a `$ref` has no target.
    pub async fn compile(&self, schema: Value) -> Result<SchemaValidator, CompileError> {
        let schema = Arc::new(schema);
        let base = resolver::base_uri(&schema);
        let mut fetched = HashSet::new();

        loop {
            debug!(cached = self.cache.len(), "attempting schema compilation");
            let context = match self.engine.compile(&schema, &self.cache.snapshot()) {
                Ok(context) => context,
                Err(EngineError::MissingReferences(uris)) => {
                    self.fetch_missing(uris, &mut fetched).await?;
                    continue;
                }
                Err(EngineError::InvalidSchema(reason)) => {
                    return Err(CompileError::InvalidSchema { reason });
                }
            };

            let missing = unresolved_documents(&schema, base.as_ref(), &context)?;
            if missing.is_empty() {
                return Ok(SchemaValidator {
                    schema,
                    context,
                    pre: Arc::clone(&self.pre),
                    post: Arc::clone(&self.post),
                });
            }
            self.fetch_missing(missing, &mut fetched).await?;
        }
    }

    async fn fetch_missing(
        &self,
        uris: Vec<String>,
        fetched: &mut HashSet<String>,
    ) -> Result<(), CompileError> {
        for uri in &uris {
            if !fetched.insert(uri.clone()) {
                warn!(uri = %uri, "reference still unresolved after fetching");
                return Err(CompileError::UnresolvedReference {
                    reference: uri.clone(),
                    reason: "document was fetched but the reference still cannot be resolved"
                        .to_string(),
                });
            }
        }
        info!(count = uris.len(), "fetching referenced schemas");
        try_join_all(uris.iter().map(|uri| self.cache.fetch(uri))).await?;
        Ok(())
    }
}

fn add_transform(
    set: &TransformSet,
    stage: Stage,
    visitor: Arc<dyn JsonVisitor>,
    dependencies: &[&str],
) -> Result<(), OrderError> {
    let name = visitor.name().to_string();
    set.write().add(name.clone(), visitor, dependencies)?;
    debug!(%stage, transform = %name, ?dependencies, "registered transform");
    Ok(())
}

/// Check every `$ref` of the schema against the context of the resource
/// declaring it. Returns the remote documents that still need fetching.
fn unresolved_documents(
    schema: &Value,
    base: Option<&Url>,
    context: &Arc<dyn ValidatorContext>,
) -> Result<Vec<String>, CompileError> {
    let mut missing = Vec::new();
    for resource in collect_references(schema) {
        let mut scope_base = base.cloned();
        let mut scope = Arc::clone(context);
        for id in &resource.scope {
            scope_base = scope_base.and_then(|b| b.join(id).ok());
            if let Some(inner) = scope.document(id) {
                scope = inner;
            }
        }

        for reference in resource.references {
            let err = match resolver::resolve(&reference, Some(&scope)) {
                Ok(_) => continue,
                Err(err) => err,
            };
            if let ReferenceError::UnknownDocument { .. } = err {
                let (document, _) = split_reference(&reference);
                let uri = resolver::absolute_document(scope_base.as_ref(), document);
                let remote = Url::parse(&uri)
                    .map(|url| matches!(url.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if remote {
                    if !missing.contains(&uri) {
                        missing.push(uri);
                    }
                    continue;
                }
            }
            warn!(reference = %reference, error = %err, "unresolvable schema reference");
            return Err(CompileError::UnresolvedReference {
                reason: err.to_string(),
                reference,
            });
        }
    }
    Ok(missing)
}

/// Outcome of running a pipeline on one value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaValidatorResult {
    /// The value after the stages that ran.
    pub data: Value,
    /// Whether the value conformed to the schema.
    pub success: bool,
    /// Violations as `"<path> <message>"`, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl SchemaValidatorResult {
    /// A successful result.
    pub fn valid(data: Value) -> Self {
        Self {
            data,
            success: true,
            errors: None,
        }
    }

    /// A failed result.
    pub fn invalid(data: Value, errors: Vec<String>) -> Self {
        Self {
            data,
            success: false,
            errors: Some(errors),
        }
    }
}

/// A compiled pipeline. Cheap to clone and safe to share across tasks.
#[derive(Clone)]
pub struct SchemaValidator {
    schema: Arc<Value>,
    context: Arc<dyn ValidatorContext>,
    pre: TransformSet,
    post: TransformSet,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// The compiled schema.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// The engine context the schema was compiled into.
    pub fn context(&self) -> &Arc<dyn ValidatorContext> {
        &self.context
    }

    /// Run the pipeline on `data`.
    ///
    /// Invalid data is not an error: the result has `success: false`, the
    /// pre-transformed data, and the violation list.
    ///
    /// # Errors
    ///
    /// [`PipelineError`] when transforms cannot be ordered or one of them
    /// fails.
    pub async fn validate(&self, data: Value) -> Result<SchemaValidatorResult, PipelineError> {
        let data = self.run_stage(Stage::Pre, data).await?;

        let report = self.context.validate(&data).resolve().await;
        if !report.is_valid() {
            debug!(violations = report.len(), "data does not conform to schema");
            return Ok(SchemaValidatorResult::invalid(data, report.errors()));
        }

        let data = self.run_stage(Stage::Post, data).await?;
        Ok(SchemaValidatorResult::valid(data))
    }

    async fn run_stage(&self, stage: Stage, mut data: Value) -> Result<Value, PipelineError> {
        let transforms: Vec<Arc<dyn JsonVisitor>> = {
            let set = match stage {
                Stage::Pre => self.pre.read(),
                Stage::Post => self.post.read(),
            };
            set.ordered()?.into_iter().cloned().collect()
        };

        for transform in transforms {
            trace!(%stage, transform = transform.name(), "running transform");
            data = visit_json(
                data,
                transform.as_ref(),
                Some(&self.schema),
                Some(Arc::clone(&self.context)),
            )
            .await
            .map_err(|source| PipelineError::Transform {
                stage,
                transform: transform.name().to_string(),
                source,
            })?;
        }
        Ok(data)
    }
}
