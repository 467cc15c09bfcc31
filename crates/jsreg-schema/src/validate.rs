//! # `jsonschema`-backed Engine
//!
//! [`JsonSchemaEngine`] implements [`SchemaEngine`] on top of the
//! `jsonschema` crate.
//!
//! ## Reference Retrieval
//!
//! The engine never touches the network. External `$ref`s are answered by a
//! local retriever over the documents the registry handed in. A reference the
//! retriever cannot answer is recorded, compilation fails, and the engine
//! reports every recorded URI as [`EngineError::MissingReferences`] so the
//! registry can fetch them and compile again.
//!
//! ## Formats
//!
//! Synchronous formats are registered with `jsonschema` directly.
//! Asynchronous formats are registered with a closure that answers from a
//! per-validation [`FormatSession`]. A validation runs the engine, records
//! every `(format, string)` pair the session had no verdict for, awaits
//! those checks and runs the engine again, until a pass asks for nothing
//! new. The engine therefore sees real verdicts wherever the format sits,
//! including under `allOf`, `anyOf` or `not`. Registering an asynchronous
//! format makes every validation outcome deferred.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use futures_util::future::join_all;
use jsonschema::{Retrieve, Uri, ValidationOptions, Validator};
use jsreg_core::JsonPointer;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{RegistryConfig, SchemaDraft};
use crate::engine::{
    DocumentSet, SchemaEngine, ValidationOutcome, ValidationReport, ValidatorContext, Violation,
};
use crate::error::EngineError;
use crate::fetch::normalize_uri;
use crate::format::SchemaFormat;
use crate::resolver;

/// Retriever that answers `$ref` URIs from a fixed document set and records
/// the ones it cannot answer.
struct DocumentRetriever {
    documents: Arc<DocumentSet>,
    missing: Arc<Mutex<Vec<String>>>,
}

impl Retrieve for DocumentRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let key = normalize_uri(uri.as_str());
        if let Some(document) = self.documents.get(&key) {
            return Ok(Value::clone(document));
        }

        let mut missing = self.missing.lock();
        if !missing.contains(&key) {
            missing.push(key.clone());
        }
        Err(format!("schema '{key}' is not available locally").into())
    }
}

/// Engine settings captured when a schema is compiled.
#[derive(Debug, Clone)]
struct EngineOptions {
    draft: SchemaDraft,
    validate_formats: bool,
    formats: Vec<SchemaFormat>,
}

impl EngineOptions {
    fn validation_options(&self, retriever: DocumentRetriever) -> ValidationOptions {
        let mut opts = jsonschema::options();
        if let Some(draft) = self.draft.engine_draft() {
            opts.with_draft(draft);
        }
        opts.should_validate_formats(self.validate_formats);

        for format in &self.formats {
            if format.is_async() {
                let name = format.name.clone();
                opts.with_format(format.name.clone(), move |data: &str| {
                    answer_deferred(&name, data)
                });
            } else {
                let check = format.clone();
                opts.with_format(format.name.clone(), move |data: &str| check.check_now(data));
            }
        }

        opts.with_retriever(retriever);
        opts
    }

    fn deferred_formats(&self) -> HashMap<String, SchemaFormat> {
        if !self.validate_formats {
            return HashMap::new();
        }
        self.formats
            .iter()
            .filter(|f| f.is_async())
            .map(|f| (f.name.clone(), f.clone()))
            .collect()
    }
}

/// A [`SchemaEngine`] backed by the `jsonschema` crate.
#[derive(Debug)]
pub struct JsonSchemaEngine {
    draft: SchemaDraft,
    validate_formats: bool,
    formats: RwLock<Vec<SchemaFormat>>,
}

impl JsonSchemaEngine {
    /// Create an engine using the draft and format settings of `config`.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            draft: config.draft,
            validate_formats: config.validate_formats,
            formats: RwLock::new(Vec::new()),
        }
    }

    fn options(&self) -> EngineOptions {
        EngineOptions {
            draft: self.draft,
            validate_formats: self.validate_formats,
            formats: self.formats.read().clone(),
        }
    }
}

impl SchemaEngine for JsonSchemaEngine {
    fn compile(
        &self,
        schema: &Value,
        documents: &DocumentSet,
    ) -> Result<Arc<dyn ValidatorContext>, EngineError> {
        let options = self.options();
        let root = Arc::new(schema.clone());
        let base = resolver::base_uri(schema);

        let mut known = DocumentSet::new();
        if let Some(base) = &base {
            index_resources(&root, base, &mut known);
        }
        for (uri, document) in documents {
            known
                .entry(uri.clone())
                .or_insert_with(|| Arc::clone(document));
            if let Ok(doc_base) = Url::parse(uri) {
                index_resources(document, &doc_base, &mut known);
            }
        }
        let known = Arc::new(known);

        let missing = Arc::new(Mutex::new(Vec::new()));
        let retriever = DocumentRetriever {
            documents: Arc::clone(&known),
            missing: Arc::clone(&missing),
        };
        debug!(documents = known.len(), "compiling schema");

        let validator = options
            .validation_options(retriever)
            .build(&root)
            .map_err(|e| {
                let missing = std::mem::take(&mut *missing.lock());
                if missing.is_empty() {
                    EngineError::InvalidSchema(e.to_string())
                } else {
                    EngineError::MissingReferences(missing)
                }
            })?;

        let shared = Arc::new(Shared {
            deferred_formats: Arc::new(options.deferred_formats()),
            options,
            documents: known,
        });
        Ok(Arc::new(JsonSchemaContext {
            schema: root,
            base,
            validator: Arc::new(OnceLock::from(Ok(validator))),
            shared,
        }))
    }

    fn add_format(&self, format: SchemaFormat) {
        debug!(format = %format.name, is_async = format.is_async(), "registering format");
        let mut formats = self.formats.write();
        formats.retain(|f| f.name != format.name);
        formats.push(format);
    }
}

/// State shared by the root context and every document context derived
/// from it.
#[derive(Debug)]
struct Shared {
    options: EngineOptions,
    documents: Arc<DocumentSet>,
    deferred_formats: Arc<HashMap<String, SchemaFormat>>,
}

/// A compiled document: the root schema, or one of the documents it
/// references.
#[derive(Clone)]
pub struct JsonSchemaContext {
    schema: Arc<Value>,
    base: Option<Url>,
    validator: Arc<OnceLock<Result<Validator, String>>>,
    shared: Arc<Shared>,
}

impl fmt::Debug for JsonSchemaContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchemaContext")
            .field("base", &self.base.as_ref().map(Url::as_str))
            .field("documents", &self.shared.documents.len())
            .finish()
    }
}

impl JsonSchemaContext {
    fn validator(&self) -> &Result<Validator, String> {
        self.validator.get_or_init(|| {
            let retriever = DocumentRetriever {
                documents: Arc::clone(&self.shared.documents),
                missing: Arc::new(Mutex::new(Vec::new())),
            };
            self.shared
                .options
                .validation_options(retriever)
                .build(&self.schema)
                .map_err(|e| e.to_string())
        })
    }

    /// One synchronous engine pass over `instance`.
    fn engine_report(&self, instance: &Value) -> ValidationReport {
        match self.validator() {
            Ok(validator) => ValidationReport::from_violations(
                validator.iter_errors(instance).map(Violation::from).collect(),
            ),
            Err(reason) => ValidationReport::from_violations(vec![Violation {
                instance_path: String::new(),
                schema_path: String::new(),
                message: format!("schema could not be compiled: {reason}"),
            }]),
        }
    }
}

impl ValidatorContext for JsonSchemaContext {
    fn schema(&self) -> &Value {
        &self.schema
    }

    fn validate(&self, instance: &Value) -> ValidationOutcome {
        if self.shared.deferred_formats.is_empty() {
            return ValidationOutcome::Ready(self.engine_report(instance));
        }
        ValidationOutcome::Deferred(Box::pin(check_deferred_formats(
            self.clone(),
            instance.clone(),
        )))
    }

    fn fragment(&self, fragment: &str) -> Option<Value> {
        if fragment.is_empty() {
            return Some(Value::clone(&self.schema));
        }
        if fragment.starts_with('/') {
            return JsonPointer::from_uri_fragment(fragment)?
                .resolve(&self.schema)
                .cloned();
        }
        find_anchor(&self.schema, fragment).cloned()
    }

    fn document(&self, reference: &str) -> Option<Arc<dyn ValidatorContext>> {
        let key = resolver::absolute_document(self.base.as_ref(), reference);
        let schema = self.shared.documents.get(&key)?;
        Some(Arc::new(JsonSchemaContext {
            schema: Arc::clone(schema),
            base: Url::parse(&key).ok(),
            validator: Arc::new(OnceLock::new()),
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Verdicts of asynchronous formats for one validation.
#[derive(Debug, Default)]
struct FormatSession {
    verdicts: HashMap<(String, String), bool>,
    pending: Vec<(String, String)>,
}

thread_local! {
    static FORMAT_SESSION: RefCell<Option<FormatSession>> = const { RefCell::new(None) };
}

/// Answer an asynchronous format from the session installed on this
/// thread. Unknown pairs are recorded and provisionally match.
fn answer_deferred(format: &str, data: &str) -> bool {
    FORMAT_SESSION.with(|cell| {
        let mut slot = cell.borrow_mut();
        let Some(session) = slot.as_mut() else {
            return true;
        };
        let key = (format.to_string(), data.to_string());
        match session.verdicts.get(&key) {
            Some(verdict) => *verdict,
            None => {
                if !session.pending.contains(&key) {
                    session.pending.push(key);
                }
                true
            }
        }
    })
}

/// Run `f` with `session` installed on this thread, then take it back.
///
/// `f` must not await: the engine calls format closures synchronously from
/// inside `iter_errors`.
fn with_session<R>(session: FormatSession, f: impl FnOnce() -> R) -> (FormatSession, R) {
    FORMAT_SESSION.with(|cell| *cell.borrow_mut() = Some(session));
    let out = f();
    let session = FORMAT_SESSION
        .with(|cell| cell.borrow_mut().take())
        .unwrap_or_default();
    (session, out)
}

async fn check_deferred_formats(context: JsonSchemaContext, instance: Value) -> ValidationReport {
    let mut session = FormatSession::default();
    loop {
        let (next, report) = with_session(session, || context.engine_report(&instance));
        session = next;
        let pending = std::mem::take(&mut session.pending);
        if pending.is_empty() {
            return report;
        }

        let formats = &context.shared.deferred_formats;
        let verdicts = join_all(pending.into_iter().map(|(name, data)| {
            let check = formats.get(&name).map(|f| f.formatter.validate(&data));
            async move {
                let verdict = match check {
                    Some(check) => check.resolve().await,
                    None => true,
                };
                ((name, data), verdict)
            }
        }))
        .await;
        session.verdicts.extend(verdicts);
    }
}

/// Register every subschema that declares its own `$id` under its absolute
/// URI. Existing entries win.
fn index_resources(schema: &Value, base: &Url, out: &mut DocumentSet) {
    let Value::Object(map) = schema else {
        return;
    };
    let mut scope = base.clone();
    if let Some(id) = resolver::resource_id(map) {
        if let Ok(url) = base.join(id) {
            out.entry(normalize_uri(url.as_str()))
                .or_insert_with(|| Arc::new(schema.clone()));
            scope = url;
        }
    }
    for sub in resolver::subschemas(map) {
        index_resources(sub, &scope, out);
    }
}

/// The subschema named by a plain-name fragment: `$anchor: name`, or a
/// draft-4..7 `$id`/`id` of `#name`.
fn find_anchor<'s>(schema: &'s Value, name: &str) -> Option<&'s Value> {
    match schema {
        Value::Object(map) => {
            let is_target = map.get("$anchor").and_then(Value::as_str) == Some(name)
                || ["$id", "id"].iter().any(|key| {
                    map.get(*key)
                        .and_then(Value::as_str)
                        .and_then(|id| id.strip_prefix('#'))
                        == Some(name)
                });
            if is_target {
                return Some(schema);
            }
            resolver::subschemas(map)
                .into_iter()
                .find_map(|sub| find_anchor(sub, name))
        }
        _ => None,
    }
}
