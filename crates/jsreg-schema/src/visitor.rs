//! # Tree Visitor
//!
//! Walks a JSON value alongside the schema that describes it and lets a
//! [`JsonVisitor`] replace each node.
//!
//! ## Traversal Rules
//!
//! - The visitor sees each node before its children (pre-order). Children
//!   of the value the visitor *returned* are visited next, so a visitor
//!   that turns `null` into `{"a": null}` also gets to visit `/a`.
//! - A schema that is a `$ref` is resolved first, following chains of
//!   references, so the visitor always receives the effective schema.
//!   References inside an embedded resource (a subschema with its own
//!   `$id`) resolve against that resource.
//! - Object properties are paired with `properties[key]`, falling back to an
//!   object-valued `additionalProperties`. Array elements are paired with
//!   `items` (single schema), `items[i]` or `prefixItems[i]` (tuple form),
//!   falling back to `additionalItems`.
//! - Siblings are visited one after another in document order, even when
//!   the visitor suspends. The first error aborts the walk.

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use jsreg_core::JsonPointer;
use serde_json::{Map, Value};

use crate::engine::ValidatorContext;
use crate::error::TransformError;
use crate::resolver;

/// Maximum number of `$ref` hops followed for a single node.
pub const MAX_REF_HOPS: usize = 32;

/// The replacement a visitor produced for one node.
pub enum Visit<'a> {
    /// Computed synchronously.
    Ready(Result<Value, TransformError>),
    /// Still being computed.
    Deferred(BoxFuture<'a, Result<Value, TransformError>>),
}

impl Visit<'_> {
    /// Await the replacement regardless of which form the visitor chose.
    pub async fn resolve(self) -> Result<Value, TransformError> {
        match self {
            Self::Ready(result) => result,
            Self::Deferred(pending) => pending.await,
        }
    }
}

impl From<Result<Value, TransformError>> for Visit<'_> {
    fn from(result: Result<Value, TransformError>) -> Self {
        Self::Ready(result)
    }
}

/// A per-node transformation.
pub trait JsonVisitor: Send + Sync {
    /// Name used to order this visitor among the others of its stage.
    fn name(&self) -> &str;

    /// Produce the replacement for `value`, located at `pointer` and
    /// described by `schema` (already dereferenced).
    fn visit<'a>(
        &'a self,
        value: Value,
        pointer: &'a JsonPointer,
        schema: Option<&'a Value>,
    ) -> Visit<'a>;
}

struct FnVisitor<F> {
    name: String,
    f: F,
}

impl<F> JsonVisitor for FnVisitor<F>
where
    F: Fn(Value, &JsonPointer, Option<&Value>) -> Result<Value, TransformError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn visit<'a>(
        &'a self,
        value: Value,
        pointer: &'a JsonPointer,
        schema: Option<&'a Value>,
    ) -> Visit<'a> {
        Visit::Ready((self.f)(value, pointer, schema))
    }
}

struct AsyncFnVisitor<F> {
    name: String,
    f: F,
}

impl<F, Fut> JsonVisitor for AsyncFnVisitor<F>
where
    F: Fn(Value, JsonPointer, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, TransformError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn visit<'a>(
        &'a self,
        value: Value,
        pointer: &'a JsonPointer,
        schema: Option<&'a Value>,
    ) -> Visit<'a> {
        Visit::Deferred(Box::pin((self.f)(value, pointer.clone(), schema.cloned())))
    }
}

/// A synchronous visitor from a closure.
pub fn visitor_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn JsonVisitor>
where
    F: Fn(Value, &JsonPointer, Option<&Value>) -> Result<Value, TransformError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(FnVisitor {
        name: name.into(),
        f,
    })
}

/// An asynchronous visitor from a closure returning a future. The closure
/// receives owned copies of the pointer and schema.
pub fn async_visitor_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn JsonVisitor>
where
    F: Fn(Value, JsonPointer, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, TransformError>> + Send + 'static,
{
    Arc::new(AsyncFnVisitor {
        name: name.into(),
        f,
    })
}

/// Walk `value` with `visitor` and return the rebuilt value.
///
/// `context` resolves the `$ref`s met in `schema`; without one, `$ref`
/// schemas are handed to the visitor as they are.
///
/// # Errors
///
/// The first error returned by the visitor, or
/// [`TransformError::UnresolvedReference`] if a reference cannot be
/// followed.
pub async fn visit_json(
    value: Value,
    visitor: &dyn JsonVisitor,
    schema: Option<&Value>,
    context: Option<Arc<dyn ValidatorContext>>,
) -> Result<Value, TransformError> {
    visit_node(
        value,
        JsonPointer::root(),
        schema.map(Cow::Borrowed),
        visitor,
        context,
    )
    .await
}

fn visit_node<'a>(
    value: Value,
    pointer: JsonPointer,
    schema: Option<Cow<'a, Value>>,
    visitor: &'a dyn JsonVisitor,
    context: Option<Arc<dyn ValidatorContext>>,
) -> BoxFuture<'a, Result<Value, TransformError>> {
    Box::pin(async move {
        let (schema, context) = match schema {
            Some(schema) => {
                let (schema, context) = effective_schema(schema, context, &pointer)?;
                (Some(schema), context)
            }
            None => (None, context),
        };

        let value = visitor
            .visit(value, &pointer, schema.as_deref())
            .resolve()
            .await?;

        match value {
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, child) in map {
                    let child_schema = child_schema(&schema, Child::Property(&key));
                    let child_pointer = pointer.join(key.as_str());
                    let child = visit_node(
                        child,
                        child_pointer,
                        child_schema,
                        visitor,
                        context.clone(),
                    )
                    .await?;
                    out.insert(key, child);
                }
                Ok(Value::Object(out))
            }
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, child) in items.into_iter().enumerate() {
                    let child_schema = child_schema(&schema, Child::Item(index));
                    let child_pointer = pointer.join(index.to_string());
                    out.push(
                        visit_node(child, child_pointer, child_schema, visitor, context.clone())
                            .await?,
                    );
                }
                Ok(Value::Array(out))
            }
            leaf => Ok(leaf),
        }
    })
}

/// Follow `$ref`s until a schema without one is reached.
///
/// Entering a subschema that declares its own `$id` switches to that
/// resource's context first, so its references resolve inside it.
fn effective_schema<'a>(
    mut schema: Cow<'a, Value>,
    mut context: Option<Arc<dyn ValidatorContext>>,
    pointer: &JsonPointer,
) -> Result<(Cow<'a, Value>, Option<Arc<dyn ValidatorContext>>), TransformError> {
    let mut hops = 0usize;
    loop {
        context = enter_resource(&schema, context);
        let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
            break;
        };
        let unresolved = || TransformError::UnresolvedReference {
            reference: reference.to_string(),
            pointer: pointer.to_string(),
        };
        if hops == MAX_REF_HOPS {
            return Err(unresolved());
        }
        hops += 1;

        let resolved = match resolver::resolve(reference, context.as_ref()) {
            Ok(Some(resolved)) => resolved,
            Ok(None) => break,
            Err(_) => return Err(unresolved()),
        };
        schema = Cow::Owned(resolved.schema);
        context = Some(resolved.context);
    }
    Ok((schema, context))
}

fn enter_resource(
    schema: &Value,
    context: Option<Arc<dyn ValidatorContext>>,
) -> Option<Arc<dyn ValidatorContext>> {
    let id = schema.as_object().and_then(resolver::resource_id);
    match (id, context) {
        (Some(id), Some(context)) => Some(context.document(id).unwrap_or(context)),
        (_, context) => context,
    }
}

#[derive(Clone, Copy)]
enum Child<'k> {
    Property(&'k str),
    Item(usize),
}

fn select<'s>(schema: &'s Value, child: Child<'_>) -> Option<&'s Value> {
    match child {
        Child::Property(key) => property_schema(schema, key),
        Child::Item(index) => item_schema(schema, index),
    }
}

fn child_schema<'a>(schema: &Option<Cow<'a, Value>>, child: Child<'_>) -> Option<Cow<'a, Value>> {
    match schema {
        Some(Cow::Borrowed(s)) => select(*s, child).map(Cow::Borrowed),
        Some(Cow::Owned(s)) => select(s, child).cloned().map(Cow::Owned),
        None => None,
    }
}

fn property_schema<'s>(schema: &'s Value, key: &str) -> Option<&'s Value> {
    schema
        .get("properties")
        .and_then(|props| props.get(key))
        .or_else(|| schema.get("additionalProperties").filter(|s| s.is_object()))
}

fn item_schema(schema: &Value, index: usize) -> Option<&Value> {
    if let Some(Value::Array(prefix)) = schema.get("prefixItems") {
        return prefix
            .get(index)
            .or_else(|| schema.get("items").filter(|s| s.is_object()));
    }
    match schema.get("items") {
        Some(items @ Value::Object(_)) => Some(items),
        Some(Value::Array(tuple)) => tuple
            .get(index)
            .or_else(|| schema.get("additionalItems").filter(|s| s.is_object())),
        _ => None,
    }
}
