//! # Reference Resolver
//!
//! Turns a `$ref` string into the schema it points at, using the tables a
//! [`ValidatorContext`] exposes. Resolution is read-only and never touches
//! the network: cross-document references are only found if the engine
//! ingested the document while compiling.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;
use url::Url;

use crate::engine::ValidatorContext;
use crate::error::ReferenceError;
use crate::fetch::normalize_uri;

/// The target of a resolved reference.
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    /// The context owning the target. Nested references inside `schema`
    /// resolve against this context.
    pub context: Arc<dyn ValidatorContext>,
    /// The referenced schema.
    pub schema: Value,
}

/// Split a reference on its first `#` into document and fragment parts.
/// A missing `#` yields an empty fragment.
pub fn split_reference(reference: &str) -> (&str, &str) {
    reference.split_once('#').unwrap_or((reference, ""))
}

/// Resolve `reference` within `context`.
///
/// Returns `Ok(None)` when there is no context to resolve against.
///
/// # Errors
///
/// - [`ReferenceError::UnknownDocument`] if the document part names a
///   document the context does not know.
/// - [`ReferenceError::UnknownFragment`] if the fragment has no target in
///   the selected document.
pub fn resolve(
    reference: &str,
    context: Option<&Arc<dyn ValidatorContext>>,
) -> Result<Option<ResolvedReference>, ReferenceError> {
    let Some(context) = context else {
        return Ok(None);
    };
    let (document, fragment) = split_reference(reference);

    let target = if document.is_empty() {
        Arc::clone(context)
    } else {
        context.document(document).ok_or_else(|| {
            warn!(reference, "reference names an unknown document");
            ReferenceError::UnknownDocument {
                reference: reference.to_string(),
            }
        })?
    };

    let schema = target
        .fragment(fragment)
        .ok_or_else(|| ReferenceError::UnknownFragment {
            reference: reference.to_string(),
            fragment: fragment.to_string(),
        })?;

    Ok(Some(ResolvedReference {
        context: target,
        schema,
    }))
}

/// Base URI of a document that declares no `$id`.
pub const DEFAULT_BASE_URI: &str = "json-schema:///";

/// Base URI of `schema`: its root `$id` (or draft-4 `id`) resolved against
/// [`DEFAULT_BASE_URI`].
pub fn base_uri(schema: &Value) -> Option<Url> {
    let default = Url::parse(DEFAULT_BASE_URI).ok()?;
    match schema.as_object().and_then(resource_id) {
        Some(id) => default.join(id).ok().or(Some(default)),
        None => Some(default),
    }
}

/// The absolute, fragment-free URI that the document part of a reference
/// names, seen from a document with base `base`.
pub fn absolute_document(base: Option<&Url>, document: &str) -> String {
    match base.and_then(|b| b.join(document).ok()) {
        Some(url) => normalize_uri(url.as_str()),
        None => normalize_uri(document),
    }
}

/// The `$id` (or draft-4 `id`) of a schema object, unless it is a plain
/// fragment anchor.
pub(crate) fn resource_id(map: &Map<String, Value>) -> Option<&str> {
    ["$id", "id"].iter().find_map(|key| {
        map.get(*key)
            .and_then(Value::as_str)
            .filter(|id| !id.starts_with('#'))
    })
}

/// Keywords whose value is a single subschema.
const SCHEMA_KEYWORDS: &[&str] = &[
    "additionalProperties",
    "additionalItems",
    "unevaluatedProperties",
    "unevaluatedItems",
    "contains",
    "propertyNames",
    "not",
    "if",
    "then",
    "else",
    "contentSchema",
];

/// Keywords whose value is an array of subschemas.
const SCHEMA_ARRAY_KEYWORDS: &[&str] = &["allOf", "anyOf", "oneOf", "prefixItems"];

/// Keywords whose value maps arbitrary names to subschemas.
const NAMED_SCHEMA_MAPS: &[&str] = &[
    "properties",
    "patternProperties",
    "definitions",
    "$defs",
    "dependentSchemas",
    "dependencies",
];

/// The direct subschemas of a schema object.
///
/// Only keywords that hold schemas are followed, so annotations, vendor
/// extensions and data keywords (`enum`, `const`, `default`, `examples`)
/// are never mistaken for schemas. `items` is followed in both its single
/// and tuple forms; `dependencies` entries that are property lists are
/// skipped.
pub(crate) fn subschemas(map: &Map<String, Value>) -> Vec<&Value> {
    let mut out = Vec::new();
    for (key, value) in map {
        let key = key.as_str();
        if key == "items" {
            match value {
                Value::Array(tuple) => out.extend(tuple.iter()),
                single => out.push(single),
            }
        } else if SCHEMA_KEYWORDS.contains(&key) {
            out.push(value);
        } else if SCHEMA_ARRAY_KEYWORDS.contains(&key) {
            if let Value::Array(items) = value {
                out.extend(items.iter());
            }
        } else if NAMED_SCHEMA_MAPS.contains(&key) {
            if let Value::Object(named) = value {
                out.extend(named.values().filter(|v| !v.is_array()));
            }
        }
    }
    out
}

/// The `$ref`s declared by one schema resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReferences {
    /// `$id`s leading from the root to this resource, as written. Empty for
    /// the root resource. Each one is relative to the one before it.
    pub scope: Vec<String>,
    /// References declared inside this resource, in document order.
    pub references: Vec<String>,
}

/// Every `$ref` declared in `schema`, grouped by the resource it belongs to.
///
/// A subschema that declares its own `$id` starts a new resource, and its
/// references resolve against that resource rather than the root. The root
/// resource always comes first, followed by nested resources in document
/// order.
pub fn collect_references(schema: &Value) -> Vec<ResourceReferences> {
    let mut out = vec![ResourceReferences {
        scope: Vec::new(),
        references: Vec::new(),
    }];
    collect_into(schema, 0, &[], true, &mut out);
    out
}

fn collect_into(
    schema: &Value,
    resource: usize,
    scope: &[String],
    is_root: bool,
    out: &mut Vec<ResourceReferences>,
) {
    let Value::Object(map) = schema else {
        return;
    };
    if !is_root {
        if let Some(id) = resource_id(map) {
            let mut nested = scope.to_vec();
            nested.push(id.to_string());
            out.push(ResourceReferences {
                scope: nested.clone(),
                references: Vec::new(),
            });
            let index = out.len() - 1;
            collect_into(schema, index, &nested, true, out);
            return;
        }
    }
    if let Some(Value::String(reference)) = map.get("$ref") {
        out[resource].references.push(reference.clone());
    }
    for sub in subschemas(map) {
        collect_into(sub, resource, scope, false, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ValidationOutcome, ValidationReport};
    use jsreg_core::JsonPointer;
    use serde_json::json;
    use std::collections::HashMap;

    /// Context over a fixed document and table of named documents.
    #[derive(Debug)]
    struct FixedContext {
        schema: Value,
        documents: HashMap<String, Arc<FixedContext>>,
    }

    impl ValidatorContext for FixedContext {
        fn schema(&self) -> &Value {
            &self.schema
        }

        fn validate(&self, _instance: &Value) -> ValidationOutcome {
            ValidationOutcome::Ready(ValidationReport::default())
        }

        fn fragment(&self, fragment: &str) -> Option<Value> {
            JsonPointer::from_uri_fragment(fragment)?
                .resolve(&self.schema)
                .cloned()
        }

        fn document(&self, reference: &str) -> Option<Arc<dyn ValidatorContext>> {
            self.documents
                .get(reference)
                .map(|doc| Arc::clone(doc) as Arc<dyn ValidatorContext>)
        }
    }

    fn context() -> Arc<dyn ValidatorContext> {
        let other = Arc::new(FixedContext {
            schema: json!({"definitions": {"id": {"type": "integer"}}}),
            documents: HashMap::new(),
        });
        Arc::new(FixedContext {
            schema: json!({"definitions": {"x": {"type": "string"}}}),
            documents: HashMap::from([("other.json".to_string(), other)]),
        })
    }

    #[test]
    fn no_context_means_nothing_to_resolve() {
        assert!(resolve("#/definitions/x", None).unwrap().is_none());
    }

    #[test]
    fn same_document_pointer() {
        let ctx = context();
        let resolved = resolve("#/definitions/x", Some(&ctx)).unwrap().unwrap();
        assert_eq!(resolved.schema, json!({"type": "string"}));
        assert!(Arc::ptr_eq(&resolved.context, &ctx));
    }

    #[test]
    fn cross_document_switches_context() {
        let ctx = context();
        let resolved = resolve("other.json#/definitions/id", Some(&ctx)).unwrap().unwrap();
        assert_eq!(resolved.schema, json!({"type": "integer"}));
        assert!(!Arc::ptr_eq(&resolved.context, &ctx));
        // Nested references now resolve inside the other document.
        assert!(resolve("#/definitions/x", Some(&resolved.context)).is_err());
    }

    #[test]
    fn unknown_targets_are_errors() {
        let ctx = context();
        assert_eq!(
            resolve("missing.json#/a", Some(&ctx)).unwrap_err(),
            ReferenceError::UnknownDocument {
                reference: "missing.json#/a".into()
            }
        );
        assert_eq!(
            resolve("#/definitions/nope", Some(&ctx)).unwrap_err(),
            ReferenceError::UnknownFragment {
                reference: "#/definitions/nope".into(),
                fragment: "/definitions/nope".into()
            }
        );
    }

    #[test]
    fn base_uri_follows_root_id() {
        let base = base_uri(&json!({"$id": "http://example.com/schemas/root.json"})).unwrap();
        assert_eq!(
            absolute_document(Some(&base), "other.json"),
            "http://example.com/schemas/other.json"
        );
        let anonymous = base_uri(&json!({"id": "#anchor-only"})).unwrap();
        assert_eq!(anonymous.as_str(), DEFAULT_BASE_URI);
        assert_eq!(
            absolute_document(None, "http://example.com/a.json#/x"),
            "http://example.com/a.json"
        );
    }

    #[test]
    fn split_on_first_hash_only() {
        assert_eq!(split_reference("a.json#/b#c"), ("a.json", "/b#c"));
        assert_eq!(split_reference("a.json"), ("a.json", ""));
        assert_eq!(split_reference("#"), ("", ""));
    }

    #[test]
    fn collects_refs_by_resource() {
        let schema = json!({
            "$id": "http://example.com/root.json",
            "properties": {
                "a": {"$ref": "#/definitions/x"},
                "enum": {"$ref": "#/definitions/y"},
                "nested": {
                    "$id": "nested.json",
                    "items": {"$ref": "#/definitions/z"},
                    "definitions": {"z": {}}
                }
            },
            "items": [{"$ref": "other.json"}],
            "default": {"$ref": "not-a-reference"},
            "definitions": {"x": {"type": "string"}, "y": {}}
        });
        assert_eq!(
            collect_references(&schema),
            vec![
                ResourceReferences {
                    scope: vec![],
                    references: vec![
                        "#/definitions/x".into(),
                        "#/definitions/y".into(),
                        "other.json".into()
                    ],
                },
                ResourceReferences {
                    scope: vec!["nested.json".into()],
                    references: vec!["#/definitions/z".into()],
                },
            ]
        );
    }

    #[test]
    fn annotation_keywords_are_not_schemas() {
        let schema = json!({
            "type": "object",
            "x-doc": {"$ref": "#/not/a/schema"},
            "title": "thing",
            "dependencies": {"a": ["b"], "c": {"$ref": "#/definitions/c"}},
            "allOf": [{"if": {"$ref": "#/definitions/d"}}],
            "definitions": {"c": {}, "d": {}}
        });
        assert_eq!(
            collect_references(&schema)[0].references,
            vec!["#/definitions/c", "#/definitions/d"]
        );
    }
}
