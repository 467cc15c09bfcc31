//! End-to-end pipeline behaviour: built-in transforms, caller transforms and
//! formats, all without network access.

use std::time::Duration;

use jsreg_schema::{
    async_visitor_fn, visitor_fn, CompileError, RegistryConfig, SchemaFormat, SchemaRegistry,
    SchemaValidatorResult, Stage, TransformError, ADD_UNDEFINED_DEFAULTS,
};
use serde_json::{json, Value};

fn bare() -> SchemaRegistry {
    SchemaRegistry::new(RegistryConfig::without_builtin_transforms()).unwrap()
}

#[tokio::test]
async fn definitions_reference_accepts_and_rejects() {
    let validator = bare()
        .compile(json!({
            "properties": {"a": {"$ref": "#/definitions/x"}},
            "definitions": {"x": {"type": "string"}}
        }))
        .await
        .unwrap();

    let ok = validator.validate(json!({"a": "hi"})).await.unwrap();
    assert_eq!(ok, SchemaValidatorResult::valid(json!({"a": "hi"})));

    let bad = validator.validate(json!({"a": 1})).await.unwrap();
    assert!(!bad.success);
    assert_eq!(bad.data, json!({"a": 1}));
    let errors = bad.errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("/a "));
}

#[tokio::test]
async fn root_errors_render_with_empty_path() {
    let validator = bare().compile(json!({"type": "string"})).await.unwrap();
    let result = validator.validate(json!(1)).await.unwrap();
    assert_eq!(result.errors, Some(vec![" 1 is not of type \"string\"".to_string()]));
}

#[tokio::test]
async fn defaults_are_inserted_before_validation() {
    let registry = SchemaRegistry::new(RegistryConfig::default()).unwrap();
    let validator = registry
        .compile(json!({
            "type": "object",
            "properties": {"level": {"type": "integer", "default": 2}},
            "required": ["level"]
        }))
        .await
        .unwrap();
    let result = validator.validate(json!({})).await.unwrap();
    assert_eq!(result, SchemaValidatorResult::valid(json!({"level": 2})));
}

#[tokio::test]
async fn undefined_properties_are_filled_idempotently() {
    let registry = SchemaRegistry::new(RegistryConfig::default()).unwrap();
    let validator = registry
        .compile(json!({
            "properties": {
                "a": {},
                "list": {"type": "array"},
                "b": {"properties": {"c": {}}}
            }
        }))
        .await
        .unwrap();

    let once = validator.validate(json!({})).await.unwrap();
    assert_eq!(once.data, json!({"a": null, "list": [], "b": {"c": null}}));
    let twice = validator.validate(once.data.clone()).await.unwrap();
    assert_eq!(once, twice);
}

#[tokio::test]
async fn caller_transform_can_run_after_the_builtin_fill() {
    let registry = SchemaRegistry::new(RegistryConfig::default()).unwrap();
    registry
        .add_post_transform(
            visitor_fn("nulls-to-zero", |value, _, _| {
                Ok(if value.is_null() { json!(0) } else { value })
            }),
            &[ADD_UNDEFINED_DEFAULTS],
        )
        .unwrap();
    assert_eq!(
        registry.transform_order(Stage::Post).unwrap(),
        vec![ADD_UNDEFINED_DEFAULTS, "nulls-to-zero"]
    );

    let validator = registry
        .compile(json!({"properties": {"x": {}, "y": {}}}))
        .await
        .unwrap();
    let result = validator.validate(json!({"y": 5})).await.unwrap();
    assert_eq!(result.data, json!({"y": 5, "x": 0}));
}

#[tokio::test]
async fn deferred_pre_transform_feeds_validation() {
    let registry = bare();
    registry
        .add_pre_transform(
            async_visitor_fn("trim", |value, _, _| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(match value {
                    Value::String(s) => Value::String(s.trim().to_string()),
                    other => other,
                })
            }),
            &[],
        )
        .unwrap();
    let validator = registry
        .compile(json!({"items": {"type": "string", "maxLength": 3}}))
        .await
        .unwrap();

    let result = validator.validate(json!(["  abc  ", "de "])).await.unwrap();
    assert_eq!(result, SchemaValidatorResult::valid(json!(["abc", "de"])));
}

#[tokio::test]
async fn deferred_transform_error_aborts_pipeline() {
    let registry = bare();
    registry
        .add_post_transform(
            async_visitor_fn("no-negatives", |value, pointer, _| async move {
                match value.as_i64() {
                    Some(n) if n < 0 => Err(TransformError::failed(&pointer, "negative")),
                    _ => Ok(value),
                }
            }),
            &[],
        )
        .unwrap();
    let validator = registry.compile(json!({})).await.unwrap();
    let err = validator.validate(json!([1, -2])).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "post transform 'no-negatives' failed: transform failed at '/1': negative"
    );
}

#[tokio::test]
async fn deferred_format_is_checked_after_engine_pass() {
    let registry = SchemaRegistry::with_formats(
        RegistryConfig::without_builtin_transforms(),
        [SchemaFormat::deferred("even-length", |s: String| async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            s.len() % 2 == 0
        })],
    )
    .unwrap();
    let validator = registry
        .compile(json!({"properties": {"n": {"type": "string", "format": "even-length"}}}))
        .await
        .unwrap();

    assert!(validator.validate(json!({"n": "ab"})).await.unwrap().success);
    let bad = validator.validate(json!({"n": "abc"})).await.unwrap();
    assert_eq!(
        bad.errors,
        Some(vec!["/n \"abc\" is not a \"even-length\"".to_string()])
    );
}

#[tokio::test]
async fn sync_format_registered_later_applies_to_later_compiles() {
    let registry = bare();
    let schema = json!({"format": "digits"});
    let before = registry.compile(schema.clone()).await.unwrap();
    registry.add_format(SchemaFormat::sync("digits", |s| s.chars().all(|c| c.is_ascii_digit())));
    let after = registry.compile(schema).await.unwrap();

    assert!(before.validate(json!("12a")).await.unwrap().success);
    assert!(!after.validate(json!("12a")).await.unwrap().success);
    assert!(after.validate(json!("123")).await.unwrap().success);
}

#[tokio::test]
async fn validators_are_shareable_across_tasks() {
    let registry = SchemaRegistry::new(RegistryConfig::default()).unwrap();
    let validator = registry
        .compile(json!({"properties": {"id": {"type": "integer"}}}))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let validator = validator.clone();
            tokio::spawn(async move { validator.validate(json!({"id": i})).await })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.data, json!({"id": i}));
    }
}

#[tokio::test]
async fn registries_do_not_share_transforms() {
    let first = bare();
    let second = bare();
    first
        .add_post_transform(visitor_fn("mark", |_, _, _| Ok(json!("marked"))), &[])
        .unwrap();
    let schema = json!({});
    let a = first.compile(schema.clone()).await.unwrap();
    let b = second.compile(schema).await.unwrap();
    assert_eq!(a.validate(json!(1)).await.unwrap().data, json!("marked"));
    assert_eq!(b.validate(json!(1)).await.unwrap().data, json!(1));
}

#[tokio::test]
async fn embedded_resources_resolve_their_own_references() {
    let registry = SchemaRegistry::new(RegistryConfig::default()).unwrap();
    let validator = registry
        .compile(json!({
            "$id": "http://example.com/root.json",
            "properties": {
                "a": {
                    "$id": "http://example.com/a.json",
                    "properties": {"b": {"$ref": "#/definitions/x"}},
                    "definitions": {"x": {"type": "string", "default": "none"}}
                }
            }
        }))
        .await
        .unwrap();

    let ok = validator.validate(json!({"a": {"b": "hi"}})).await.unwrap();
    assert_eq!(ok, SchemaValidatorResult::valid(json!({"a": {"b": "hi"}})));

    let bad = validator.validate(json!({"a": {"b": 1}})).await.unwrap();
    assert!(!bad.success);
    assert_eq!(bad.errors.map(|e| e.len()), Some(1));
}

#[tokio::test]
async fn dangling_reference_inside_embedded_resource_fails_compilation() {
    let err = bare()
        .compile(json!({
            "$id": "http://example.com/root.json",
            "properties": {
                "a": {
                    "$id": "http://example.com/a.json",
                    "properties": {"b": {"$ref": "#/definitions/x"}}
                }
            },
            "definitions": {"x": {}}
        }))
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            CompileError::UnresolvedReference { .. } | CompileError::InvalidSchema { .. }
        ),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn annotation_keywords_are_not_checked_for_references() {
    let validator = bare()
        .compile(json!({
            "type": "object",
            "x-doc": {"$ref": "#/not/a/schema"},
            "properties": {"n": {"type": "integer"}}
        }))
        .await
        .unwrap();
    assert!(validator.validate(json!({"n": 1})).await.unwrap().success);
}

#[tokio::test]
async fn deferred_format_under_all_of_is_enforced() {
    let registry = SchemaRegistry::with_formats(
        RegistryConfig::without_builtin_transforms(),
        [SchemaFormat::deferred("never", |_| async { false })],
    )
    .unwrap();
    let validator = registry
        .compile(json!({"allOf": [{"type": "string", "format": "never"}]}))
        .await
        .unwrap();

    let result = validator.validate(json!("x")).await.unwrap();
    assert!(!result.success);
    assert_eq!(
        result.errors,
        Some(vec![" \"x\" is not a \"never\"".to_string()])
    );
}

#[tokio::test]
async fn deferred_format_inside_one_of_picks_the_matching_branch() {
    let registry = SchemaRegistry::with_formats(
        RegistryConfig::without_builtin_transforms(),
        [SchemaFormat::deferred("even-length", |s: String| async move {
            s.len() % 2 == 0
        })],
    )
    .unwrap();
    let validator = registry
        .compile(json!({
            "properties": {
                "id": {"oneOf": [{"format": "even-length"}, {"maxLength": 1}]}
            }
        }))
        .await
        .unwrap();

    assert!(validator.validate(json!({"id": "ab"})).await.unwrap().success);
    assert!(validator.validate(json!({"id": "a"})).await.unwrap().success);
    assert!(!validator.validate(json!({"id": "abc"})).await.unwrap().success);
}
