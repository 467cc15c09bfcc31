//! # Validate Subcommand
//!
//! Compiles one schema, then runs every data file through the registry
//! pipeline: pre transforms, schema validation, post transforms. Each result
//! is printed to stdout as a `SchemaValidatorResult` JSON object.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use jsreg_schema::{
    RegistryConfig, SchemaDraft, SchemaRegistry, SchemaValidator, SchemaValidatorResult,
};

use crate::input::load_document;

/// Arguments for the `jsreg validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Schema to validate against (JSON or YAML).
    #[arg(long, short, value_name = "SCHEMA")]
    pub schema: PathBuf,

    /// Data files to validate.
    #[arg(value_name = "DATA", required = true)]
    pub data: Vec<PathBuf>,

    /// Do not insert `default` values before validation.
    #[arg(long)]
    pub no_defaults: bool,

    /// Do not add declared but absent properties after validation.
    #[arg(long)]
    pub no_fill: bool,

    /// Do not enforce the `format` keyword.
    #[arg(long)]
    pub no_formats: bool,

    /// Force a schema draft instead of detecting it from `$schema`.
    #[arg(long, value_name = "DRAFT")]
    pub draft: Option<SchemaDraft>,

    /// Print each result on a single line.
    #[arg(long)]
    pub compact: bool,
}

impl ValidateArgs {
    /// Apply the command-line overrides on top of `config`.
    pub fn apply(&self, mut config: RegistryConfig) -> RegistryConfig {
        if self.no_defaults {
            config.use_defaults = false;
        }
        if self.no_fill {
            config.fill_undefined_properties = false;
        }
        if self.no_formats {
            config.validate_formats = false;
        }
        if let Some(draft) = self.draft {
            config.draft = draft;
        }
        config
    }
}

/// Execute the validate subcommand.
///
/// Returns exit code: 0 when every file is valid, 1 when any file fails
/// validation.
pub async fn run_validate(args: &ValidateArgs, config: RegistryConfig) -> Result<u8> {
    let registry =
        SchemaRegistry::new(args.apply(config)).context("failed to create schema registry")?;
    let schema = load_document(&args.schema)?;
    let validator = registry
        .compile(schema)
        .await
        .with_context(|| format!("failed to compile schema {}", args.schema.display()))?;

    tracing::info!(
        schema = %args.schema.display(),
        fetched = registry.cache().len(),
        "compiled schema"
    );

    let mut had_failures = false;
    for path in &args.data {
        let result = validate_file(&validator, path).await?;
        if !result.success {
            tracing::warn!(
                path = %path.display(),
                errors = result.errors.as_ref().map_or(0, Vec::len),
                "validation failed"
            );
            had_failures = true;
        }
        println!("{}", render(&result, args.compact)?);
    }

    Ok(if had_failures { 1 } else { 0 })
}

/// Load one data file and run it through `validator`.
pub async fn validate_file(validator: &SchemaValidator, path: &Path) -> Result<SchemaValidatorResult> {
    let data = load_document(path)?;
    validator
        .validate(data)
        .await
        .with_context(|| format!("pipeline failed for {}", path.display()))
}

/// Serialize a result for stdout.
pub fn render(result: &SchemaValidatorResult, compact: bool) -> Result<String> {
    let text = if compact {
        serde_json::to_string(result)?
    } else {
        serde_json::to_string_pretty(result)?
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(schema: PathBuf, data: Vec<PathBuf>) -> ValidateArgs {
        ValidateArgs {
            schema,
            data,
            no_defaults: false,
            no_fill: false,
            no_formats: false,
            draft: None,
            compact: true,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn flags_override_config() {
        let mut a = args(PathBuf::from("s.json"), vec![]);
        a.no_defaults = true;
        a.no_formats = true;
        a.draft = Some(SchemaDraft::Draft6);
        let config = a.apply(RegistryConfig::default());
        assert!(!config.use_defaults);
        assert!(!config.validate_formats);
        assert!(config.fill_undefined_properties);
        assert_eq!(config.draft, SchemaDraft::Draft6);
    }

    #[tokio::test]
    async fn yaml_data_runs_through_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write(
            dir.path(),
            "schema.yaml",
            "type: object\nproperties:\n  port:\n    type: integer\n    default: 8080\n  host:\n    type: string\n",
        );
        let data = write(dir.path(), "data.yaml", "host: localhost\n");

        let registry = SchemaRegistry::new(RegistryConfig::default()).unwrap();
        let validator = registry.compile(load_document(&schema).unwrap()).await.unwrap();
        let result = validate_file(&validator, &data).await.unwrap();
        assert_eq!(
            result,
            SchemaValidatorResult::valid(json!({"host": "localhost", "port": 8080}))
        );
    }

    #[tokio::test]
    async fn exit_code_reports_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let schema = write(dir.path(), "schema.json", r#"{"type": "integer"}"#);
        let good = write(dir.path(), "good.json", "4");
        let bad = write(dir.path(), "bad.json", r#""four""#);

        let config = RegistryConfig::without_builtin_transforms();
        let all_good = args(schema.clone(), vec![good.clone()]);
        assert_eq!(run_validate(&all_good, config.clone()).await.unwrap(), 0);
        let mixed = args(schema, vec![good, bad]);
        assert_eq!(run_validate(&mixed, config).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unreadable_schema_is_an_operational_error() {
        let dir = tempfile::tempdir().unwrap();
        let data = write(dir.path(), "data.json", "{}");
        let missing = args(dir.path().join("nope.json"), vec![data]);
        assert!(run_validate(&missing, RegistryConfig::default()).await.is_err());
    }

    #[test]
    fn compact_rendering_omits_errors_when_valid() {
        let text = render(&SchemaValidatorResult::valid(json!({"a": 1})), true).unwrap();
        assert_eq!(text, r#"{"data":{"a":1},"success":true}"#);
    }
}
