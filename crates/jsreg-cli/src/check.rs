//! # Check Subcommand
//!
//! Compiles each schema with one shared registry, so a remote document
//! referenced by several schemas is fetched once.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use jsreg_schema::{RegistryConfig, SchemaRegistry};

use crate::input::load_document;

/// Arguments for the `jsreg check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Schemas to compile (JSON or YAML).
    #[arg(value_name = "SCHEMA", required = true)]
    pub schemas: Vec<PathBuf>,
}

/// Execute the check subcommand.
///
/// Returns exit code: 0 when every schema compiles, 1 otherwise.
pub async fn run_check(args: &CheckArgs, config: RegistryConfig) -> Result<u8> {
    let registry = SchemaRegistry::new(config).context("failed to create schema registry")?;
    let mut failed = 0usize;

    for path in &args.schemas {
        let schema = load_document(path)?;
        match registry.compile(schema).await {
            Ok(_) => println!("OK: {}", path.display()),
            Err(e) => {
                failed += 1;
                println!("FAIL: {}: {e}", path.display());
            }
        }
    }

    println!(
        "Schemas: {}/{} compiled",
        args.schemas.len() - failed,
        args.schemas.len()
    );
    tracing::info!(fetched = registry.cache().len(), "remote documents fetched");

    Ok(if failed > 0 { 1 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reports_schemas_that_do_not_compile() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.yaml");
        std::fs::write(&good, r##"{"$ref": "#/definitions/a", "definitions": {"a": {}}}"##).unwrap();
        std::fs::write(&bad, "type: 12\n").unwrap();

        let config = RegistryConfig::without_builtin_transforms();
        let only_good = CheckArgs { schemas: vec![good.clone()] };
        assert_eq!(run_check(&only_good, config.clone()).await.unwrap(), 0);
        let both = CheckArgs { schemas: vec![good, bad] };
        assert_eq!(run_check(&both, config).await.unwrap(), 1);
    }
}
