//! File loading shared by the subcommands.

use std::path::Path;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;

use jsreg_schema::RegistryConfig;

/// Read a JSON or YAML file into `T`.
///
/// Files ending in `.yaml` or `.yml` are parsed as YAML; everything else
/// as JSON.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if is_yaml(path) {
        serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse YAML in {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse JSON in {}", path.display()))
    }
}

/// Registry configuration from a file, or from `JSREG_*` variables when no
/// file is given.
///
/// Fields missing from the file take their default values.
pub fn load_config(path: Option<&Path>) -> Result<RegistryConfig> {
    match path {
        Some(path) => {
            let config: RegistryConfig =
                load_document(path).context("failed to load registry configuration")?;
            tracing::debug!(path = %path.display(), "loaded registry configuration");
            Ok(config)
        }
        None => RegistryConfig::from_env().context("invalid registry configuration"),
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml")
    )
}
