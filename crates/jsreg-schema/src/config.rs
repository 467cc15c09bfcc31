//! Registry configuration.
//!
//! Every knob has a default, so `RegistryConfig::default()` is a working
//! configuration. Override fields explicitly, deserialize from a config
//! file, or load from environment variables with [`RegistryConfig::from_env`].

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// JSON Schema dialect used to compile schemas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaDraft {
    /// Detect from `$schema`, falling back to the engine default.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "draft4")]
    Draft4,
    #[serde(rename = "draft6")]
    Draft6,
    #[serde(rename = "draft7")]
    Draft7,
    #[serde(rename = "draft2019-09")]
    Draft201909,
    #[serde(rename = "draft2020-12")]
    Draft202012,
}

impl SchemaDraft {
    /// The configuration spelling of this draft.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Draft4 => "draft4",
            Self::Draft6 => "draft6",
            Self::Draft7 => "draft7",
            Self::Draft201909 => "draft2019-09",
            Self::Draft202012 => "draft2020-12",
        }
    }

    /// The engine draft to force, or `None` to let the engine detect it.
    pub(crate) fn engine_draft(self) -> Option<jsonschema::Draft> {
        match self {
            Self::Auto => None,
            Self::Draft4 => Some(jsonschema::Draft::Draft4),
            Self::Draft6 => Some(jsonschema::Draft::Draft6),
            Self::Draft7 => Some(jsonschema::Draft::Draft7),
            Self::Draft201909 => Some(jsonschema::Draft::Draft201909),
            Self::Draft202012 => Some(jsonschema::Draft::Draft202012),
        }
    }
}

impl fmt::Display for SchemaDraft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaDraft {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "draft4" | "draft-04" => Ok(Self::Draft4),
            "draft6" | "draft-06" => Ok(Self::Draft6),
            "draft7" | "draft-07" => Ok(Self::Draft7),
            "draft2019-09" | "draft201909" => Ok(Self::Draft201909),
            "draft2020-12" | "draft202012" => Ok(Self::Draft202012),
            other => Err(format!("unknown schema draft '{other}'")),
        }
    }
}

/// Configuration for a [`SchemaRegistry`](crate::SchemaRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Dialect used to compile schemas.
    pub draft: SchemaDraft,
    /// Enforce the `format` keyword instead of treating it as an annotation.
    pub validate_formats: bool,
    /// Insert `default` values from property schemas before validation.
    pub use_defaults: bool,
    /// After successful validation, add every declared but absent property
    /// with a null value.
    pub fill_undefined_properties: bool,
    /// Timeout for each remote schema fetch, in seconds.
    pub fetch_timeout_secs: u64,
    /// `User-Agent` sent with remote schema fetches.
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            draft: SchemaDraft::Auto,
            validate_formats: true,
            use_defaults: true,
            fill_undefined_properties: true,
            fetch_timeout_secs: 30,
            user_agent: default_user_agent(),
        }
    }
}

fn default_user_agent() -> String {
    format!("jsreg/{}", env!("CARGO_PKG_VERSION"))
}

impl RegistryConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `JSREG_DRAFT` (default: `auto`)
    /// - `JSREG_VALIDATE_FORMATS` (default: `true`)
    /// - `JSREG_USE_DEFAULTS` (default: `true`)
    /// - `JSREG_FILL_UNDEFINED` (default: `true`)
    /// - `JSREG_FETCH_TIMEOUT_SECS` (default: 30)
    /// - `JSREG_USER_AGENT` (default: `jsreg/<version>`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a variable is set to a value
    /// that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            draft: env_parse("JSREG_DRAFT", defaults.draft)?,
            validate_formats: env_bool("JSREG_VALIDATE_FORMATS", defaults.validate_formats)?,
            use_defaults: env_bool("JSREG_USE_DEFAULTS", defaults.use_defaults)?,
            fill_undefined_properties: env_bool(
                "JSREG_FILL_UNDEFINED",
                defaults.fill_undefined_properties,
            )?,
            fetch_timeout_secs: env_parse("JSREG_FETCH_TIMEOUT_SECS", defaults.fetch_timeout_secs)?,
            user_agent: std::env::var("JSREG_USER_AGENT").unwrap_or(defaults.user_agent),
        })
    }

    /// The fetch timeout as a [`Duration`].
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// A configuration with both built-in transforms disabled, so data
    /// passes through the pipeline unchanged.
    pub fn without_builtin_transforms() -> Self {
        Self {
            use_defaults: false,
            fill_undefined_properties: false,
            ..Self::default()
        }
    }
}

fn env_parse<T: FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(var: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable holds a value that does not parse.
    #[error("invalid value '{value}' for {var}")]
    Invalid {
        /// Name of the variable.
        var: String,
        /// The rejected value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_builtin_behaviour() {
        let cfg = RegistryConfig::default();
        assert_eq!(cfg.draft, SchemaDraft::Auto);
        assert!(cfg.validate_formats);
        assert!(cfg.use_defaults);
        assert!(cfg.fill_undefined_properties);
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(30));
        assert!(cfg.user_agent.starts_with("jsreg/"));
    }

    #[test]
    fn draft_parses_both_spellings() {
        assert_eq!("draft7".parse::<SchemaDraft>(), Ok(SchemaDraft::Draft7));
        assert_eq!("Draft-04".parse::<SchemaDraft>(), Ok(SchemaDraft::Draft4));
        assert_eq!("draft2020-12".parse::<SchemaDraft>(), Ok(SchemaDraft::Draft202012));
        assert!("draft3".parse::<SchemaDraft>().is_err());
        assert_eq!(SchemaDraft::Draft201909.to_string(), "draft2019-09");
    }

    #[test]
    fn deserializes_partial_config() {
        let cfg: RegistryConfig =
            serde_json::from_str(r#"{"draft": "draft2019-09", "use_defaults": false}"#).unwrap();
        assert_eq!(cfg.draft, SchemaDraft::Draft201909);
        assert!(!cfg.use_defaults);
        assert!(cfg.fill_undefined_properties);
    }

    #[test]
    fn env_parse_uses_default_when_var_absent() {
        let value = env_parse("JSREG_NONEXISTENT_VAR_8841", 7u64).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn env_bool_rejects_garbage() {
        std::env::set_var("JSREG_TEST_BAD_BOOL", "maybe");
        let result = env_bool("JSREG_TEST_BAD_BOOL", true);
        std::env::remove_var("JSREG_TEST_BAD_BOOL");
        assert_eq!(
            result,
            Err(ConfigError::Invalid {
                var: "JSREG_TEST_BAD_BOOL".into(),
                value: "maybe".into()
            })
        );
    }

    #[test]
    fn parse_bool_accepts_common_forms() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool(""), None);
    }
}
