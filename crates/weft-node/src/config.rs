//! Node configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use weft_core::{Result, WeftError};
use weft_engine::EngineConfig;
use weft_parser::ParserConfig;
use weft_runtime::LocalRuntimeConfig;

/// Everything the node needs to parse a transcript and execute its actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeftConfig {
    /// Directive parser settings.
    pub parser: ParserConfig,

    /// Execution engine settings.
    pub engine: EngineConfig,

    /// Working root and shell for real execution.
    pub runtime: LocalRuntimeConfig,

    /// Default tracing filter, used when `WEFT_LOG` is unset.
    pub log_filter: String,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            engine: EngineConfig::default(),
            runtime: LocalRuntimeConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl WeftConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| WeftError::Config(e.to_string()))
    }

    /// Load from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| WeftError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use weft_engine::FailurePolicy;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = WeftConfig::from_json("{}").unwrap();
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.parser, ParserConfig::default());
        assert_eq!(config.runtime.shell, "sh");
    }

    #[test]
    fn test_nested_overrides() {
        let config = WeftConfig::from_json(
            r#"{
                "engine": { "failure_policy": "halt" },
                "runtime": { "root": "/tmp/work", "shell": "bash" },
                "log_filter": "weft_engine=debug"
            }"#,
        )
        .unwrap();

        assert_eq!(config.engine.failure_policy, FailurePolicy::Halt);
        assert_eq!(config.runtime.shell, "bash");
        assert_eq!(config.runtime.shell_flag, "-c");
        assert_eq!(
            config.runtime.env.get("npm_config_yes").map(String::as_str),
            Some("true")
        );
        assert_eq!(config.log_filter, "weft_engine=debug");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"parser": {{"max_tag_len": 128}}}}"#).unwrap();

        let config = WeftConfig::load(file.path()).unwrap();
        assert_eq!(config.parser.max_tag_len, 128);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            WeftConfig::from_json("{ nope"),
            Err(WeftError::Config(_))
        ));
        assert!(WeftConfig::load(Path::new("/definitely/missing.json")).is_err());
    }
}
