//! Parser configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the directive parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Longest opening tag, in bytes, that is held back waiting for its `>`.
    /// Longer candidates are emitted as literal text.
    pub max_tag_len: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { max_tag_len: 4096 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ParserConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, ParserConfig::default());

        let config: ParserConfig = serde_json::from_str(r#"{"max_tag_len": 64}"#).unwrap();
        assert_eq!(config.max_tag_len, 64);
    }
}
