//! Engine configuration.
//!
//! Every member has a default, so an empty TOML document (or
//! `EngineConfig::default()`) is a complete configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rule::HideMode;

/// Tunables for aggregation and normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Recursion bound of the rule-collection walker.
    pub max_depth: usize,
    /// Members ignored when comparing rules for duplication.
    pub volatile_keys: Vec<String>,
    /// Top-level names of heading-domain rule collections.
    pub heading_rule_keys: Vec<String>,
    /// Top-level names of field-domain rule collections.
    pub field_rule_keys: Vec<String>,
    /// Nested containers searched, in order, when no top-level collection
    /// holds rules. Several are legacy aliases of the same container.
    pub payload_containers: Vec<String>,
    /// Field-domain hide effect for rules that carry no `hideMode`.
    pub default_hide_mode: HideMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let names =
            |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        EngineConfig {
            max_depth: 32,
            volatile_keys: names(&["version", "ts"]),
            heading_rule_keys: names(&["rules", "headingRules", "sectionRules"]),
            field_rule_keys: names(&["fieldRules", "optionRules"]),
            payload_containers: names(&[
                "payload",
                "data",
                "state",
                "formState",
                "savedState",
                "meta",
            ]),
            default_hide_mode: HideMode::Hide,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth == 0 {
            return Err(ConfigError::ZeroDepth);
        }
        let lists: [(&'static str, &Vec<String>); 3] = [
            ("heading_rule_keys", &self.heading_rule_keys),
            ("field_rule_keys", &self.field_rule_keys),
            ("payload_containers", &self.payload_containers),
        ];
        for (key, list) in lists {
            if list.is_empty() {
                return Err(ConfigError::EmptyList { key });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_value(serde_json::json!({"max_depth": 4})).unwrap();
        assert_eq!(cfg.max_depth, 4);
        assert_eq!(cfg.volatile_keys, vec!["version", "ts"]);
    }

    #[test]
    fn unknown_members_are_rejected() {
        let parsed: Result<EngineConfig, _> =
            serde_json::from_value(serde_json::json!({"depth": 4}));
        assert!(parsed.is_err());
    }

    #[test]
    fn empty_lists_fail_validation() {
        let cfg = EngineConfig {
            payload_containers: vec![],
            ..EngineConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::EmptyList {
                key: "payload_containers"
            })
        );
        let cfg = EngineConfig {
            max_depth: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroDepth));
    }
}
