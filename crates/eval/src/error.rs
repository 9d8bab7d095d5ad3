//! Error types for the visibility engine.
//!
//! None of these escape the evaluation path as failures: rule-level errors
//! are returned as rejection data alongside the rules that did normalize.
//! Only configuration validation returns `Err` to callers.

/// Why a raw record could not become a canonical rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleParseError {
    /// The record is not a JSON object.
    #[error("rule is not an object")]
    NotAnObject,
    /// No `action` member.
    #[error("rule has no action")]
    MissingAction,
    /// `action` is neither show nor hide.
    #[error("unknown action '{action}'")]
    UnknownAction { action: String },
    /// None of `fieldId`, `field` or `whenField` is present.
    #[error("rule has no trigger field reference")]
    MissingTrigger,
    /// The trigger reference matches no field in the schema.
    #[error("trigger reference '{reference}' does not resolve to a field")]
    UnresolvedTrigger { reference: String },
    /// `op`/`operator` names no known operator.
    #[error("unknown operator '{op}'")]
    UnknownOperator { op: String },
}

/// Configuration rejected by [`crate::EngineConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("max_depth must be at least 1")]
    ZeroDepth,
    #[error("'{key}' must list at least one name")]
    EmptyList { key: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = RuleParseError::UnresolvedTrigger {
            reference: "pets".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "trigger reference 'pets' does not resolve to a field"
        );
        assert_eq!(
            ConfigError::EmptyList {
                key: "payload_containers"
            }
            .to_string(),
            "'payload_containers' must list at least one name"
        );
    }
}
