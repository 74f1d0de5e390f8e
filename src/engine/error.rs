use crate::engine::{FactSnapshot, Quantity, TagType};
use thiserror::Error;

/// Errors raised while planning or running a rule session
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Duplicate rule name '{0}'")]
    DuplicateRule(String),

    #[error("Rule '{rule}' requires tag '{tag}', which no rule produces and no session input provides")]
    UnsatisfiableTag { rule: String, tag: TagType },

    #[error("Cyclic tag dependency between rules: {}", rules.join(", "))]
    CyclicDependency { rules: Vec<String> },

    #[error("Rule '{rule}' requires session variable '{variable}', which is not set")]
    MissingSessionVariable { rule: String, variable: String },

    #[error("Rule '{rule}' failed: {source:#}\n  facts at failure: {snapshot}")]
    RuleFault {
        rule: String,
        snapshot: FactSnapshot,
        #[source]
        source: anyhow::Error,
    },

    #[error("Rule '{rule}' declares {declared:?} output but returned {returned:?}")]
    OutputMismatch {
        rule: String,
        declared: Quantity,
        returned: Quantity,
    },
}

impl EngineError {
    /// Name of the rule the error is attributed to, if any
    pub fn rule(&self) -> Option<&str> {
        match self {
            EngineError::DuplicateRule(rule) => Some(rule),
            EngineError::UnsatisfiableTag { rule, .. }
            | EngineError::MissingSessionVariable { rule, .. }
            | EngineError::RuleFault { rule, .. }
            | EngineError::OutputMismatch { rule, .. } => Some(rule),
            EngineError::CyclicDependency { .. } => None,
        }
    }

    /// Whether the error is a rule configuration problem found before any session ran
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            EngineError::DuplicateRule(_)
                | EngineError::UnsatisfiableTag { .. }
                | EngineError::CyclicDependency { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
