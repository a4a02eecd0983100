//! Knowledge model - best practices and optimization rules.

use crate::{clamp_unit, Parameters};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Applicability key marking a practice as always applicable.
pub const GENERAL_SCOPE_KEY: &str = "scope";

/// Applicability value marking a practice as always applicable.
pub const GENERAL_SCOPE_VALUE: &str = "general";

/// Action key that never overrides a parameter.
pub const MAINTAIN_ACTION: &str = "maintain";

/// Pre-execution guidance derived from high-quality runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestPractice {
    /// Stable identifier (e.g. `optimal_<param>`)
    pub id: String,

    /// Human-readable description
    pub description: String,

    /// Condition on the call parameters
    #[serde(default)]
    pub applicability: Parameters,

    /// Parameter overrides to apply
    #[serde(default)]
    pub actions: Parameters,

    /// Expected improvement
    pub expected_gain: f64,

    /// Success rate observed when the practice was derived
    #[serde(default)]
    pub observed_success_rate: f64,

    /// How often the practice matched a call
    #[serde(default)]
    pub times_applied: u64,
}

impl BestPractice {
    /// Create a practice that applies to every call.
    pub fn general(id: impl Into<String>, description: impl Into<String>, actions: Parameters) -> Self {
        let mut applicability = Parameters::new();
        applicability.insert(GENERAL_SCOPE_KEY.to_string(), Value::from(GENERAL_SCOPE_VALUE));
        Self {
            id: id.into(),
            description: description.into(),
            applicability,
            actions,
            expected_gain: 0.0,
            observed_success_rate: 0.0,
            times_applied: 0,
        }
    }

    /// Whether the practice applies to a call with these parameters.
    ///
    /// Empty and general-scope conditions always match; anything else needs
    /// every key/value pair to be present in the call.
    pub fn applies_to(&self, params: &Parameters) -> bool {
        if self.applicability.is_empty() || self.is_general() {
            return true;
        }
        self.applicability
            .iter()
            .all(|(key, value)| params.get(key) == Some(value))
    }

    fn is_general(&self) -> bool {
        self.applicability.get(GENERAL_SCOPE_KEY).and_then(Value::as_str) == Some(GENERAL_SCOPE_VALUE)
    }
}

/// A proposed mutation of a skill's persisted configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRule {
    /// Stable identifier (e.g. `optimize_<param>`)
    pub id: String,

    /// What the rule changes
    #[serde(flatten)]
    pub kind: RuleKind,

    /// Trust in `[0, 1]`
    pub confidence: f64,

    /// Expected improvement
    #[serde(default)]
    pub expected_gain: f64,
}

/// Variant-specific payload of a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleKind {
    /// Overwrite the value at a dotted path
    Parameter {
        target: String,
        #[serde(default)]
        action: ParameterAction,
        value: Value,
    },
    /// Edit a key at the document root
    Config {
        target: String,
        action: ConfigAction,
        #[serde(default)]
        value: Value,
    },
}

/// Action of a parameter rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterAction {
    #[default]
    Adjust,
}

/// Action of a config rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigAction {
    Add,
    Remove,
    Replace,
}

impl ConfigAction {
    /// Lowercase name as written in rule documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigAction::Add => "add",
            ConfigAction::Remove => "remove",
            ConfigAction::Replace => "replace",
        }
    }
}

impl OptimizationRule {
    /// Create a parameter rule.
    pub fn parameter(
        id: impl Into<String>,
        target: impl Into<String>,
        value: Value,
        confidence: f64,
        expected_gain: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: RuleKind::Parameter {
                target: target.into(),
                action: ParameterAction::Adjust,
                value,
            },
            confidence: clamp_unit(confidence),
            expected_gain,
        }
    }

    /// Create a config rule.
    pub fn config(
        id: impl Into<String>,
        target: impl Into<String>,
        action: ConfigAction,
        value: Value,
        confidence: f64,
        expected_gain: f64,
    ) -> Self {
        Self {
            id: id.into(),
            kind: RuleKind::Config {
                target: target.into(),
                action,
                value,
            },
            confidence: clamp_unit(confidence),
            expected_gain,
        }
    }

    /// Target path or key.
    pub fn target(&self) -> &str {
        match &self.kind {
            RuleKind::Parameter { target, .. } | RuleKind::Config { target, .. } => target,
        }
    }

    /// Value the rule writes.
    pub fn value(&self) -> &Value {
        match &self.kind {
            RuleKind::Parameter { value, .. } | RuleKind::Config { value, .. } => value,
        }
    }

    /// Short label for logs, e.g. `parameter/adjust`.
    pub fn label(&self) -> String {
        match &self.kind {
            RuleKind::Parameter { .. } => "parameter/adjust".to_string(),
            RuleKind::Config { action, .. } => format!("config/{}", action.as_str()),
        }
    }
}
