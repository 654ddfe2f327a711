use std::fmt;

use serde::{Deserialize, Serialize};

use super::parameters::ParameterSet;

/// Tolerance of `equals`/`not_equals` comparisons.
pub const EQUALITY_EPSILON: f32 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionMode {
    #[default]
    IfTrue,
    IfFalse,
    Greater,
    Less,
    Equals,
    NotEquals,
    GreaterOrEqual,
    LessOrEqual,
}

impl ConditionMode {
    /// Whether the mode compares against a threshold.
    #[must_use]
    pub fn uses_threshold(self) -> bool {
        !matches!(self, ConditionMode::IfTrue | ConditionMode::IfFalse)
    }

    #[must_use]
    pub fn test(self, value: f32, threshold: f32) -> bool {
        match self {
            ConditionMode::IfTrue => value != 0.0,
            ConditionMode::IfFalse => value == 0.0,
            ConditionMode::Greater => value > threshold,
            ConditionMode::Less => value < threshold,
            ConditionMode::Equals => (value - threshold).abs() < EQUALITY_EPSILON,
            ConditionMode::NotEquals => (value - threshold).abs() >= EQUALITY_EPSILON,
            ConditionMode::GreaterOrEqual => value >= threshold,
            ConditionMode::LessOrEqual => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConditionData {
    #[serde(default)]
    parameter: String,
    #[serde(default)]
    mode: ConditionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<f32>,
}

/// Comparison of one parameter against a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ConditionData", into = "ConditionData")]
pub struct TransitionCondition {
    pub parameter: String,
    pub mode: ConditionMode,
    pub threshold: f32,
}

impl From<ConditionData> for TransitionCondition {
    fn from(data: ConditionData) -> Self {
        Self {
            parameter: data.parameter,
            mode: data.mode,
            threshold: data.threshold.unwrap_or(0.0),
        }
    }
}

impl From<TransitionCondition> for ConditionData {
    fn from(condition: TransitionCondition) -> Self {
        Self {
            threshold: condition.mode.uses_threshold().then_some(condition.threshold),
            parameter: condition.parameter,
            mode: condition.mode,
        }
    }
}

impl TransitionCondition {
    #[must_use]
    pub fn new(parameter: impl Into<String>, mode: ConditionMode, threshold: f32) -> Self {
        Self {
            parameter: parameter.into(),
            mode,
            threshold,
        }
    }

    #[must_use]
    pub fn if_true(parameter: impl Into<String>) -> Self {
        Self::new(parameter, ConditionMode::IfTrue, 0.0)
    }

    #[must_use]
    pub fn if_false(parameter: impl Into<String>) -> Self {
        Self::new(parameter, ConditionMode::IfFalse, 0.0)
    }

    #[must_use]
    pub fn greater(parameter: impl Into<String>, threshold: f32) -> Self {
        Self::new(parameter, ConditionMode::Greater, threshold)
    }

    #[must_use]
    pub fn less(parameter: impl Into<String>, threshold: f32) -> Self {
        Self::new(parameter, ConditionMode::Less, threshold)
    }

    /// Undeclared parameters never satisfy a condition.
    #[must_use]
    pub fn evaluate(&self, parameters: &ParameterSet) -> bool {
        parameters
            .numeric(&self.parameter)
            .is_some_and(|value| self.mode.test(value, self.threshold))
    }
}

impl fmt::Display for TransitionCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.mode {
            ConditionMode::IfTrue => return write!(f, "{}", self.parameter),
            ConditionMode::IfFalse => return write!(f, "!{}", self.parameter),
            ConditionMode::Greater => ">",
            ConditionMode::Less => "<",
            ConditionMode::Equals => "==",
            ConditionMode::NotEquals => "!=",
            ConditionMode::GreaterOrEqual => ">=",
            ConditionMode::LessOrEqual => "<=",
        };
        write!(f, "{} {op} {}", self.parameter, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::parameters::AnimationParameter;

    fn params() -> ParameterSet {
        [
            AnimationParameter::float("speed", 0.5),
            AnimationParameter::bool("grounded", true),
            AnimationParameter::int("combo", 2),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn modes() {
        let p = params();
        assert!(TransitionCondition::greater("speed", 0.1).evaluate(&p));
        assert!(!TransitionCondition::less("speed", 0.5).evaluate(&p));
        assert!(TransitionCondition::new("speed", ConditionMode::LessOrEqual, 0.5).evaluate(&p));
        assert!(TransitionCondition::new("speed", ConditionMode::Equals, 0.50005).evaluate(&p));
        assert!(TransitionCondition::new("combo", ConditionMode::NotEquals, 3.0).evaluate(&p));
        assert!(TransitionCondition::if_true("grounded").evaluate(&p));
        assert!(!TransitionCondition::if_false("grounded").evaluate(&p));
        assert!(!TransitionCondition::if_false("missing").evaluate(&p));
    }

    #[test]
    fn bool_modes_omit_threshold() {
        let json = serde_json::to_value(TransitionCondition::if_true("grounded")).unwrap();
        assert!(json.get("threshold").is_none());
        let json = serde_json::to_value(TransitionCondition::greater("speed", 0.1)).unwrap();
        assert_eq!(json["mode"], "greater");
        assert!(json.get("threshold").is_some());
    }
}
