use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AnimationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Float,
    Int,
    Bool,
    /// A bool that resets itself after every state machine update.
    Trigger,
}

impl ParameterKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ParameterKind::Float => "float",
            ParameterKind::Int => "int",
            ParameterKind::Bool => "bool",
            ParameterKind::Trigger => "trigger",
        }
    }

    #[must_use]
    pub fn zero(self) -> ParameterValue {
        match self {
            ParameterKind::Float => ParameterValue::Float(0.0),
            ParameterKind::Int => ParameterValue::Int(0),
            ParameterKind::Bool => ParameterValue::Bool(false),
            ParameterKind::Trigger => ParameterValue::Trigger(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Trigger(bool),
}

impl ParameterValue {
    #[must_use]
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::Float(_) => ParameterKind::Float,
            ParameterValue::Int(_) => ParameterKind::Int,
            ParameterValue::Bool(_) => ParameterKind::Bool,
            ParameterValue::Trigger(_) => ParameterKind::Trigger,
        }
    }

    /// Numeric view used by conditions: bools are 0 or 1.
    #[must_use]
    pub fn as_f32(&self) -> f32 {
        match *self {
            ParameterValue::Float(v) => v,
            ParameterValue::Int(v) => v as f32,
            ParameterValue::Bool(v) | ParameterValue::Trigger(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f32> {
        match *self {
            ParameterValue::Float(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            ParameterValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// Bool and trigger values.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            ParameterValue::Bool(v) | ParameterValue::Trigger(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_json(&self) -> Value {
        match *self {
            ParameterValue::Float(v) => Value::from(v),
            ParameterValue::Int(v) => Value::from(v),
            ParameterValue::Bool(v) | ParameterValue::Trigger(v) => Value::from(v),
        }
    }

    fn from_json(kind: ParameterKind, value: &Value) -> Option<Self> {
        match kind {
            ParameterKind::Float => value.as_f64().map(|v| ParameterValue::Float(v as f32)),
            ParameterKind::Int => value
                .as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(ParameterValue::Int),
            ParameterKind::Bool => value.as_bool().map(ParameterValue::Bool),
            ParameterKind::Trigger => value.as_bool().map(ParameterValue::Trigger),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterData {
    name: String,
    #[serde(rename = "type", default)]
    kind: ParameterKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<Value>,
}

/// A named, typed state machine input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ParameterData", into = "ParameterData")]
pub struct AnimationParameter {
    pub name: String,
    default: ParameterValue,
    current: ParameterValue,
}

impl TryFrom<ParameterData> for AnimationParameter {
    type Error = String;

    fn try_from(data: ParameterData) -> std::result::Result<Self, Self::Error> {
        let default = match &data.default_value {
            None => data.kind.zero(),
            Some(value) => ParameterValue::from_json(data.kind, value).ok_or_else(|| {
                format!(
                    "parameter '{}': default {value} is not a valid {}",
                    data.name,
                    data.kind.name()
                )
            })?,
        };
        Ok(Self::new(data.name, default))
    }
}

impl From<AnimationParameter> for ParameterData {
    fn from(parameter: AnimationParameter) -> Self {
        Self {
            name: parameter.name,
            kind: parameter.default.kind(),
            default_value: Some(parameter.default.to_json()),
        }
    }
}

impl AnimationParameter {
    #[must_use]
    pub fn new(name: impl Into<String>, default: ParameterValue) -> Self {
        Self {
            name: name.into(),
            default,
            current: default,
        }
    }

    #[must_use]
    pub fn float(name: impl Into<String>, default: f32) -> Self {
        Self::new(name, ParameterValue::Float(default))
    }

    #[must_use]
    pub fn int(name: impl Into<String>, default: i32) -> Self {
        Self::new(name, ParameterValue::Int(default))
    }

    #[must_use]
    pub fn bool(name: impl Into<String>, default: bool) -> Self {
        Self::new(name, ParameterValue::Bool(default))
    }

    #[must_use]
    pub fn trigger(name: impl Into<String>) -> Self {
        Self::new(name, ParameterValue::Trigger(false))
    }

    #[must_use]
    pub fn kind(&self) -> ParameterKind {
        self.default.kind()
    }

    #[must_use]
    pub fn default_value(&self) -> ParameterValue {
        self.default
    }

    #[must_use]
    pub fn value(&self) -> ParameterValue {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.default;
    }
}

fn mismatch(name: &str, expected: ParameterKind, found: ParameterKind) -> AnimationError {
    AnimationError::ParameterTypeMismatch {
        name: name.to_string(),
        expected: expected.name(),
        found: found.name(),
    }
}

/// Declared parameters, ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    parameters: BTreeMap<String, AnimationParameter>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a parameter, replacing any previous one with the same name.
    pub fn add(&mut self, parameter: AnimationParameter) {
        self.parameters.insert(parameter.name.clone(), parameter);
    }

    pub fn remove(&mut self, name: &str) -> Option<AnimationParameter> {
        self.parameters.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AnimationParameter> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnimationParameter> {
        self.parameters.values()
    }

    pub fn clear(&mut self) {
        self.parameters.clear();
    }

    /// Numeric value of a declared parameter.
    #[must_use]
    pub fn numeric(&self, name: &str) -> Option<f32> {
        self.parameters.get(name).map(|p| p.current.as_f32())
    }

    /// Assigns a value of the parameter's declared kind.
    pub fn set(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        let parameter = self
            .parameters
            .get_mut(name)
            .ok_or_else(|| AnimationError::ParameterNotFound(name.to_string()))?;
        if parameter.kind() != value.kind() {
            return Err(mismatch(name, value.kind(), parameter.kind()));
        }
        parameter.current = value;
        Ok(())
    }

    /// Assigns a value, declaring the parameter with a zero default when
    /// it does not exist yet.
    pub fn set_or_add(&mut self, name: &str, value: ParameterValue) -> Result<()> {
        if !self.contains(name) {
            self.add(AnimationParameter::new(name, value.kind().zero()));
        }
        self.set(name, value)
    }

    fn typed(&self, name: &str, kind: ParameterKind) -> Result<ParameterValue> {
        let parameter = self
            .parameters
            .get(name)
            .ok_or_else(|| AnimationError::ParameterNotFound(name.to_string()))?;
        let compatible = parameter.kind() == kind
            || (kind == ParameterKind::Bool && parameter.kind() == ParameterKind::Trigger);
        if !compatible {
            return Err(mismatch(name, kind, parameter.kind()));
        }
        Ok(parameter.current)
    }

    pub fn float(&self, name: &str) -> Result<f32> {
        Ok(self.typed(name, ParameterKind::Float)?.as_f32())
    }

    pub fn int(&self, name: &str) -> Result<i32> {
        let value = self.typed(name, ParameterKind::Int)?;
        Ok(value.as_int().unwrap_or_default())
    }

    /// Reads bool and trigger parameters.
    pub fn bool(&self, name: &str) -> Result<bool> {
        let value = self.typed(name, ParameterKind::Bool)?;
        Ok(value.as_bool().unwrap_or_default())
    }

    pub fn reset_triggers(&mut self) {
        for parameter in self.parameters.values_mut() {
            if parameter.kind() == ParameterKind::Trigger {
                parameter.current = ParameterValue::Trigger(false);
            }
        }
    }

    pub fn reset_to_defaults(&mut self) {
        for parameter in self.parameters.values_mut() {
            parameter.reset();
        }
    }

    /// Current values as a JSON object.
    #[must_use]
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        self.parameters
            .iter()
            .map(|(name, p)| (name.clone(), p.current.to_json()))
            .collect()
    }
}

impl FromIterator<AnimationParameter> for ParameterSet {
    fn from_iter<I: IntoIterator<Item = AnimationParameter>>(iter: I) -> Self {
        let mut set = Self::new();
        for parameter in iter {
            set.add(parameter);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access_rejects_other_kinds() {
        let mut set = ParameterSet::new();
        set.add(AnimationParameter::float("speed", 0.5));
        set.add(AnimationParameter::trigger("jump"));

        assert_eq!(set.float("speed").unwrap(), 0.5);
        assert!(matches!(
            set.int("speed"),
            Err(AnimationError::ParameterTypeMismatch { expected: "int", found: "float", .. })
        ));
        assert!(set.set("speed", ParameterValue::Bool(true)).is_err());
        assert!(matches!(set.float("missing"), Err(AnimationError::ParameterNotFound(_))));

        set.set("jump", ParameterValue::Trigger(true)).unwrap();
        assert!(set.bool("jump").unwrap());
        set.reset_triggers();
        assert!(!set.bool("jump").unwrap());
    }

    #[test]
    fn parameter_json_uses_type_and_default_keys() {
        let json = r#"[
            {"name": "speed", "type": "float", "defaultValue": 0.25},
            {"name": "combo", "type": "int", "defaultValue": 2},
            {"name": "attack", "type": "trigger"}
        ]"#;
        let parameters: Vec<AnimationParameter> = serde_json::from_str(json).unwrap();
        assert_eq!(parameters[0].value(), ParameterValue::Float(0.25));
        assert_eq!(parameters[1].value(), ParameterValue::Int(2));
        assert_eq!(parameters[2].kind(), ParameterKind::Trigger);

        let out = serde_json::to_value(&parameters[1]).unwrap();
        assert_eq!(out["type"], "int");
        assert_eq!(out["defaultValue"], 2);
    }

    #[test]
    fn bad_default_is_an_error() {
        let json = r#"{"name": "grounded", "type": "bool", "defaultValue": 3}"#;
        assert!(serde_json::from_str::<AnimationParameter>(json).is_err());
    }
}
