use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::condition::TransitionCondition;
use super::parameters::AnimationParameter;
use crate::layer::LayerBlendMode;

fn default_one() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_transition_duration() -> f32 {
    0.2
}

fn default_exit_time() -> f32 {
    -1.0
}

fn is_zero(v: &f32) -> bool {
    *v == 0.0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Named event fired when playback of a state crosses `time`
/// (normalized, 0 to 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationEvent {
    #[serde(default)]
    pub time: f32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Value,
    #[serde(skip)]
    pub(crate) triggered: bool,
}

impl AnimationEvent {
    #[must_use]
    pub fn new(time: f32, name: impl Into<String>) -> Self {
        Self {
            time,
            name: name.into(),
            data: Value::Null,
            triggered: false,
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Actions dispatched as `behavior_action` events when a state is
/// entered, exited or updated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBehavior {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_enter: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_exit: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_update: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTransition {
    #[serde(default)]
    pub to: String,
    /// Free-form expression; empty means no expression check.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
    /// All must hold, in addition to `condition`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<TransitionCondition>,
    /// Blend duration in seconds.
    #[serde(default = "default_transition_duration")]
    pub duration: f32,
    /// Higher is checked first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub has_exit_time: bool,
    /// Normalized time the state must reach when `has_exit_time` is set.
    #[serde(default = "default_exit_time")]
    pub exit_time: f32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub can_transition_to_self: bool,
}

impl StateTransition {
    #[must_use]
    pub fn new(to: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            condition: String::new(),
            conditions: Vec::new(),
            duration: default_transition_duration(),
            priority: 0,
            has_exit_time: false,
            exit_time: default_exit_time(),
            can_transition_to_self: false,
        }
    }

    #[must_use]
    pub fn with_condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = expression.into();
        self
    }

    #[must_use]
    pub fn with_parameter_condition(mut self, condition: TransitionCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.duration = seconds;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_exit_time(mut self, normalized: f32) -> Self {
        self.has_exit_time = true;
        self.exit_time = normalized;
        self
    }

    #[must_use]
    pub fn allow_self_transition(mut self) -> Self {
        self.can_transition_to_self = true;
        self
    }

    /// Text recorded in the transition history.
    #[must_use]
    pub fn describe_trigger(&self) -> String {
        if !self.condition.is_empty() {
            return self.condition.clone();
        }
        self.conditions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

/// Sorts by descending priority; equal priorities keep declaration order.
pub(crate) fn sort_by_priority(transitions: &mut [StateTransition]) {
    transitions.sort_by_key(|t| std::cmp::Reverse(t.priority));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimationState {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub clip: String,
    #[serde(default = "default_one")]
    pub speed: f32,
    #[serde(rename = "loop", default = "default_true")]
    pub looping: bool,
    /// Normalized start offset.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub cycle_offset: f32,
    /// Float parameter multiplied into `speed`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub speed_multiplier_parameter: String,
    /// Float parameter receiving the normalized time every update.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time_parameter: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub blend_tree_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<AnimationEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub behaviors: Vec<StateBehavior>,
}

impl AnimationState {
    #[must_use]
    pub fn new(name: impl Into<String>, clip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clip: clip.into(),
            speed: 1.0,
            looping: true,
            cycle_offset: 0.0,
            speed_multiplier_parameter: String::new(),
            time_parameter: String::new(),
            blend_tree_id: String::new(),
            events: Vec::new(),
            transitions: Vec::new(),
            behaviors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    #[must_use]
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[must_use]
    pub fn with_cycle_offset(mut self, offset: f32) -> Self {
        self.cycle_offset = offset;
        self
    }

    #[must_use]
    pub fn with_speed_multiplier_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.speed_multiplier_parameter = parameter.into();
        self
    }

    #[must_use]
    pub fn with_time_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.time_parameter = parameter.into();
        self
    }

    #[must_use]
    pub fn with_transition(mut self, transition: StateTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: AnimationEvent) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn with_behavior(mut self, behavior: StateBehavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub(crate) fn reset_events(&mut self) {
        for event in &mut self.events {
            event.triggered = false;
        }
    }
}

/// Authoring data for an additional layer of states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineLayer {
    pub name: String,
    #[serde(default = "default_one")]
    pub weight: f32,
    #[serde(default)]
    pub blending_mode: LayerBlendMode,
    /// Name of a mask in the mask library.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_state: String,
    #[serde(rename = "syncedLayerIndex", default, skip_serializing_if = "Option::is_none")]
    pub synced_layer: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<AnimationState>,
}

impl StateMachineLayer {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight: 1.0,
            blending_mode: LayerBlendMode::Override,
            mask: None,
            default_state: String::new(),
            synced_layer: None,
            states: Vec::new(),
        }
    }
}

/// Serialized form of a [`super::DataDrivenStateMachine`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMachineConfig {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub default_state: String,
    #[serde(default)]
    pub parameters: Vec<AnimationParameter>,
    #[serde(default)]
    pub states: Vec<AnimationState>,
    /// Transitions that may fire from any state.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub any_state_transitions: Vec<StateTransition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub layers: Vec<StateMachineLayer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_defaults() {
        let t: StateTransition = serde_json::from_str(r#"{"to": "run"}"#).unwrap();
        assert_eq!(t.duration, 0.2);
        assert_eq!(t.exit_time, -1.0);
        assert!(!t.has_exit_time);

        let json = serde_json::to_value(StateTransition::new("idle").with_exit_time(0.9)).unwrap();
        assert_eq!(json["hasExitTime"], true);
        assert!(json.get("canTransitionToSelf").is_none());
    }

    #[test]
    fn priority_sort_is_stable() {
        let mut transitions = vec![
            StateTransition::new("a"),
            StateTransition::new("b").with_priority(2),
            StateTransition::new("c"),
            StateTransition::new("d").with_priority(2),
        ];
        sort_by_priority(&mut transitions);
        let order: Vec<_> = transitions.iter().map(|t| t.to.as_str()).collect();
        assert_eq!(order, ["b", "d", "a", "c"]);
    }

    #[test]
    fn state_keys_follow_authoring_format() {
        let state: AnimationState = serde_json::from_str(
            r#"{"name": "walk", "clip": "walk_fwd", "loop": false, "speedMultiplierParameter": "speed",
                "events": [{"time": 0.5, "name": "footstep", "data": {"foot": "left"}}]}"#,
        )
        .unwrap();
        assert!(!state.looping);
        assert_eq!(state.speed, 1.0);
        assert_eq!(state.events[0].data["foot"], "left");
        assert_eq!(state.speed_multiplier_parameter, "speed");
    }
}
