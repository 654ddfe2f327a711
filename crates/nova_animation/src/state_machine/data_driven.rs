use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::{Value, json};
use smallvec::SmallVec;

use super::config::{AnimationState, StateMachineConfig, StateMachineLayer, StateTransition, sort_by_priority};
use super::expression::ConditionExpressionParser;
use super::parameters::{AnimationParameter, ParameterSet, ParameterValue};
use crate::controller::AnimationController;
use crate::errors::{AnimationError, Result};
use crate::events::AnimationEventSystem;

/// Transitions kept by [`DataDrivenStateMachine::history`].
pub const MAX_HISTORY: usize = 100;

/// Clip length assumed when no controller knows the state's clip.
const FALLBACK_DURATION: f32 = 1.0;

pub type StateCallback = Box<dyn FnMut(&str) + Send>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateHistoryEntry {
    pub from: String,
    pub to: String,
    pub trigger: String,
    /// Machine time when the transition started.
    pub timestamp: f32,
    pub parameters: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BehaviorPhase {
    Enter,
    Exit,
    Update,
}

#[derive(Debug, Clone)]
struct ActiveTransition {
    target: String,
    duration: f32,
    progress: f32,
}

/// State machine loaded from JSON authoring data.
///
/// Transitions are checked once per [`DataDrivenStateMachine::update`]
/// while no transition is in progress: any-state transitions first, then
/// the current state's, each list by descending priority. The first
/// transition whose expression and conditions hold starts a blend of
/// `duration` seconds; the current state switches when the blend ends.
pub struct DataDrivenStateMachine {
    id: String,
    name: String,
    default_state: String,
    parameters: ParameterSet,
    states: Vec<AnimationState>,
    any_state_transitions: Vec<StateTransition>,
    layers: Vec<StateMachineLayer>,
    parser: ConditionExpressionParser,

    controller: Option<AnimationController>,
    event_system: Option<Box<dyn AnimationEventSystem>>,

    current_state: Option<String>,
    previous_state: Option<String>,
    transition: Option<ActiveTransition>,
    state_time: f32,
    normalized_time: f32,
    total_time: f32,

    on_enter: FxHashMap<String, Vec<StateCallback>>,
    on_exit: FxHashMap<String, Vec<StateCallback>>,

    history: VecDeque<StateHistoryEntry>,
    record_history: bool,
    config_path: Option<PathBuf>,
}

impl std::fmt::Debug for DataDrivenStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataDrivenStateMachine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("states", &self.states.len())
            .field("current_state", &self.current_state)
            .field("transition", &self.transition)
            .finish_non_exhaustive()
    }
}

impl Default for DataDrivenStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl DataDrivenStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            default_state: String::new(),
            parameters: ParameterSet::new(),
            states: Vec::new(),
            any_state_transitions: Vec::new(),
            layers: Vec::new(),
            parser: ConditionExpressionParser::new(),
            controller: None,
            event_system: None,
            current_state: None,
            previous_state: None,
            transition: None,
            state_time: 0.0,
            normalized_time: 0.0,
            total_time: 0.0,
            on_enter: FxHashMap::default(),
            on_exit: FxHashMap::default(),
            history: VecDeque::new(),
            record_history: true,
            config_path: None,
        }
    }

    #[must_use]
    pub fn with_controller(mut self, controller: AnimationController) -> Self {
        self.controller = Some(controller);
        self
    }

    #[must_use]
    pub fn with_event_system(mut self, events: Box<dyn AnimationEventSystem>) -> Self {
        self.event_system = Some(events);
        self
    }

    #[must_use]
    pub fn from_config(config: StateMachineConfig) -> Self {
        let mut machine = Self::new();
        machine.apply_config(config);
        machine
    }

    // ========================================================================
    // Authoring data
    // ========================================================================

    fn apply_config(&mut self, config: StateMachineConfig) {
        self.id = config.id;
        self.name = config.name;
        self.default_state = config.default_state;
        self.parameters = config.parameters.into_iter().collect();
        self.states = config.states;
        self.any_state_transitions = config.any_state_transitions;
        sort_by_priority(&mut self.any_state_transitions);
        self.layers = config.layers;
        self.parser.clear_cache();
    }

    /// Replaces states, parameters and layers. Runtime state is kept; call
    /// [`DataDrivenStateMachine::start`] to re-enter the default state.
    pub fn load_from_json(&mut self, value: Value) -> Result<()> {
        let config: StateMachineConfig = serde_json::from_value(value)?;
        self.apply_config(config);
        Ok(())
    }

    pub fn load_from_str(&mut self, json: &str) -> Result<()> {
        let config: StateMachineConfig = serde_json::from_str(json)?;
        self.apply_config(config);
        Ok(())
    }

    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        self.load_from_str(&json)?;
        self.config_path = Some(path.to_path_buf());
        log::debug!("Loaded state machine '{}' from {}", self.name, path.display());
        Ok(())
    }

    /// Loads the file last passed to [`DataDrivenStateMachine::load_from_file`] again.
    pub fn reload(&mut self) -> Result<()> {
        let path = self
            .config_path
            .clone()
            .ok_or_else(|| AnimationError::Io(std::io::Error::other("state machine was not loaded from a file")))?;
        self.load_from_file(path)
    }

    #[must_use]
    pub fn config(&self) -> StateMachineConfig {
        let mut states = self.states.clone();
        for state in &mut states {
            state.reset_events();
        }
        StateMachineConfig {
            id: self.id.clone(),
            name: self.name.clone(),
            default_state: self.default_state.clone(),
            parameters: self
                .parameters
                .iter()
                .map(|p| AnimationParameter::new(p.name.clone(), p.default_value()))
                .collect(),
            states,
            any_state_transitions: self.any_state_transitions.clone(),
            layers: self.layers.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.config())?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn default_state(&self) -> &str {
        &self.default_state
    }

    pub fn set_default_state(&mut self, name: impl Into<String>) {
        self.default_state = name.into();
    }

    // ========================================================================
    // States
    // ========================================================================

    /// Adds a state, replacing one with the same name.
    pub fn add_state(&mut self, state: AnimationState) {
        match self.states.iter_mut().find(|s| s.name == state.name) {
            Some(existing) => *existing = state,
            None => self.states.push(state),
        }
    }

    pub fn remove_state(&mut self, name: &str) -> Option<AnimationState> {
        let index = self.states.iter().position(|s| s.name == name)?;
        Some(self.states.remove(index))
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<&AnimationState> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn state_mut(&mut self, name: &str) -> Option<&mut AnimationState> {
        self.states.iter_mut().find(|s| s.name == name)
    }

    #[must_use]
    pub fn states(&self) -> &[AnimationState] {
        &self.states
    }

    pub fn add_any_state_transition(&mut self, transition: StateTransition) {
        self.any_state_transitions.push(transition);
        sort_by_priority(&mut self.any_state_transitions);
    }

    #[must_use]
    pub fn any_state_transitions(&self) -> &[StateTransition] {
        &self.any_state_transitions
    }

    // ========================================================================
    // Layers
    // ========================================================================

    pub fn add_layer(&mut self, layer: StateMachineLayer) {
        self.layers.push(layer);
    }

    #[must_use]
    pub fn layer(&self, name: &str) -> Option<&StateMachineLayer> {
        self.layers.iter().find(|l| l.name == name)
    }

    #[must_use]
    pub fn layers(&self) -> &[StateMachineLayer] {
        &self.layers
    }

    pub fn set_layer_weight(&mut self, name: &str, weight: f32) {
        match self.layers.iter_mut().find(|l| l.name == name) {
            Some(layer) => layer.weight = weight,
            None => log::debug!("State machine '{}': unknown layer '{name}'", self.name),
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    pub fn add_parameter(&mut self, parameter: AnimationParameter) {
        self.parameters.add(parameter);
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    fn set_value(&mut self, name: &str, value: ParameterValue) {
        if let Err(e) = self.parameters.set(name, value) {
            log::warn!("State machine '{}': {e}", self.name);
        }
    }

    /// Unknown names and kind mismatches are ignored (logged).
    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set_value(name, ParameterValue::Float(value));
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set_value(name, ParameterValue::Int(value));
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set_value(name, ParameterValue::Bool(value));
    }

    /// Sets a trigger; it resets after the next update.
    pub fn set_trigger(&mut self, name: &str) {
        self.set_value(name, ParameterValue::Trigger(true));
    }

    pub fn reset_trigger(&mut self, name: &str) {
        self.set_value(name, ParameterValue::Trigger(false));
    }

    /// 0 for unknown or differently typed parameters.
    #[must_use]
    pub fn get_float(&self, name: &str) -> f32 {
        self.parameters.float(name).unwrap_or_default()
    }

    #[must_use]
    pub fn get_int(&self, name: &str) -> i32 {
        self.parameters.int(name).unwrap_or_default()
    }

    /// Reads bool and trigger parameters; false otherwise.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> bool {
        self.parameters.bool(name).unwrap_or_default()
    }

    pub fn try_get_float(&self, name: &str) -> Result<f32> {
        self.parameters.float(name)
    }

    pub fn try_get_int(&self, name: &str) -> Result<i32> {
        self.parameters.int(name)
    }

    pub fn try_get_bool(&self, name: &str) -> Result<bool> {
        self.parameters.bool(name)
    }

    // ========================================================================
    // Collaborators
    // ========================================================================

    #[must_use]
    pub fn controller(&self) -> Option<&AnimationController> {
        self.controller.as_ref()
    }

    pub fn controller_mut(&mut self) -> Option<&mut AnimationController> {
        self.controller.as_mut()
    }

    pub fn set_controller(&mut self, controller: Option<AnimationController>) {
        self.controller = controller;
    }

    pub fn set_event_system(&mut self, events: Option<Box<dyn AnimationEventSystem>>) {
        self.event_system = events;
    }

    pub fn on_state_enter(&mut self, state: impl Into<String>, callback: impl FnMut(&str) + Send + 'static) {
        self.on_enter.entry(state.into()).or_default().push(Box::new(callback));
    }

    pub fn on_state_exit(&mut self, state: impl Into<String>, callback: impl FnMut(&str) + Send + 'static) {
        self.on_exit.entry(state.into()).or_default().push(Box::new(callback));
    }

    // ========================================================================
    // Runtime
    // ========================================================================

    /// Enters the default state.
    pub fn start(&mut self) {
        if self.default_state.is_empty() {
            log::warn!("State machine '{}' has no default state", self.name);
            self.current_state = None;
            return;
        }
        if self.state(&self.default_state).is_none() {
            log::warn!(
                "State machine '{}': default state '{}' does not exist",
                self.name,
                self.default_state
            );
        }

        self.current_state = Some(self.default_state.clone());
        self.previous_state = None;
        self.transition = None;
        self.enter_current();

        if let Some(state) = self.states.iter().find(|s| s.name == self.default_state)
            && !state.clip.is_empty()
            && let Some(controller) = &mut self.controller
        {
            controller.play(&state.clip, 0.0, state.looping);
            controller.set_animation_speed(&state.clip, state.speed);
        }
    }

    /// Steps the machine and, if present, the owned controller.
    pub fn update(&mut self, dt: f32) {
        let Some(current) = self.current_state.clone() else {
            return;
        };
        if !dt.is_finite() {
            log::warn!("State machine '{}': ignoring non-finite update step {dt}", self.name);
            return;
        }
        self.total_time += dt;

        if let Some(transition) = &mut self.transition {
            transition.progress = if transition.duration > 0.0 {
                transition.progress + dt / transition.duration
            } else {
                1.0
            };
            if transition.progress >= 1.0 {
                self.complete_transition();
            }
        }
        let current = self.current_state.clone().unwrap_or(current);

        let playback = self.state(&current).map(|state| {
            (
                state.speed,
                state.speed_multiplier_parameter.clone(),
                state.clip.clone(),
                state.looping,
                state.time_parameter.clone(),
            )
        });

        if let Some((base_speed, multiplier, clip, looping, time_parameter)) = playback {
            let speed = if multiplier.is_empty() {
                base_speed
            } else {
                base_speed * self.get_float(&multiplier)
            };

            let previous = self.normalized_time;
            self.state_time += dt * speed;
            let duration = self.clip_duration(&clip);
            if duration > 0.0 {
                self.normalized_time = if looping {
                    (self.state_time / duration).rem_euclid(1.0)
                } else {
                    (self.state_time / duration).min(1.0)
                };
            }

            if !time_parameter.is_empty() {
                self.set_float(&time_parameter, self.normalized_time);
            }
            if self.transition.is_none()
                && !clip.is_empty()
                && let Some(controller) = &mut self.controller
            {
                controller.set_animation_speed(&clip, speed);
            }

            self.process_state_events(&current, previous, self.normalized_time);
            self.execute_behaviors(&current, BehaviorPhase::Update);
            self.evaluate_transitions(&current);
        }

        self.parameters.reset_triggers();

        if let Some(controller) = &mut self.controller {
            controller.update(dt);
        }
    }

    /// Moves to `state` over `blend_time` seconds (`<= 0` switches now).
    /// Unknown states and the current state are ignored.
    pub fn force_state(&mut self, state: &str, blend_time: f32) {
        if self.current_state.as_deref() == Some(state) {
            return;
        }
        if self.state(state).is_none() {
            log::warn!("State machine '{}': cannot force unknown state '{state}'", self.name);
            return;
        }
        if self.current_state.is_none() {
            self.current_state = Some(state.to_string());
            self.enter_current();
            return;
        }
        self.start_transition(state, blend_time);
        self.record_transition(state, "force_state");
        if blend_time <= 0.0 {
            self.complete_transition();
        }
    }

    #[must_use]
    pub fn current_state(&self) -> Option<&str> {
        self.current_state.as_deref()
    }

    #[must_use]
    pub fn previous_state(&self) -> Option<&str> {
        self.previous_state.as_deref()
    }

    #[must_use]
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    #[must_use]
    pub fn transition_target(&self) -> Option<&str> {
        self.transition.as_ref().map(|t| t.target.as_str())
    }

    /// 0 to 1 while transitioning, 0 otherwise.
    #[must_use]
    pub fn transition_progress(&self) -> f32 {
        self.transition.as_ref().map_or(0.0, |t| t.progress.min(1.0))
    }

    #[must_use]
    pub fn normalized_time(&self) -> f32 {
        self.normalized_time
    }

    /// Seconds spent in the current state, scaled by state speed.
    #[must_use]
    pub fn state_time(&self) -> f32 {
        self.state_time
    }

    /// Length in seconds of the current state's clip, 1 when unknown.
    #[must_use]
    pub fn current_clip_duration(&self) -> f32 {
        let clip = self
            .current_state
            .as_deref()
            .and_then(|name| self.states.iter().find(|s| s.name == name))
            .map(|s| s.clip.as_str());
        clip.map_or(FALLBACK_DURATION, |clip| self.clip_duration(clip))
    }

    // ========================================================================
    // History & debugging
    // ========================================================================

    pub fn history(&self) -> impl Iterator<Item = &StateHistoryEntry> {
        self.history.iter()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn set_record_history(&mut self, record: bool) {
        self.record_history = record;
    }

    #[must_use]
    pub fn debug_info(&self) -> Value {
        json!({
            "currentState": self.current_state,
            "previousState": self.previous_state,
            "stateTime": self.state_time,
            "normalizedTime": self.normalized_time,
            "isTransitioning": self.is_transitioning(),
            "transitionTarget": self.transition_target(),
            "transitionProgress": self.transition_progress(),
            "parameters": self.parameters.snapshot(),
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn clip_duration(&self, clip: &str) -> f32 {
        self.controller
            .as_ref()
            .and_then(|c| c.animation(clip))
            .map_or(FALLBACK_DURATION, |a| a.duration())
    }

    fn evaluate_transitions(&mut self, current: &str) {
        if self.transition.is_some() {
            return;
        }
        let Some(state) = self.states.iter().find(|s| s.name == current) else {
            return;
        };

        let mut local: SmallVec<[&StateTransition; 8]> = state.transitions.iter().collect();
        local.sort_by_key(|t| std::cmp::Reverse(t.priority));

        let mut winner = None;
        for transition in self.any_state_transitions.iter().chain(local) {
            if transition.to == current && !transition.can_transition_to_self {
                continue;
            }
            if transition.has_exit_time && self.normalized_time < transition.exit_time {
                continue;
            }
            let expression_holds = self.parser.evaluate(&transition.condition, &self.parameters);
            if expression_holds && transition.conditions.iter().all(|c| c.evaluate(&self.parameters)) {
                winner = Some(transition.clone());
                break;
            }
        }

        if let Some(transition) = winner {
            log::debug!(
                "State machine '{}': {current} -> {} ({})",
                self.name,
                transition.to,
                transition.describe_trigger()
            );
            self.start_transition(&transition.to, transition.duration);
            self.record_transition(&transition.to, &transition.describe_trigger());
            if transition.duration <= 0.0 {
                self.complete_transition();
            }
        }
    }

    fn start_transition(&mut self, target: &str, duration: f32) {
        if let Some(current) = self.current_state.clone() {
            self.run_callbacks(&current, false);
            self.execute_behaviors(&current, BehaviorPhase::Exit);
        }

        self.previous_state = self.current_state.clone();
        self.transition = Some(ActiveTransition {
            target: target.to_string(),
            duration,
            progress: 0.0,
        });

        if let Some(state) = self.states.iter().find(|s| s.name == target)
            && !state.clip.is_empty()
            && let Some(controller) = &mut self.controller
        {
            controller.cross_fade(&state.clip, duration, state.looping);
            controller.set_animation_speed(&state.clip, state.speed);
        }
    }

    fn complete_transition(&mut self) {
        let Some(transition) = self.transition.take() else {
            return;
        };
        if let Some(current) = self.current_state.clone()
            && let Some(state) = self.state_mut(&current)
        {
            state.reset_events();
        }
        self.current_state = Some(transition.target);
        self.enter_current();
    }

    /// Resets timing for the current state and runs its enter hooks.
    fn enter_current(&mut self) {
        let Some(current) = self.current_state.clone() else {
            return;
        };

        let (offset, clip) = match self.state_mut(&current) {
            Some(state) => {
                state.reset_events();
                (state.cycle_offset, state.clip.clone())
            }
            None => (0.0, String::new()),
        };
        self.normalized_time = offset.rem_euclid(1.0);
        self.state_time = self.normalized_time * self.clip_duration(&clip);

        self.run_callbacks(&current, true);
        self.execute_behaviors(&current, BehaviorPhase::Enter);
    }

    fn run_callbacks(&mut self, state: &str, enter: bool) {
        let callbacks = if enter { &mut self.on_enter } else { &mut self.on_exit };
        if let Some(callbacks) = callbacks.get_mut(state) {
            for callback in callbacks {
                callback(state);
            }
        }
    }

    fn execute_behaviors(&mut self, name: &str, phase: BehaviorPhase) {
        let Some(events) = &mut self.event_system else {
            return;
        };
        let Some(state) = self.states.iter().find(|s| s.name == name) else {
            return;
        };
        for behavior in &state.behaviors {
            let actions = match phase {
                BehaviorPhase::Enter => &behavior.on_enter,
                BehaviorPhase::Exit => &behavior.on_exit,
                BehaviorPhase::Update => &behavior.on_update,
            };
            for action in actions {
                events.dispatch_event("behavior_action", action);
            }
        }
    }

    /// Fires events whose time lies in `(previous, current]`, wrapping
    /// around when playback looped.
    fn process_state_events(&mut self, name: &str, previous: f32, current: f32) {
        let Some(state) = self.states.iter_mut().find(|s| s.name == name) else {
            return;
        };

        for event in &mut state.events {
            let crossed = if current >= previous {
                event.time > previous && event.time <= current
            } else {
                event.time > previous || event.time <= current
            };

            if crossed && !event.triggered {
                event.triggered = true;
                log::trace!("Animation event '{}' at {}", event.name, event.time);
                if let Some(events) = &mut self.event_system {
                    events.dispatch_event(&event.name, &event.data);
                }
            }

            if current < event.time && previous >= event.time {
                event.triggered = false;
            }
        }
    }

    fn record_transition(&mut self, to: &str, trigger: &str) {
        if !self.record_history {
            return;
        }
        self.history.push_back(StateHistoryEntry {
            from: self.previous_state.clone().unwrap_or_default(),
            to: to.to_string(),
            trigger: trigger.to_string(),
            timestamp: self.total_time,
            parameters: self.parameters.snapshot(),
        });
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::test_support::hold;
    use crate::events::EventQueue;
    use crate::state_machine::config::AnimationEvent;

    const LOCOMOTION: &str = r#"{
        "id": "humanoid",
        "name": "Locomotion",
        "defaultState": "idle",
        "parameters": [
            {"name": "speed", "type": "float", "defaultValue": 0.0},
            {"name": "jump", "type": "trigger"}
        ],
        "states": [
            {"name": "idle", "clip": "idle",
             "transitions": [{"to": "run", "condition": "speed > 0.1", "duration": 0.2}]},
            {"name": "run", "clip": "run",
             "transitions": [{"to": "idle", "conditions": [{"parameter": "speed", "mode": "less", "threshold": 0.1}]}]},
            {"name": "jump", "clip": "jump", "loop": false,
             "transitions": [{"to": "idle", "hasExitTime": true, "exitTime": 0.95, "duration": 0.1}]}
        ],
        "anyStateTransitions": [
            {"to": "jump", "conditions": [{"parameter": "jump", "mode": "if_true"}], "duration": 0.0}
        ]
    }"#;

    fn machine() -> DataDrivenStateMachine {
        let mut m = DataDrivenStateMachine::new();
        m.load_from_str(LOCOMOTION).unwrap();
        m.start();
        m
    }

    #[test]
    fn transitions_once_when_condition_holds() {
        let mut m = machine();
        for _ in 0..10 {
            m.update(0.05);
        }
        assert_eq!(m.current_state(), Some("idle"));

        m.set_float("speed", 1.0);
        m.update(0.05);
        assert!(m.is_transitioning());
        assert_eq!(m.transition_target(), Some("run"));
        for _ in 0..10 {
            m.update(0.05);
        }
        assert_eq!(m.current_state(), Some("run"));
        assert!(!m.is_transitioning());
        assert_eq!(m.history().count(), 1);
    }

    #[test]
    fn triggers_reset_after_update() {
        let mut m = machine();
        m.set_trigger("jump");
        assert!(m.get_bool("jump"));
        m.update(0.016);
        assert!(!m.get_bool("jump"));
        assert_eq!(m.current_state(), Some("jump"));
    }

    #[test]
    fn exit_time_gates_transition() {
        let mut m = machine();
        m.force_state("jump", 0.0);
        m.update(0.5);
        assert_eq!(m.current_state(), Some("jump"));
        m.update(0.5);
        assert!(m.is_transitioning());
        assert_eq!(m.transition_target(), Some("idle"));
    }

    #[test]
    fn events_fire_once_per_crossing() {
        let queue = EventQueue::new();
        let mut m = DataDrivenStateMachine::new().with_event_system(Box::new(queue.clone()));
        m.add_state(AnimationState::new("walk", "walk").with_event(AnimationEvent::new(0.5, "footstep")));
        m.set_default_state("walk");
        m.start();

        m.update(0.25);
        assert!(queue.is_empty());
        m.update(0.5);
        m.update(0.1);
        assert_eq!(queue.drain().len(), 1);
        // wraps past 1.0 and crosses 0.5 again
        m.update(0.25);
        m.update(0.5);
        assert_eq!(queue.drain().len(), 1);
    }

    #[test]
    fn type_mismatch_is_reported_by_try_get() {
        let mut m = machine();
        m.set_int("speed", 3);
        assert_eq!(m.get_float("speed"), 0.0);
        assert!(matches!(
            m.try_get_int("speed"),
            Err(AnimationError::ParameterTypeMismatch { .. })
        ));
        assert!(m.try_get_float("speed").is_ok());
    }

    #[test]
    fn drives_owned_controller() {
        let mut controller = AnimationController::new();
        for name in ["idle", "run"] {
            controller.insert_animation(hold(name, 0.0, 1.0));
        }
        let mut m = DataDrivenStateMachine::new().with_controller(controller);
        m.load_from_str(LOCOMOTION).unwrap();
        m.start();
        assert!(m.controller().unwrap().is_playing("idle"));

        m.set_float("speed", 1.0);
        m.update(0.05);
        assert!(m.controller().unwrap().is_playing("run"));
    }

    #[test]
    fn callbacks_and_debug_info() {
        let queue = EventQueue::new();
        let mut m = machine();
        let entered = queue.clone();
        m.on_state_enter("run", move |s| entered.push(format!("enter:{s}"), Value::Null));
        let exited = queue.clone();
        m.on_state_exit("idle", move |s| exited.push(format!("exit:{s}"), Value::Null));

        m.force_state("run", 0.0);
        let names: Vec<_> = queue.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["exit:idle", "enter:run"]);

        let info = m.debug_info();
        assert_eq!(info["currentState"], "run");
        assert_eq!(info["previousState"], "idle");
        assert_eq!(info["isTransitioning"], false);
    }

    #[test]
    fn json_round_trip() {
        let m = machine();
        let mut copy = DataDrivenStateMachine::new();
        copy.load_from_str(&m.to_json().unwrap()).unwrap();
        assert_eq!(copy.config(), m.config());
        assert_eq!(copy.any_state_transitions().len(), 1);
    }
}
