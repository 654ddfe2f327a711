//! Animation Triggers
//!
//! Authored rules that turn playback progress, state changes, gameplay
//! properties and input sequences into named events:
//!
//! - [`AnimationTriggerSystem`]: a prioritised list of [`TriggerConfig`]s,
//!   checked once per update and published through an
//!   [`AnimationEventSystem`] (usually an
//!   [`AnimationEventBus`](crate::events::AnimationEventBus)).
//! - [`ComboDetector`]: input-sequence tracking without per-trigger setup.
//! - [`TriggerTemplates`]: ready-made configs for common gameplay hooks.

use std::collections::VecDeque;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::Result;
use crate::events::AnimationEventSystem;
use crate::state_machine::DataDrivenStateMachine;

/// Frame rate assumed by frame-based time triggers.
pub const TRIGGER_FRAME_RATE: f32 = 30.0;

/// Inputs kept by [`ComboDetector::input_history`].
pub const MAX_INPUT_HISTORY: usize = 32;

/// Event published for triggers that name a script function.
pub const SCRIPT_EVENT: &str = "trigger_script";

const CHANGE_EPSILON: f32 = 1e-4;

fn default_true() -> bool {
    true
}

fn default_max_delay() -> f32 {
    0.5
}

fn default_combo_window() -> f32 {
    1.0
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyCompareMode {
    /// Fires on the update the value reaches the threshold from below.
    #[default]
    CrossAbove,
    /// Fires on the update the value reaches the threshold from above.
    CrossBelow,
    /// Fires every update the value is above the threshold.
    WhileAbove,
    /// Fires every update the value is below the threshold.
    WhileBelow,
    /// Fires whenever the value moved since the previous update.
    OnChange,
}

impl PropertyCompareMode {
    fn holds(self, previous: Option<f32>, current: f32, threshold: f32) -> bool {
        match self {
            Self::CrossAbove => previous.is_some_and(|p| p < threshold) && current >= threshold,
            Self::CrossBelow => previous.is_some_and(|p| p > threshold) && current <= threshold,
            Self::WhileAbove => current > threshold,
            Self::WhileBelow => current < threshold,
            Self::OnChange => previous.is_some_and(|p| (current - p).abs() > CHANGE_EPSILON),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboInput {
    pub input: String,
    /// Longest gap allowed since the previous input of the sequence.
    #[serde(default = "default_max_delay")]
    pub max_delay: f32,
}

impl ComboInput {
    #[must_use]
    pub fn new(input: impl Into<String>, max_delay: f32) -> Self {
        Self {
            input: input.into(),
            max_delay,
        }
    }
}

/// What makes a trigger fire. Serialized inline in [`TriggerConfig`] under
/// a `"type"` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerKind {
    /// Playback crosses `time`, in normalized clip time, or in frames at
    /// [`TRIGGER_FRAME_RATE`] when `is_frame_based`.
    #[serde(rename_all = "camelCase")]
    Time {
        #[serde(default)]
        time: f32,
        #[serde(default)]
        is_frame_based: bool,
    },
    #[serde(rename_all = "camelCase")]
    StateEnter { target_state: String },
    #[serde(rename_all = "camelCase")]
    StateExit { target_state: String },
    #[serde(rename_all = "camelCase")]
    Property {
        property: String,
        #[serde(default)]
        threshold: f32,
        #[serde(default)]
        compare_mode: PropertyCompareMode,
    },
    /// The sequence was entered with every gap within its `max_delay` and
    /// the whole sequence within `combo_window` seconds.
    #[serde(rename_all = "camelCase")]
    Combo {
        #[serde(default)]
        combo_sequence: Vec<ComboInput>,
        #[serde(default = "default_combo_window")]
        combo_window: f32,
    },
    /// Only fires through [`AnimationTriggerSystem::fire`].
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Higher priorities are checked and published first.
    #[serde(default)]
    pub priority: i32,
    /// Minimum seconds between two firings.
    #[serde(default)]
    pub cooldown: f32,
    #[serde(flatten)]
    pub kind: TriggerKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub event_data: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub script: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub script_args: Value,
}

impl TriggerConfig {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TriggerKind) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            enabled: true,
            priority: 0,
            cooldown: 0.0,
            kind,
            event: String::new(),
            event_data: Value::Null,
            script: String::new(),
            script_args: Value::Null,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: impl Into<String>, data: Value) -> Self {
        self.event = event.into();
        self.event_data = data;
        self
    }

    #[must_use]
    pub fn with_script(mut self, function: impl Into<String>, args: Value) -> Self {
        self.script = function.into();
        self.script_args = args;
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: f32) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// On-disk form of an [`AnimationTriggerSystem`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerSetConfig {
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
}

// ============================================================================
// Context
// ============================================================================

/// Playback snapshot a trigger update is checked against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TriggerContext<'a> {
    /// Position in the current clip, 0 to 1.
    pub normalized_time: f32,
    /// Clip length in seconds; converts frame-based trigger times.
    pub duration: f32,
    pub current_state: Option<&'a str>,
    pub previous_state: Option<&'a str>,
}

impl<'a> TriggerContext<'a> {
    #[must_use]
    pub fn at(normalized_time: f32, duration: f32) -> Self {
        Self {
            normalized_time,
            duration,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_state(mut self, current: &'a str) -> Self {
        self.current_state = Some(current);
        self
    }

    #[must_use]
    pub fn after_state(mut self, previous: &'a str) -> Self {
        self.previous_state = Some(previous);
        self
    }

    #[must_use]
    pub fn from_state_machine(machine: &'a DataDrivenStateMachine) -> Self {
        Self {
            normalized_time: machine.normalized_time(),
            duration: machine.current_clip_duration(),
            current_state: machine.current_state(),
            previous_state: machine.previous_state(),
        }
    }

    /// Keys merged into every published trigger payload.
    #[must_use]
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("normalizedTime".into(), json!(self.normalized_time));
        if let Some(state) = self.current_state {
            map.insert("currentState".into(), json!(state));
        }
        if let Some(state) = self.previous_state {
            map.insert("previousState".into(), json!(state));
        }
        map
    }

    fn time_of_frame(&self, frame: f32) -> f32 {
        let seconds = frame / TRIGGER_FRAME_RATE;
        if self.duration > 0.0 { seconds / self.duration } else { seconds }
    }
}

// ============================================================================
// Trigger
// ============================================================================

#[derive(Debug, Clone, Default)]
struct TriggerState {
    last_fired: Option<f32>,
    previous_time: f32,
    last_state: Option<String>,
    property: Option<f32>,
    previous_property: Option<f32>,
    combo_progress: usize,
    first_input_time: f32,
    last_input_time: f32,
}

/// A [`TriggerConfig`] plus the runtime state its checks need.
#[derive(Debug, Clone)]
pub struct AnimationTrigger {
    config: TriggerConfig,
    state: TriggerState,
}

impl AnimationTrigger {
    #[must_use]
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            state: TriggerState::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.config.id
    }

    #[must_use]
    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    #[must_use]
    pub fn last_fired(&self) -> Option<f32> {
        self.state.last_fired
    }

    /// Inputs of the combo sequence matched so far.
    #[must_use]
    pub fn combo_progress(&self) -> usize {
        self.state.combo_progress
    }

    pub fn reset(&mut self) {
        self.state = TriggerState::default();
    }

    pub fn set_property_value(&mut self, value: f32) {
        self.state.previous_property = self.state.property;
        self.state.property = Some(value);
    }

    /// Advances a combo trigger's sequence. A late input restarts the
    /// sequence, counting as its first input when it matches.
    pub fn process_input(&mut self, input: &str, now: f32) {
        let TriggerKind::Combo { combo_sequence, .. } = &self.config.kind else {
            return;
        };
        advance_sequence(
            combo_sequence,
            &mut self.state.combo_progress,
            &mut self.state.first_input_time,
            &mut self.state.last_input_time,
            input,
            now,
        );
    }

    /// Checks the trigger at machine time `now`. Tracking state moves on even
    /// while the trigger is disabled or cooling down.
    pub fn check(&mut self, ctx: &TriggerContext<'_>, now: f32) -> bool {
        let state = &mut self.state;
        let state_changed = state.last_state.as_deref() != ctx.current_state;

        let condition = match &self.config.kind {
            TriggerKind::Time { time, is_frame_based } => {
                let point = if *is_frame_based { ctx.time_of_frame(*time) } else { *time };
                // Normalized time restarts with every state change.
                let previous = if state_changed { 0.0 } else { state.previous_time };
                state.previous_time = ctx.normalized_time;
                time_crossed(point, previous, ctx.normalized_time)
            }
            TriggerKind::StateEnter { target_state } => {
                ctx.current_state == Some(target_state.as_str())
                    && state.last_state.as_deref() != Some(target_state.as_str())
            }
            TriggerKind::StateExit { target_state } => {
                state.last_state.as_deref() == Some(target_state.as_str())
                    && ctx.current_state != Some(target_state.as_str())
            }
            TriggerKind::Property {
                threshold, compare_mode, ..
            } => state
                .property
                .is_some_and(|current| compare_mode.holds(state.previous_property, current, *threshold)),
            TriggerKind::Combo {
                combo_sequence,
                combo_window,
            } => {
                let complete = !combo_sequence.is_empty() && state.combo_progress >= combo_sequence.len();
                if complete {
                    state.combo_progress = 0;
                }
                complete && now - state.first_input_time <= *combo_window
            }
            TriggerKind::Custom => false,
        };

        if state_changed {
            state.last_state = ctx.current_state.map(str::to_owned);
        }

        if !condition || !self.config.enabled {
            return false;
        }
        if state.last_fired.is_some_and(|last| now - last < self.config.cooldown) {
            log::trace!("Trigger '{}' cooling down", self.config.id);
            return false;
        }
        state.last_fired = Some(now);
        true
    }
}

fn time_crossed(point: f32, previous: f32, current: f32) -> bool {
    if current >= previous {
        point > previous && point <= current
    } else {
        point > previous || point <= current
    }
}

fn advance_sequence(
    sequence: &[ComboInput],
    progress: &mut usize,
    first_input_time: &mut f32,
    last_input_time: &mut f32,
    input: &str,
    now: f32,
) {
    let Some(expected) = sequence.get(*progress) else {
        return;
    };
    if expected.input != input {
        return;
    }
    if *progress > 0 && now - *last_input_time > expected.max_delay {
        *progress = 0;
        if sequence.first().is_none_or(|first| first.input != input) {
            return;
        }
    }
    if *progress == 0 {
        *first_input_time = now;
    }
    *progress += 1;
    *last_input_time = now;
}

fn payload_object(value: &Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other.clone());
            map
        }
    }
}

fn publish(events: &mut dyn AnimationEventSystem, config: &TriggerConfig, context: &Map<String, Value>) {
    if !config.event.is_empty() {
        let mut payload = payload_object(&config.event_data);
        payload.insert("triggerId".into(), json!(config.id));
        payload.insert("triggerName".into(), json!(config.name));
        for (key, value) in context {
            payload.entry(key.clone()).or_insert_with(|| value.clone());
        }
        events.dispatch_event(&config.event, &Value::Object(payload));
    }

    if !config.script.is_empty() {
        let mut args = payload_object(&config.script_args);
        args.insert("triggerId".into(), json!(config.id));
        let call = json!({
            "function": config.script,
            "args": args,
            "context": context,
        });
        events.dispatch_event(SCRIPT_EVENT, &call);
    }
}

// ============================================================================
// Trigger System
// ============================================================================

/// Prioritised trigger list checked once per frame.
///
/// Property triggers read values set with
/// [`AnimationTriggerSystem::set_property`]; combo triggers consume inputs
/// from [`AnimationTriggerSystem::process_input`]. Triggers that fire during
/// [`AnimationTriggerSystem::update`] publish their event with the config's
/// `event_data`, the trigger id and name, and the context keys the data does
/// not already carry.
#[derive(Default)]
pub struct AnimationTriggerSystem {
    triggers: Vec<AnimationTrigger>,
    properties: FxHashMap<String, f32>,
    fired: Vec<String>,
    event_system: Option<Box<dyn AnimationEventSystem>>,
}

impl std::fmt::Debug for AnimationTriggerSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationTriggerSystem")
            .field("triggers", &self.triggers.len())
            .field("properties", &self.properties)
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}

impl AnimationTriggerSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_event_system(mut self, events: Box<dyn AnimationEventSystem>) -> Self {
        self.event_system = Some(events);
        self
    }

    pub fn set_event_system(&mut self, events: Option<Box<dyn AnimationEventSystem>>) {
        self.event_system = events;
    }

    #[must_use]
    pub fn from_config(config: TriggerSetConfig) -> Self {
        let mut system = Self::new();
        for trigger in config.triggers {
            system.add_trigger(trigger);
        }
        system
    }

    // ========================================================================
    // Triggers
    // ========================================================================

    /// Adds a trigger, replacing one with the same id.
    pub fn add_trigger(&mut self, config: TriggerConfig) {
        if self.remove_trigger(&config.id).is_some() {
            log::debug!("Replacing trigger '{}'", config.id);
        }
        self.triggers.push(AnimationTrigger::new(config));
        self.triggers.sort_by_key(|t| std::cmp::Reverse(t.config.priority));
    }

    pub fn remove_trigger(&mut self, id: &str) -> Option<TriggerConfig> {
        let index = self.triggers.iter().position(|t| t.config.id == id)?;
        Some(self.triggers.remove(index).config)
    }

    #[must_use]
    pub fn trigger(&self, id: &str) -> Option<&AnimationTrigger> {
        self.triggers.iter().find(|t| t.config.id == id)
    }

    pub fn trigger_mut(&mut self, id: &str) -> Option<&mut AnimationTrigger> {
        self.triggers.iter_mut().find(|t| t.config.id == id)
    }

    /// Triggers in check order.
    pub fn triggers(&self) -> impl Iterator<Item = &AnimationTrigger> {
        self.triggers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn clear(&mut self) {
        self.triggers.clear();
        self.properties.clear();
        self.fired.clear();
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    pub fn set_property(&mut self, name: impl Into<String>, value: f32) {
        self.properties.insert(name.into(), value);
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<f32> {
        self.properties.get(name).copied()
    }

    pub fn process_input(&mut self, input: &str, now: f32) {
        for trigger in &mut self.triggers {
            trigger.process_input(input, now);
        }
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Checks every trigger and returns the ids that fired, in priority order.
    pub fn update(&mut self, ctx: &TriggerContext<'_>, now: f32) -> &[String] {
        self.fired.clear();
        let context = ctx.to_json();

        for trigger in &mut self.triggers {
            let value = match &trigger.config.kind {
                TriggerKind::Property { property, .. } => self.properties.get(property).copied(),
                _ => None,
            };
            if let Some(value) = value {
                trigger.set_property_value(value);
            }

            if trigger.check(ctx, now) {
                log::trace!("Trigger '{}' fired at {now}", trigger.config.id);
                self.fired.push(trigger.config.id.clone());
                if let Some(events) = &mut self.event_system {
                    publish(events.as_mut(), &trigger.config, &context);
                }
            }
        }

        &self.fired
    }

    /// Fires a trigger regardless of its condition. Disabled triggers and
    /// triggers cooling down stay silent.
    pub fn fire(&mut self, id: &str, ctx: &TriggerContext<'_>, now: f32) -> bool {
        let Some(trigger) = self.triggers.iter_mut().find(|t| t.config.id == id) else {
            log::warn!("Cannot fire unknown trigger '{id}'");
            return false;
        };
        if !trigger.config.enabled
            || trigger
                .state
                .last_fired
                .is_some_and(|last| now - last < trigger.config.cooldown)
        {
            return false;
        }
        trigger.state.last_fired = Some(now);
        if let Some(events) = &mut self.event_system {
            publish(events.as_mut(), &trigger.config, &ctx.to_json());
        }
        true
    }

    /// Ids fired by the last [`AnimationTriggerSystem::update`].
    #[must_use]
    pub fn fired_triggers(&self) -> &[String] {
        &self.fired
    }

    pub fn reset_all(&mut self) {
        for trigger in &mut self.triggers {
            trigger.reset();
        }
        self.properties.clear();
        self.fired.clear();
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    #[must_use]
    pub fn config(&self) -> TriggerSetConfig {
        TriggerSetConfig {
            triggers: self.triggers.iter().map(|t| t.config.clone()).collect(),
        }
    }

    /// Replaces every trigger. Properties are kept.
    pub fn load_from_json(&mut self, value: Value) -> Result<()> {
        let config: TriggerSetConfig = serde_json::from_value(value)?;
        self.apply_config(config);
        Ok(())
    }

    pub fn load_from_str(&mut self, json: &str) -> Result<()> {
        let config: TriggerSetConfig = serde_json::from_str(json)?;
        self.apply_config(config);
        Ok(())
    }

    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        self.load_from_str(&json)?;
        log::debug!("Loaded {} triggers from {}", self.triggers.len(), path.display());
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.config())?)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    fn apply_config(&mut self, config: TriggerSetConfig) {
        self.triggers.clear();
        self.fired.clear();
        for trigger in config.triggers {
            self.add_trigger(trigger);
        }
    }
}

// ============================================================================
// Combo Detector
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboDefinition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sequence: Vec<ComboInput>,
    /// Seconds after the latest input before partial progress is dropped.
    #[serde(default = "default_combo_window")]
    pub window_time: f32,
    /// Event published by [`ComboDetector::dispatch_completed`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub on_complete: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub completion_data: Value,
}

impl ComboDefinition {
    #[must_use]
    pub fn new(id: impl Into<String>, sequence: Vec<ComboInput>, window_time: f32) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            sequence,
            window_time,
            on_complete: String::new(),
            completion_data: Value::Null,
        }
    }

    #[must_use]
    pub fn with_completion(mut self, event: impl Into<String>, data: Value) -> Self {
        self.on_complete = event.into();
        self.completion_data = data;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComboSetConfig {
    #[serde(default)]
    pub combos: Vec<ComboDefinition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputRecord {
    pub input: String,
    pub time: f32,
}

#[derive(Debug, Clone, Copy, Default)]
struct ComboProgress {
    matched: usize,
    first_input_time: f32,
    last_input_time: f32,
    completed: bool,
}

/// Tracks every registered combo against one input stream.
///
/// A completed combo stays completed, ignoring input, until
/// [`ComboDetector::take_completed`] hands it out.
#[derive(Debug, Clone, Default)]
pub struct ComboDetector {
    combos: Vec<ComboDefinition>,
    progress: FxHashMap<String, ComboProgress>,
    history: VecDeque<InputRecord>,
    completed: Vec<String>,
}

impl ComboDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a combo, replacing one with the same id.
    pub fn add_combo(&mut self, combo: ComboDefinition) {
        self.combos.retain(|c| c.id != combo.id);
        self.progress.insert(combo.id.clone(), ComboProgress::default());
        self.combos.push(combo);
    }

    pub fn remove_combo(&mut self, id: &str) -> Option<ComboDefinition> {
        let index = self.combos.iter().position(|c| c.id == id)?;
        self.progress.remove(id);
        self.completed.retain(|c| c != id);
        Some(self.combos.remove(index))
    }

    #[must_use]
    pub fn combo(&self, id: &str) -> Option<&ComboDefinition> {
        self.combos.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn combos(&self) -> &[ComboDefinition] {
        &self.combos
    }

    /// Inputs of `id`'s sequence matched so far.
    #[must_use]
    pub fn progress(&self, id: &str) -> usize {
        self.progress.get(id).map_or(0, |p| p.matched)
    }

    /// Recent inputs, oldest first.
    pub fn input_history(&self) -> impl Iterator<Item = &InputRecord> {
        self.history.iter()
    }

    pub fn process_input(&mut self, input: &str, now: f32) {
        self.history.push_back(InputRecord {
            input: input.to_string(),
            time: now,
        });
        while self.history.len() > MAX_INPUT_HISTORY {
            self.history.pop_front();
        }

        for combo in &self.combos {
            let Some(state) = self.progress.get_mut(&combo.id) else {
                continue;
            };
            if state.completed {
                continue;
            }
            advance_sequence(
                &combo.sequence,
                &mut state.matched,
                &mut state.first_input_time,
                &mut state.last_input_time,
                input,
                now,
            );
            if !combo.sequence.is_empty() && state.matched >= combo.sequence.len() {
                state.completed = true;
                log::debug!("Combo '{}' completed", combo.id);
                self.completed.push(combo.id.clone());
            }
        }
    }

    /// Drops partial progress older than each combo's window.
    pub fn update(&mut self, now: f32) {
        for combo in &self.combos {
            let Some(state) = self.progress.get_mut(&combo.id) else {
                continue;
            };
            if state.matched > 0 && !state.completed && now - state.last_input_time > combo.window_time {
                *state = ComboProgress::default();
            }
        }
    }

    /// Hands out completed combo ids, oldest first, and rearms them.
    pub fn take_completed(&mut self) -> Vec<String> {
        let completed = std::mem::take(&mut self.completed);
        for id in &completed {
            if let Some(state) = self.progress.get_mut(id) {
                *state = ComboProgress::default();
            }
        }
        completed
    }

    /// [`ComboDetector::take_completed`], publishing each combo's
    /// `on_complete` event with its `completion_data` and `comboId`.
    pub fn dispatch_completed(&mut self, events: &mut dyn AnimationEventSystem) -> Vec<String> {
        let completed = self.take_completed();
        for id in &completed {
            let Some(combo) = self.combo(id) else {
                continue;
            };
            if combo.on_complete.is_empty() {
                continue;
            }
            let mut payload = payload_object(&combo.completion_data);
            payload.insert("comboId".into(), json!(combo.id));
            events.dispatch_event(&combo.on_complete, &Value::Object(payload));
        }
        completed
    }

    pub fn reset(&mut self) {
        for state in self.progress.values_mut() {
            *state = ComboProgress::default();
        }
        self.history.clear();
        self.completed.clear();
    }

    #[must_use]
    pub fn config(&self) -> ComboSetConfig {
        ComboSetConfig {
            combos: self.combos.clone(),
        }
    }

    /// Replaces every combo.
    pub fn load_from_json(&mut self, value: Value) -> Result<()> {
        let config: ComboSetConfig = serde_json::from_value(value)?;
        *self = Self::new();
        for combo in config.combos {
            self.add_combo(combo);
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.config())?)
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Configs for common gameplay hooks. Times are normalized clip times.
pub struct TriggerTemplates;

impl TriggerTemplates {
    fn at_time(id: &str, name: &str, time: f32) -> TriggerConfig {
        TriggerConfig::new(
            id,
            TriggerKind::Time {
                time,
                is_frame_based: false,
            },
        )
        .with_name(name)
    }

    #[must_use]
    pub fn footstep(id: &str, time: f32, left_foot: bool) -> TriggerConfig {
        let foot = if left_foot { "left" } else { "right" };
        Self::at_time(id, "Footstep", time).with_event("footstep", json!({ "foot": foot }))
    }

    #[must_use]
    pub fn hit_frame(id: &str, time: f32, hit_data: Value) -> TriggerConfig {
        Self::at_time(id, "Hit Frame", time).with_event("attack_hit", hit_data)
    }

    #[must_use]
    pub fn projectile_spawn(id: &str, time: f32, projectile: &str) -> TriggerConfig {
        Self::at_time(id, "Spawn Projectile", time).with_event("spawn_projectile", json!({ "type": projectile }))
    }

    #[must_use]
    pub fn vfx_spawn(id: &str, time: f32, vfx: &str, bone: &str) -> TriggerConfig {
        Self::at_time(id, "Spawn VFX", time).with_event("spawn_vfx", json!({ "vfx": vfx, "bone": bone }))
    }

    #[must_use]
    pub fn sound(id: &str, time: f32, sound: &str) -> TriggerConfig {
        Self::at_time(id, "Play Sound", time).with_event("play_sound", json!({ "sound": sound }))
    }

    #[must_use]
    pub fn state_enter(id: &str, state: &str, event: &str) -> TriggerConfig {
        TriggerConfig::new(
            id,
            TriggerKind::StateEnter {
                target_state: state.to_string(),
            },
        )
        .with_name(format!("On Enter {state}"))
        .with_event(event, Value::Null)
    }

    #[must_use]
    pub fn property_threshold(id: &str, property: &str, threshold: f32, mode: PropertyCompareMode) -> TriggerConfig {
        TriggerConfig::new(
            id,
            TriggerKind::Property {
                property: property.to_string(),
                threshold,
                compare_mode: mode,
            },
        )
        .with_name("Property Threshold")
        .with_event(
            "property_trigger",
            json!({ "property": property, "threshold": threshold }),
        )
    }

    /// Each step may take an equal share of `window`.
    #[must_use]
    pub fn combo(id: &str, inputs: &[&str], window: f32) -> TriggerConfig {
        let max_delay = if inputs.is_empty() { window } else { window / inputs.len() as f32 };
        let combo_sequence = inputs.iter().map(|input| ComboInput::new(*input, max_delay)).collect();
        TriggerConfig::new(
            id,
            TriggerKind::Combo {
                combo_sequence,
                combo_window: window,
            },
        )
        .with_name("Combo")
        .with_event("combo_complete", json!({ "comboId": id }))
    }
}
