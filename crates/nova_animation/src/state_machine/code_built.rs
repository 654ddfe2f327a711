use rustc_hash::FxHashMap;

use super::parameters::{ParameterSet, ParameterValue};
use crate::controller::AnimationController;

pub type TransitionPredicate = Box<dyn Fn(&ParameterSet) -> bool + Send + Sync>;

struct CodeTransition {
    to: String,
    blend_time: f32,
    /// Normalized clip time that must be reached first.
    exit_time: Option<f32>,
    predicate: TransitionPredicate,
}

struct CodeState {
    clip: String,
    looping: bool,
    speed: f32,
    transitions: Vec<CodeTransition>,
}

/// State machine assembled in code.
///
/// Conditions are closures over the parameter set. Each state plays one
/// clip on the owned [`AnimationController`]; transitions cross-fade.
///
/// ```rust,ignore
/// let mut machine = AnimationStateMachine::new(controller);
/// machine.add_state("idle", "idle", true);
/// machine.add_state("run", "run", true);
/// machine.add_transition("idle", "run", 0.2, |p| p.numeric("speed").unwrap_or(0.0) > 0.1);
/// machine.set_initial_state("idle");
/// ```
pub struct AnimationStateMachine {
    controller: AnimationController,
    states: FxHashMap<String, CodeState>,
    parameters: ParameterSet,
    current: Option<String>,
    state_time: f32,
}

impl std::fmt::Debug for AnimationStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationStateMachine")
            .field("states", &self.states.len())
            .field("current", &self.current)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl AnimationStateMachine {
    #[must_use]
    pub fn new(controller: AnimationController) -> Self {
        Self {
            controller,
            states: FxHashMap::default(),
            parameters: ParameterSet::new(),
            current: None,
            state_time: 0.0,
        }
    }

    /// Adds a state or replaces the clip of an existing one.
    pub fn add_state(&mut self, name: impl Into<String>, clip: impl Into<String>, looping: bool) -> &mut Self {
        let clip = clip.into();
        self.states
            .entry(name.into())
            .and_modify(|s| {
                s.clip.clone_from(&clip);
                s.looping = looping;
            })
            .or_insert_with(|| CodeState {
                clip,
                looping,
                speed: 1.0,
                transitions: Vec::new(),
            });
        self
    }

    pub fn set_state_speed(&mut self, state: &str, speed: f32) {
        if let Some(s) = self.states.get_mut(state) {
            s.speed = speed;
        }
    }

    /// Transitions are checked in insertion order.
    pub fn add_transition(
        &mut self,
        from: &str,
        to: impl Into<String>,
        blend_time: f32,
        predicate: impl Fn(&ParameterSet) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.push_transition(from, to.into(), blend_time, None, Box::new(predicate));
        self
    }

    /// Like [`AnimationStateMachine::add_transition`], but only once the
    /// clip reached `exit_time` (normalized).
    pub fn add_exit_transition(
        &mut self,
        from: &str,
        to: impl Into<String>,
        blend_time: f32,
        exit_time: f32,
        predicate: impl Fn(&ParameterSet) -> bool + Send + Sync + 'static,
    ) -> &mut Self {
        self.push_transition(from, to.into(), blend_time, Some(exit_time), Box::new(predicate));
        self
    }

    fn push_transition(
        &mut self,
        from: &str,
        to: String,
        blend_time: f32,
        exit_time: Option<f32>,
        predicate: TransitionPredicate,
    ) {
        match self.states.get_mut(from) {
            Some(state) => state.transitions.push(CodeTransition {
                to,
                blend_time,
                exit_time,
                predicate,
            }),
            None => log::warn!("AnimationStateMachine: transition from unknown state '{from}'"),
        }
    }

    /// Enters `state` immediately, without blending.
    pub fn set_initial_state(&mut self, state: &str) {
        self.enter(state, 0.0);
    }

    /// Cross-fades to `state` regardless of conditions.
    pub fn force_state(&mut self, state: &str, blend_time: f32) {
        self.enter(state, blend_time);
    }

    fn enter(&mut self, name: &str, blend_time: f32) {
        let Some(state) = self.states.get(name) else {
            log::warn!("AnimationStateMachine: unknown state '{name}'");
            return;
        };
        self.controller.cross_fade(&state.clip, blend_time, state.looping);
        self.controller.set_animation_speed(&state.clip, state.speed);
        self.current = Some(name.to_string());
        self.state_time = 0.0;
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Parameters are declared on first assignment.
    pub fn set_float(&mut self, name: &str, value: f32) {
        self.assign(name, ParameterValue::Float(value));
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.assign(name, ParameterValue::Int(value));
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.assign(name, ParameterValue::Bool(value));
    }

    pub fn set_trigger(&mut self, name: &str) {
        self.assign(name, ParameterValue::Trigger(true));
    }

    fn assign(&mut self, name: &str, value: ParameterValue) {
        if let Err(e) = self.parameters.set_or_add(name, value) {
            log::warn!("AnimationStateMachine: {e}");
        }
    }

    #[must_use]
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    // ========================================================================
    // Runtime
    // ========================================================================

    /// Takes the first satisfied transition of the current state, resets
    /// triggers and advances the controller.
    pub fn update(&mut self, dt: f32) {
        self.state_time += dt;

        if let Some(current) = &self.current
            && let Some(state) = self.states.get(current)
        {
            let normalized = self.normalized_time();
            let next = state
                .transitions
                .iter()
                .filter(|t| t.to != *current)
                .filter(|t| t.exit_time.is_none_or(|exit| normalized >= exit))
                .find(|t| (t.predicate)(&self.parameters))
                .map(|t| (t.to.clone(), t.blend_time));

            if let Some((to, blend_time)) = next {
                log::debug!("AnimationStateMachine: {current} -> {to}");
                self.enter(&to, blend_time);
            }
        }

        self.parameters.reset_triggers();
        self.controller.update(dt);
    }

    #[must_use]
    pub fn current_state(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Playback position of the current state's clip.
    #[must_use]
    pub fn normalized_time(&self) -> f32 {
        self.current
            .as_ref()
            .and_then(|name| self.states.get(name))
            .and_then(|state| self.controller.instance(&state.clip))
            .map_or(0.0, |instance| instance.normalized_time())
    }

    /// Seconds since the current state was entered.
    #[must_use]
    pub fn state_time(&self) -> f32 {
        self.state_time
    }

    #[must_use]
    pub fn controller(&self) -> &AnimationController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut AnimationController {
        &mut self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend_tree::test_support::{hold, slide};

    fn machine() -> AnimationStateMachine {
        let mut controller = AnimationController::new();
        controller.insert_animation(hold("idle", 0.0, 1.0));
        controller.insert_animation(hold("run", 2.0, 1.0));
        controller.insert_animation(slide("attack", 1.0, 0.5));

        let mut m = AnimationStateMachine::new(controller);
        m.add_state("idle", "idle", true)
            .add_state("run", "run", true)
            .add_state("attack", "attack", false);
        m.add_transition("idle", "run", 0.2, |p| p.numeric("speed").unwrap_or(0.0) > 0.1)
            .add_transition("run", "idle", 0.2, |p| p.numeric("speed").unwrap_or(0.0) <= 0.1)
            .add_transition("idle", "attack", 0.0, |p| p.bool("attack").unwrap_or(false))
            .add_exit_transition("attack", "idle", 0.1, 0.9, |_| true);
        m.set_initial_state("idle");
        m
    }

    #[test]
    fn speed_drives_idle_run() {
        let mut m = machine();
        m.set_float("speed", 0.0);
        m.update(0.1);
        assert_eq!(m.current_state(), Some("idle"));

        m.set_float("speed", 1.0);
        m.update(0.1);
        assert_eq!(m.current_state(), Some("run"));
        assert!(m.controller().is_playing("run"));
        m.update(0.1);
        assert_eq!(m.current_state(), Some("run"));
    }

    #[test]
    fn trigger_fires_once() {
        let mut m = machine();
        m.set_trigger("attack");
        m.update(0.1);
        assert_eq!(m.current_state(), Some("attack"));
        assert_eq!(m.parameters().bool("attack").ok(), Some(false));

        m.update(0.2);
        m.update(0.3);
        assert_eq!(m.current_state(), Some("attack"));
        // clip finished during the previous update
        m.update(0.1);
        assert_eq!(m.current_state(), Some("idle"));
    }
}
