//! State Machine Tests
//!
//! Tests for:
//! - Data-driven machines loaded from JSON (conditions, priorities, exit times)
//! - Speed multiplier, time and cycle-offset state options
//! - Behaviors and events routed through the event systems
//! - History limits and file reload
//! - Code-built machines driving a controller
//! - Condition expressions

use glam::{Quat, Vec3};
use serde_json::Value;

use nova::animation::state_machine::{
    AnimationParameter, AnimationState, AnimationStateMachine, ConditionExpressionParser, DataDrivenStateMachine,
    MAX_HISTORY, ParameterSet, StateTransition,
};
use nova::animation::{
    Animation, AnimationChannel, AnimationController, AnimationEventBus, EventQueue, Keyframe,
};

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn hold(name: &str, x: f32) -> Animation {
    Animation::new(
        name,
        vec![AnimationChannel::new(
            "root",
            vec![
                Keyframe::new(0.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
                Keyframe::new(1.0, Vec3::X * x, Quat::IDENTITY, Vec3::ONE),
            ],
        )],
    )
}

const LOCOMOTION: &str = r#"{
    "id": "grunt",
    "name": "Grunt",
    "defaultState": "idle",
    "parameters": [
        {"name": "speed", "type": "float", "defaultValue": 0.0},
        {"name": "health", "type": "float", "defaultValue": 100.0},
        {"name": "damaged", "type": "trigger"},
        {"name": "animSpeed", "type": "float", "defaultValue": 1.0},
        {"name": "phase", "type": "float"}
    ],
    "states": [
        {"name": "idle", "clip": "idle",
         "transitions": [{"to": "run", "condition": "speed > 0.1 && health > 0", "duration": 0.2}]},
        {"name": "run", "clip": "run", "speedMultiplierParameter": "animSpeed", "timeParameter": "phase",
         "transitions": [{"to": "idle", "conditions": [{"parameter": "speed", "mode": "less", "threshold": 0.1}]}]},
        {"name": "hit", "clip": "hit", "loop": false,
         "transitions": [{"to": "idle", "hasExitTime": true, "exitTime": 0.9, "duration": 0.1}]},
        {"name": "die", "clip": "die", "loop": false}
    ],
    "anyStateTransitions": [
        {"to": "hit", "condition": "damaged", "priority": 1, "duration": 0.0},
        {"to": "die", "condition": "health <= 0", "priority": 10, "duration": 0.0}
    ]
}"#;

fn machine() -> DataDrivenStateMachine {
    let mut m = DataDrivenStateMachine::new();
    m.load_from_str(LOCOMOTION).unwrap();
    m.start();
    m
}

fn run_for(m: &mut DataDrivenStateMachine, seconds: f32) {
    let steps = (seconds / 0.05).round() as usize;
    for _ in 0..steps {
        m.update(0.05);
    }
}

// ============================================================================
// Data-driven transitions
// ============================================================================

#[test]
fn idle_to_run_fires_exactly_once() {
    let mut m = machine();
    assert_eq!(m.current_state(), Some("idle"));

    m.set_float("speed", 1.0);
    run_for(&mut m, 1.0);
    assert_eq!(m.current_state(), Some("run"));
    assert_eq!(m.previous_state(), Some("idle"));

    let history: Vec<_> = m.history().collect();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].trigger, "speed > 0.1 && health > 0");
    assert_eq!(history[0].parameters["speed"], 1.0);
}

#[test]
fn structured_conditions_return_to_idle() {
    let mut m = machine();
    m.set_float("speed", 1.0);
    run_for(&mut m, 0.5);
    m.set_float("speed", 0.0);
    run_for(&mut m, 0.5);
    assert_eq!(m.current_state(), Some("idle"));
    assert_eq!(m.history().last().unwrap().trigger, "speed < 0.1");
}

#[test]
fn higher_priority_any_state_wins() {
    let mut m = machine();
    m.set_trigger("damaged");
    m.set_float("health", 0.0);
    m.update(0.05);
    assert_eq!(m.current_state(), Some("die"));

    // No self transition, and the trigger was consumed
    m.update(0.05);
    assert_eq!(m.current_state(), Some("die"));
    assert_eq!(m.history().count(), 1);
}

#[test]
fn exit_time_holds_until_reached() {
    let mut m = machine();
    m.set_trigger("damaged");
    m.update(0.05);
    assert_eq!(m.current_state(), Some("hit"));

    run_for(&mut m, 0.8);
    assert_eq!(m.current_state(), Some("hit"));
    run_for(&mut m, 0.15);
    assert_eq!(m.transition_target(), Some("idle"));
}

#[test]
fn transition_progress_advances() {
    let mut m = machine();
    m.set_float("speed", 1.0);
    m.update(0.05);
    assert!(m.is_transitioning());
    assert!(approx(m.transition_progress(), 0.0));
    m.update(0.1);
    assert!(approx(m.transition_progress(), 0.5));
    assert_eq!(m.current_state(), Some("idle"));
}

// ============================================================================
// State options
// ============================================================================

#[test]
fn speed_multiplier_and_time_parameter() {
    let mut m = machine();
    m.force_state("run", 0.0);
    m.set_float("animSpeed", 2.0);
    m.update(0.2);
    assert!(approx(m.state_time(), 0.4));
    assert!(approx(m.normalized_time(), 0.4));
    assert!(approx(m.get_float("phase"), 0.4));
}

#[test]
fn cycle_offset_applies_on_entry() {
    let mut m = DataDrivenStateMachine::new();
    m.add_state(AnimationState::new("walk", "walk").with_cycle_offset(0.25));
    m.set_default_state("walk");
    m.start();
    assert!(approx(m.normalized_time(), 0.25));
}

#[test]
fn unknown_parameters_are_ignored() {
    let mut m = machine();
    m.set_float("nonsense", 3.0);
    m.set_bool("speed", true);
    assert!(approx(m.get_float("speed"), 0.0));
    assert!(m.try_get_float("nonsense").is_err());
    assert!(!m.parameters().contains("nonsense"));
}

// ============================================================================
// Events and behaviors
// ============================================================================

#[test]
fn behaviors_dispatch_through_bus() {
    let seen = EventQueue::new();
    let mut bus = AnimationEventBus::new();
    let sink = seen.clone();
    bus.subscribe("behavior_action", move |name, data| sink.push(name, data.clone()));

    let json = r#"{
        "name": "emotes",
        "defaultState": "wave",
        "states": [
            {"name": "wave", "clip": "wave",
             "behaviors": [{"type": "audio", "onEnter": [{"sound": "hello"}], "onExit": [{"sound": "bye"}]}]},
            {"name": "rest", "clip": "rest"}
        ]
    }"#;
    let mut m = DataDrivenStateMachine::new().with_event_system(Box::new(bus));
    m.load_from_str(json).unwrap();
    m.start();
    m.force_state("rest", 0.0);

    let sounds: Vec<Value> = seen.drain().into_iter().map(|e| e.data["sound"].clone()).collect();
    assert_eq!(sounds, ["hello", "bye"]);
}

#[test]
fn state_events_reach_queue_with_data() {
    let queue = EventQueue::new();
    let json = r#"{
        "name": "walker",
        "defaultState": "walk",
        "states": [{"name": "walk", "clip": "walk",
                    "events": [{"time": 0.3, "name": "footstep", "data": {"foot": "left"}},
                               {"time": 0.8, "name": "footstep", "data": {"foot": "right"}}]}]
    }"#;
    let mut m = DataDrivenStateMachine::new().with_event_system(Box::new(queue.clone()));
    m.load_from_str(json).unwrap();
    m.start();

    m.update(0.5);
    m.update(0.4);
    let feet: Vec<Value> = queue.drain().into_iter().map(|e| e.data["foot"].clone()).collect();
    assert_eq!(feet, ["left", "right"]);
}

// ============================================================================
// History and files
// ============================================================================

#[test]
fn history_is_bounded() {
    let mut m = machine();
    for i in 0..(MAX_HISTORY + 20) {
        m.force_state(if i % 2 == 0 { "run" } else { "idle" }, 0.0);
    }
    assert_eq!(m.history().count(), MAX_HISTORY);
    assert!(m.history().all(|h| h.trigger == "force_state"));

    m.clear_history();
    m.set_record_history(false);
    m.force_state("die", 0.0);
    assert_eq!(m.history().count(), 0);
}

#[test]
fn save_load_and_reload() {
    let path = std::env::temp_dir().join(format!("nova_state_machine_{}.json", std::process::id()));
    machine().save_to_file(&path).unwrap();

    let mut loaded = DataDrivenStateMachine::new();
    loaded.load_from_file(&path).unwrap();
    assert_eq!(loaded.name(), "Grunt");
    assert_eq!(loaded.states().len(), 4);
    assert_eq!(loaded.any_state_transitions()[0].to, "die");

    let mut edited: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    edited["name"] = Value::from("Grunt v2");
    std::fs::write(&path, edited.to_string()).unwrap();
    loaded.reload().unwrap();
    assert_eq!(loaded.name(), "Grunt v2");

    std::fs::remove_file(&path).ok();
    assert!(DataDrivenStateMachine::new().reload().is_err());
}

#[test]
fn code_added_transitions_sort_by_priority() {
    let mut m = DataDrivenStateMachine::new();
    m.add_parameter(AnimationParameter::bool("go", false));
    m.add_state(AnimationState::new("a", "a"));
    m.add_state(AnimationState::new("b", "b"));
    m.add_state(AnimationState::new("c", "c"));
    m.add_any_state_transition(StateTransition::new("b").with_condition("go").with_duration(0.0));
    m.add_any_state_transition(
        StateTransition::new("c")
            .with_condition("go")
            .with_priority(5)
            .with_duration(0.0),
    );
    m.set_default_state("a");
    m.start();

    m.set_bool("go", true);
    m.update(0.016);
    assert_eq!(m.current_state(), Some("c"));
}

// ============================================================================
// Code-built machine
// ============================================================================

#[test]
fn code_built_machine_cross_fades() {
    let mut controller = AnimationController::new();
    controller.add_animation(hold("idle", 0.0));
    controller.add_animation(hold("run", 3.0));

    let mut m = AnimationStateMachine::new(controller);
    m.add_state("idle", "idle", true).add_state("run", "run", true);
    m.add_transition("idle", "run", 0.5, |p| p.numeric("speed").unwrap_or(0.0) > 0.1);
    m.set_initial_state("idle");

    m.set_float("speed", 1.0);
    m.update(0.1);
    assert_eq!(m.current_state(), Some("run"));
    assert!(approx(m.controller().instance("run").unwrap().weight(), 0.2));
    assert!(approx(m.controller().instance("idle").unwrap().weight(), 0.8));

    for _ in 0..10 {
        m.update(0.1);
    }
    assert_eq!(m.controller().active_instances().len(), 1);
    assert!(approx(m.state_time(), 1.0));
}

// ============================================================================
// Expressions
// ============================================================================

fn params() -> ParameterSet {
    [
        AnimationParameter::float("speed", 2.5),
        AnimationParameter::int("combo", 3),
        AnimationParameter::bool("grounded", false),
        AnimationParameter::trigger("attack"),
    ]
    .into_iter()
    .collect()
}

#[test]
fn expressions_over_parameters() {
    let params = params();
    let mut parser = ConditionExpressionParser::new();
    assert!(parser.evaluate("!grounded || speed >= 2", &params));
    assert!(parser.evaluate("combo == 3 && speed / 2 > 1", &params));
    assert!(parser.evaluate("combo != 2.5", &params));
    assert!(!parser.evaluate("attack", &params));
    assert!(!parser.evaluate("speed > 1 && grounded", &params));
    assert!(parser.evaluate("-(speed - 3) * 2 == 1", &params));
}

#[test]
fn malformed_expressions_are_false() {
    let params = params();
    let mut parser = ConditionExpressionParser::new();
    assert!(!parser.evaluate("speed >> 2", &params));
    assert!(!parser.evaluate("speed @ 2", &params));
    assert!(ConditionExpressionParser::parse("speed > 1)").is_err());
    assert!(ConditionExpressionParser::parse("(speed > 1) && !grounded").is_ok());
}
