//! Trigger Tests
//!
//! Tests for:
//! - Trigger sets loaded from JSON and fed by a running state machine
//! - Payloads delivered through the event bus
//! - Combo detection published to listeners
//! - Saving and reloading trigger sets

use serde_json::json;

use nova::animation::state_machine::DataDrivenStateMachine;
use nova::animation::trigger::{ComboDetector, TriggerSetConfig};
use nova::animation::{
    AnimationEventBus, AnimationTriggerSystem, EventQueue, PropertyCompareMode, TriggerContext, TriggerTemplates,
};

const STEP: f32 = 0.05;

const HERO: &str = r#"{
    "id": "hero",
    "name": "Hero",
    "defaultState": "idle",
    "parameters": [
        {"name": "speed", "type": "float", "defaultValue": 0.0}
    ],
    "states": [
        {"name": "idle", "clip": "idle",
         "transitions": [{"to": "run", "condition": "speed > 0.1", "duration": 0.0}]},
        {"name": "run", "clip": "run"}
    ]
}"#;

const HERO_TRIGGERS: &str = r#"{
    "triggers": [
        {"id": "run_start", "type": "state_enter", "targetState": "run", "event": "started_running", "priority": 1},
        {"id": "step", "type": "time", "time": 0.5, "event": "footstep", "eventData": {"foot": "left"}},
        {"id": "fast", "type": "property", "property": "speed", "threshold": 3.0, "event": "sprint"}
    ]
}"#;

fn recording_bus() -> (AnimationEventBus, EventQueue) {
    let queue = EventQueue::new();
    let sink = queue.clone();
    let mut bus = AnimationEventBus::new();
    bus.subscribe_all(move |name, data| sink.push(name, data.clone()));
    (bus, queue)
}

// ============================================================================
// State machine integration
// ============================================================================

#[test]
fn state_machine_context_drives_triggers() {
    let mut machine = DataDrivenStateMachine::new();
    machine.load_from_str(HERO).unwrap();
    machine.start();

    let (bus, queue) = recording_bus();
    let mut triggers = AnimationTriggerSystem::new().with_event_system(Box::new(bus));
    triggers.load_from_str(HERO_TRIGGERS).unwrap();
    assert_eq!(triggers.len(), 3);

    machine.set_float("speed", 2.0);
    triggers.set_property("speed", 2.0);

    let mut now = 0.0;
    for _ in 0..40 {
        machine.update(STEP);
        now += STEP;
        triggers.update(&TriggerContext::from_state_machine(&machine), now);
    }
    assert_eq!(machine.current_state(), Some("run"));

    let events = queue.drain();
    let started: Vec<_> = events.iter().filter(|e| e.name == "started_running").collect();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].data["triggerId"], "run_start");
    assert_eq!(started[0].data["currentState"], "run");

    // the run clip's 1 s fallback length is crossed at 0.5 s and 1.5 s
    let steps: Vec<_> = events.iter().filter(|e| e.name == "footstep").collect();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|e| e.data["foot"] == "left"));
    assert!(events.iter().all(|e| e.name != "sprint"));

    triggers.set_property("speed", 4.0);
    let fired = triggers.update(&TriggerContext::from_state_machine(&machine), now + STEP);
    assert!(fired.iter().any(|id| id == "fast"));
    assert_eq!(queue.drain().iter().filter(|e| e.name == "sprint").count(), 1);
}

#[test]
fn reset_all_forgets_properties_and_progress() {
    let mut triggers = AnimationTriggerSystem::new();
    triggers.add_trigger(TriggerTemplates::property_threshold(
        "low_health",
        "health",
        25.0,
        PropertyCompareMode::CrossBelow,
    ));
    triggers.add_trigger(TriggerTemplates::combo("uppercut", &["down", "up"], 0.4));

    let ctx = TriggerContext::default();
    triggers.set_property("health", 50.0);
    triggers.update(&ctx, 0.0);
    triggers.process_input("down", 0.1);
    assert_eq!(triggers.trigger("uppercut").map(|t| t.combo_progress()), Some(1));

    triggers.reset_all();
    assert_eq!(triggers.property("health"), None);
    assert_eq!(triggers.trigger("uppercut").map(|t| t.combo_progress()), Some(0));

    // without a previous sample the drop is not a crossing
    triggers.set_property("health", 10.0);
    assert!(triggers.update(&ctx, 1.0).is_empty());
}

// ============================================================================
// Combos
// ============================================================================

#[test]
fn combo_detector_publishes_through_bus() {
    let mut detector = ComboDetector::new();
    detector
        .load_from_json(json!({
            "combos": [{
                "id": "dash",
                "name": "Dash",
                "windowTime": 0.5,
                "onComplete": "dash",
                "completionData": {"distance": 4},
                "sequence": [
                    {"input": "right", "maxDelay": 0.25},
                    {"input": "right", "maxDelay": 0.25}
                ]
            }]
        }))
        .unwrap();

    let (mut bus, queue) = recording_bus();

    detector.process_input("right", 0.0);
    // too slow: the second tap opens a new attempt
    detector.process_input("right", 0.4);
    assert_eq!(detector.progress("dash"), 1);
    assert!(detector.dispatch_completed(&mut bus).is_empty());

    detector.process_input("right", 0.5);
    assert_eq!(detector.dispatch_completed(&mut bus), ["dash"]);

    let events = queue.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "dash");
    assert_eq!(events[0].data, json!({"distance": 4, "comboId": "dash"}));
}

#[test]
fn combo_trigger_reports_through_system() {
    let (bus, queue) = recording_bus();
    let mut triggers = AnimationTriggerSystem::new().with_event_system(Box::new(bus));
    triggers.add_trigger(TriggerTemplates::combo("uppercut", &["down", "up"], 0.4));

    triggers.process_input("down", 1.0);
    triggers.process_input("up", 1.15);
    assert_eq!(triggers.update(&TriggerContext::default(), 1.2), ["uppercut"]);

    let events = queue.drain();
    assert_eq!(events[0].name, "combo_complete");
    assert_eq!(events[0].data["comboId"], "uppercut");
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn trigger_sets_survive_a_file_round_trip() {
    let mut triggers = AnimationTriggerSystem::new();
    triggers.add_trigger(TriggerTemplates::footstep("left", 0.1, true));
    triggers.add_trigger(TriggerTemplates::vfx_spawn("dust", 0.1, "dust_puff", "foot_l").with_priority(2));
    triggers.add_trigger(TriggerTemplates::state_enter("land", "landing", "landed").with_cooldown(0.5));

    let path = std::env::temp_dir().join(format!("nova_triggers_{}.json", std::process::id()));
    triggers.save_to_file(&path).unwrap();

    let mut loaded = AnimationTriggerSystem::new();
    loaded.load_from_file(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.config(), triggers.config());
    let first = loaded.triggers().next().map(|t| t.id().to_string());
    assert_eq!(first.as_deref(), Some("dust"));

    let parsed: TriggerSetConfig = serde_json::from_str(&triggers.to_json().unwrap()).unwrap();
    assert_eq!(parsed.triggers.len(), 3);
}
