//! End-to-end pass behavior against in-memory sensor and actuator doubles.

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use hestia::assist::AssistTimerState;
use hestia::config::DeviceRole;
use hestia::orchestrator::Orchestrator;
use hestia::orchestrator::status::StatusSnapshot;
use hestia::orchestrator::types::{CommandOutcome, HvacMode};
use hestia::persistence::{FileTimerStore, TimerPersistence};
use hestia::resolver::DeviceMode;

use common::MockWorld;

fn latest(orch: &Orchestrator) -> Arc<StatusSnapshot> {
    orch.subscribe_snapshot().borrow().clone()
}

/// Loop water above the hot threshold while the room is below target: the
/// assist pump is switched on as soon as the condition has held long
/// enough, and the same pass already gives it a setpoint.
#[tokio::test]
async fn hot_loop_water_turns_the_assist_on() {
    let world = MockWorld::new();
    world.set_number("sensor.living_room", 19.0);
    world.set_number("sensor.loop_water", 45.0);
    world.put_device("climate.hp_main", common::reading(true, 35.0));
    world.put_device("climate.hp_attic", common::reading(false, 19.0));

    let mut config = common::two_pump_config();
    config.assist.timer_threshold_seconds = 0.001;
    config.assist.min_off_minutes = 0.0;

    let mut orch = Orchestrator::new(config, world.clone(), world.clone()).unwrap();

    // First pass: condition starts accumulating, water pump tracks its band
    orch.run_single_pass().await;
    assert_eq!(world.command_log(), vec!["climate.hp_main temp=34.7"]);

    tokio::time::sleep(Duration::from_millis(25)).await;

    // Second pass: threshold crossed, assist switches on and gets a target
    orch.run_single_pass().await;
    assert_eq!(
        world.command_log(),
        vec![
            "climate.hp_main temp=34.7",
            "climate.hp_attic mode=Heat",
            "climate.hp_attic temp=21.0",
        ]
    );
    assert!(world.device("climate.hp_attic").hvac_running);

    let snap = latest(&orch);
    assert_eq!(snap.room.temperature, Some(19.0));
    assert_eq!(snap.room.delta, Some(2.0));

    let attic = &snap.devices[1];
    assert!(attic.running);
    assert_eq!(attic.mode, Some(DeviceMode::Setpoint));
    assert_eq!(attic.mode_command, Some(CommandOutcome::Sent));
    assert_eq!(attic.setpoint_command, Some(CommandOutcome::Sent));

    let assist = attic.assist.as_ref().unwrap();
    assert_eq!(assist.active_condition, "water_hot");
    assert!(assist.on_timer_seconds > 0.0);
}

/// A restored off-stamp inside the min_off window blocks the switch; the
/// intent and the block reason are still visible in the snapshot.
#[tokio::test]
async fn min_off_dwell_blocks_the_switch_but_records_intent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timers.json");
    let store = FileTimerStore::new(path.to_str().unwrap());

    let mut timers = HashMap::new();
    timers.insert(
        "hp_attic".to_string(),
        AssistTimerState {
            on_timer_seconds: 400.0,
            active_condition: "water_hot".to_string(),
            last_off: Some(Utc::now() - chrono::Duration::minutes(5)),
            ..Default::default()
        },
    );
    store.save(&timers).unwrap();

    let world = MockWorld::new();
    world.set_number("sensor.living_room", 19.0);
    world.set_number("sensor.loop_water", 45.0);
    world.put_device("climate.hp_main", common::reading(true, 35.0));
    world.put_device("climate.hp_attic", common::reading(false, 19.0));

    let config = common::two_pump_config();
    let mut orch = Orchestrator::new(config, world.clone(), world.clone())
        .unwrap()
        .with_timer_store(Box::new(FileTimerStore::new(path.to_str().unwrap())));

    orch.run_single_pass().await;

    // Only the water pump was commanded; the assist stayed off
    assert_eq!(world.command_log(), vec!["climate.hp_main temp=34.7"]);
    assert!(!world.device("climate.hp_attic").hvac_running);

    let snap = latest(&orch);
    let attic = &snap.devices[1];
    assert_eq!(attic.mode_command, None);

    let assist = attic.assist.as_ref().unwrap();
    assert_eq!(assist.target_hvac_mode, Some(HvacMode::Heat));
    assert_eq!(assist.target_reason, "water_hot");
    assert!(assist.block_reason.starts_with("min_off"));
}

/// Re-running a pass against unchanged readings issues no new commands.
#[tokio::test]
async fn repeated_pass_sends_nothing_new() {
    let world = MockWorld::new();
    world.set_number("sensor.living_room", 19.0);
    world.set_number("sensor.loop_water", 35.0);
    world.put_device("climate.hp_main", common::reading(true, 35.0));
    world.put_device("climate.hp_attic", common::reading(true, 19.0));

    let config = common::two_pump_config();
    let mut orch = Orchestrator::new(config, world.clone(), world.clone()).unwrap();

    orch.run_single_pass().await;
    assert_eq!(
        world.command_log(),
        vec!["climate.hp_main temp=34.7", "climate.hp_attic temp=21.0"]
    );

    orch.run_single_pass().await;
    assert_eq!(world.command_log().len(), 2);

    let snap = latest(&orch);
    assert_eq!(
        snap.devices[0].setpoint_command,
        Some(CommandOutcome::Unchanged)
    );
    assert_eq!(
        snap.devices[1].setpoint_command,
        Some(CommandOutcome::Unchanged)
    );
}

/// One device rejecting its command does not stop the rest of the pass.
#[tokio::test]
async fn failing_device_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("timers.json");
    let store = FileTimerStore::new(path.to_str().unwrap());

    let mut timers = HashMap::new();
    for id in ["hp_attic1", "hp_attic2"] {
        timers.insert(
            id.to_string(),
            AssistTimerState {
                on_timer_seconds: 400.0,
                active_condition: "water_hot".to_string(),
                ..Default::default()
            },
        );
    }
    store.save(&timers).unwrap();

    let mut main = common::device("climate.hp_main", DeviceRole::Water, false);
    main.water_sensor = Some("sensor.loop_water".to_string());
    let mut config = common::two_pump_config();
    config.devices = vec![
        main,
        common::device("climate.hp_attic1", DeviceRole::Air, true),
        common::device("climate.hp_attic2", DeviceRole::Air, true),
    ];
    config.normalize();

    let world = MockWorld::new();
    world.set_number("sensor.living_room", 19.0);
    world.set_number("sensor.loop_water", 45.0);
    world.put_device("climate.hp_main", common::reading(true, 35.0));
    world.put_device("climate.hp_attic1", common::reading(false, 19.0));
    world.put_device("climate.hp_attic2", common::reading(false, 19.0));
    world.fail_entity("climate.hp_attic1");

    let mut orch = Orchestrator::new(config, world.clone(), world.clone())
        .unwrap()
        .with_timer_store(Box::new(FileTimerStore::new(path.to_str().unwrap())));

    orch.run_single_pass().await;

    assert_eq!(
        world.command_log(),
        vec![
            "climate.hp_attic2 mode=Heat",
            "climate.hp_main temp=34.7",
            "climate.hp_attic2 temp=21.0",
        ]
    );

    let snap = latest(&orch);
    match &snap.devices[1].mode_command {
        Some(CommandOutcome::Failed(message)) => assert!(message.contains("injected")),
        other => panic!("expected a failed outcome, got {other:?}"),
    }
    assert_eq!(snap.devices[2].mode_command, Some(CommandOutcome::Sent));
    assert!(!world.device("climate.hp_attic1").hvac_running);
    assert!(world.device("climate.hp_attic2").hvac_running);
}

/// Each pass hands the publisher a fresh snapshot and emits one JSON
/// status message on the broadcast stream.
#[tokio::test]
async fn every_pass_publishes_a_snapshot() {
    let world = MockWorld::new();
    world.set_number("sensor.living_room", 19.0);
    world.set_number("sensor.loop_water", 35.0);
    world.put_device("climate.hp_main", common::reading(true, 35.0));
    world.put_device("climate.hp_attic", common::reading(false, 19.0));

    let publisher = common::CapturingPublisher::new();
    let mut orch = Orchestrator::new(common::two_pump_config(), world.clone(), world.clone())
        .unwrap()
        .with_publisher(publisher.clone());
    let mut stream = orch.subscribe_status_stream();

    orch.run_single_pass().await;
    orch.run_single_pass().await;

    let published = publisher.snapshots();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].passes_total, 1);
    assert_eq!(published[1].passes_total, 2);

    let message = stream.try_recv().unwrap();
    let json: serde_json::Value = serde_json::from_str(&message).unwrap();
    assert_eq!(json["devices"].as_array().unwrap().len(), 2);
    assert_eq!(json["room"]["temperature"], 19.0);
}

/// Without a room reading no assist decisions are made, but the water pump
/// still tracks its band around the loop temperature.
#[tokio::test]
async fn missing_room_reading_degrades_gracefully() {
    let world = MockWorld::new();
    world.set_number("sensor.loop_water", 45.0);
    world.put_device("climate.hp_main", common::reading(true, 35.0));
    world.put_device("climate.hp_attic", common::reading(false, 19.0));

    let config = common::two_pump_config();
    let mut orch = Orchestrator::new(config, world.clone(), world.clone()).unwrap();

    orch.run_single_pass().await;

    assert_eq!(world.command_log(), vec!["climate.hp_main temp=34.7"]);
    assert!(!world.device("climate.hp_attic").hvac_running);

    let snap = latest(&orch);
    assert_eq!(snap.room.temperature, None);
    assert_eq!(snap.room.delta, None);
    assert_eq!(snap.devices[1].mode, Some(DeviceMode::Off));
}
