//! Shared in-memory doubles for orchestrator integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use hestia::config::{Config, DeviceConfig, DeviceRole};
use hestia::error::CommandError;
use hestia::orchestrator::io::{DeviceActuator, SensorReader, StatusPublisher};
use hestia::orchestrator::status::StatusSnapshot;
use hestia::orchestrator::types::{DeviceReading, HvacMode};

/// In-memory stand-in for the home automation host. Sensor reads and
/// actuator commands share one state, so a mode command is visible to the
/// re-read that follows it within the same pass.
#[derive(Default)]
pub struct MockWorld {
    inner: Mutex<WorldState>,
}

#[derive(Default)]
struct WorldState {
    numbers: HashMap<String, f64>,
    devices: HashMap<String, DeviceReading>,
    failing: HashSet<String>,
    log: Vec<String>,
}

impl MockWorld {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_number(&self, sensor_id: &str, value: f64) {
        self.inner
            .lock()
            .unwrap()
            .numbers
            .insert(sensor_id.to_string(), value);
    }

    pub fn clear_number(&self, sensor_id: &str) {
        self.inner.lock().unwrap().numbers.remove(sensor_id);
    }

    pub fn put_device(&self, entity: &str, reading: DeviceReading) {
        self.inner
            .lock()
            .unwrap()
            .devices
            .insert(entity.to_string(), reading);
    }

    /// Make every command for this entity fail.
    pub fn fail_entity(&self, entity: &str) {
        self.inner
            .lock()
            .unwrap()
            .failing
            .insert(entity.to_string());
    }

    pub fn command_log(&self) -> Vec<String> {
        self.inner.lock().unwrap().log.clone()
    }

    pub fn device(&self, entity: &str) -> DeviceReading {
        self.inner
            .lock()
            .unwrap()
            .devices
            .get(entity)
            .cloned()
            .unwrap()
    }
}

#[async_trait]
impl SensorReader for MockWorld {
    async fn read_numeric(&self, sensor_id: &str) -> Option<f64> {
        self.inner.lock().unwrap().numbers.get(sensor_id).copied()
    }

    async fn read_device(&self, entity: &str) -> Option<DeviceReading> {
        self.inner.lock().unwrap().devices.get(entity).cloned()
    }
}

#[async_trait]
impl DeviceActuator for MockWorld {
    async fn set_mode(&self, entity: &str, mode: HvacMode) -> Result<(), CommandError> {
        let mut world = self.inner.lock().unwrap();
        if world.failing.contains(entity) {
            return Err(CommandError::rejected("injected failure"));
        }
        world.log.push(format!("{entity} mode={mode:?}"));
        if let Some(device) = world.devices.get_mut(entity) {
            device.hvac_running = mode == HvacMode::Heat;
        }
        Ok(())
    }

    async fn set_temperature(&self, entity: &str, value: f64) -> Result<(), CommandError> {
        let mut world = self.inner.lock().unwrap();
        if world.failing.contains(entity) {
            return Err(CommandError::rejected("injected failure"));
        }
        world.log.push(format!("{entity} temp={value:.1}"));
        if let Some(device) = world.devices.get_mut(entity) {
            device.target_temperature = Some(value);
        }
        Ok(())
    }
}

/// Collects every snapshot handed to the publisher hook.
#[derive(Default)]
pub struct CapturingPublisher {
    snapshots: Mutex<Vec<StatusSnapshot>>,
}

impl CapturingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshots(&self) -> Vec<StatusSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusPublisher for CapturingPublisher {
    async fn publish(&self, snapshot: &StatusSnapshot) {
        self.snapshots.lock().unwrap().push(snapshot.clone());
    }
}

/// Climate entity payload with the fields hosts typically report.
pub fn reading(running: bool, current: f64) -> DeviceReading {
    DeviceReading {
        hvac_running: running,
        current_temperature: Some(current),
        ..DeviceReading::default()
    }
}

pub fn device(entity: &str, role: DeviceRole, allow_on_off: bool) -> DeviceConfig {
    DeviceConfig {
        id: String::new(),
        name: String::new(),
        entity: entity.to_string(),
        role: Some(role),
        lower_offset: None,
        upper_offset: None,
        allow_on_off_control: allow_on_off,
        power_sensor: None,
        water_sensor: None,
    }
}

/// Two pumps on one loop: a primary water pump with a loop water sensor
/// and one controllable air assist, both with power sensors.
pub fn two_pump_config() -> Config {
    let mut main = device("climate.hp_main", DeviceRole::Water, false);
    main.water_sensor = Some("sensor.loop_water".to_string());
    main.power_sensor = Some("sensor.hp_main_power".to_string());

    let mut attic = device("climate.hp_attic", DeviceRole::Air, true);
    attic.power_sensor = Some("sensor.hp_attic_power".to_string());

    let mut config = Config {
        target_temperature: 21.0,
        room_sensors: vec!["sensor.living_room".to_string()],
        devices: vec![main, attic],
        ..Config::default()
    };
    config.normalize();
    config
}
