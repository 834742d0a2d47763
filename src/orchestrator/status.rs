//! Status snapshot assembly and publication.
//!
//! One snapshot is built per pass and fans out three ways: the optional
//! StatusPublisher collaborator, a watch channel carrying the typed value,
//! and a broadcast channel streaming the JSON rendering.

use super::types::{CommandOutcome, HvacMode};
use crate::config::DeviceRole;
use crate::power::PowerDiagnostics;
use crate::resolver::{DeviceMode, SystemPreset};
use crate::util;
use serde::Serialize;
use std::sync::Arc;

/// Full controller state published once per pass
#[derive(Debug, Clone, Serialize, Default)]
pub struct StatusSnapshot {
    pub timestamp: String,
    pub preset: SystemPreset,
    pub target_temperature: f64,
    pub passes_total: u64,
    pub passes_deferred: u64,
    pub last_pass_duration_ms: u64,
    pub room: RoomStatus,
    pub water: WaterStatus,
    pub power: PowerDiagnostics,
    pub thresholds: ThresholdStatus,
    pub devices: Vec<DeviceStatus>,
}

/// Averaged room measurements and trend
#[derive(Debug, Clone, Serialize, Default)]
pub struct RoomStatus {
    pub temperature: Option<f64>,
    pub sensor_values: Vec<Option<f64>>,
    pub target: f64,
    /// Target minus room, °C
    pub delta: Option<f64>,
    pub derivative_c_per_hour: Option<f64>,
    pub eta_hours: Option<f64>,
    pub eta_minutes: Option<f64>,
}

/// Loop water state of the primary device
#[derive(Debug, Clone, Serialize, Default)]
pub struct WaterStatus {
    pub temperature: Option<f64>,
    pub derivative_c_per_hour: Option<f64>,
}

/// Active assist thresholds, for dashboards
#[derive(Debug, Clone, Serialize, Default)]
pub struct ThresholdStatus {
    pub assist_timer_seconds: f64,
    pub on_eta_minutes: f64,
    pub off_eta_minutes: f64,
    pub min_on_minutes: f64,
    pub min_off_minutes: f64,
    pub water_threshold_c: f64,
    pub stall_delta_c: f64,
}

/// One device's state as of the last pass
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub id: String,
    pub name: String,
    pub entity: String,
    pub role: DeviceRole,
    pub running: bool,
    /// Mode resolved in the last pass, absent before the first one
    pub mode: Option<DeviceMode>,
    pub current_temperature: Option<f64>,
    /// Setpoint the device itself reports
    pub reported_target: Option<f64>,
    /// Setpoint the orchestrator decided on this pass
    pub commanded_target: Option<f64>,
    pub water_temperature: Option<f64>,
    pub power_watts: Option<f64>,
    pub budget_watts: f64,
    /// Assist timer details, Air devices only
    pub assist: Option<AssistStatus>,
    pub mode_command: Option<CommandOutcome>,
    pub setpoint_command: Option<CommandOutcome>,
}

/// Assist timer block of one Air device
#[derive(Debug, Clone, Serialize, Default)]
pub struct AssistStatus {
    pub on_timer_seconds: f64,
    pub off_timer_seconds: f64,
    /// `"MM:SS/MM:SS"` progress toward the action threshold
    pub on_timer: String,
    pub off_timer: String,
    pub active_condition: String,
    pub block_reason: String,
    pub target_hvac_mode: Option<HvacMode>,
    pub target_reason: String,
    pub allow_on_off_control: bool,
}

impl super::Orchestrator {
    /// Watch channel carrying the latest typed snapshot.
    pub fn subscribe_snapshot(&self) -> tokio::sync::watch::Receiver<Arc<StatusSnapshot>> {
        self.snapshot_rx.clone()
    }

    /// Broadcast channel streaming the JSON rendering of each snapshot.
    pub fn subscribe_status_stream(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.status_tx.subscribe()
    }

    pub(super) fn build_snapshot(&self) -> StatusSnapshot {
        let room = RoomStatus {
            temperature: self.room.temperature,
            sensor_values: self.room.sensor_values.clone(),
            target: self.target_temperature,
            delta: self
                .room
                .temperature
                .map(|room| util::round_to_tenth(self.target_temperature - room)),
            derivative_c_per_hour: self.room.derivative_c_per_hour.map(util::round_to_tenth),
            eta_hours: self.room.eta_hours.map(|h| (h * 100.0).round() / 100.0),
            eta_minutes: self.room.eta_hours.map(|h| (h * 60.0).round()),
        };

        let water = WaterStatus {
            temperature: self.primary_water_temperature(),
            derivative_c_per_hour: self.water_derivative.map(util::round_to_tenth),
        };

        let thresholds = ThresholdStatus {
            assist_timer_seconds: self.config.assist.timer_threshold_seconds,
            on_eta_minutes: self.config.assist.on_eta_minutes,
            off_eta_minutes: self.config.assist.off_eta_minutes,
            min_on_minutes: self.config.assist.min_on_minutes,
            min_off_minutes: self.config.assist.min_off_minutes,
            water_threshold_c: self.config.assist.water_threshold_c,
            stall_delta_c: self.config.assist.stall_delta_c,
        };

        let devices = self
            .config
            .devices
            .iter()
            .enumerate()
            .map(|(index, device)| self.build_device_status(index, device))
            .collect();

        StatusSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            preset: self.preset,
            target_temperature: self.target_temperature,
            passes_total: self.passes_total,
            passes_deferred: self.passes_deferred,
            last_pass_duration_ms: self.last_pass_duration_ms,
            room,
            water,
            power: self.power.diagnostics(),
            thresholds,
            devices,
        }
    }

    fn build_device_status(
        &self,
        index: usize,
        device: &crate::config::DeviceConfig,
    ) -> DeviceStatus {
        let role = self.config.device_role(index);
        let reading = self.readings.get(&device.id);
        let decision = self.decisions.get(&device.id);

        let assist = (role == DeviceRole::Air).then(|| {
            let threshold = self.config.assist.timer_threshold_seconds;
            match self.assist.timer(&device.id) {
                Some(timer) => AssistStatus {
                    on_timer_seconds: timer.on_timer_seconds,
                    off_timer_seconds: timer.off_timer_seconds,
                    on_timer: util::format_timer(timer.on_timer_seconds, threshold),
                    off_timer: util::format_timer(timer.off_timer_seconds, threshold),
                    active_condition: timer.active_condition.clone(),
                    block_reason: timer.block_reason.clone(),
                    target_hvac_mode: timer.target_hvac_mode,
                    target_reason: timer.target_reason.clone(),
                    allow_on_off_control: device.allow_on_off_control,
                },
                None => AssistStatus {
                    on_timer: util::format_timer(0.0, threshold),
                    off_timer: util::format_timer(0.0, threshold),
                    active_condition: "none".to_string(),
                    allow_on_off_control: device.allow_on_off_control,
                    ..AssistStatus::default()
                },
            }
        });

        DeviceStatus {
            id: device.id.clone(),
            name: device.name.clone(),
            entity: device.entity.clone(),
            role,
            running: reading.map(|r| r.hvac_running).unwrap_or(false),
            mode: decision.and_then(|d| d.mode),
            current_temperature: reading.and_then(|r| r.current_temperature),
            reported_target: reading.and_then(|r| r.target_temperature),
            commanded_target: decision.and_then(|d| d.commanded_target),
            water_temperature: reading.and_then(|r| r.water_temperature),
            power_watts: reading.and_then(|r| r.power_watts),
            budget_watts: self.power.budget(&device.id),
            assist,
            mode_command: decision.and_then(|d| d.mode_outcome.clone()),
            setpoint_command: decision.and_then(|d| d.setpoint_outcome.clone()),
        }
    }

    pub(super) async fn publish_status(&mut self) {
        let snapshot = self.build_snapshot();

        if let Some(publisher) = &self.publisher {
            publisher.publish(&snapshot).await;
        }
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                let _ = self.status_tx.send(json);
            }
            Err(e) => self
                .logger
                .warn(&format!("Could not serialize status snapshot: {e}")),
        }
        self.snapshot_tx.send(Arc::new(snapshot)).ok();
    }
}
