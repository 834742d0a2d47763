//! Core orchestration logic for Hestia
//!
//! This module contains the pass loop that coordinates the configured heat
//! pumps: it samples sensors, advances the trend and assist timer state,
//! resolves a mode and target per device, and issues the resulting
//! commands through the host-provided actuator.

pub mod io;
pub mod status;
pub mod types;

mod gate;

use crate::assist::AssistController;
use crate::conditions::ConditionInputs;
use crate::config::{Config, DeviceConfig, DeviceRole};
use crate::error::Result;
use crate::logging::{StructuredLogger, get_logger};
use crate::persistence::TimerPersistence;
use crate::power::PowerSteering;
use crate::resolver::{self, DeviceMode, SystemPreset};
use crate::setpoint;
use crate::trend::TrendTracker;
use chrono::{DateTime, Utc};
use gate::CommandGate;
use io::{DeviceActuator, SensorReader, StatusPublisher};
use status::StatusSnapshot;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Duration, interval};
use types::{
    CommandOutcome, DeviceDecision, DeviceReading, HvacMode, OrchestratorCommand,
    OrchestratorState, RoomState,
};

/// Coordinates all heat pumps on one hydronic loop.
pub struct Orchestrator {
    /// Configuration
    config: Config,

    /// Current orchestrator state
    state: watch::Sender<OrchestratorState>,

    /// Logger with context
    logger: StructuredLogger,

    /// Sensor access provided by the host
    sensors: Arc<dyn SensorReader>,

    /// Command path to the heat pumps
    actuator: Arc<dyn DeviceActuator>,

    /// Optional per-pass status sink
    publisher: Option<Arc<dyn StatusPublisher>>,

    /// Assist timer store, loaded at startup and written after each pass
    timer_store: Option<Box<dyn TimerPersistence>>,

    /// Assist timer machine
    assist: AssistController,

    /// Budget allocation and power-tracking setpoints
    power: PowerSteering,

    /// Room temperature trend
    room_trend: TrendTracker,

    /// Loop water trend per water-capable device
    water_trends: HashMap<String, TrendTracker>,

    /// Command pacing and idempotence
    gate: CommandGate,

    /// Room target temperature
    target_temperature: f64,

    /// Active system preset
    preset: SystemPreset,

    /// Room state of the last pass
    room: RoomState,

    /// Device readings of the last pass, keyed by device id
    readings: HashMap<String, DeviceReading>,

    /// Water derivative of the primary device, for the snapshot
    water_derivative: Option<f64>,

    /// Per-device decisions of the last pass
    decisions: HashMap<String, DeviceDecision>,

    /// Pass requested while another was pending
    needs_pass: bool,
    passes_total: u64,
    passes_deferred: u64,
    last_pass_duration_ms: u64,

    /// Shutdown signal
    shutdown_tx: mpsc::UnboundedSender<()>,

    /// Shutdown receiver
    shutdown_rx: mpsc::UnboundedReceiver<()>,

    /// Command receiver for external control
    commands_rx: mpsc::UnboundedReceiver<OrchestratorCommand>,

    /// Command sender handed out to hosts
    commands_tx: mpsc::UnboundedSender<OrchestratorCommand>,

    /// Broadcast channel streaming status JSON
    status_tx: broadcast::Sender<String>,

    /// Latest typed snapshot
    snapshot_tx: watch::Sender<Arc<StatusSnapshot>>,
    snapshot_rx: watch::Receiver<Arc<StatusSnapshot>>,
}

impl Orchestrator {
    /// Create a new orchestrator around host-provided collaborators.
    ///
    /// Device ids are filled in and the configuration is validated; an
    /// invalid configuration is rejected here rather than mid-pass.
    pub fn new(
        config: Config,
        sensors: Arc<dyn SensorReader>,
        actuator: Arc<dyn DeviceActuator>,
    ) -> Result<Self> {
        let mut config = config;
        config.normalize();
        config.validate()?;

        let logger = get_logger("orchestrator");
        logger.info(&format!(
            "Initializing coordinator for {} device(s)",
            config.devices.len()
        ));

        let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(OrchestratorState::Initializing);
        let (status_tx, _status_rx) = broadcast::channel::<String>(100);
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(StatusSnapshot::default()));

        let assist = AssistController::new(config.assist.clone());
        let power = PowerSteering::new(config.power.clone());
        let room_trend = TrendTracker::new(config.trend.window_seconds);
        let gate = CommandGate::new(&config.control);
        let target_temperature = config.target_temperature;

        Ok(Self {
            config,
            state: state_tx,
            logger,
            sensors,
            actuator,
            publisher: None,
            timer_store: None,
            assist,
            power,
            room_trend,
            water_trends: HashMap::new(),
            gate,
            target_temperature,
            preset: SystemPreset::None,
            room: RoomState::default(),
            readings: HashMap::new(),
            water_derivative: None,
            decisions: HashMap::new(),
            needs_pass: false,
            passes_total: 0,
            passes_deferred: 0,
            last_pass_duration_ms: 0,
            shutdown_tx,
            shutdown_rx,
            commands_rx,
            commands_tx,
            status_tx,
            snapshot_tx,
            snapshot_rx,
        })
    }

    /// Attach a per-pass status sink.
    pub fn with_publisher(mut self, publisher: Arc<dyn StatusPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Attach a timer store so assist dwell state survives restarts. Any
    /// previously saved state is restored immediately.
    pub fn with_timer_store(mut self, store: Box<dyn TimerPersistence>) -> Self {
        self.timer_store = Some(store);
        self.restore_timers();
        self
    }

    /// Run the orchestrator main loop
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting heat pump coordination loop");

        self.state.send_replace(OrchestratorState::Running);

        let mut poll_interval = interval(Duration::from_secs(
            self.config.control.poll_interval_seconds,
        ));

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    self.run_single_pass().await;
                }
                Some(cmd) = self.commands_rx.recv() => {
                    self.handle_command(cmd);
                    // Drain whatever queued up behind it so one pass covers
                    // the whole batch
                    while let Ok(cmd) = self.commands_rx.try_recv() {
                        self.handle_command(cmd);
                    }
                    if self.needs_pass {
                        self.run_single_pass().await;
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    self.logger.info("Shutdown signal received");
                    break;
                }
            }
        }

        self.state.send_replace(OrchestratorState::ShuttingDown);
        self.save_timers();
        self.logger.info("Coordination loop stopped");

        Ok(())
    }

    /// Execute one orchestration pass immediately.
    ///
    /// `run` drives this from its periodic tick and after external
    /// commands; hosts with their own scheduler may call it directly.
    pub async fn run_single_pass(&mut self) {
        let started = std::time::Instant::now();
        self.needs_pass = false;

        let now = Utc::now();
        self.run_pass(now).await;

        self.passes_total += 1;
        self.last_pass_duration_ms = started.elapsed().as_millis() as u64;
        self.publish_status().await;
        self.save_timers();
    }

    async fn run_pass(&mut self, now: DateTime<Utc>) {
        let devices = self.config.devices.clone();
        if devices.is_empty() {
            self.logger.debug("No devices configured, skipping pass");
            return;
        }

        self.decisions.clear();
        self.read_room(now).await;
        self.read_devices(&devices).await;
        self.update_water_trends(&devices, now);

        // Shared elapsed time for every assist timer this pass
        let dt = self.assist.advance(now);

        match self.preset {
            SystemPreset::Boost => self.apply_boost(&devices, now).await,
            SystemPreset::Away => self.apply_away(&devices, now).await,
            _ => self.apply_assist(&devices, dt, now).await,
        }

        if self.preset == SystemPreset::Solar {
            self.update_power_budgets(now).await;
        }

        self.apply_targets(&devices, now).await;
    }

    /// Average the configured room sensors and refresh the room trend.
    async fn read_room(&mut self, now: DateTime<Utc>) {
        let sensors = self.config.room_sensors.clone();
        let mut values = Vec::with_capacity(sensors.len());
        for id in &sensors {
            values.push(self.sensors.read_numeric(id).await);
        }

        let known: Vec<f64> = values.iter().flatten().copied().collect();
        let mean = if known.is_empty() {
            None
        } else {
            Some(crate::util::round_to_tenth(
                known.iter().sum::<f64>() / known.len() as f64,
            ))
        };
        if mean.is_none() && !sensors.is_empty() {
            self.logger.warn("No room temperature reading available");
        }

        let now_s = now.timestamp_millis() as f64 / 1000.0;
        let derivative = self.room_trend.update(now_s, mean);
        let delta = mean.map(|room| self.target_temperature - room);
        let eta_hours = setpoint::eta_hours(delta, derivative);

        self.room = RoomState {
            temperature: mean,
            sensor_values: values,
            target: self.target_temperature,
            derivative_c_per_hour: derivative,
            eta_hours,
        };
    }

    async fn read_devices(&mut self, devices: &[DeviceConfig]) {
        let mut readings = HashMap::with_capacity(devices.len());
        for device in devices {
            readings.insert(device.id.clone(), self.read_one_device(device).await);
        }
        self.readings = readings;
    }

    /// Compose one device reading: climate state from the host plus the
    /// separately configured water and power sensors.
    async fn read_one_device(&self, device: &DeviceConfig) -> DeviceReading {
        let mut reading = match self.sensors.read_device(&device.entity).await {
            Some(reading) => reading,
            None => {
                self.logger
                    .debug(&format!("Device {} unavailable", device.entity));
                DeviceReading::default()
            }
        };
        if reading.entity.is_empty() {
            reading.entity = device.entity.clone();
        }
        if let Some(sensor) = &device.water_sensor {
            if let Some(value) = self.sensors.read_numeric(sensor).await {
                reading.water_temperature = Some(value);
            }
        }
        if let Some(sensor) = &device.power_sensor {
            if let Some(value) = self.sensors.read_numeric(sensor).await {
                reading.power_watts = Some(value);
            }
        }
        reading
    }

    /// Re-read one device after a mode command so the rest of the pass
    /// sees the post-command state.
    async fn refresh_reading(&mut self, device: &DeviceConfig) {
        let reading = self.read_one_device(device).await;
        self.readings.insert(device.id.clone(), reading);
    }

    fn update_water_trends(&mut self, devices: &[DeviceConfig], now: DateTime<Utc>) {
        let now_s = now.timestamp_millis() as f64 / 1000.0;
        let window = self.config.trend.water_window_seconds;
        let primary_id = self.config.water_device().map(|(_, d)| d.id.clone());

        self.water_derivative = None;
        for device in devices {
            let water = self
                .readings
                .get(&device.id)
                .and_then(|r| r.water_temperature);
            if water.is_none() && !self.water_trends.contains_key(&device.id) {
                continue;
            }
            let tracker = self
                .water_trends
                .entry(device.id.clone())
                .or_insert_with(|| TrendTracker::new(window));
            let derivative = tracker.update(now_s, water);
            if primary_id.as_deref() == Some(device.id.as_str()) {
                self.water_derivative = derivative;
            }
        }
    }

    fn is_running(&self, device_id: &str) -> bool {
        self.readings
            .get(device_id)
            .map(|r| r.hvac_running)
            .unwrap_or(false)
    }

    fn primary_water_temperature(&self) -> Option<f64> {
        let (_, device) = self.config.water_device()?;
        self.readings
            .get(&device.id)
            .and_then(|r| r.water_temperature)
    }

    /// Boost preset: bring every mode-controllable device up to Heat. The
    /// boost target itself comes from the regular target stage once the
    /// device reads back as running.
    async fn apply_boost(&mut self, devices: &[DeviceConfig], now: DateTime<Utc>) {
        for (index, device) in devices.iter().enumerate() {
            let controllable = self.config.device_role(index) == DeviceRole::Water
                || device.allow_on_off_control;
            if !controllable || self.is_running(&device.id) {
                continue;
            }
            let outcome = self
                .gate
                .ensure_mode(
                    self.actuator.as_ref(),
                    &device.entity,
                    HvacMode::Heat,
                    Some(HvacMode::Off),
                    now,
                )
                .await;
            if outcome == CommandOutcome::Sent {
                self.logger
                    .info(&format!("Boost: switched {} to heat", device.id));
                self.refresh_reading(device).await;
            }
            self.note_mode_outcome(&device.id, outcome);
        }
    }

    /// Away preset: force controllable assists off, skipping the dwell
    /// gate. Everything left running resolves to a minimal target later.
    async fn apply_away(&mut self, devices: &[DeviceConfig], now: DateTime<Utc>) {
        for (index, device) in devices.iter().enumerate() {
            if self.config.device_role(index) != DeviceRole::Air || !device.allow_on_off_control {
                continue;
            }
            if !self.is_running(&device.id) {
                continue;
            }
            let outcome = self
                .gate
                .ensure_mode(
                    self.actuator.as_ref(),
                    &device.entity,
                    HvacMode::Off,
                    Some(HvacMode::Heat),
                    now,
                )
                .await;
            if outcome == CommandOutcome::Sent {
                self.logger
                    .info(&format!("Away: switched {} off", device.id));
                self.assist.force_off(&device.id, now);
                self.refresh_reading(device).await;
            }
            self.note_mode_outcome(&device.id, outcome);
        }
    }

    /// Normal staging: advance assist timers and emit any gated on/off
    /// actions, re-reading each device after a successful command.
    async fn apply_assist(&mut self, devices: &[DeviceConfig], dt: f64, now: DateTime<Utc>) {
        let inputs = ConditionInputs {
            room_temp: self.room.temperature,
            target_temp: Some(self.target_temperature),
            eta_minutes: self.room.eta_hours.map(|h| h * 60.0),
            water_temp: self.primary_water_temperature(),
            derivative: self.room.derivative_c_per_hour,
        };

        for (index, device) in devices.iter().enumerate() {
            if self.config.device_role(index) != DeviceRole::Air {
                continue;
            }
            let running = self.is_running(&device.id);
            self.assist
                .update_timers(&device.id, now, dt, &inputs, running);
            if !device.allow_on_off_control {
                continue;
            }
            let Some((mode, reason)) = self.assist.evaluate_action(&device.id, running, now)
            else {
                continue;
            };

            let observed = if running { HvacMode::Heat } else { HvacMode::Off };
            let outcome = self
                .gate
                .ensure_mode(self.actuator.as_ref(), &device.entity, mode, Some(observed), now)
                .await;
            match &outcome {
                CommandOutcome::Sent => {
                    match mode {
                        HvacMode::Heat => self.assist.record_turn_on(&device.id, now),
                        HvacMode::Off => self.assist.record_turn_off(&device.id, now),
                    }
                    self.refresh_reading(device).await;
                }
                other => {
                    self.logger.debug(&format!(
                        "Assist intent {mode:?} for {} ({reason}) not delivered: {other:?}",
                        device.id
                    ));
                }
            }
            self.note_mode_outcome(&device.id, outcome);
        }
    }

    /// Re-allocate power budgets from the net power sensor. Only called
    /// while the solar preset is active.
    async fn update_power_budgets(&mut self, now: DateTime<Utc>) {
        let raw = match self.config.power.net_power_sensor.clone() {
            Some(sensor) => self.sensors.read_numeric(&sensor).await,
            None => None,
        };

        let order: Vec<String> = self
            .config
            .priority_order()
            .into_iter()
            .filter_map(|i| self.config.devices.get(i).map(|d| d.id.clone()))
            .collect();
        let order_refs: Vec<&str> = order.iter().map(String::as_str).collect();
        self.power.update_budgets(now, raw, &order_refs);
    }

    /// Resolve the mode per device and issue the resulting setpoint.
    async fn apply_targets(&mut self, devices: &[DeviceConfig], now: DateTime<Utc>) {
        let room_at_target = match self.room.temperature {
            Some(room) => room >= self.target_temperature,
            None => false,
        };

        for (index, device) in devices.iter().enumerate() {
            let role = self.config.device_role(index);
            let running = self.is_running(&device.id);
            let off_timer = self
                .assist
                .timer(&device.id)
                .map(|t| t.off_timer_seconds)
                .unwrap_or(0.0);
            let has_budget = self.power.budget(&device.id) > 0.0;

            let mode = resolver::resolve_mode(&resolver::ModeInputs {
                preset: self.preset,
                role,
                allow_on_off_control: device.allow_on_off_control,
                is_running: running,
                room_at_target,
                off_timer_seconds: off_timer,
                has_budget,
            });

            let current = self
                .readings
                .get(&device.id)
                .and_then(|r| r.current_temperature);
            let (lower, upper) = self.config.effective_offsets(index);
            let target = match mode {
                DeviceMode::Power => {
                    let power_w = self.readings.get(&device.id).and_then(|r| r.power_watts);
                    Some(self.power.track_setpoint(
                        &device.id,
                        power_w,
                        self.config.setpoint.min,
                        self.config.setpoint.max,
                        now,
                    ))
                }
                _ => resolver::mode_target(
                    mode,
                    current,
                    Some(self.target_temperature),
                    lower,
                    upper,
                    self.config.setpoint.min,
                    self.config.setpoint.max,
                ),
            };
            if mode == DeviceMode::Boost && target.is_none() {
                self.logger.warn(&format!(
                    "No boost target for {}, current temperature unknown",
                    device.id
                ));
            }

            let decision = self.decisions.entry(device.id.clone()).or_default();
            decision.mode = Some(mode);
            decision.commanded_target = target;

            if let Some(value) = target {
                let outcome = self
                    .gate
                    .ensure_temperature(self.actuator.as_ref(), &device.entity, value, now)
                    .await;
                self.decisions
                    .entry(device.id.clone())
                    .or_default()
                    .setpoint_outcome = Some(outcome);
            }
        }
    }

    fn note_mode_outcome(&mut self, device_id: &str, outcome: CommandOutcome) {
        self.decisions
            .entry(device_id.to_string())
            .or_default()
            .mode_outcome = Some(outcome);
    }

    fn restore_timers(&mut self) {
        let Some(store) = &self.timer_store else {
            return;
        };
        match store.load() {
            Ok(saved) => self.assist.restore(saved),
            Err(e) => self
                .logger
                .warn(&format!("Could not load saved timer state: {e}")),
        }
    }

    fn save_timers(&self) {
        let Some(store) = &self.timer_store else {
            return;
        };
        if let Err(e) = store.save(self.assist.timers()) {
            self.logger
                .warn(&format!("Could not persist timer state: {e}"));
        }
    }

    /// Sender half of the command channel, for host components.
    pub fn command_sender(&self) -> mpsc::UnboundedSender<OrchestratorCommand> {
        self.commands_tx.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn preset(&self) -> SystemPreset {
        self.preset
    }

    pub fn target_temperature(&self) -> f64 {
        self.target_temperature
    }

    /// Ask a running `run` loop to stop after the current pass.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

// External command handling
impl Orchestrator {
    pub(crate) fn handle_command(&mut self, cmd: OrchestratorCommand) {
        match cmd {
            OrchestratorCommand::SetTargetTemperature(value) => {
                self.set_target_temperature(value);
            }
            OrchestratorCommand::SetPreset(preset) => self.set_preset(preset),
            OrchestratorCommand::SetPowerBudget { device_id, watts } => {
                self.set_power_budget(&device_id, watts);
            }
            OrchestratorCommand::ClearPowerBudget { device_id } => {
                self.clear_power_budget(&device_id);
            }
            OrchestratorCommand::TriggerPass => self.request_pass(),
            OrchestratorCommand::Shutdown => self.request_shutdown(),
        }
    }

    /// Change the room target, clamped to the absolute setpoint bounds.
    pub fn set_target_temperature(&mut self, value: f64) {
        if !value.is_finite() {
            self.logger
                .warn(&format!("Ignoring non-finite room target {value}"));
            return;
        }
        let clamped =
            setpoint::clamp_value(value, self.config.setpoint.min, self.config.setpoint.max);
        self.target_temperature = clamped;
        self.logger.info(&format!("Room target set to {clamped:.1}"));
        self.request_pass();
    }

    pub fn set_preset(&mut self, preset: SystemPreset) {
        if self.preset == preset {
            return;
        }
        // Budgets belong to the solar preset; leaving it drops them
        if self.preset == SystemPreset::Solar {
            self.power.clear_all();
        }
        self.preset = preset;
        self.logger.info(&format!("Preset changed to {preset:?}"));
        self.request_pass();
    }

    /// Manually assign a power budget, bypassing the allocator. Zero or
    /// negative clears it.
    pub fn set_power_budget(&mut self, device_id: &str, watts: f64) {
        if !watts.is_finite() || watts <= 0.0 {
            self.power.clear_budget(device_id);
        } else {
            self.power.set_budget(device_id, watts);
        }
        self.request_pass();
    }

    pub fn clear_power_budget(&mut self, device_id: &str) {
        self.power.clear_budget(device_id);
        self.request_pass();
    }

    fn request_pass(&mut self) {
        if self.needs_pass {
            self.passes_deferred += 1;
        } else {
            self.needs_pass = true;
        }
    }
}
