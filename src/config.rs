//! Configuration management for Hestia
//!
//! This module handles loading, validation, and management of the controller
//! configuration from YAML files, including per-device roles and setpoint
//! band offsets with their role-based defaults.

use crate::error::{HestiaError, Result};
use crate::util;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default band offsets by role, applied when a device omits its own.
pub const WATER_LOWER_OFFSET_DEFAULT: f64 = -0.3;
pub const WATER_UPPER_OFFSET_DEFAULT: f64 = 1.5;
pub const AIR_LOWER_OFFSET_DEFAULT: f64 = -4.0;
pub const AIR_UPPER_OFFSET_DEFAULT: f64 = 4.0;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Room target temperature in °C
    pub target_temperature: f64,

    /// Room temperature sensor references; readings are averaged per pass
    pub room_sensors: Vec<String>,

    /// Heat pumps sharing the hydronic loop, in priority order
    pub devices: Vec<DeviceConfig>,

    /// Absolute setpoint guardrails
    pub setpoint: SetpointConfig,

    /// Temperature trend estimation
    pub trend: TrendConfig,

    /// Assist pump triggering and anti-short-cycle protection
    pub assist: AssistConfig,

    /// Power budget allocation and setpoint tracking
    pub power: PowerConfig,

    /// Pass scheduling and command pacing
    pub control: ControlConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Timer state persistence
    pub persistence: PersistenceConfig,
}

/// Loop role of a configured heat pump
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    /// Primary pump heating the loop water; its HVAC mode is always managed
    Water,
    /// Assist pump; HVAC mode is only touched when on/off control is allowed
    Air,
}

/// A setpoint band offset, either numeric or textual.
///
/// The textual form exists to pin a signed `-0`: YAML emitters do not
/// reliably round-trip the sign bit of a numeric `-0.0`, and a `-0` lower
/// offset means "floor exactly at current temperature", which is different
/// from `0` in diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OffsetValue {
    Number(f64),
    Text(String),
}

impl OffsetValue {
    /// Resolve to a signed value; `None` when the text form does not parse.
    pub fn resolve(&self) -> Option<f64> {
        match self {
            OffsetValue::Number(v) => Some(*v),
            OffsetValue::Text(s) => util::parse_offset(s),
        }
    }
}

/// One heat pump on the loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Stable device id; generated from the entity when empty
    #[serde(default)]
    pub id: String,

    /// Display name; generated from the entity when empty
    #[serde(default)]
    pub name: String,

    /// Control entity reference understood by the host actuator
    pub entity: String,

    /// Loop role; when unset the first configured device is Water, the rest Air
    #[serde(default)]
    pub role: Option<DeviceRole>,

    /// Lower band offset in °C relative to current temperature
    #[serde(default)]
    pub lower_offset: Option<OffsetValue>,

    /// Upper band offset in °C relative to current temperature
    #[serde(default)]
    pub upper_offset: Option<OffsetValue>,

    /// Allow the orchestrator to switch this pump on and off (Air role only)
    #[serde(default)]
    pub allow_on_off_control: bool,

    /// Electrical power sensor in watts, used by power steering
    #[serde(default)]
    pub power_sensor: Option<String>,

    /// Loop water temperature sensor
    #[serde(default)]
    pub water_sensor: Option<String>,
}

/// Absolute setpoint guardrails in °C
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SetpointConfig {
    /// Lowest setpoint any device may receive
    pub min: f64,

    /// Highest setpoint any device may receive
    pub max: f64,
}

/// Temperature trend estimation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Rolling sample window for room temperature, in seconds
    pub window_seconds: u64,

    /// Rolling sample window for loop water temperature, in seconds
    pub water_window_seconds: u64,
}

/// Assist pump triggering and anti-short-cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Seconds a condition must hold before an action is taken
    pub timer_threshold_seconds: f64,

    /// Minimum run time before an assist pump may be turned off
    pub min_on_minutes: f64,

    /// Minimum rest time before an assist pump may be turned on
    pub min_off_minutes: f64,

    /// ETA above this many minutes triggers assist heating
    pub on_eta_minutes: f64,

    /// ETA below this many minutes allows assist shutdown
    pub off_eta_minutes: f64,

    /// Loop water at or above this temperature counts as hot
    pub water_threshold_c: f64,

    /// Room distance to target treated as "at target" for stall checks
    pub stall_delta_c: f64,
}

/// Unit of the configured net power sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerUnit {
    W,
    Kw,
}

/// Power budget allocation and setpoint tracking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    /// House net power sensor (signed, negative = exporting)
    pub net_power_sensor: Option<String>,

    /// Unit delivered by the net power sensor
    pub net_power_unit: PowerUnit,

    /// Surplus held back as a noise deadband, in watts
    pub reserve_w: f64,

    /// Minimum seconds between allocator runs
    pub update_interval_seconds: u64,

    /// Smallest budget worth assigning to a device, in watts
    pub min_budget_w: f64,

    /// Largest budget a single device may receive, in watts
    pub max_per_device_w: f64,

    /// Minimum seconds between setpoint adjustments per device
    pub adjustment_interval_seconds: u64,

    /// Relative error below which the tracker holds the setpoint (0..1)
    pub deadband_percent: f64,

    /// Setpoint step per adjustment, in °C
    pub step_c: f64,
}

/// Pass scheduling and command pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Seconds between periodic orchestration passes
    pub poll_interval_seconds: u64,

    /// Seconds a device-level command suppresses a repeat
    pub command_cooldown_seconds: u64,

    /// Seconds before an outbound command is abandoned
    pub command_timeout_seconds: u64,

    /// Setpoint changes smaller than this are not sent, in °C
    pub setpoint_epsilon_c: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Console-specific level override
    pub console_level: Option<String>,

    /// File-specific level override
    pub file_level: Option<String>,

    /// Path to log file or directory; empty disables the file layer
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Timer state persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Path to the assist timer state file
    pub timers_file: String,
}

impl Default for SetpointConfig {
    fn default() -> Self {
        Self {
            min: 16.0,
            max: 30.0,
        }
    }
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            window_seconds: 900,
            water_window_seconds: 600,
        }
    }
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            timer_threshold_seconds: 300.0,
            min_on_minutes: 20.0,
            min_off_minutes: 10.0,
            on_eta_minutes: 60.0,
            off_eta_minutes: 15.0,
            water_threshold_c: 40.0,
            stall_delta_c: 0.5,
        }
    }
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            net_power_sensor: None,
            net_power_unit: PowerUnit::W,
            reserve_w: 300.0,
            update_interval_seconds: 30,
            min_budget_w: 200.0,
            max_per_device_w: 1200.0,
            adjustment_interval_seconds: 90,
            deadband_percent: 0.15,
            step_c: 0.3,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            command_cooldown_seconds: 20,
            command_timeout_seconds: 5,
            setpoint_epsilon_c: 0.1,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: String::new(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            timers_file: "hestia_timers.json".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_temperature: 21.0,
            room_sensors: Vec::new(),
            devices: Vec::new(),
            setpoint: SetpointConfig::default(),
            trend: TrendConfig::default(),
            assist: AssistConfig::default(),
            power: PowerConfig::default(),
            control: ControlConfig::default(),
            logging: LoggingConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&contents)?;
        config.normalize();
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("HESTIA_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = ["hestia.yaml", "/data/hestia.yaml", "/etc/hestia/config.yaml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Fill in generated device ids and names.
    ///
    /// Explicit ids are kept as configured; empty ones are derived from the
    /// entity reference and deduplicated with `_2`, `_3`... suffixes in
    /// configuration order.
    pub fn normalize(&mut self) {
        let mut used: HashSet<String> = self
            .devices
            .iter()
            .filter(|d| !d.id.is_empty())
            .map(|d| d.id.clone())
            .collect();

        for device in &mut self.devices {
            if device.id.is_empty() {
                let id = util::unique_device_id(&device.entity, &used);
                used.insert(id.clone());
                device.id = id;
            }
            if device.name.is_empty() {
                device.name = util::device_name_from_entity(&device.entity);
            }
        }
    }

    /// Resolved role of the device at `index`.
    ///
    /// Compatibility rule for configurations without explicit roles: the
    /// first configured device drives the loop water, the rest assist.
    pub fn device_role(&self, index: usize) -> DeviceRole {
        self.devices
            .get(index)
            .and_then(|d| d.role)
            .unwrap_or(if index == 0 {
                DeviceRole::Water
            } else {
                DeviceRole::Air
            })
    }

    /// The primary (Water) device, if one is configured.
    pub fn water_device(&self) -> Option<(usize, &DeviceConfig)> {
        self.devices
            .iter()
            .enumerate()
            .find(|(i, _)| self.device_role(*i) == DeviceRole::Water)
    }

    /// All assist (Air) devices, in configuration order.
    pub fn air_devices(&self) -> Vec<(usize, &DeviceConfig)> {
        self.devices
            .iter()
            .enumerate()
            .filter(|(i, _)| self.device_role(*i) == DeviceRole::Air)
            .collect()
    }

    /// Device indices in budget priority order: Water first, then Air in
    /// configuration order.
    pub fn priority_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = Vec::with_capacity(self.devices.len());
        if let Some((water_idx, _)) = self.water_device() {
            order.push(water_idx);
        }
        for (i, _) in self.devices.iter().enumerate() {
            if !order.contains(&i) {
                order.push(i);
            }
        }
        order
    }

    /// Effective `(lower, upper)` offsets for the device at `index`.
    ///
    /// Unset or unparsable offsets fall back to the role defaults; a textual
    /// `-0` resolves to a signed negative zero.
    pub fn effective_offsets(&self, index: usize) -> (f64, f64) {
        let role = self.device_role(index);
        let (lower_default, upper_default) = match role {
            DeviceRole::Water => (WATER_LOWER_OFFSET_DEFAULT, WATER_UPPER_OFFSET_DEFAULT),
            DeviceRole::Air => (AIR_LOWER_OFFSET_DEFAULT, AIR_UPPER_OFFSET_DEFAULT),
        };
        let Some(device) = self.devices.get(index) else {
            return (lower_default, upper_default);
        };
        let lower = device
            .lower_offset
            .as_ref()
            .and_then(OffsetValue::resolve)
            .unwrap_or(lower_default);
        let upper = device
            .upper_offset
            .as_ref()
            .and_then(OffsetValue::resolve)
            .unwrap_or(upper_default);
        (lower, upper)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.setpoint.min >= self.setpoint.max {
            return Err(HestiaError::validation(
                "setpoint",
                "min must be below max",
            ));
        }

        if self.trend.window_seconds == 0 {
            return Err(HestiaError::validation(
                "trend.window_seconds",
                "Must be greater than 0",
            ));
        }

        if self.trend.water_window_seconds == 0 {
            return Err(HestiaError::validation(
                "trend.water_window_seconds",
                "Must be greater than 0",
            ));
        }

        if self.assist.timer_threshold_seconds <= 0.0 {
            return Err(HestiaError::validation(
                "assist.timer_threshold_seconds",
                "Must be positive",
            ));
        }

        if self.assist.min_on_minutes < 0.0 || self.assist.min_off_minutes < 0.0 {
            return Err(HestiaError::validation(
                "assist",
                "min_on_minutes and min_off_minutes cannot be negative",
            ));
        }

        if self.power.min_budget_w <= 0.0 {
            return Err(HestiaError::validation(
                "power.min_budget_w",
                "Must be positive",
            ));
        }

        if self.power.max_per_device_w < self.power.min_budget_w {
            return Err(HestiaError::validation(
                "power.max_per_device_w",
                "Must be at least min_budget_w",
            ));
        }

        if self.power.reserve_w < 0.0 {
            return Err(HestiaError::validation(
                "power.reserve_w",
                "Cannot be negative",
            ));
        }

        if !(0.0..1.0).contains(&self.power.deadband_percent)
            || self.power.deadband_percent == 0.0
        {
            return Err(HestiaError::validation(
                "power.deadband_percent",
                "Must be within (0, 1)",
            ));
        }

        if self.power.step_c <= 0.0 {
            return Err(HestiaError::validation(
                "power.step_c",
                "Must be positive",
            ));
        }

        if self.power.update_interval_seconds == 0 || self.power.adjustment_interval_seconds == 0 {
            return Err(HestiaError::validation(
                "power",
                "update and adjustment intervals must be greater than 0",
            ));
        }

        if self.control.poll_interval_seconds == 0 {
            return Err(HestiaError::validation(
                "control.poll_interval_seconds",
                "Must be greater than 0",
            ));
        }

        if self.control.command_timeout_seconds == 0 {
            return Err(HestiaError::validation(
                "control.command_timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if self.control.setpoint_epsilon_c < 0.0 {
            return Err(HestiaError::validation(
                "control.setpoint_epsilon_c",
                "Cannot be negative",
            ));
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (i, device) in self.devices.iter().enumerate() {
            if device.entity.is_empty() {
                return Err(HestiaError::validation(
                    "devices.entity",
                    "Entity reference cannot be empty",
                ));
            }
            if !device.id.is_empty() && !seen_ids.insert(device.id.as_str()) {
                return Err(HestiaError::Validation {
                    field: "devices.id".to_string(),
                    message: format!("Duplicate device id: {}", device.id),
                });
            }

            let (lower, upper) = self.effective_offsets(i);
            if lower > upper {
                return Err(HestiaError::Validation {
                    field: format!("devices[{}].offsets", i),
                    message: "lower_offset must not exceed upper_offset".to_string(),
                });
            }
        }

        let water_count = self
            .devices
            .iter()
            .enumerate()
            .filter(|(i, _)| self.device_role(*i) == DeviceRole::Water)
            .count();
        if water_count > 1 {
            return Err(HestiaError::validation(
                "devices.role",
                "At most one device may have the water role",
            ));
        }

        Ok(())
    }
}
