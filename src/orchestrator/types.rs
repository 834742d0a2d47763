use crate::resolver::{DeviceMode, SystemPreset};
use serde::{Deserialize, Serialize};

/// Main orchestrator state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorState {
    /// Orchestrator is initializing
    Initializing,
    /// Orchestrator is running passes
    Running,
    /// Orchestrator is shutting down
    ShuttingDown,
}

/// HVAC mode of a heat pump as seen and commanded by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Heat,
    Off,
}

/// One device's observed state, produced fresh each pass.
///
/// A host's `read_device` fills the climate fields; water and electrical
/// power are read separately through the configured sensors and merged in
/// by the pass, so implementations may leave them `None`.
#[derive(Debug, Clone, Default)]
pub struct DeviceReading {
    /// Control entity reference
    pub entity: String,
    /// Whether the device is actively heating
    pub hvac_running: bool,
    /// Measured temperature at the device, °C
    pub current_temperature: Option<f64>,
    /// Setpoint currently held by the device, °C
    pub target_temperature: Option<f64>,
    /// Loop water temperature, °C
    pub water_temperature: Option<f64>,
    /// Electrical power draw, W
    pub power_watts: Option<f64>,
}

/// Averaged room measurements for one pass
#[derive(Debug, Clone, Default)]
pub struct RoomState {
    /// Mean of the configured room sensors, rounded to 0.1 °C
    pub temperature: Option<f64>,
    /// Individual sensor readings in configuration order
    pub sensor_values: Vec<Option<f64>>,
    /// Room target temperature, °C
    pub target: f64,
    /// Temperature trend in °C/hour
    pub derivative_c_per_hour: Option<f64>,
    /// Estimated hours until the room reaches target
    pub eta_hours: Option<f64>,
}

/// Commands accepted by the orchestrator from external components
#[derive(Debug, Clone)]
pub enum OrchestratorCommand {
    SetTargetTemperature(f64),
    SetPreset(SystemPreset),
    SetPowerBudget { device_id: String, watts: f64 },
    ClearPowerBudget { device_id: String },
    TriggerPass,
    Shutdown,
}

/// Result of the last command attempt toward one device
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Command was sent and acknowledged
    Sent,
    /// Device already held the requested state
    Unchanged,
    /// Suppressed by the per-device command cooldown
    Cooldown,
    /// Actuator failed or timed out
    Failed(String),
}

/// What the pass decided for one device, kept for the status snapshot
#[derive(Debug, Clone, Default)]
pub struct DeviceDecision {
    pub mode: Option<DeviceMode>,
    pub commanded_target: Option<f64>,
    pub mode_outcome: Option<CommandOutcome>,
    pub setpoint_outcome: Option<CommandOutcome>,
}
