//! Device mode resolution.
//!
//! Maps the system preset and per-device observations to the operating mode
//! a device should run in this pass, and turns that mode into a numeric
//! setpoint target.

use serde::{Deserialize, Serialize};

use crate::config::DeviceRole;
use crate::setpoint;

/// System-wide operating preset chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemPreset {
    #[default]
    None,
    Boost,
    Away,
    MinimalSupport,
    Solar,
}

/// Operating mode resolved for one device in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    Off,
    Boost,
    Minimal,
    Setpoint,
    Power,
}

/// Everything the resolver looks at for one device.
#[derive(Debug, Clone, Copy)]
pub struct ModeInputs {
    pub preset: SystemPreset,
    pub role: DeviceRole,
    pub allow_on_off_control: bool,
    pub is_running: bool,
    pub room_at_target: bool,
    /// Accumulated OFF-condition seconds, meaningful only with on/off control
    pub off_timer_seconds: f64,
    pub has_budget: bool,
}

/// Resolve the operating mode for one device. Rules are evaluated in order
/// and the first match wins.
pub fn resolve_mode(inputs: &ModeInputs) -> DeviceMode {
    // A device that is not heating gets no target at all
    if !inputs.is_running {
        return DeviceMode::Off;
    }

    match inputs.preset {
        SystemPreset::Boost => return DeviceMode::Boost,
        SystemPreset::MinimalSupport => {
            return match inputs.role {
                DeviceRole::Water => DeviceMode::Boost,
                DeviceRole::Air => DeviceMode::Minimal,
            };
        }
        // Controllable assists were already forced off upstream
        SystemPreset::Away => return DeviceMode::Minimal,
        SystemPreset::None | SystemPreset::Solar => {}
    }

    if inputs.has_budget {
        return DeviceMode::Power;
    }

    match inputs.role {
        DeviceRole::Water => DeviceMode::Setpoint,
        DeviceRole::Air => {
            // A nonzero off timer means the room just reached target and the
            // pump is winding down; keep it minimally engaged instead of
            // re-triggering it.
            if inputs.allow_on_off_control && inputs.off_timer_seconds > 0.0 {
                DeviceMode::Minimal
            } else if inputs.room_at_target {
                DeviceMode::Minimal
            } else {
                DeviceMode::Setpoint
            }
        }
    }
}

/// Numeric setpoint for a resolved mode, `None` when no temperature command
/// should be issued. `Power` targets come from the power tracker, not from
/// here, and `Off` devices are left alone.
pub fn mode_target(
    mode: DeviceMode,
    current_temp: Option<f64>,
    room_target: Option<f64>,
    lower_offset: f64,
    upper_offset: f64,
    min_setpoint: f64,
    max_setpoint: f64,
) -> Option<f64> {
    match mode {
        DeviceMode::Off | DeviceMode::Power => None,
        DeviceMode::Boost => current_temp
            .map(|current| setpoint::clamp_value(current + upper_offset, min_setpoint, max_setpoint)),
        DeviceMode::Minimal => Some(minimal_target(
            current_temp,
            lower_offset,
            upper_offset,
            min_setpoint,
            max_setpoint,
        )),
        DeviceMode::Setpoint => Some(setpoint::clamp_setpoint(
            room_target,
            current_temp,
            lower_offset,
            upper_offset,
            min_setpoint,
            max_setpoint,
        )),
    }
}

/// Lowest setpoint the device's band allows, holding rather than heating.
fn minimal_target(
    current_temp: Option<f64>,
    lower_offset: f64,
    upper_offset: f64,
    min_setpoint: f64,
    max_setpoint: f64,
) -> f64 {
    match current_temp {
        None => min_setpoint,
        Some(current) => setpoint::clamp_setpoint(
            Some(current + lower_offset),
            Some(current),
            lower_offset,
            upper_offset,
            min_setpoint,
            max_setpoint,
        ),
    }
}
