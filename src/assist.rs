//! Assist pump timer state machine.
//!
//! Tracks, per assist device, how long ON or OFF trigger conditions have been
//! continuously true, and turns sustained conditions into mode intents guarded
//! by anti-short-cycle dwell times. Timer state is serializable so accumulated
//! progress survives restarts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conditions::{self, ConditionInputs};
use crate::config::AssistConfig;
use crate::logging::{StructuredLogger, get_logger};
use crate::orchestrator::types::HvacMode;

/// Timer and dwell state for one assist device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistTimerState {
    /// Accumulated seconds the ON conditions have been continuously met
    pub on_timer_seconds: f64,

    /// Accumulated seconds the OFF conditions have been continuously met
    pub off_timer_seconds: f64,

    /// Name of the winning condition, or "none"
    pub active_condition: String,

    /// Last observed running flag
    pub running_state: bool,

    /// When the device last switched on
    pub last_on: Option<DateTime<Utc>>,

    /// When the device last switched off
    pub last_off: Option<DateTime<Utc>>,

    /// Why the pending intent was withheld, e.g. "min_off 420s"
    pub block_reason: String,

    /// Pending mode intent, recorded even when the dwell gate blocks it
    pub target_hvac_mode: Option<HvacMode>,

    /// Condition name behind the pending intent
    pub target_reason: String,
}

impl Default for AssistTimerState {
    fn default() -> Self {
        Self {
            on_timer_seconds: 0.0,
            off_timer_seconds: 0.0,
            active_condition: "none".to_string(),
            running_state: false,
            last_on: None,
            last_off: None,
            block_reason: String::new(),
            target_hvac_mode: None,
            target_reason: String::new(),
        }
    }
}

/// Hysteresis controller deciding when assist pumps switch on or off.
pub struct AssistController {
    config: AssistConfig,
    timers: HashMap<String, AssistTimerState>,
    last_advance: Option<DateTime<Utc>>,
    logger: StructuredLogger,
}

impl AssistController {
    pub fn new(config: AssistConfig) -> Self {
        Self {
            config,
            timers: HashMap::new(),
            last_advance: None,
            logger: get_logger("assist"),
        }
    }

    /// Replace timer state with entries restored from the timer store.
    pub fn restore(&mut self, saved: HashMap<String, AssistTimerState>) {
        if !saved.is_empty() {
            self.logger
                .info(&format!("Restored {} assist timer state(s)", saved.len()));
        }
        self.timers = saved;
    }

    /// All timer states, for persistence and status reporting.
    pub fn timers(&self) -> &HashMap<String, AssistTimerState> {
        &self.timers
    }

    /// Timer state for a device, if it has been referenced before.
    pub fn timer(&self, device_id: &str) -> Option<&AssistTimerState> {
        self.timers.get(device_id)
    }

    /// Get or create the timer state for a device.
    pub fn timer_state(&mut self, device_id: &str) -> &AssistTimerState {
        self.timers.entry(device_id.to_string()).or_default()
    }

    /// Advance the shared pass clock and return the elapsed seconds since the
    /// previous advance. Every device updated in the same pass must be fed
    /// this one delta. The first call returns 0.
    pub fn advance(&mut self, now: DateTime<Utc>) -> f64 {
        let dt = match self.last_advance {
            Some(previous) => seconds_between(previous, now).max(0.0),
            None => 0.0,
        };
        self.last_advance = Some(now);
        dt
    }

    /// Accumulate condition time for one device.
    ///
    /// ON and OFF accumulation are mutually exclusive: whichever side has a
    /// satisfied condition gains `dt` while the other side resets, and with
    /// neither side satisfied both reset. Externally toggled devices get
    /// their `last_on`/`last_off` stamps here when the running flag flips.
    pub fn update_timers(
        &mut self,
        device_id: &str,
        now: DateTime<Utc>,
        dt: f64,
        inputs: &ConditionInputs,
        is_running: bool,
    ) -> &AssistTimerState {
        let on_condition = conditions::first_on_condition(inputs, &self.config);
        let off_condition = conditions::first_off_condition(inputs, &self.config);

        let state = self.timers.entry(device_id.to_string()).or_default();

        if state.running_state != is_running {
            state.running_state = is_running;
            if is_running {
                state.last_on = Some(now);
            } else {
                state.last_off = Some(now);
            }
        }

        state.block_reason.clear();

        if let Some(name) = on_condition {
            state.on_timer_seconds += dt;
            state.off_timer_seconds = 0.0;
            state.active_condition = name.to_string();
        } else if let Some(name) = off_condition {
            state.off_timer_seconds += dt;
            state.on_timer_seconds = 0.0;
            state.active_condition = name.to_string();
        } else {
            state.on_timer_seconds = 0.0;
            state.off_timer_seconds = 0.0;
            state.active_condition = "none".to_string();
        }

        state
    }

    /// Decide whether a sustained condition has earned a mode change.
    ///
    /// The pending intent is recorded on the state even when the
    /// anti-short-cycle gate withholds it, so status consumers can see what
    /// the machine wants and why it is held back.
    pub fn evaluate_action(
        &mut self,
        device_id: &str,
        is_running: bool,
        now: DateTime<Utc>,
    ) -> Option<(HvacMode, String)> {
        let threshold = self.config.timer_threshold_seconds;
        let min_on_seconds = self.config.min_on_minutes * 60.0;
        let min_off_seconds = self.config.min_off_minutes * 60.0;

        let state = self.timers.entry(device_id.to_string()).or_default();
        state.target_hvac_mode = None;
        state.target_reason.clear();

        if !is_running && state.on_timer_seconds >= threshold {
            state.target_hvac_mode = Some(HvacMode::Heat);
            state.target_reason = state.active_condition.clone();

            if let Some(last_off) = state.last_off {
                let since_off = seconds_between(last_off, now);
                if since_off < min_off_seconds {
                    let remaining = (min_off_seconds - since_off) as i64;
                    state.block_reason = format!("min_off {remaining}s");
                    self.logger.debug(&format!(
                        "Assist ON blocked for {device_id}: min_off has {remaining}s left"
                    ));
                    return None;
                }
            }

            return Some((HvacMode::Heat, state.active_condition.clone()));
        }

        if is_running && state.off_timer_seconds >= threshold {
            state.target_hvac_mode = Some(HvacMode::Off);
            state.target_reason = state.active_condition.clone();

            if let Some(last_on) = state.last_on {
                let since_on = seconds_between(last_on, now);
                if since_on < min_on_seconds {
                    let remaining = (min_on_seconds - since_on) as i64;
                    state.block_reason = format!("min_on {remaining}s");
                    self.logger.debug(&format!(
                        "Assist OFF blocked for {device_id}: min_on has {remaining}s left"
                    ));
                    return None;
                }
            }

            return Some((HvacMode::Off, state.active_condition.clone()));
        }

        None
    }

    /// Note a turn-on command that went through, for the next dwell check.
    pub fn record_turn_on(&mut self, device_id: &str, now: DateTime<Utc>) {
        let state = self.timers.entry(device_id.to_string()).or_default();
        state.last_on = Some(now);
        state.running_state = true;
        self.logger.info(&format!(
            "Assist ON for {device_id}: condition={}, timer={:.1}s",
            state.active_condition, state.on_timer_seconds
        ));
    }

    /// Note a turn-off command that went through, for the next dwell check.
    pub fn record_turn_off(&mut self, device_id: &str, now: DateTime<Utc>) {
        let state = self.timers.entry(device_id.to_string()).or_default();
        state.last_off = Some(now);
        state.running_state = false;
        self.logger.info(&format!(
            "Assist OFF for {device_id}: condition={}, timer={:.1}s",
            state.active_condition, state.off_timer_seconds
        ));
    }

    /// Drop all accumulated state and stamp an off transition, bypassing the
    /// dwell gate. Used when a preset forces assist pumps off.
    pub fn force_off(&mut self, device_id: &str, now: DateTime<Utc>) {
        let state = self.timers.entry(device_id.to_string()).or_default();
        state.on_timer_seconds = 0.0;
        state.off_timer_seconds = 0.0;
        state.active_condition = "none".to_string();
        state.target_hvac_mode = None;
        state.target_reason.clear();
        state.block_reason.clear();
        state.last_off = Some(now);
        state.running_state = false;
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}
