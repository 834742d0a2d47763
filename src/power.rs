//! Power budget allocation and power-tracking setpoint stepping.
//!
//! When surplus power is available (house exporting), budgets are handed out
//! to devices in priority order and each budgeted device's setpoint is
//! stepped so its measured consumption converges on its budget.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::{PowerConfig, PowerUnit};
use crate::logging::{StructuredLogger, get_logger};
use crate::setpoint;

/// Budget and step-controller state for one device.
#[derive(Debug, Clone, Default)]
pub struct PowerBudgetState {
    /// Target consumption in watts
    pub budget_watts: f64,

    /// Setpoint the step controller is holding, lazily initialized
    pub current_setpoint: Option<f64>,

    /// When the setpoint was last stepped
    pub last_adjustment: Option<DateTime<Utc>>,
}

/// Allocator diagnostics for the status snapshot.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PowerDiagnostics {
    pub house_net_power_w: Option<f64>,
    pub power_available_w: Option<f64>,
    pub power_budget_remaining_w: Option<f64>,
    pub power_budget_total_w: f64,
    pub power_budget_by_device_w: BTreeMap<String, f64>,
}

/// Distributes surplus power across devices and tracks each budget with a
/// stepped setpoint.
pub struct PowerSteering {
    config: PowerConfig,
    states: HashMap<String, PowerBudgetState>,
    last_update: Option<DateTime<Utc>>,
    house_net_power_w: Option<f64>,
    power_available_w: Option<f64>,
    budget_remaining_w: Option<f64>,
    logger: StructuredLogger,
}

impl PowerSteering {
    pub fn new(config: PowerConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            last_update: None,
            house_net_power_w: None,
            power_available_w: None,
            budget_remaining_w: None,
            logger: get_logger("power"),
        }
    }

    /// Current budget for a device, 0 when none is assigned.
    pub fn budget(&self, device_id: &str) -> f64 {
        self.states
            .get(device_id)
            .map(|state| state.budget_watts)
            .unwrap_or(0.0)
    }

    /// Assign a budget, keeping any step-controller state the device has.
    pub fn set_budget(&mut self, device_id: &str, watts: f64) {
        let state = self.states.entry(device_id.to_string()).or_default();
        state.budget_watts = watts;
        self.logger
            .info(&format!("Power budget set for {device_id}: {watts:.0} W"));
    }

    /// Remove a device's budget together with its step-controller state.
    pub fn clear_budget(&mut self, device_id: &str) {
        if self.states.remove(device_id).is_some() {
            self.logger
                .info(&format!("Power budget cleared for {device_id}"));
        }
    }

    /// Drop all budgets, step state, and allocator bookkeeping.
    ///
    /// Also resets the rate limiter so the next allocation attempt is not
    /// deferred behind a failed read.
    pub fn clear_all(&mut self) {
        self.states.clear();
        self.last_update = None;
        self.house_net_power_w = None;
        self.power_available_w = None;
        self.budget_remaining_w = None;
    }

    /// Re-allocate budgets from the house net power reading.
    ///
    /// `net_power` is signed in the sensor's configured unit, negative when
    /// the house is exporting. `priority` lists device ids in allocation
    /// order; allocation stops entirely at the first device that would
    /// receive less than the minimum worthwhile budget. Runs are rate
    /// limited; calls inside the update interval are ignored.
    pub fn update_budgets(
        &mut self,
        now: DateTime<Utc>,
        net_power: Option<f64>,
        priority: &[&str],
    ) {
        if let Some(previous) = self.last_update {
            if seconds_between(previous, now) < self.config.update_interval_seconds as f64 {
                return;
            }
        }
        self.last_update = Some(now);

        let Some(net_w) = net_power.map(|raw| self.to_watts(raw)) else {
            self.clear_all();
            return;
        };

        self.house_net_power_w = Some(net_w);

        let available = (-net_w - self.config.reserve_w).max(0.0);
        self.power_available_w = Some(available);

        let mut remaining = available;
        let mut allocated: Vec<(&str, f64)> = Vec::new();
        for device_id in priority {
            let budget = self.config.max_per_device_w.min(remaining);
            if budget >= self.config.min_budget_w {
                allocated.push((device_id, budget));
                remaining -= budget;
            } else {
                break;
            }
        }

        let stale: Vec<String> = self
            .states
            .keys()
            .filter(|id| !allocated.iter().any(|(name, _)| name == &id.as_str()))
            .cloned()
            .collect();
        for device_id in stale {
            self.clear_budget(&device_id);
        }

        for (device_id, watts) in allocated {
            self.set_budget(device_id, watts);
        }

        self.budget_remaining_w = Some(remaining.max(0.0));
    }

    /// Step a device's setpoint toward its power budget.
    ///
    /// First use initializes the held setpoint to the midpoint of the bounds.
    /// Without a budget or a power reading the held setpoint is returned
    /// unchanged, as it is inside the per-device adjustment interval or the
    /// deadband. Otherwise the setpoint moves one step toward the budget and
    /// is clamped to the bounds.
    pub fn track_setpoint(
        &mut self,
        device_id: &str,
        current_power: Option<f64>,
        min_setpoint: f64,
        max_setpoint: f64,
        now: DateTime<Utc>,
    ) -> f64 {
        let state = self.states.entry(device_id.to_string()).or_default();
        let held = match state.current_setpoint {
            Some(value) => value,
            None => {
                let midpoint = (min_setpoint + max_setpoint) / 2.0;
                state.current_setpoint = Some(midpoint);
                midpoint
            }
        };

        if state.budget_watts <= 0.0 {
            return held;
        }
        let Some(power) = current_power else {
            return held;
        };

        if let Some(last) = state.last_adjustment {
            if seconds_between(last, now) < self.config.adjustment_interval_seconds as f64 {
                return held;
            }
        }

        let error = state.budget_watts - power;
        let error_percent = error.abs() / state.budget_watts;
        if error_percent < self.config.deadband_percent {
            return held;
        }

        let stepped = if error > 0.0 {
            held + self.config.step_c
        } else {
            held - self.config.step_c
        };
        let next = setpoint::clamp_value(stepped, min_setpoint, max_setpoint);

        state.current_setpoint = Some(next);
        state.last_adjustment = Some(now);

        self.logger.debug(&format!(
            "Power tracking {device_id}: budget={:.0}W measured={power:.0}W error={:.0}% setpoint {held:.1} to {next:.1}",
            state.budget_watts,
            error_percent * 100.0,
        ));

        next
    }

    /// Allocator state for the status snapshot.
    pub fn diagnostics(&self) -> PowerDiagnostics {
        let by_device: BTreeMap<String, f64> = self
            .states
            .iter()
            .filter(|(_, state)| state.budget_watts > 0.0)
            .map(|(id, state)| (id.clone(), state.budget_watts))
            .collect();
        let total = by_device.values().sum();

        PowerDiagnostics {
            house_net_power_w: self.house_net_power_w,
            power_available_w: self.power_available_w,
            power_budget_remaining_w: self.budget_remaining_w,
            power_budget_total_w: total,
            power_budget_by_device_w: by_device,
        }
    }

    fn to_watts(&self, raw: f64) -> f64 {
        match self.config.net_power_unit {
            PowerUnit::W => raw,
            PowerUnit::Kw => raw * 1000.0,
        }
    }
}

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}
