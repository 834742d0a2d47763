//! Assist pump trigger conditions.
//!
//! Stateless predicate layer feeding the assist timer machine. ON and OFF
//! conditions live in two ordered tables; the first satisfied entry wins and
//! its name becomes the timer's `active_condition`. A missing input disables
//! exactly the conditions that need it.

use crate::config::AssistConfig;

/// Sensor-derived inputs to one evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionInputs {
    /// Averaged room temperature
    pub room_temp: Option<f64>,
    /// Room target temperature
    pub target_temp: Option<f64>,
    /// Estimated minutes until the room reaches target
    pub eta_minutes: Option<f64>,
    /// Loop water temperature
    pub water_temp: Option<f64>,
    /// Room temperature derivative in °C/hour
    pub derivative: Option<f64>,
}

type Predicate = fn(&ConditionInputs, &AssistConfig) -> bool;

/// Conditions that argue for turning an assist pump on, in priority order.
const ON_CONDITIONS: &[(&str, Predicate)] = &[
    ("eta_high", eta_high),
    ("water_hot", water_hot),
    ("stalled_below_target", stalled_below_target),
];

/// Conditions that argue for turning an assist pump off, in priority order.
const OFF_CONDITIONS: &[(&str, Predicate)] = &[
    ("eta_low", eta_low),
    ("overshoot", overshoot),
    ("stalled_at_target", stalled_at_target),
];

/// Name of the first satisfied ON condition, if any.
pub fn first_on_condition(inputs: &ConditionInputs, cfg: &AssistConfig) -> Option<&'static str> {
    ON_CONDITIONS
        .iter()
        .find(|(_, check)| check(inputs, cfg))
        .map(|(name, _)| *name)
}

/// Name of the first satisfied OFF condition, if any.
pub fn first_off_condition(inputs: &ConditionInputs, cfg: &AssistConfig) -> Option<&'static str> {
    OFF_CONDITIONS
        .iter()
        .find(|(_, check)| check(inputs, cfg))
        .map(|(name, _)| *name)
}

fn eta_high(inputs: &ConditionInputs, cfg: &AssistConfig) -> bool {
    matches!(
        (inputs.eta_minutes, inputs.room_temp, inputs.target_temp),
        (Some(eta), Some(room), Some(target)) if eta > cfg.on_eta_minutes && room < target
    )
}

fn water_hot(inputs: &ConditionInputs, cfg: &AssistConfig) -> bool {
    matches!(
        (inputs.water_temp, inputs.room_temp, inputs.target_temp),
        (Some(water), Some(room), Some(target))
            if water >= cfg.water_threshold_c && room < target
    )
}

fn stalled_below_target(inputs: &ConditionInputs, cfg: &AssistConfig) -> bool {
    matches!(
        (inputs.derivative, inputs.room_temp, inputs.target_temp),
        (Some(derivative), Some(room), Some(target))
            if derivative <= 0.0 && room < target - cfg.stall_delta_c
    )
}

fn eta_low(inputs: &ConditionInputs, cfg: &AssistConfig) -> bool {
    matches!(inputs.eta_minutes, Some(eta) if eta < cfg.off_eta_minutes)
}

fn overshoot(inputs: &ConditionInputs, _cfg: &AssistConfig) -> bool {
    matches!(
        (inputs.room_temp, inputs.target_temp),
        (Some(room), Some(target)) if room >= target
    )
}

fn stalled_at_target(inputs: &ConditionInputs, cfg: &AssistConfig) -> bool {
    matches!(
        (inputs.derivative, inputs.room_temp, inputs.target_temp),
        (Some(derivative), Some(room), Some(target))
            if derivative <= 0.0 && target - room <= cfg.stall_delta_c
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs() -> ConditionInputs {
        ConditionInputs {
            room_temp: Some(19.0),
            target_temp: Some(21.0),
            eta_minutes: None,
            water_temp: None,
            derivative: None,
        }
    }

    #[test]
    fn eta_high_triggers_on_long_eta_below_target() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.eta_minutes = Some(90.0);
        assert_eq!(first_on_condition(&i, &cfg), Some("eta_high"));

        i.eta_minutes = Some(45.0);
        assert_eq!(first_on_condition(&i, &cfg), None);
    }

    #[test]
    fn eta_high_requires_room_below_target() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.eta_minutes = Some(90.0);
        i.room_temp = Some(21.5);
        assert_eq!(first_on_condition(&i, &cfg), None);
    }

    #[test]
    fn water_hot_triggers_at_threshold() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.water_temp = Some(40.0);
        assert_eq!(first_on_condition(&i, &cfg), Some("water_hot"));

        i.water_temp = Some(39.9);
        assert_eq!(first_on_condition(&i, &cfg), None);
    }

    #[test]
    fn stalled_below_target_needs_margin() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.derivative = Some(-0.2);
        i.room_temp = Some(20.4);
        assert_eq!(first_on_condition(&i, &cfg), Some("stalled_below_target"));

        // Within the stall delta of target: not "below target" any more
        i.room_temp = Some(20.6);
        assert_eq!(first_on_condition(&i, &cfg), None);
    }

    #[test]
    fn on_conditions_follow_priority_order() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.eta_minutes = Some(90.0);
        i.water_temp = Some(45.0);
        i.derivative = Some(-1.0);
        assert_eq!(first_on_condition(&i, &cfg), Some("eta_high"));

        i.eta_minutes = None;
        assert_eq!(first_on_condition(&i, &cfg), Some("water_hot"));
    }

    #[test]
    fn eta_low_ignores_room_state() {
        let cfg = AssistConfig::default();
        let mut i = ConditionInputs::default();
        i.eta_minutes = Some(10.0);
        assert_eq!(first_off_condition(&i, &cfg), Some("eta_low"));

        i.eta_minutes = Some(20.0);
        assert_eq!(first_off_condition(&i, &cfg), None);
    }

    #[test]
    fn overshoot_triggers_at_target() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.room_temp = Some(21.0);
        assert_eq!(first_off_condition(&i, &cfg), Some("overshoot"));
    }

    #[test]
    fn stalled_at_target_uses_stall_delta() {
        let cfg = AssistConfig::default();
        let mut i = inputs();
        i.derivative = Some(0.0);
        i.room_temp = Some(20.5);
        assert_eq!(first_off_condition(&i, &cfg), Some("stalled_at_target"));

        i.room_temp = Some(20.4);
        assert_eq!(first_off_condition(&i, &cfg), None);
    }

    #[test]
    fn missing_inputs_disable_conditions() {
        let cfg = AssistConfig::default();
        let empty = ConditionInputs::default();
        assert_eq!(first_on_condition(&empty, &cfg), None);
        assert_eq!(first_off_condition(&empty, &cfg), None);
    }
}
