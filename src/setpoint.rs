//! Setpoint band clamping and time-to-target estimation.
//!
//! Pure helpers shared by the mode resolver and the power tracker. The clamp
//! deliberately avoids `f64::clamp`: with extreme current temperatures the
//! band floor can exceed the band ceiling, and the floor must win without
//! panicking.

/// Clamp `value` into `[minimum, maximum]`, favoring the floor when the
/// bounds cross.
pub fn clamp_value(value: f64, minimum: f64, maximum: f64) -> f64 {
    minimum.max(value.min(maximum))
}

/// Bound a desired target into the device's safe band.
///
/// Without a target the absolute minimum is returned; without a current
/// temperature only the absolute guardrails apply. Otherwise the band is
/// `[current + lower_offset, current + upper_offset]` intersected with the
/// guardrails.
pub fn clamp_setpoint(
    target: Option<f64>,
    current_temp: Option<f64>,
    lower_offset: f64,
    upper_offset: f64,
    min_setpoint: f64,
    max_setpoint: f64,
) -> f64 {
    let Some(target) = target else {
        return min_setpoint;
    };
    let Some(current) = current_temp else {
        return clamp_value(target, min_setpoint, max_setpoint);
    };
    let floor = (current + lower_offset).max(min_setpoint);
    let ceiling = (current + upper_offset).min(max_setpoint);
    floor.max(target.min(ceiling))
}

/// Estimated hours until the measured value reaches its target.
///
/// `None` when either input is unknown, the trend is flat, or the movement
/// is away from the target.
pub fn eta_hours(delta_to_target: Option<f64>, derivative: Option<f64>) -> Option<f64> {
    let delta = delta_to_target?;
    let derivative = derivative?;
    if derivative == 0.0 {
        return None;
    }
    if delta * derivative <= 0.0 {
        // Not moving toward target
        return None;
    }
    let hours = delta / derivative;
    if hours >= 0.0 { Some(hours) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_setpoint_inside_band_passes_through() {
        let result = clamp_setpoint(Some(21.0), Some(20.0), -1.0, 2.0, 16.0, 30.0);
        assert!((result - 21.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamp_setpoint_hits_floor_and_ceiling() {
        let result = clamp_setpoint(Some(17.0), Some(20.0), -1.0, 2.0, 16.0, 30.0);
        assert!((result - 19.0).abs() < f64::EPSILON);

        let result = clamp_setpoint(Some(25.0), Some(20.0), -1.0, 2.0, 16.0, 30.0);
        assert!((result - 22.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamp_setpoint_without_target_returns_minimum() {
        let result = clamp_setpoint(None, Some(20.0), -1.0, 2.0, 16.0, 30.0);
        assert!((result - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamp_setpoint_without_current_uses_absolute_bounds() {
        let result = clamp_setpoint(Some(35.0), None, -1.0, 2.0, 16.0, 30.0);
        assert!((result - 30.0).abs() < f64::EPSILON);

        let result = clamp_setpoint(Some(10.0), None, -1.0, 2.0, 16.0, 30.0);
        assert!((result - 16.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamp_setpoint_never_exceeds_absolute_bounds() {
        let result = clamp_setpoint(Some(35.0), Some(25.0), 0.0, 10.0, 16.0, 30.0);
        assert!((result - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clamp_setpoint_respects_band_invariant() {
        for target in [14.0, 18.5, 21.0, 27.3, 33.0] {
            let current = 20.0;
            let (lower, upper) = (-1.5, 2.5);
            let (min_abs, max_abs) = (16.0, 30.0);
            let result =
                clamp_setpoint(Some(target), Some(current), lower, upper, min_abs, max_abs);
            let floor = (current + lower).max(min_abs);
            let ceiling = (current + upper).min(max_abs);
            assert!(result >= floor && result <= ceiling);
            assert!(result >= min_abs && result <= max_abs);
        }
    }

    #[test]
    fn negative_zero_lower_offset_floors_at_current() {
        let result = clamp_setpoint(Some(19.0), Some(20.0), -0.0, 2.0, 16.0, 30.0);
        assert!((result - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn eta_hours_valid_cases() {
        assert_eq!(eta_hours(Some(2.0), Some(1.0)), Some(2.0));
        assert_eq!(eta_hours(Some(-1.0), Some(-0.5)), Some(2.0));
    }

    #[test]
    fn eta_hours_rejects_flat_or_diverging_trends() {
        assert_eq!(eta_hours(Some(2.0), Some(0.0)), None);
        assert_eq!(eta_hours(Some(2.0), Some(-1.0)), None);
        assert_eq!(eta_hours(None, Some(1.0)), None);
        assert_eq!(eta_hours(Some(2.0), None), None);
    }
}
