//! Temperature trend estimation for Hestia
//!
//! One `TrendTracker` per measured series (room, loop water) converts noisy
//! periodic samples into a rate of change in °C/hour. Spikes are trimmed with
//! a median/MAD filter before a least-squares fit, so a single bad reading
//! cannot swing the slope, while a genuine step change keeps enough history
//! to register.

/// Threshold applied when the MAD collapses to zero (identical samples).
const ZERO_MAD_THRESHOLD: f64 = 0.5;

/// Deviation multiplier for the MAD outlier cut.
const MAD_MULTIPLIER: f64 = 3.0;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at_s: f64,
    value: f64,
}

/// Rolling sample history with derivative estimation.
///
/// Timestamps are seconds on the caller's monotonic clock; the tracker only
/// ever compares differences.
#[derive(Debug)]
pub struct TrendTracker {
    window_s: f64,
    samples: Vec<Sample>,
}

impl TrendTracker {
    /// Create a tracker over a rolling window of `window_seconds`.
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window_s: window_seconds as f64,
            samples: Vec::new(),
        }
    }

    /// Advance the history and estimate the current derivative in °C/hour.
    ///
    /// Entries older than the window are pruned and the new reading, when
    /// present and finite, is appended. Returns `None` when the reading is
    /// absent, fewer than 2 samples remain, or the retained timestamps are
    /// degenerate. History mutation is the side effect the next call builds
    /// on.
    pub fn update(&mut self, now_s: f64, reading: Option<f64>) -> Option<f64> {
        let window = self.window_s;
        self.samples.retain(|s| now_s - s.at_s <= window);

        let value = reading.filter(|v| v.is_finite())?;
        self.samples.push(Sample {
            at_s: now_s,
            value,
        });

        if self.samples.len() < 2 {
            return None;
        }

        if self.samples.len() >= 3 {
            let values: Vec<f64> = self.samples.iter().map(|s| s.value).collect();
            let center = median(&values);
            let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
            let mad = median(&deviations);
            let threshold = if mad == 0.0 {
                ZERO_MAD_THRESHOLD
            } else {
                MAD_MULTIPLIER * mad
            };

            let filtered: Vec<Sample> = self
                .samples
                .iter()
                .copied()
                .filter(|s| (s.value - center).abs() <= threshold)
                .collect();
            // Keep the unfiltered set when trimming would leave too little:
            // a genuine step change must not erase the history.
            if filtered.len() >= 2 {
                self.samples = filtered;
            }
        }

        self.slope().map(|per_second| per_second * 3600.0)
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Least-squares slope in °C/second over the retained samples.
    fn slope(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let x0 = self.samples[0].at_s;
        let n = self.samples.len() as f64;

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_xx = 0.0;
        for s in &self.samples {
            let x = s.at_s - x0;
            sum_x += x;
            sum_y += s.value;
            sum_xy += x * s.value;
            sum_xx += x * x;
        }

        let denominator = n * sum_xx - sum_x * sum_x;
        if denominator == 0.0 {
            return None;
        }
        Some((n * sum_xy - sum_x * sum_y) / denominator)
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_point_slope_matches_rate() {
        let mut tracker = TrendTracker::new(900);
        assert_eq!(tracker.update(0.0, Some(20.0)), None);
        let derivative = tracker.update(600.0, Some(21.0)).unwrap();
        assert!((derivative - 6.0).abs() < 1e-9);
    }

    #[test]
    fn missing_reading_degrades_to_none() {
        let mut tracker = TrendTracker::new(900);
        tracker.update(0.0, Some(20.0));
        tracker.update(60.0, Some(20.5));
        assert_eq!(tracker.update(120.0, None), None);
        // History is intact for the next reading
        assert_eq!(tracker.len(), 2);
        assert!(tracker.update(180.0, Some(21.0)).is_some());
    }

    #[test]
    fn non_finite_reading_is_ignored() {
        let mut tracker = TrendTracker::new(900);
        tracker.update(0.0, Some(20.0));
        assert_eq!(tracker.update(60.0, Some(f64::NAN)), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn spike_is_trimmed_from_history() {
        let mut tracker = TrendTracker::new(900);
        for i in 0..5 {
            tracker.update(f64::from(i) * 60.0, Some(20.0));
        }
        let derivative = tracker.update(300.0, Some(30.0)).unwrap();
        assert!(derivative.abs() < 1e-9);
        // The spike was dropped, not just ignored
        assert_eq!(tracker.len(), 5);
    }

    #[test]
    fn consistent_movement_survives_the_filter() {
        let mut tracker = TrendTracker::new(900);
        tracker.update(0.0, Some(19.0));
        tracker.update(300.0, Some(20.0));
        let derivative = tracker.update(600.0, Some(21.0)).unwrap();
        assert!((derivative - 12.0).abs() < 1e-9);
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn duplicate_timestamps_are_degenerate() {
        let mut tracker = TrendTracker::new(900);
        tracker.update(100.0, Some(20.0));
        assert_eq!(tracker.update(100.0, Some(21.0)), None);
    }

    #[test]
    fn old_samples_fall_out_of_the_window() {
        let mut tracker = TrendTracker::new(900);
        tracker.update(0.0, Some(20.0));
        assert_eq!(tracker.update(1000.0, Some(21.0)), None);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn clear_drops_history() {
        let mut tracker = TrendTracker::new(900);
        tracker.update(0.0, Some(20.0));
        tracker.update(60.0, Some(21.0));
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
