//! Plausibility bounds and a rolling Hampel filter for live power readings.
//!
//! A reading is classified before it can win a tick:
//!
//! - negative or non-finite: rejected outright;
//! - above the ceiling, or more than `threshold` scaled MADs from the rolling
//!   median: suspect, accepted only when another source corroborates it;
//! - otherwise accepted.
//!
//! Every plausible reading (within `[0, ceiling]`) enters the window, so a
//! genuine step change becomes the new baseline after a few ticks.

use std::collections::VecDeque;

use crate::stats::percentile;

/// Consistency constant turning a MAD into a normal-distribution sigma.
const MAD_SCALE: f64 = 1.4826;

/// Tunables for live outlier handling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierPolicy {
    /// Rolling window length, in accepted ticks.
    pub window: usize,
    /// Below this many points the Hampel test never fires.
    pub min_points: usize,
    /// Multiples of the scaled MAD tolerated around the median.
    pub threshold: f64,
    /// Lower bound on the scaled MAD in watts; a perfectly flat idle trace
    /// would otherwise flag 0.1 W of jitter.
    pub mad_floor_w: f64,
    /// Implausible power for laptop-class hardware.
    pub ceiling_w: f64,
    /// Relative agreement a corroborating source must reach.
    pub corroboration_tolerance: f64,
}

impl Default for OutlierPolicy {
    fn default() -> Self {
        Self {
            window: 15,
            min_points: 5,
            threshold: 3.0,
            mad_floor_w: 0.5,
            ceiling_w: 60.0,
            corroboration_tolerance: 0.15,
        }
    }
}

/// Why a reading needs corroboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspicion {
    AboveCeiling,
    Hampel,
}

/// Outcome of classifying one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Suspect(Suspicion),
    Reject,
}

impl OutlierPolicy {
    /// Classify `watts` against the bounds and the current window.
    pub fn classify(&self, watts: f64, window: &HampelWindow) -> Verdict {
        if !watts.is_finite() || watts < 0.0 {
            return Verdict::Reject;
        }
        if watts > self.ceiling_w {
            return Verdict::Suspect(Suspicion::AboveCeiling);
        }
        if window.is_outlier(watts, self) {
            return Verdict::Suspect(Suspicion::Hampel);
        }
        Verdict::Accept
    }

    /// Whether `other` agrees with `suspect` within the relative tolerance.
    pub fn corroborates(&self, suspect: f64, other: f64) -> bool {
        if !suspect.is_finite() || !other.is_finite() || other < 0.0 {
            return false;
        }
        let scale = suspect.abs().max(other.abs());
        if scale == 0.0 {
            return true;
        }
        (suspect - other).abs() <= self.corroboration_tolerance * scale
    }

    /// Whether a reading may enter the rolling window.
    pub fn admits(&self, watts: f64) -> bool {
        watts.is_finite() && (0.0..=self.ceiling_w).contains(&watts)
    }
}

/// Bounded window of recent plausible watts readings.
#[derive(Debug, Clone)]
pub struct HampelWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl HampelWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, watts: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(watts);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Median of the window, `None` when empty.
    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        Some(percentile(&sorted, 0.5))
    }

    /// Median absolute deviation around the window median.
    pub fn mad(&self) -> Option<f64> {
        let median = self.median()?;
        let mut deviations: Vec<f64> = self.values.iter().map(|v| (v - median).abs()).collect();
        deviations.sort_by(f64::total_cmp);
        Some(percentile(&deviations, 0.5))
    }

    /// Hampel test for `watts` against the current contents.
    pub fn is_outlier(&self, watts: f64, policy: &OutlierPolicy) -> bool {
        if self.values.len() < policy.min_points {
            return false;
        }
        let (Some(median), Some(mad)) = (self.median(), self.mad()) else {
            return false;
        };
        let scale = (MAD_SCALE * mad).max(policy.mad_floor_w);
        (watts - median).abs() > policy.threshold * scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(values: &[f64]) -> HampelWindow {
        let mut w = HampelWindow::new(15);
        for v in values {
            w.push(*v);
        }
        w
    }

    // -----------------------------------------------------------------------
    // Bounds
    // -----------------------------------------------------------------------

    #[test]
    fn test_negative_and_nan_rejected() {
        let policy = OutlierPolicy::default();
        let w = HampelWindow::new(15);
        assert_eq!(policy.classify(-5.0, &w), Verdict::Reject);
        assert_eq!(policy.classify(f64::NAN, &w), Verdict::Reject);
        assert_eq!(policy.classify(f64::INFINITY, &w), Verdict::Reject);
    }

    #[test]
    fn test_above_ceiling_is_suspect() {
        let policy = OutlierPolicy::default();
        let w = HampelWindow::new(15);
        assert_eq!(
            policy.classify(200.0, &w),
            Verdict::Suspect(Suspicion::AboveCeiling)
        );
        assert_eq!(policy.classify(60.0, &w), Verdict::Accept);
        assert!(!policy.admits(200.0));
        assert!(policy.admits(0.0));
    }

    // -----------------------------------------------------------------------
    // Hampel
    // -----------------------------------------------------------------------

    #[test]
    fn test_hampel_needs_min_points() {
        let policy = OutlierPolicy::default();
        let w = window_of(&[5.0, 5.0, 5.0, 5.0]);
        assert!(!w.is_outlier(40.0, &policy));
    }

    #[test]
    fn test_hampel_flags_spike() {
        let policy = OutlierPolicy::default();
        let w = window_of(&[5.0, 5.1, 4.9, 5.0, 5.2, 4.8, 5.0]);
        assert!(w.is_outlier(30.0, &policy));
        assert_eq!(policy.classify(30.0, &w), Verdict::Suspect(Suspicion::Hampel));
        // Within the 1.5 W band implied by the MAD floor.
        assert!(!w.is_outlier(6.2, &policy));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut w = HampelWindow::new(3);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            w.push(v);
        }
        assert_eq!(w.len(), 3);
        assert_eq!(w.median(), Some(4.0));
    }

    #[test]
    fn test_step_change_becomes_baseline() {
        let policy = OutlierPolicy::default();
        let mut w = window_of(&[5.0; 10]);
        assert!(w.is_outlier(20.0, &policy));
        for _ in 0..10 {
            w.push(20.0);
        }
        assert!(!w.is_outlier(20.0, &policy));
    }

    #[test]
    fn test_median_and_mad() {
        let w = window_of(&[1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_eq!(w.median(), Some(3.0));
        assert_eq!(w.mad(), Some(1.0));
        assert_eq!(HampelWindow::new(5).median(), None);
    }

    // -----------------------------------------------------------------------
    // Corroboration
    // -----------------------------------------------------------------------

    #[test]
    fn test_corroboration_tolerance() {
        let policy = OutlierPolicy::default();
        assert!(policy.corroborates(70.0, 65.0));
        assert!(!policy.corroborates(70.0, 50.0));
        assert!(!policy.corroborates(70.0, f64::NAN));
        assert!(policy.corroborates(0.0, 0.0));
    }
}
