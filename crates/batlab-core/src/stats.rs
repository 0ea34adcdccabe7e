//! Per-run statistics.
//!
//! [`summarize_with`] reduces one run's samples to a [`RunSummary`]:
//!
//! 1. keep samples with a percentage in `[0, 100]` and watts in `[0, ceiling)`,
//!    dropping `slope` ticks that carry no estimate (0 W);
//! 2. reject the run if fewer than `min_valid_samples` remain;
//! 3. average watts, load, RAM and temperature over valid samples;
//! 4. median and 95th percentile of watts by linear interpolation;
//! 5. duration from timestamps when they are consistent, else from the
//!    nominal sampling interval;
//! 6. percentage drop from the first to the last valid sample, clamped at 0.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::sample::{SourceTag, TelemetrySample};

/// Default nominal interval between samples (one per minute).
pub const DEFAULT_INTERVAL_SECS: f64 = 60.0;

/// Fraction of valid samples below which a run is low-confidence.
pub const LOW_CONFIDENCE_RATIO: f64 = 0.5;

/// Configuration for summarizing runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisConfig {
    pub min_valid_samples: usize,
    /// Sanity ceiling for offline validity, deliberately looser than the
    /// live outlier ceiling.
    pub watts_ceiling: f64,
    /// Seconds between samples, used when timestamps cannot be trusted.
    pub nominal_interval_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_valid_samples: 10,
            watts_ceiling: 100.0,
            nominal_interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl AnalysisConfig {
    /// Derive the nominal interval from a recorded sampling rate.
    pub fn with_sampling_hz(mut self, hz: Option<f64>) -> Self {
        self.nominal_interval_secs = hz
            .filter(|h| h.is_finite() && *h > 0.0)
            .map(|h| 1.0 / h)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        self
    }
}

/// Where a run's duration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationSource {
    Timestamps,
    NominalRate,
}

/// Statistics for one run. Derived on every pass; never persisted as truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub samples_total: usize,
    pub samples_valid: usize,
    pub avg_watts: f64,
    pub median_watts: f64,
    pub p95_watts: f64,
    pub avg_cpu_load: f64,
    pub avg_ram_pct: f64,
    pub avg_temp_c: f64,
    pub start_pct: Option<f64>,
    pub end_pct: Option<f64>,
    pub pct_drop: f64,
    pub duration_s: f64,
    pub duration_source: DurationSource,
    /// Valid samples whose watts came from slope estimation.
    pub estimated_samples: usize,
    pub low_confidence: bool,
    /// Percentage rose over the run, or charging ticks were logged.
    pub charging_contaminated: bool,
    pub malformed_lines: usize,
}

/// Percentile of an ascending slice by linear interpolation.
///
/// `index = p * (n - 1)`; a fractional index interpolates between the two
/// bracketing order statistics. Empty input yields 0.0; `p` is clamped to
/// `[0, 1]`.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) };
    let index = p * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

/// Whether a sample counts towards statistics.
pub fn is_valid(sample: &TelemetrySample, watts_ceiling: f64) -> bool {
    let pct_ok = sample
        .percentage
        .is_some_and(|p| p.is_finite() && (0.0..=100.0).contains(&p));
    let watts_ok = sample.watts.is_finite() && sample.watts >= 0.0 && sample.watts < watts_ceiling;
    // A slope tick without an estimate is missing data, not 0 W.
    let estimated_ok = !(sample.source == SourceTag::Slope && sample.watts == 0.0);
    let rest_ok =
        sample.cpu_load.is_finite() && sample.ram_pct.is_finite() && sample.temp_c.is_finite();
    pct_ok && watts_ok && estimated_ok && rest_ok
}

/// Summarize with default settings and a custom minimum.
pub fn summarize(
    samples: &[TelemetrySample],
    min_valid_samples: usize,
) -> Result<RunSummary, AnalysisError> {
    let config = AnalysisConfig {
        min_valid_samples,
        ..AnalysisConfig::default()
    };
    summarize_with(samples, 0, &config)
}

/// Summarize a run. `extra_total` counts log lines that failed to parse;
/// they add to `samples_total` but can never be valid.
pub fn summarize_with(
    samples: &[TelemetrySample],
    extra_total: usize,
    config: &AnalysisConfig,
) -> Result<RunSummary, AnalysisError> {
    let total = samples.len() + extra_total;
    if total == 0 {
        return Err(AnalysisError::NoSamples);
    }

    let valid: Vec<&TelemetrySample> = samples
        .iter()
        .filter(|s| is_valid(s, config.watts_ceiling))
        .collect();

    let required = config.min_valid_samples.max(1);
    if valid.len() < required {
        return Err(AnalysisError::InsufficientSamples {
            valid: valid.len(),
            required: config.min_valid_samples,
        });
    }

    let mut watts: Vec<f64> = valid.iter().map(|s| s.watts).collect();
    watts.sort_by(f64::total_cmp);

    let start_pct = valid.first().and_then(|s| s.percentage);
    let end_pct = valid.last().and_then(|s| s.percentage);
    let raw_drop = match (start_pct, end_pct) {
        (Some(a), Some(b)) => a - b,
        _ => 0.0,
    };
    let saw_charging = samples.iter().any(|s| s.source == SourceTag::Charging);

    let (duration_s, duration_source) = duration(&valid, config.nominal_interval_secs);

    Ok(RunSummary {
        samples_total: total,
        samples_valid: valid.len(),
        avg_watts: mean(valid.iter().map(|s| s.watts)),
        median_watts: percentile(&watts, 0.5),
        p95_watts: percentile(&watts, 0.95),
        avg_cpu_load: mean(valid.iter().map(|s| s.cpu_load)),
        avg_ram_pct: mean(valid.iter().map(|s| s.ram_pct)),
        avg_temp_c: mean(valid.iter().map(|s| s.temp_c)),
        start_pct,
        end_pct,
        pct_drop: raw_drop.max(0.0),
        duration_s,
        duration_source,
        estimated_samples: valid.iter().filter(|s| s.source == SourceTag::Slope).count(),
        low_confidence: (valid.len() as f64) / (total as f64) < LOW_CONFIDENCE_RATIO,
        charging_contaminated: raw_drop < 0.0 || saw_charging,
        malformed_lines: extra_total,
    })
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

/// Elapsed seconds, preferring timestamps when they are consistent.
fn duration(valid: &[&TelemetrySample], nominal_interval_secs: f64) -> (f64, DurationSource) {
    if valid.len() >= 2 {
        let ordered = valid.windows(2).all(|w| w[0].timestamp <= w[1].timestamp);
        if let (true, Some(first), Some(last)) = (ordered, valid.first(), valid.last()) {
            let span = (last.timestamp - first.timestamp).num_milliseconds() as f64 / 1000.0;
            if span > 0.0 {
                return (span, DurationSource::Timestamps);
            }
        }
    }
    (
        valid.len() as f64 * nominal_interval_secs,
        DurationSource::NominalRate,
    )
}
