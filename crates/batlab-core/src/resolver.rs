//! Battery source resolution.
//!
//! Each tick the resolver walks the primary readers in priority order and
//! returns the first acceptable reading. Readings are screened by the
//! [`OutlierPolicy`]: negative values are dropped, and suspect values (above
//! the ceiling or Hampel outliers) need another source to agree within the
//! same tick. When nothing wins, power is estimated from the percentage
//! slope between recent ticks.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SourceError;
use crate::outlier::{HampelWindow, OutlierPolicy, Verdict};
use crate::sample::{BatteryCapacity, BatteryReading, SourceTag};
use crate::source::{BatterySource, SourceInfo};
use crate::sources::SourceChain;

/// Counters reported at the end of a logging session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub ticks: u64,
    /// Ticks won per source tag (including `slope`, `charging` and `none`).
    pub wins: BTreeMap<String, u64>,
    /// Readings dropped as negative, non-finite or uncorroborated suspects.
    pub rejected_outliers: u64,
    /// Suspect readings accepted because another source agreed.
    pub corroborated: u64,
    /// Ticks that fell back to slope estimation.
    pub fallbacks: u64,
}

impl ResolverStats {
    fn record_win(&mut self, tag: SourceTag) {
        *self.wins.entry(tag.to_string()).or_insert(0) += 1;
    }

    pub fn wins_for(&self, tag: SourceTag) -> u64 {
        self.wins.get(&tag.to_string()).copied().unwrap_or(0)
    }
}

/// Result of a pre-flight read of the primary sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// At least one primary produced a reading.
    Ready,
    /// A primary reported the machine on AC.
    Charging,
    /// No primary produced anything.
    NoReading,
}

/// What one source produced this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Outcome {
    Reading(BatteryReading),
    Charging,
    Failed,
}

/// Per-OS fallback chain with outlier screening and slope estimation.
pub struct SourceResolver {
    /// Primaries first, then corroborators.
    sources: Vec<Box<dyn BatterySource>>,
    primary_count: usize,
    /// Sources that failed with a permission error; skipped from then on.
    disabled: Vec<bool>,
    policy: OutlierPolicy,
    window: HampelWindow,
    history: VecDeque<(DateTime<Utc>, f64)>,
    capacity: Option<BatteryCapacity>,
    stats: ResolverStats,
}

impl SourceResolver {
    /// Build a resolver and resolve battery capacity once.
    pub fn new(chain: SourceChain, policy: OutlierPolicy) -> Self {
        let primary_count = chain.primary.len();
        let sources: Vec<Box<dyn BatterySource>> =
            chain.primary.into_iter().chain(chain.corroborators).collect();

        let capacity = sources
            .iter()
            .filter_map(|s| s.capacity())
            .find(|c| c.effective_wh().is_some());
        match capacity.and_then(|c| c.effective_wh()) {
            Some(wh) => log::info!("battery capacity {wh:.2} Wh (used for slope estimation)"),
            None if !sources.is_empty() => {
                log::info!("battery capacity unknown; slope fallback will report 0 W")
            }
            None => {}
        }

        Self {
            disabled: vec![false; sources.len()],
            sources,
            primary_count,
            window: HampelWindow::new(policy.window),
            history: VecDeque::with_capacity(policy.window),
            policy,
            capacity,
            stats: ResolverStats::default(),
        }
    }

    /// Override the capacity used for slope estimation.
    pub fn with_capacity(mut self, capacity: Option<BatteryCapacity>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn capacity(&self) -> Option<BatteryCapacity> {
        self.capacity
    }

    pub fn stats(&self) -> &ResolverStats {
        &self.stats
    }

    pub fn has_sources(&self) -> bool {
        self.primary_count > 0
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub fn source_infos(&self) -> Vec<&SourceInfo> {
        self.sources.iter().map(|s| s.info()).collect()
    }

    /// Read every primary once without touching tick state.
    ///
    /// A reading from any primary wins over a charging report, so a machine
    /// with one usable reader is ready even if another reader sees AC.
    pub fn check_ready(&mut self) -> Readiness {
        let mut outcomes: Vec<Option<Outcome>> = vec![None; self.sources.len()];
        let mut charging = false;
        for idx in 0..self.primary_count {
            match self.poll(idx, &mut outcomes) {
                Outcome::Reading(_) => return Readiness::Ready,
                Outcome::Charging => charging = true,
                Outcome::Failed => {}
            }
        }
        if charging {
            Readiness::Charging
        } else {
            Readiness::NoReading
        }
    }

    /// Resolve the battery triple for a tick stamped `now`.
    ///
    /// Never fails: the worst case is `{pct: None, watts: 0}` tagged `slope`
    /// (or `none` when the platform has no readers at all).
    pub fn resolve(&mut self, now: DateTime<Utc>) -> BatteryReading {
        self.stats.ticks += 1;

        if self.primary_count == 0 {
            self.stats.record_win(SourceTag::None);
            return BatteryReading::empty(SourceTag::None);
        }

        let mut outcomes: Vec<Option<Outcome>> = vec![None; self.sources.len()];
        let mut observed_pct: Option<f64> = None;

        for idx in 0..self.primary_count {
            let reading = match self.poll(idx, &mut outcomes) {
                Outcome::Charging => return self.charging_tick(),
                Outcome::Failed => continue,
                Outcome::Reading(r) => r,
            };
            observed_pct = observed_pct.or(reading.percentage);

            let verdict = self.policy.classify(reading.watts, &self.window);
            if self.policy.admits(reading.watts) {
                self.window.push(reading.watts);
            }

            let accepted = match verdict {
                Verdict::Accept => true,
                Verdict::Reject => false,
                Verdict::Suspect(why) => {
                    let ok = self.corroborated(idx, reading.watts, &mut outcomes);
                    if ok {
                        self.stats.corroborated += 1;
                    } else {
                        log::debug!(
                            "{}: {:.2} W rejected ({why:?}, no corroborating source)",
                            self.sources[idx].name(),
                            reading.watts
                        );
                    }
                    ok
                }
            };

            if accepted {
                if let Some(pct) = reading.percentage {
                    self.remember(now, pct);
                }
                self.stats.record_win(reading.source);
                return reading;
            }
            self.stats.rejected_outliers += 1;
        }

        self.slope_tick(now, observed_pct)
    }

    /// Read source `idx` at most once per tick.
    fn poll(&mut self, idx: usize, outcomes: &mut [Option<Outcome>]) -> Outcome {
        if let Some(outcome) = outcomes[idx] {
            return outcome;
        }
        let outcome = if self.disabled[idx] {
            Outcome::Failed
        } else {
            match self.sources[idx].read() {
                Ok(reading) => Outcome::Reading(reading),
                Err(SourceError::Charging { .. }) => Outcome::Charging,
                Err(SourceError::PermissionDenied { reader, hint }) => {
                    log::warn!(
                        "permission denied reading {reader}; skipping it for the rest of this run. \
                         Remedy: {hint}"
                    );
                    self.disabled[idx] = true;
                    Outcome::Failed
                }
                Err(e) => {
                    log::debug!("{e}");
                    Outcome::Failed
                }
            }
        };
        outcomes[idx] = Some(outcome);
        outcome
    }

    /// Whether any other source reports similar watts this tick.
    fn corroborated(&mut self, idx: usize, watts: f64, outcomes: &mut [Option<Outcome>]) -> bool {
        (0..self.sources.len())
            .filter(|&other| other != idx)
            .any(|other| match self.poll(other, outcomes) {
                Outcome::Reading(r) => self.policy.corroborates(watts, r.watts),
                _ => false,
            })
    }

    fn remember(&mut self, now: DateTime<Utc>, pct: f64) {
        if self.history.len() == self.policy.window.max(2) {
            self.history.pop_front();
        }
        self.history.push_back((now, pct));
    }

    fn charging_tick(&mut self) -> BatteryReading {
        self.history.clear();
        self.stats.record_win(SourceTag::Charging);
        BatteryReading::empty(SourceTag::Charging)
    }

    fn slope_tick(&mut self, now: DateTime<Utc>, observed_pct: Option<f64>) -> BatteryReading {
        self.stats.fallbacks += 1;
        self.stats.record_win(SourceTag::Slope);

        let points = match (observed_pct, self.history.back()) {
            (Some(pct), Some(&newest)) => Some((newest, (now, pct))),
            (Some(_), None) => None,
            (None, _) => {
                let n = self.history.len();
                (n >= 2).then(|| (self.history[n - 2], self.history[n - 1]))
            }
        };
        let mut watts = match (points, self.capacity.and_then(|c| c.effective_wh())) {
            (Some((old, new)), Some(wh)) => slope_watts(old, new, wh),
            _ => 0.0,
        };
        if !self.policy.admits(watts) {
            log::debug!("slope estimate {watts:.2} W above ceiling; reporting 0 W");
            self.stats.rejected_outliers += 1;
            watts = 0.0;
        }

        if let Some(pct) = observed_pct {
            self.remember(now, pct);
        }
        BatteryReading {
            percentage: observed_pct,
            watts,
            source: SourceTag::Slope,
        }
    }
}

/// Discharge power implied by two `(time, percentage)` points.
///
/// Returns 0 for a non-positive interval or a rising percentage.
pub fn slope_watts(
    old: (DateTime<Utc>, f64),
    new: (DateTime<Utc>, f64),
    capacity_wh: f64,
) -> f64 {
    let hours = (new.0 - old.0).num_milliseconds() as f64 / 3_600_000.0;
    if hours <= 0.0 || !capacity_wh.is_finite() {
        return 0.0;
    }
    let watts = (old.1 - new.1) / 100.0 * capacity_wh / hours;
    if watts.is_finite() { watts.max(0.0) } else { 0.0 }
}
