//! Continuous logging sessions.
//!
//! A [`LogSession`] owns everything one run needs: the sampler, the sink and
//! a [`CancelToken`]. Cancellation is cooperative: the token is checked once
//! per tick and between sleep slices, so a tick in progress always finishes
//! writing before the log is flushed and closed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;

use crate::error::{ConfigError, SessionError};
use crate::identity::{RunIdentity, validate_label};
use crate::platform::{OsFamily, detect_system_info};
use crate::resolver::{Readiness, ResolverStats};
use crate::sample::RunMetadata;
use crate::sampler::Sampler;
use crate::sink::{DEFAULT_FLUSH_EVERY, SampleSink, sidecar_path, write_metadata};

/// Supported sampling frequency range, in Hz.
pub const MIN_HZ: f64 = 0.01;
pub const MAX_HZ: f64 = 10.0;

/// One sample per minute.
pub const DEFAULT_HZ: f64 = 1.0 / 60.0;

const SLEEP_SLICE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared stop flag, set from a signal handler and polled by the loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Sleep for `total`, waking every 100 ms to honor cancellation.
/// Returns `false` if cancelled.
pub fn sleep_cancellable(total: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for a logging run.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Configuration label, e.g. `powersave`.
    pub config: String,
    pub workload: Option<String>,
    pub sampling_hz: f64,
    /// Explicit log path; defaults to `<data_dir>/<run_id>.jsonl`.
    pub output: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub flush_every: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            config: "default".to_string(),
            workload: None,
            sampling_hz: DEFAULT_HZ,
            output: None,
            data_dir: PathBuf::from("data"),
            flush_every: DEFAULT_FLUSH_EVERY,
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_label("config", &self.config)?;
        if let Some(workload) = &self.workload {
            validate_label("workload", workload)?;
        }
        if !(MIN_HZ..=MAX_HZ).contains(&self.sampling_hz) {
            return Err(ConfigError::FrequencyOutOfRange(self.sampling_hz));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sampling_hz)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// What a finished session did.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub run_id: String,
    pub log_path: PathBuf,
    pub ticks_written: u64,
    pub write_errors: u64,
    pub elapsed_secs: f64,
    pub resolver: ResolverStats,
}

/// One continuous logging run.
pub struct LogSession {
    identity: RunIdentity,
    metadata: RunMetadata,
    sampler: Sampler,
    sink: SampleSink,
    cancel: CancelToken,
    interval: Duration,
}

impl LogSession {
    /// Validate the config, check that a battery reader works, write the
    /// sidecar and open the log.
    ///
    /// Nothing is written when no primary reader produces a reading.
    pub fn start(
        config: &LogConfig,
        mut sampler: Sampler,
        cancel: CancelToken,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        if !sampler.resolver().has_sources() {
            return Err(SessionError::NoSources);
        }
        match sampler.resolver_mut().check_ready() {
            Readiness::Ready => {}
            Readiness::Charging => log::warn!(
                "battery is charging; unplug AC power, ticks on AC carry no discharge data"
            ),
            Readiness::NoReading => return Err(SessionError::NoSources),
        }

        let system = detect_system_info();
        let started = Utc::now();
        let identity = RunIdentity::new(
            started,
            &system.hostname,
            OsFamily::current().label(),
            &config.config,
            config.workload.as_deref(),
        );
        let log_path = config
            .output
            .clone()
            .unwrap_or_else(|| config.data_dir.join(format!("{}.jsonl", identity.run_id)));

        let metadata = RunMetadata {
            run_id: identity.run_id.clone(),
            host: system.hostname,
            os: system.os,
            kernel: system.kernel,
            cpu: system.cpu,
            machine: system.machine,
            config: identity.config.clone(),
            workload: identity.workload.clone(),
            start_time: Some(started),
            sampling_hz: Some(config.sampling_hz),
            battery_capacity: sampler.resolver().capacity(),
            batlab_version: Some(crate::VERSION.to_string()),
        };
        write_metadata(&sidecar_path(&log_path), &metadata)?;
        let sink = SampleSink::create(&log_path, config.flush_every)?;

        log::info!(
            "logging run {} to {} every {:.1}s via {:?}",
            identity.run_id,
            log_path.display(),
            1.0 / config.sampling_hz,
            sampler.resolver().source_names()
        );

        Ok(Self {
            identity,
            metadata,
            sampler,
            sink,
            cancel,
            interval: config.interval(),
        })
    }

    pub fn identity(&self) -> &RunIdentity {
        &self.identity
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn log_path(&self) -> &Path {
        self.sink.path()
    }

    /// Tick until cancelled or `max_ticks` samples were attempted.
    ///
    /// A failed write is logged and counted; sampling carries on.
    pub fn run(mut self, max_ticks: Option<u64>) -> Result<SessionReport, SessionError> {
        let started = Instant::now();
        let mut attempted: u64 = 0;
        let mut write_errors: u64 = 0;

        while !self.cancel.is_cancelled() {
            let tick_start = Instant::now();
            let sample = self.sampler.sample();
            match self.sink.append(&sample) {
                Ok(()) => log::debug!(
                    "tick {}: pct={:?} watts={:.2} src={}",
                    attempted + 1,
                    sample.percentage,
                    sample.watts,
                    sample.source
                ),
                Err(e) => {
                    write_errors += 1;
                    log::error!("failed to write sample: {e}");
                }
            }
            attempted += 1;

            if max_ticks.is_some_and(|max| attempted >= max) {
                break;
            }
            let remaining = self.interval.saturating_sub(tick_start.elapsed());
            if !sleep_cancellable(remaining, &self.cancel) {
                break;
            }
        }

        let run_id = self.identity.run_id.clone();
        let log_path = self.sink.path().to_path_buf();
        let resolver = self.sampler.resolver().stats().clone();
        let ticks_written = self.sink.finish()?;

        log::info!(
            "run {run_id} finished: {ticks_written} samples, {} slope fallbacks, {} rejected outliers",
            resolver.fallbacks,
            resolver.rejected_outliers
        );

        Ok(SessionReport {
            run_id,
            log_path,
            ticks_written,
            write_errors,
            elapsed_secs: started.elapsed().as_secs_f64(),
            resolver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::metrics::NullMonitor;
    use crate::outlier::OutlierPolicy;
    use crate::platform::OsFamily;
    use crate::resolver::SourceResolver;
    use crate::sample::{BatteryReading, SourceTag};
    use crate::source::{BatterySource, SourceInfo, SourceRole};
    use crate::sources::SourceChain;

    /// Reader that always returns the same result.
    struct Constant {
        info: SourceInfo,
        result: fn() -> Result<BatteryReading, SourceError>,
    }

    impl BatterySource for Constant {
        fn info(&self) -> &SourceInfo {
            &self.info
        }

        fn is_available(&self) -> bool {
            true
        }

        fn read(&self) -> Result<BatteryReading, SourceError> {
            (self.result)()
        }
    }

    fn sampler_with(result: fn() -> Result<BatteryReading, SourceError>) -> Sampler {
        let source = Constant {
            info: SourceInfo {
                name: "constant",
                description: "fixed result",
                tag: SourceTag::Upower,
                platform: OsFamily::Linux,
                role: SourceRole::Primary,
            },
            result,
        };
        let chain = SourceChain::from_sources(vec![Box::new(source)]);
        Sampler::new(
            SourceResolver::new(chain, OutlierPolicy::default()),
            Box::new(NullMonitor),
        )
    }

    fn config_in(dir: &Path) -> LogConfig {
        LogConfig {
            data_dir: dir.to_path_buf(),
            ..LogConfig::default()
        }
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_sleep_cancellable_returns_early() {
        let token = CancelToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(!sleep_cancellable(Duration::from_secs(5), &token));
        assert!(start.elapsed() < Duration::from_secs(1));

        assert!(sleep_cancellable(Duration::from_millis(10), &CancelToken::new()));
    }

    #[test]
    fn test_config_validation() {
        assert!(LogConfig::default().validate().is_ok());

        let bad_hz = LogConfig {
            sampling_hz: 20.0,
            ..LogConfig::default()
        };
        assert!(matches!(
            bad_hz.validate(),
            Err(ConfigError::FrequencyOutOfRange(_))
        ));

        let bad_label = LogConfig {
            workload: Some("web_browse".to_string()),
            ..LogConfig::default()
        };
        assert!(matches!(
            bad_label.validate(),
            Err(ConfigError::InvalidLabel { kind: "workload", .. })
        ));
    }

    #[test]
    fn test_interval() {
        let config = LogConfig {
            sampling_hz: 2.0,
            ..LogConfig::default()
        };
        assert_eq!(config.interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_start_without_sources_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            data_dir: dir.path().to_path_buf(),
            ..LogConfig::default()
        };
        let sampler = Sampler::new(
            SourceResolver::new(SourceChain::default(), OutlierPolicy::default()),
            Box::new(NullMonitor),
        );
        assert!(matches!(
            LogSession::start(&config, sampler, CancelToken::new()),
            Err(SessionError::NoSources)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    // -----------------------------------------------------------------------
    // Pre-flight read
    // -----------------------------------------------------------------------

    #[test]
    fn test_start_without_battery_fails() {
        // A reader that is installed but finds no battery device.
        let dir = tempfile::tempdir().unwrap();
        let sampler =
            sampler_with(|| Err(SourceError::unavailable("constant", "no battery device")));
        assert!(matches!(
            LogSession::start(&config_in(dir.path()), sampler, CancelToken::new()),
            Err(SessionError::NoSources)
        ));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_start_while_charging_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = sampler_with(|| Err(SourceError::Charging { reader: "constant" }));
        let session = LogSession::start(&config_in(dir.path()), sampler, CancelToken::new())
            .expect("charging should only warn");
        assert!(sidecar_path(session.log_path()).exists());

        let report = session.run(Some(1)).unwrap();
        assert_eq!(report.ticks_written, 1);
        assert_eq!(report.resolver.wins_for(SourceTag::Charging), 1);
    }

    #[test]
    fn test_start_with_reading_proceeds() {
        let dir = tempfile::tempdir().unwrap();
        let sampler = sampler_with(|| Ok(BatteryReading::new(75.0, 6.5, SourceTag::Upower)));
        let session =
            LogSession::start(&config_in(dir.path()), sampler, CancelToken::new()).unwrap();
        assert_eq!(session.sampler.resolver().stats().ticks, 0);
        assert!(session.log_path().exists());
    }
}
