//! # batlab-core
//!
//! Battery telemetry acquisition and run analysis for laptop power research.
//!
//! `batlab-core` samples battery percentage, discharge power and basic system
//! load at a fixed cadence while a laptop runs under a named configuration,
//! appends every tick to a newline-delimited JSON log, and later reduces each
//! run to robust summary statistics for cross-configuration comparison.
//!
//! ## Quick Start
//!
//! ```no_run
//! use batlab_core::Sampler;
//!
//! // Pick the battery readers for this OS and take one sample
//! let mut sampler = Sampler::for_current_platform();
//! let sample = sampler.sample();
//! println!("{:?}% at {:.2} W via {}", sample.percentage, sample.watts, sample.source);
//! ```
//!
//! ## Architecture
//!
//! Sources → Resolver (priority, outliers, slope fallback) → Sampler → Sink
//!
//! Loader → Statistics → Report
//!
//! Every battery reader implements the [`BatterySource`] trait. The
//! [`SourceResolver`] walks an ordered [`SourceChain`] each tick, rejects
//! implausible power readings that no other source corroborates, and
//! estimates power from the percentage slope when every reader fails.
//! Analysis never trusts the live pipeline: [`summarize_with`] re-applies its
//! own validity filter to whatever is on disk.

pub mod error;
pub mod identity;
pub mod loader;
pub mod metrics;
pub mod outlier;
pub mod platform;
pub mod report;
pub mod resolver;
pub mod sample;
pub mod sampler;
pub mod session;
pub mod sink;
pub mod source;
pub mod sources;
pub mod stats;

pub use error::{AnalysisError, ConfigError, LoadError, SessionError, SinkError, SourceError};
pub use identity::{RunIdentity, generate_run_id, parse_run_id, validate_label};
pub use loader::{LoadedRun, discover_runs, load_run};
pub use metrics::{SystemMonitor, monitor_for};
pub use outlier::{HampelWindow, OutlierPolicy, Verdict};
pub use platform::{OsFamily, SystemInfo, detect_system_info};
pub use report::{BatchReport, Exclusion, GroupBy, GroupStats, RunReport, analyze_dir, write_csv};
pub use resolver::{Readiness, ResolverStats, SourceResolver};
pub use sample::{
    BatteryCapacity, BatteryReading, RunMetadata, SourceTag, SystemMetrics, TelemetrySample,
};
pub use sampler::Sampler;
pub use session::{CancelToken, LogConfig, LogSession, SessionReport};
pub use sink::{SampleSink, sidecar_path, write_metadata};
pub use source::{BatterySource, SourceInfo, SourceRole};
pub use sources::{SourceChain, for_platform};
pub use stats::{AnalysisConfig, DurationSource, RunSummary, percentile, summarize, summarize_with};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
