//! One tick of telemetry: timestamp, battery triple and system metrics.

use chrono::{DateTime, Utc};

use crate::metrics::{SystemMonitor, monitor_for};
use crate::outlier::OutlierPolicy;
use crate::platform::OsFamily;
use crate::resolver::SourceResolver;
use crate::sample::TelemetrySample;
use crate::sources;

/// Composes a [`TelemetrySample`] per tick.
pub struct Sampler {
    resolver: SourceResolver,
    monitor: Box<dyn SystemMonitor>,
}

impl Sampler {
    pub fn new(resolver: SourceResolver, monitor: Box<dyn SystemMonitor>) -> Self {
        Self { resolver, monitor }
    }

    /// Sampler for the running OS, with unavailable sources dropped.
    pub fn for_current_platform() -> Self {
        let os = OsFamily::current();
        let chain = sources::for_platform(os).available();
        log::debug!("battery sources for {os}: {:?}", chain.names());
        Self::new(
            SourceResolver::new(chain, OutlierPolicy::default()),
            monitor_for(os),
        )
    }

    /// Take a sample stamped with the current time.
    pub fn sample(&mut self) -> TelemetrySample {
        self.sample_at(Utc::now())
    }

    /// Take a sample stamped `timestamp`.
    pub fn sample_at(&mut self, timestamp: DateTime<Utc>) -> TelemetrySample {
        let battery = self.resolver.resolve(timestamp);
        let system = self.monitor.read();
        TelemetrySample::from_parts(timestamp, battery, system)
    }

    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut SourceResolver {
        &mut self.resolver
    }
}
