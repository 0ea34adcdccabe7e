//! Battery source implementations.
//!
//! Each OS family has an ordered chain of readers, built once at process
//! start by [`for_platform`]:
//!
//! | OS | Primary (in order) | Corroborators |
//! |---|---|---|
//! | Linux | `upower`, `sysfs` | (the other primary) |
//! | BSD | `acpiconf` | `sysctl` |
//!
//! When every primary fails the resolver falls back to slope estimation.

pub mod acpiconf;
pub mod helpers;
pub mod sysctl;
pub mod sysfs;
pub mod upower;

pub use acpiconf::AcpiconfSource;
pub use sysctl::SysctlBatterySource;
pub use sysfs::SysfsSource;
pub use upower::UpowerSource;

use crate::error::SourceError;
use crate::platform::OsFamily;
use crate::sample::{BatteryReading, SourceTag};
use crate::source::{BatterySource, SourceRole};

/// Ordered readers for one platform.
#[derive(Default)]
pub struct SourceChain {
    /// Tried in order; the first acceptable reading wins.
    pub primary: Vec<Box<dyn BatterySource>>,
    /// Consulted only to confirm a suspect primary reading.
    pub corroborators: Vec<Box<dyn BatterySource>>,
}

impl SourceChain {
    pub fn new(
        primary: Vec<Box<dyn BatterySource>>,
        corroborators: Vec<Box<dyn BatterySource>>,
    ) -> Self {
        Self {
            primary,
            corroborators,
        }
    }

    /// Drop sources that cannot operate on this machine.
    pub fn available(self) -> Self {
        let keep = |sources: Vec<Box<dyn BatterySource>>| -> Vec<Box<dyn BatterySource>> {
            sources
                .into_iter()
                .filter(|s| {
                    let ok = s.is_available();
                    if !ok {
                        log::debug!("battery source {} not available", s.name());
                    }
                    ok
                })
                .collect()
        };
        Self {
            primary: keep(self.primary),
            corroborators: keep(self.corroborators),
        }
    }

    /// Split sources by their declared role, keeping relative order.
    pub fn from_sources(sources: Vec<Box<dyn BatterySource>>) -> Self {
        let (primary, corroborators) = sources
            .into_iter()
            .partition(|s| s.info().role == SourceRole::Primary);
        Self {
            primary,
            corroborators,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Names of all sources, primary first.
    pub fn names(&self) -> Vec<&'static str> {
        self.primary
            .iter()
            .chain(self.corroborators.iter())
            .map(|s| s.name())
            .collect()
    }
}

/// Every known reader, in priority order.
pub fn all_sources() -> Vec<Box<dyn BatterySource>> {
    vec![
        Box::new(UpowerSource::new()),
        Box::new(SysfsSource::new()),
        Box::new(AcpiconfSource::new()),
        Box::new(SysctlBatterySource::new()),
    ]
}

/// Reader chain for an OS family. Availability is not checked here.
pub fn for_platform(os: OsFamily) -> SourceChain {
    let sources = all_sources()
        .into_iter()
        .filter(|s| s.info().platform == os)
        .collect();
    SourceChain::from_sources(sources)
}

/// Turn extracted fields into a reading, or the reason there is none.
///
/// Both percentage and rate are required; a partially populated reading
/// would be misleading. Sign and plausibility of the rate are left to the
/// resolver.
pub(crate) fn assemble_reading(
    reader: &'static str,
    tag: SourceTag,
    on_ac: bool,
    percentage: Option<f64>,
    watts: Option<f64>,
) -> Result<BatteryReading, SourceError> {
    if on_ac {
        return Err(SourceError::Charging { reader });
    }
    let pct = percentage.ok_or_else(|| SourceError::unavailable(reader, "missing percentage"))?;
    if !(0.0..=100.0).contains(&pct) {
        return Err(SourceError::Parse {
            field: "percentage",
            value: pct.to_string(),
        });
    }
    let watts = watts.ok_or_else(|| SourceError::unavailable(reader, "missing discharge rate"))?;
    Ok(BatteryReading::new(pct, watts, tag))
}
