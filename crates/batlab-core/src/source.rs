//! Battery source trait.
//!
//! Every battery reader implements [`BatterySource`], which provides metadata
//! via [`SourceInfo`], availability checking, and a single-shot reading.

use crate::error::SourceError;
use crate::platform::OsFamily;
use crate::sample::{BatteryCapacity, BatteryReading, SourceTag};

/// How the resolver may use a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceRole {
    /// Can win a tick.
    Primary,
    /// Only confirms a suspect primary reading, never wins.
    Corroborator,
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Corroborator => write!(f, "corroborator"),
        }
    }
}

/// Metadata about a battery source.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Unique identifier (e.g. `"upower"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Tag written into samples this source wins.
    pub tag: SourceTag,
    /// Target platform.
    pub platform: OsFamily,
    pub role: SourceRole,
}

/// Trait that every battery reader must implement.
pub trait BatterySource: Send + Sync {
    /// Source metadata.
    fn info(&self) -> &SourceInfo;

    /// Check if this source can operate on the current machine.
    fn is_available(&self) -> bool;

    /// Take one reading.
    ///
    /// A reader that cannot extract both percentage and rate returns
    /// [`SourceError::Unavailable`]; a charging battery is
    /// [`SourceError::Charging`], never a value.
    fn read(&self) -> Result<BatteryReading, SourceError>;

    /// Battery energy capacity, when the source exposes it.
    fn capacity(&self) -> Option<BatteryCapacity> {
        None
    }

    /// Convenience: name from info.
    fn name(&self) -> &'static str {
        self.info().name
    }
}
