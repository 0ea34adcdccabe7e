//! Telemetry records and the per-run metadata written alongside them.
//!
//! A [`TelemetrySample`] is one line of a run log:
//!
//! ```text
//! {"t":"2025-01-15T10:30:45Z","pct":85.0,"watts":8.45,"cpu_load":0.3,"ram_pct":41.2,"temp_c":47.0,"src":"upower"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source tag
// ---------------------------------------------------------------------------

/// Which reading method produced the battery half of a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// UPower daemon (`upower -i`).
    Upower,
    /// `/sys/class/power_supply/BAT*`.
    Sysfs,
    /// FreeBSD `acpiconf -i 0`.
    Acpiconf,
    /// FreeBSD `hw.acpi.battery.*` sysctls.
    Sysctl,
    /// Watts estimated from the percentage slope between ticks.
    Slope,
    /// Battery was charging; the tick carries no discharge data.
    Charging,
    /// No battery source at all.
    None,
    /// Tag written by a different tool version.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upower => write!(f, "upower"),
            Self::Sysfs => write!(f, "sysfs"),
            Self::Acpiconf => write!(f, "acpiconf"),
            Self::Sysctl => write!(f, "sysctl"),
            Self::Slope => write!(f, "slope"),
            Self::Charging => write!(f, "charging"),
            Self::None => write!(f, "none"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Battery triple produced by a reader or by the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryReading {
    /// Charge percentage in [0, 100], absent when unknown.
    pub percentage: Option<f64>,
    /// Discharge power in watts, 0 when unknown.
    pub watts: f64,
    pub source: SourceTag,
}

impl BatteryReading {
    pub fn new(percentage: f64, watts: f64, source: SourceTag) -> Self {
        Self {
            percentage: Some(percentage),
            watts,
            source,
        }
    }

    /// Placeholder for ticks with no usable battery data.
    pub fn empty(source: SourceTag) -> Self {
        Self {
            percentage: None,
            watts: 0.0,
            source,
        }
    }
}

/// Supplementary host metrics; zero means "not available".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemMetrics {
    /// 1-minute load average.
    pub cpu_load: f64,
    /// Used memory, percent of total.
    pub ram_pct: f64,
    /// Degrees Celsius.
    pub temp_c: f64,
}

/// Battery energy capacity, used to turn a percentage slope into watts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryCapacity {
    pub design_wh: Option<f64>,
    pub full_wh: Option<f64>,
}

impl BatteryCapacity {
    /// Capacity to use for slope estimation: last full charge, else design.
    pub fn effective_wh(&self) -> Option<f64> {
        self.full_wh
            .filter(|wh| wh.is_finite() && *wh > 0.0)
            .or(self.design_wh.filter(|wh| wh.is_finite() && *wh > 0.0))
    }

    pub fn is_empty(&self) -> bool {
        self.design_wh.is_none() && self.full_wh.is_none()
    }
}

// ---------------------------------------------------------------------------
// Per-tick record
// ---------------------------------------------------------------------------

/// One tick of telemetry, exactly as persisted in a run log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "pct", default)]
    pub percentage: Option<f64>,
    pub watts: f64,
    #[serde(default)]
    pub cpu_load: f64,
    #[serde(default)]
    pub ram_pct: f64,
    #[serde(default)]
    pub temp_c: f64,
    #[serde(rename = "src")]
    pub source: SourceTag,
}

impl TelemetrySample {
    pub fn from_parts(
        timestamp: DateTime<Utc>,
        battery: BatteryReading,
        system: SystemMetrics,
    ) -> Self {
        Self {
            timestamp,
            percentage: battery.percentage,
            watts: battery.watts,
            cpu_load: system.cpu_load,
            ram_pct: system.ram_pct,
            temp_c: system.temp_c,
            source: battery.source,
        }
    }

    /// Serialize as a single log line, without the trailing newline.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}

// ---------------------------------------------------------------------------
// Run metadata sidecar
// ---------------------------------------------------------------------------

/// Contents of `<run>.meta.json`, written once before the first tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub host: String,
    pub os: String,
    #[serde(default)]
    pub kernel: String,
    #[serde(default)]
    pub cpu: String,
    #[serde(default)]
    pub machine: String,
    pub config: String,
    #[serde(default)]
    pub workload: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sampling_hz: Option<f64>,
    #[serde(default)]
    pub battery_capacity: Option<BatteryCapacity>,
    #[serde(default)]
    pub batlab_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> TelemetrySample {
        TelemetrySample {
            timestamp: Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 45).unwrap(),
            percentage: Some(85.5),
            watts: 12.3,
            cpu_load: 0.25,
            ram_pct: 45.0,
            temp_c: 42.5,
            source: SourceTag::Upower,
        }
    }

    // -----------------------------------------------------------------------
    // Record format
    // -----------------------------------------------------------------------

    #[test]
    fn test_sample_uses_short_keys() {
        let json = sample().to_json_line().unwrap();
        assert!(json.contains("\"t\":\"2025-01-15T10:30:45Z\""));
        assert!(json.contains("\"pct\":85.5"));
        assert!(json.contains("\"watts\":12.3"));
        assert!(json.contains("\"src\":\"upower\""));
        assert!(!json.contains('\n'));
    }

    #[test]
    fn test_sample_roundtrip() {
        let original = sample();
        let parsed = TelemetrySample::from_json_line(&original.to_json_line().unwrap()).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_absent_percentage_is_null() {
        let mut s = sample();
        s.percentage = None;
        s.source = SourceTag::Charging;
        let json = s.to_json_line().unwrap();
        assert!(json.contains("\"pct\":null"));
        let parsed = TelemetrySample::from_json_line(&json).unwrap();
        assert_eq!(parsed.percentage, None);
        assert_eq!(parsed.source, SourceTag::Charging);
    }

    #[test]
    fn test_legacy_line_without_optional_fields() {
        let line = r#"{"t":"2025-01-15T10:30:45Z","pct":80,"watts":7.5,"src":"acpiconf"}"#;
        let s = TelemetrySample::from_json_line(line).unwrap();
        assert_eq!(s.percentage, Some(80.0));
        assert_eq!(s.cpu_load, 0.0);
        assert_eq!(s.source, SourceTag::Acpiconf);
    }

    #[test]
    fn test_unknown_tag_parses() {
        let line = r#"{"t":"2025-01-15T10:30:45Z","pct":80,"watts":7.5,"src":"ioreg"}"#;
        let s = TelemetrySample::from_json_line(line).unwrap();
        assert_eq!(s.source, SourceTag::Unknown);
    }

    #[test]
    fn test_truncated_line_fails() {
        assert!(TelemetrySample::from_json_line(r#"{"t":"2025-01-15T10:30:45Z","pct":8"#).is_err());
    }

    // -----------------------------------------------------------------------
    // Capacity
    // -----------------------------------------------------------------------

    #[test]
    fn test_effective_capacity_prefers_full() {
        let cap = BatteryCapacity {
            design_wh: Some(57.7),
            full_wh: Some(50.1),
        };
        assert_eq!(cap.effective_wh(), Some(50.1));

        let design_only = BatteryCapacity {
            design_wh: Some(57.7),
            full_wh: Some(0.0),
        };
        assert_eq!(design_only.effective_wh(), Some(57.7));
        assert_eq!(BatteryCapacity::default().effective_wh(), None);
    }

    #[test]
    fn test_metadata_minimal_sidecar() {
        let json = r#"{"config":"powersave","os":"FreeBSD 14.1","extra":"ignored"}"#;
        let meta: RunMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.config, "powersave");
        assert_eq!(meta.workload, None);
        assert_eq!(meta.sampling_hz, None);
    }
}
