//! FreeBSD `acpiconf -i 0` reader.

use crate::error::SourceError;
use crate::platform::OsFamily;
use crate::sample::{BatteryCapacity, BatteryReading, SourceTag};
use crate::source::{BatterySource, SourceInfo, SourceRole};

use super::assemble_reading;
use super::helpers::{command_exists, contains_word, find_field, parse_number, run_command_io};

const NAME: &str = "acpiconf";

static ACPICONF_INFO: SourceInfo = SourceInfo {
    name: NAME,
    description: "ACPI battery 0 via acpiconf: remaining capacity and present rate",
    tag: SourceTag::Acpiconf,
    platform: OsFamily::Bsd,
    role: SourceRole::Primary,
};

/// Fields of interest from `acpiconf -i 0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcpiconfReport {
    pub state: Option<String>,
    pub remaining_pct: Option<f64>,
    /// Watts, converted from mW. `-1` (unknown) is `None`.
    pub present_rate_w: Option<f64>,
    /// Wh, converted from mWh.
    pub design_wh: Option<f64>,
    /// Wh, converted from mWh.
    pub last_full_wh: Option<f64>,
}

impl AcpiconfReport {
    pub fn is_charging(&self) -> bool {
        self.state.as_deref().is_some_and(|s| contains_word(s, "charging"))
    }

    pub fn reading(&self) -> Result<BatteryReading, SourceError> {
        assemble_reading(
            NAME,
            SourceTag::Acpiconf,
            self.is_charging(),
            self.remaining_pct,
            self.present_rate_w,
        )
    }

    pub fn capacity(&self) -> BatteryCapacity {
        BatteryCapacity {
            design_wh: self.design_wh,
            full_wh: self.last_full_wh,
        }
    }
}

/// Convert a milli-unit field, treating negative values as the unknown marker.
fn milli(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v >= 0.0).map(|v| v / 1000.0)
}

/// Extract the battery fields from `acpiconf -i 0` output.
pub fn parse_acpiconf(text: &str) -> AcpiconfReport {
    let num = |key: &str| find_field(text, key, ':').and_then(parse_number);
    AcpiconfReport {
        state: find_field(text, "State", ':').map(str::to_string),
        remaining_pct: num("Remaining capacity").filter(|v| *v >= 0.0),
        present_rate_w: milli(num("Present rate")),
        design_wh: milli(num("Design capacity")),
        last_full_wh: milli(num("Last full capacity")),
    }
}

/// Reads battery unit 0 via `acpiconf`.
pub struct AcpiconfSource;

impl AcpiconfSource {
    pub fn new() -> Self {
        Self
    }

    fn report(&self) -> Result<AcpiconfReport, SourceError> {
        let text = run_command_io("acpiconf", &["-i", "0"]).map_err(|e| {
            SourceError::from_io(NAME, "acpiconf", "add the user to the operator group", &e)
        })?;
        Ok(parse_acpiconf(&text))
    }
}

impl Default for AcpiconfSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BatterySource for AcpiconfSource {
    fn info(&self) -> &SourceInfo {
        &ACPICONF_INFO
    }

    fn is_available(&self) -> bool {
        command_exists("acpiconf")
    }

    fn read(&self) -> Result<BatteryReading, SourceError> {
        self.report()?.reading()
    }

    fn capacity(&self) -> Option<BatteryCapacity> {
        let cap = self.report().ok()?.capacity();
        (!cap.is_empty()).then_some(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISCHARGING: &str = "\
Design capacity:\t57040 mWh
Last full capacity:\t53200 mWh
Technology:\tsecondary (rechargeable)
Design voltage:\t11400 mV
Capacity (warn):\t2852 mWh
Capacity (low):\t200 mWh
Model number:\t01AV430
Serial number:\t 1234
Type:\tLiP
OEM info:\tSMP
State:\tdischarging
Remaining capacity:\t85%
Remaining time:\t3:45
Present rate:\t12500 mW
Present voltage:\t11800 mV
";

    #[test]
    fn test_parse_discharging() {
        let report = parse_acpiconf(DISCHARGING);
        assert_eq!(report.remaining_pct, Some(85.0));
        assert_eq!(report.present_rate_w, Some(12.5));
        assert_eq!(report.design_wh, Some(57.04));
        assert_eq!(report.last_full_wh, Some(53.2));

        let reading = report.reading().unwrap();
        assert_eq!(reading, BatteryReading::new(85.0, 12.5, SourceTag::Acpiconf));
        assert_eq!(report.capacity().effective_wh(), Some(53.2));
    }

    #[test]
    fn test_charging_state() {
        let text = DISCHARGING.replace("State:\tdischarging", "State:\tcharging");
        assert!(matches!(
            parse_acpiconf(&text).reading(),
            Err(SourceError::Charging { reader: "acpiconf" })
        ));
    }

    #[test]
    fn test_unknown_rate_marker() {
        let text = DISCHARGING.replace("Present rate:\t12500 mW", "Present rate:\t-1");
        let report = parse_acpiconf(&text);
        assert_eq!(report.present_rate_w, None);
        assert!(matches!(report.reading(), Err(SourceError::Unavailable { .. })));
    }

    #[test]
    fn test_rate_reported_as_unknown_word() {
        let text = DISCHARGING.replace("Present rate:\t12500 mW", "Present rate:\tunknown");
        assert!(parse_acpiconf(&text).reading().is_err());
    }

    #[test]
    fn test_empty_output() {
        let report = parse_acpiconf("Some other output");
        assert_eq!(report, AcpiconfReport::default());
        assert!(report.capacity().is_empty());
    }
}
