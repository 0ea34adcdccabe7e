//! UPower daemon reader (`upower -e` / `upower -i <device>`).

use crate::error::SourceError;
use crate::platform::OsFamily;
use crate::sample::{BatteryCapacity, BatteryReading, SourceTag};
use crate::source::{BatterySource, SourceInfo, SourceRole};

use super::assemble_reading;
use super::helpers::{command_exists, find_field, parse_number, run_command_io};

const NAME: &str = "upower";

static UPOWER_INFO: SourceInfo = SourceInfo {
    name: NAME,
    description: "UPower daemon: percentage and energy-rate of the first battery device",
    tag: SourceTag::Upower,
    platform: OsFamily::Linux,
    role: SourceRole::Primary,
};

/// Fields of interest from one `upower -i` report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpowerReport {
    pub state: Option<String>,
    pub percentage: Option<f64>,
    /// Watts.
    pub energy_rate: Option<f64>,
    /// Wh.
    pub energy_full: Option<f64>,
    /// Wh.
    pub energy_full_design: Option<f64>,
}

impl UpowerReport {
    /// Whether the battery is on AC: charging, full, or waiting to charge.
    pub fn on_ac(&self) -> bool {
        self.state.as_deref().is_some_and(|s| {
            matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "charging" | "fully-charged" | "pending-charge"
            )
        })
    }

    pub fn reading(&self) -> Result<BatteryReading, SourceError> {
        assemble_reading(
            NAME,
            SourceTag::Upower,
            self.on_ac(),
            self.percentage,
            self.energy_rate,
        )
    }

    pub fn capacity(&self) -> BatteryCapacity {
        BatteryCapacity {
            design_wh: self.energy_full_design,
            full_wh: self.energy_full,
        }
    }
}

/// Extract the battery fields from `upower -i` output.
///
/// Only `key: value` lines with an exact key match are used, so the
/// `History (rate)` tables further down never leak in.
pub fn parse_upower(text: &str) -> UpowerReport {
    let num = |key: &str| find_field(text, key, ':').and_then(parse_number);
    UpowerReport {
        state: find_field(text, "state", ':').map(str::to_string),
        percentage: num("percentage"),
        energy_rate: num("energy-rate"),
        energy_full: num("energy-full"),
        energy_full_design: num("energy-full-design"),
    }
}

/// System battery (`BAT*`) device path from `upower -e` output.
///
/// Other `battery_` devices are peripherals such as a wireless mouse.
pub fn find_battery_device(devices: &str) -> Option<&str> {
    devices.lines().map(str::trim).find(|l| l.contains("BAT"))
}

/// Reads the first battery known to UPower.
pub struct UpowerSource;

impl UpowerSource {
    pub fn new() -> Self {
        Self
    }

    fn report(&self) -> Result<UpowerReport, SourceError> {
        let hint = "check that the upower daemon is running";
        let devices = run_command_io("upower", &["-e"])
            .map_err(|e| SourceError::from_io(NAME, "upower", hint, &e))?;
        let device = find_battery_device(&devices)
            .ok_or_else(|| SourceError::unavailable(NAME, "no battery device enumerated"))?;
        let info = run_command_io("upower", &["-i", device])
            .map_err(|e| SourceError::from_io(NAME, "upower", hint, &e))?;
        Ok(parse_upower(&info))
    }
}

impl Default for UpowerSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BatterySource for UpowerSource {
    fn info(&self) -> &SourceInfo {
        &UPOWER_INFO
    }

    fn is_available(&self) -> bool {
        command_exists("upower")
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
  native-path:          BAT0
  vendor:               SMP
  model:                5B10W13930
  power supply:         yes
  updated:              Wed 15 Jan 2025 10:30:41 AM UTC (4 seconds ago)
  has history:          yes
  has statistics:       yes
  battery
    present:             yes
    rechargeable:        yes
    state:               discharging
    warning-level:       none
    energy:              45.3 Wh
    energy-empty:        0 Wh
    energy-full:         53.5 Wh
    energy-full-design:  57.72 Wh
    energy-rate:         8.45 W
    voltage:             12.1 V
    time to empty:       5.4 hours
    percentage:          85%
    capacity:            92.6889%
    technology:          lithium-polymer
  History (rate):
    1736937041\t8.450\tdischarging
    1736937011\t9.120\tdischarging
";

    // -----------------------------------------------------------------------
    // Extractor
    // -----------------------------------------------------------------------

    #[test]
    fn test_parse_discharging_report() {
        let report = parse_upower(DISCHARGING);
        assert_eq!(report.state.as_deref(), Some("discharging"));
        assert_eq!(report.percentage, Some(85.0));
        assert_eq!(report.energy_rate, Some(8.45));
        assert_eq!(report.energy_full, Some(53.5));
        assert_eq!(report.energy_full_design, Some(57.72));
        assert!(!report.on_ac());

        let reading = report.reading().unwrap();
        assert_eq!(reading.percentage, Some(85.0));
        assert_eq!(reading.watts, 8.45);
        assert_eq!(reading.source, SourceTag::Upower);
    }

    #[test]
    fn test_charging_is_unavailable() {
        let text = DISCHARGING.replace("state:               discharging", "state:               charging");
        let err = parse_upower(&text).reading().unwrap_err();
        assert!(matches!(err, SourceError::Charging { reader: "upower" }));
    }

    #[test]
    fn test_fully_charged_is_unavailable() {
        let text = DISCHARGING.replace("discharging\n    warning", "fully-charged\n    warning");
        assert!(matches!(
            parse_upower(&text).reading(),
            Err(SourceError::Charging { .. })
        ));
    }

    #[test]
    fn test_locale_decimal_comma() {
        let text = "    state: discharging\n    energy-rate:  8,45 W\n    percentage:  71%\n";
        let reading = parse_upower(text).reading().unwrap();
        assert_eq!(reading.watts, 8.45);
        assert_eq!(reading.percentage, Some(71.0));
    }

    #[test]
    fn test_missing_rate_is_unavailable() {
        let text = "    state: discharging\n    percentage:  71%\n";
        assert!(matches!(
            parse_upower(text).reading(),
            Err(SourceError::Unavailable { reader: "upower", .. })
        ));
    }

    #[test]
    fn test_capacity_from_report() {
        let cap = parse_upower(DISCHARGING).capacity();
        assert_eq!(cap.effective_wh(), Some(53.5));
    }

    // -----------------------------------------------------------------------
    // Device enumeration
    // -----------------------------------------------------------------------

    #[test]
    fn test_find_battery_device() {
        let devices = "/org/freedesktop/UPower/devices/line_power_AC\n\
                       /org/freedesktop/UPower/devices/battery_BAT0\n\
                       /org/freedesktop/UPower/devices/DisplayDevice\n";
        assert_eq!(
            find_battery_device(devices),
            Some("/org/freedesktop/UPower/devices/battery_BAT0")
        );
        assert_eq!(find_battery_device("/org/freedesktop/UPower/devices/DisplayDevice\n"), None);
    }

    #[test]
    fn test_system_battery_preferred_over_peripheral() {
        let devices = "/org/freedesktop/UPower/devices/line_power_AC\n\
                       /org/freedesktop/UPower/devices/battery_hidpp_battery_0\n\
                       /org/freedesktop/UPower/devices/battery_BAT0\n";
        assert_eq!(
            find_battery_device(devices),
            Some("/org/freedesktop/UPower/devices/battery_BAT0")
        );

        let peripheral_only = "/org/freedesktop/UPower/devices/battery_hidpp_battery_0\n";
        assert_eq!(find_battery_device(peripheral_only), None);
    }

    #[test]
    fn test_info() {
        let source = UpowerSource::new();
        assert_eq!(source.name(), "upower");
        assert_eq!(source.info().tag, SourceTag::Upower);
    }
}
