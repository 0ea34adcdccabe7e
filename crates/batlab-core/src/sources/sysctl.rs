//! FreeBSD `hw.acpi.battery.*` sysctl reader.
//!
//! These counters are aggregated over all batteries and refresh lazily, so
//! this reader only corroborates `acpiconf`; it never wins a tick.

use crate::error::SourceError;
use crate::platform::OsFamily;
use crate::sample::{BatteryReading, SourceTag};
use crate::source::{BatterySource, SourceInfo, SourceRole};

use super::assemble_reading;
use super::helpers::{command_exists, parse_number, run_command_io};

const NAME: &str = "sysctl";

/// `ACPI_BATT_STAT_CHARGING` in the battery state bitmask.
const STATE_CHARGING: i64 = 0x2;

static SYSCTL_INFO: SourceInfo = SourceInfo {
    name: NAME,
    description: "hw.acpi.battery life/rate/state counters (cross-check only)",
    tag: SourceTag::Sysctl,
    platform: OsFamily::Bsd,
    role: SourceRole::Corroborator,
};

const KEYS: [&str; 3] = [
    "hw.acpi.battery.life",
    "hw.acpi.battery.rate",
    "hw.acpi.battery.state",
];

/// Values of the three battery sysctls.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SysctlBattery {
    pub life_pct: Option<f64>,
    /// Watts, converted from mW.
    pub rate_w: Option<f64>,
    pub state: Option<i64>,
}

impl SysctlBattery {
    pub fn is_charging(&self) -> bool {
        self.state.is_some_and(|s| s >= 0 && s & STATE_CHARGING != 0)
    }

    pub fn reading(&self) -> Result<BatteryReading, SourceError> {
        assemble_reading(
            NAME,
            SourceTag::Sysctl,
            self.is_charging(),
            self.life_pct,
            self.rate_w,
        )
    }
}

/// Parse `sysctl -n` output for [`KEYS`], one value per line in key order.
///
/// Also accepts `name: value` lines, as printed without `-n`.
pub fn parse_sysctl_battery(text: &str) -> SysctlBattery {
    let mut values: [Option<f64>; 3] = [None; 3];
    let mut positional = 0;
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let (slot, raw) = match line.split_once(':') {
            Some((key, value)) => match KEYS.iter().position(|k| *k == key.trim()) {
                Some(i) => (i, value),
                None => continue,
            },
            None => {
                let i = positional;
                positional += 1;
                (i, line)
            }
        };
        if let Some(v) = values.get_mut(slot) {
            *v = parse_number(raw);
        }
    }

    let [life, rate, state] = values;
    SysctlBattery {
        life_pct: life.filter(|v| (0.0..=100.0).contains(v)),
        rate_w: rate.filter(|v| *v >= 0.0).map(|mw| mw / 1000.0),
        state: state.map(|s| s as i64),
    }
}

/// Cross-checks primary BSD readings against the kernel's battery sysctls.
pub struct SysctlBatterySource;

impl SysctlBatterySource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SysctlBatterySource {
    fn default() -> Self {
        Self::new()
    }
}

impl BatterySource for SysctlBatterySource {
    fn info(&self) -> &SourceInfo {
        &SYSCTL_INFO
    }

    fn is_available(&self) -> bool {
        command_exists("sysctl") && run_command_io("sysctl", &["-n", KEYS[0]]).is_ok()
    }

    fn read(&self) -> Result<BatteryReading, SourceError> {
        let mut args = vec!["-n"];
        args.extend(KEYS);
        let text = run_command_io("sysctl", &args)
            .map_err(|e| SourceError::from_io(NAME, "sysctl", "", &e))?;
        parse_sysctl_battery(&text).reading()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_positional() {
        let parsed = parse_sysctl_battery("85\n12500\n1\n");
        assert_eq!(parsed.life_pct, Some(85.0));
        assert_eq!(parsed.rate_w, Some(12.5));
        assert_eq!(parsed.state, Some(1));
        assert!(!parsed.is_charging());
        assert_eq!(
            parsed.reading().unwrap(),
            BatteryReading::new(85.0, 12.5, SourceTag::Sysctl)
        );
    }

    #[test]
    fn test_parse_named() {
        let text = "hw.acpi.battery.state: 2\nhw.acpi.battery.life: 40\nhw.acpi.battery.rate: 30000\n";
        let parsed = parse_sysctl_battery(text);
        assert_eq!(parsed.life_pct, Some(40.0));
        assert!(parsed.is_charging());
        assert!(matches!(parsed.reading(), Err(SourceError::Charging { .. })));
    }

    #[test]
    fn test_unknown_markers() {
        let parsed = parse_sysctl_battery("-1\n-1\n7\n");
        assert_eq!(parsed.life_pct, None);
        assert_eq!(parsed.rate_w, None);
        assert!(parsed.reading().is_err());
    }

    #[test]
    fn test_role_is_corroborator() {
        assert_eq!(SysctlBatterySource::new().info().role, SourceRole::Corroborator);
    }
}
