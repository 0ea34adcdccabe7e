//! Linux `/sys/class/power_supply/BAT*` reader.
//!
//! Units are kernel power-supply class units: µW, µV, µA, µWh, µAh.

use std::path::{Path, PathBuf};

use crate::error::SourceError;
use crate::platform::OsFamily;
use crate::sample::{BatteryCapacity, BatteryReading, SourceTag};
use crate::source::{BatterySource, SourceInfo, SourceRole};

use super::assemble_reading;
use super::helpers::{parse_number, read_first_f64, read_trimmed};

const NAME: &str = "sysfs";
const DEFAULT_ROOT: &str = "/sys/class/power_supply";
const MICRO: f64 = 1_000_000.0;

static SYSFS_INFO: SourceInfo = SourceInfo {
    name: NAME,
    description: "Kernel power_supply class: capacity plus power_now or current_now x voltage_now",
    tag: SourceTag::Sysfs,
    platform: OsFamily::Linux,
    role: SourceRole::Primary,
};

/// Raw battery state read from one `BAT*` directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SysfsBattery {
    pub status: Option<String>,
    pub capacity_pct: Option<f64>,
    /// Watts, sign dropped.
    pub power_w: Option<f64>,
    pub energy: BatteryCapacity,
}

impl SysfsBattery {
    fn holds_charge_on_ac(&self) -> bool {
        matches!(
            self.status.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("full" | "not charging")
        )
    }

    fn is_charging(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("charging"))
    }
}

/// Read every relevant node of a battery directory.
///
/// A missing or unreadable `capacity` is an error; everything else is
/// optional. `PermissionDenied` is preserved so the resolver can warn.
pub fn read_sysfs_battery(dir: &Path) -> Result<SysfsBattery, SourceError> {
    let hint = "make the power_supply nodes readable (udev rule) or run as root";
    let capacity = read_trimmed(&dir.join("capacity"))
        .map_err(|e| SourceError::from_io(NAME, "power_supply/capacity", hint, &e))?;

    let power_w = read_first_f64(&dir.join("power_now"))
        .map(|uw| uw.abs() / MICRO)
        .or_else(|| {
            let ua = read_first_f64(&dir.join("current_now"))?;
            let uv = read_first_f64(&dir.join("voltage_now"))?;
            Some((ua * uv).abs() / (MICRO * MICRO))
        });

    Ok(SysfsBattery {
        status: read_trimmed(&dir.join("status")).ok().filter(|s| !s.is_empty()),
        capacity_pct: parse_number(&capacity),
        power_w,
        energy: read_sysfs_capacity(dir),
    })
}

/// Energy capacity in Wh, from `energy_*` (µWh) or `charge_*` (µAh) nodes.
pub fn read_sysfs_capacity(dir: &Path) -> BatteryCapacity {
    let energy = |node: &str| read_first_f64(&dir.join(node)).map(|uwh| uwh / MICRO);
    let volts = read_first_f64(&dir.join("voltage_min_design")).map(|uv| uv / MICRO);
    let charge = |node: &str| {
        let uah = read_first_f64(&dir.join(node))?;
        Some(uah / MICRO * volts?)
    };

    BatteryCapacity {
        design_wh: energy("energy_full_design").or_else(|| charge("charge_full_design")),
        full_wh: energy("energy_full").or_else(|| charge("charge_full")),
    }
}

/// Whether any mains adapter under `root` reports `online = 1`.
/// `None` when no adapter is exposed at all.
fn mains_online(root: &Path) -> Option<bool> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut seen = false;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_mains = read_trimmed(&path.join("type")).is_ok_and(|t| t.eq_ignore_ascii_case("Mains"));
        if !is_mains {
            continue;
        }
        seen = true;
        if read_first_f64(&path.join("online")).is_some_and(|v| v > 0.0) {
            return Some(true);
        }
    }
    seen.then_some(false)
}

/// Reads the first `BAT*` directory under a power_supply root.
pub struct SysfsSource {
    root: PathBuf,
}

impl SysfsSource {
    pub fn new() -> Self {
        Self::with_root(DEFAULT_ROOT)
    }

    /// Use a different power_supply root (fixtures, chroots).
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn battery_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| {
                        p.file_name()
                            .and_then(|n| n.to_str())
                            .is_some_and(|n| n.starts_with("BAT"))
                    })
                    .collect()
            })
            .unwrap_or_default();
        dirs.sort();
        dirs
    }
}

impl Default for SysfsSource {
    fn default() -> Self {
        Self::new()
    }
}

impl BatterySource for SysfsSource {
    fn info(&self) -> &SourceInfo {
        &SYSFS_INFO
    }

    fn is_available(&self) -> bool {
        !self.battery_dirs().is_empty()
    }

    fn read(&self) -> Result<BatteryReading, SourceError> {
        let dir = self
            .battery_dirs()
            .into_iter()
            .next()
            .ok_or(SourceError::ToolMissing {
                tool: "/sys/class/power_supply/BAT*",
            })?;
        let battery = read_sysfs_battery(&dir)?;

        // Full/Not charging only count as AC when an adapter says so, or
        // when the machine exposes no adapter to ask.
        let on_ac = battery.is_charging()
            || (battery.holds_charge_on_ac() && mains_online(&self.root).unwrap_or(true));

        assemble_reading(NAME, SourceTag::Sysfs, on_ac, battery.capacity_pct, battery.power_w)
    }

    fn capacity(&self) -> Option<BatteryCapacity> {
        let dir = self.battery_dirs().into_iter().next()?;
        let cap = read_sysfs_capacity(&dir);
        (!cap.is_empty()).then_some(cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_nodes(dir: &Path, nodes: &[(&str, &str)]) {
        fs::create_dir_all(dir).unwrap();
        for (name, value) in nodes {
            fs::write(dir.join(name), format!("{value}\n")).unwrap();
        }
    }

    // -----------------------------------------------------------------------
    // Power derivation
    // -----------------------------------------------------------------------

    #[test]
    fn test_power_now_in_microwatts() {
        let root = tempfile::tempdir().unwrap();
        write_nodes(
            &root.path().join("BAT0"),
            &[
                ("capacity", "85"),
                ("status", "Discharging"),
                ("power_now", "8450000"),
                ("energy_full", "50120000"),
                ("energy_full_design", "57720000"),
            ],
        );

        let source = SysfsSource::with_root(root.path());
        assert!(source.is_available());
        let reading = source.read().unwrap();
        assert_eq!(reading.percentage, Some(85.0));
        assert!((reading.watts - 8.45).abs() < 1e-9);
        assert_eq!(reading.source, SourceTag::Sysfs);

        let cap = source.capacity().unwrap();
        assert!((cap.full_wh.unwrap() - 50.12).abs() < 1e-9);
        assert!((cap.design_wh.unwrap() - 57.72).abs() < 1e-9);
    }

    #[test]
    fn test_current_times_voltage() {
        let root = tempfile::tempdir().unwrap();
        // 700 mA at 12 V = 8.4 W; some firmware signs current negative.
        write_nodes(
            &root.path().join("BAT1"),
            &[
                ("capacity", "60"),
                ("status", "Discharging"),
                ("current_now", "-700000"),
                ("voltage_now", "12000000"),
            ],
        );
        let reading = SysfsSource::with_root(root.path()).read().unwrap();
        assert!((reading.watts - 8.4).abs() < 1e-9);
    }

    #[test]
    fn test_charge_based_capacity() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("BAT0");
        write_nodes(
            &dir,
            &[
                ("charge_full", "4000000"),
                ("charge_full_design", "4500000"),
                ("voltage_min_design", "11100000"),
            ],
        );
        let cap = read_sysfs_capacity(&dir);
        assert!((cap.full_wh.unwrap() - 44.4).abs() < 1e-9);
        assert!((cap.design_wh.unwrap() - 49.95).abs() < 1e-9);
    }

    #[test]
    fn test_missing_rate_is_unavailable() {
        let root = tempfile::tempdir().unwrap();
        write_nodes(
            &root.path().join("BAT0"),
            &[("capacity", "70"), ("status", "Discharging")],
        );
        assert!(matches!(
            SysfsSource::with_root(root.path()).read(),
            Err(SourceError::Unavailable { reader: "sysfs", .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Charging detection
    // -----------------------------------------------------------------------

    #[test]
    fn test_charging_status() {
        let root = tempfile::tempdir().unwrap();
        write_nodes(
            &root.path().join("BAT0"),
            &[("capacity", "40"), ("status", "Charging"), ("power_now", "20000000")],
        );
        assert!(matches!(
            SysfsSource::with_root(root.path()).read(),
            Err(SourceError::Charging { .. })
        ));
    }

    #[test]
    fn test_full_depends_on_adapter() {
        let root = tempfile::tempdir().unwrap();
        write_nodes(
            &root.path().join("BAT0"),
            &[("capacity", "100"), ("status", "Full"), ("power_now", "0")],
        );
        write_nodes(&root.path().join("AC"), &[("type", "Mains"), ("online", "1")]);
        let source = SysfsSource::with_root(root.path());
        assert!(matches!(source.read(), Err(SourceError::Charging { .. })));

        fs::write(root.path().join("AC").join("online"), "0\n").unwrap();
        let reading = source.read().unwrap();
        assert_eq!(reading.percentage, Some(100.0));
    }

    #[test]
    fn test_no_battery_directory() {
        let root = tempfile::tempdir().unwrap();
        write_nodes(&root.path().join("AC"), &[("type", "Mains"), ("online", "1")]);
        let source = SysfsSource::with_root(root.path());
        assert!(!source.is_available());
        assert!(matches!(source.read(), Err(SourceError::ToolMissing { .. })));
        assert!(source.capacity().is_none());
    }
}
