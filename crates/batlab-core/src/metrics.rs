//! Host metrics recorded next to battery data: load, memory and temperature.
//!
//! Monitors never fail. Anything unreadable becomes 0 so that a missing sensor
//! cannot hold up battery telemetry.

use std::path::{Path, PathBuf};

use crate::platform::OsFamily;
use crate::sample::SystemMetrics;
use crate::sources::helpers::{parse_number, read_first_f64, read_trimmed, run_command};

/// hwmon chip names that measure the CPU package, in preference order.
const CPU_HWMON_NAMES: [&str; 4] = ["coretemp", "k10temp", "zenpower", "cpu_thermal"];

/// BSD page counters: total first, then the pages counted as available.
const BSD_PAGE_KEYS: [&str; 4] = [
    "vm.stats.vm.v_page_count",
    "vm.stats.vm.v_free_count",
    "vm.stats.vm.v_inactive_count",
    "vm.stats.vm.v_cache_count",
];

/// BSD temperature sysctls in preference order.
const BSD_TEMPERATURE_KEYS: [&str; 4] = [
    "dev.cpu.0.temperature",
    "hw.acpi.thermal.tz0.temperature",
    "hw.acpi.thermal.tz1.temperature",
    "dev.acpi_tz.0.temperature",
];

/// Source of supplementary system metrics.
pub trait SystemMonitor: Send + Sync {
    fn read(&self) -> SystemMetrics;
}

/// Monitor for an OS family.
pub fn monitor_for(os: OsFamily) -> Box<dyn SystemMonitor> {
    match os {
        OsFamily::Linux => Box::new(LinuxMonitor::new()),
        OsFamily::Bsd => Box::new(BsdMonitor),
        OsFamily::Other => Box::new(NullMonitor),
    }
}

/// Replace non-finite or negative values by 0.
fn sanitize(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0)
}

/// 1-minute load average via `getloadavg(3)`.
fn libc_loadavg() -> Option<f64> {
    #[cfg(unix)]
    {
        let mut values = [0.0_f64; 3];
        // SAFETY: `getloadavg` writes up to `n` doubles to a valid buffer.
        let n = unsafe { libc::getloadavg(values.as_mut_ptr(), 3) };
        (n > 0).then_some(values[0])
    }
    #[cfg(not(unix))]
    {
        None
    }
}

// ---------------------------------------------------------------------------
// Linux
// ---------------------------------------------------------------------------

/// procfs + sysfs monitor. Roots are configurable for fixtures.
#[derive(Debug, Clone)]
pub struct LinuxMonitor {
    proc_root: PathBuf,
    sys_root: PathBuf,
}

impl LinuxMonitor {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    pub fn with_roots<P: Into<PathBuf>, S: Into<PathBuf>>(proc_root: P, sys_root: S) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
        }
    }

    fn cpu_load(&self) -> Option<f64> {
        read_first_f64(&self.proc_root.join("loadavg")).or_else(libc_loadavg)
    }

    fn ram_pct(&self) -> Option<f64> {
        let content = std::fs::read_to_string(self.proc_root.join("meminfo")).ok()?;
        parse_meminfo(&content)
    }

    fn temp_c(&self) -> Option<f64> {
        linux_temperature(&self.sys_root)
    }
}

impl Default for LinuxMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemMonitor for LinuxMonitor {
    fn read(&self) -> SystemMetrics {
        SystemMetrics {
            cpu_load: sanitize(self.cpu_load()),
            ram_pct: sanitize(self.ram_pct()),
            temp_c: sanitize(self.temp_c()),
        }
    }
}

/// Used-memory percentage from `/proc/meminfo` (values in kB).
///
/// Uses `MemAvailable` when the kernel provides it, otherwise
/// `MemFree + Buffers + Cached`.
pub fn parse_meminfo(content: &str) -> Option<f64> {
    let field = |key: &str| {
        content
            .lines()
            .find_map(|l| l.strip_prefix(key)?.strip_prefix(':'))
            .and_then(parse_number)
    };

    let total = field("MemTotal").filter(|t| *t > 0.0)?;
    let available = field("MemAvailable").or_else(|| {
        Some(field("MemFree")? + field("Buffers").unwrap_or(0.0) + field("Cached").unwrap_or(0.0))
    })?;

    let used = (total - available).max(0.0);
    Some(used / total * 100.0)
}

/// Millidegree sensor file to Celsius; zero and garbage are skipped.
fn read_millidegrees(path: &Path) -> Option<f64> {
    read_first_f64(path)
        .filter(|v| *v > 0.0)
        .map(|v| v / 1000.0)
}

fn sorted_children(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with(prefix))
                })
                .collect()
        })
        .unwrap_or_default();
    paths.sort();
    paths
}

/// First populated `temp*_input` of a hwmon chip.
fn hwmon_chip_temperature(chip: &Path) -> Option<f64> {
    sorted_children(chip, "temp")
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_input"))
        })
        .find_map(|p| read_millidegrees(&p))
}

/// CPU package hwmon, then `x86_pkg_temp` zone, any zone, any hwmon.
pub fn linux_temperature(sys_root: &Path) -> Option<f64> {
    let hwmon = sorted_children(&sys_root.join("class/hwmon"), "hwmon");
    let zones = sorted_children(&sys_root.join("class/thermal"), "thermal_zone");
    let chip_name = |chip: &Path| read_trimmed(&chip.join("name")).unwrap_or_default();
    let zone_type = |zone: &Path| read_trimmed(&zone.join("type")).unwrap_or_default();

    CPU_HWMON_NAMES
        .iter()
        .find_map(|wanted| {
            hwmon
                .iter()
                .filter(|chip| chip_name(chip) == *wanted)
                .find_map(|chip| hwmon_chip_temperature(chip))
        })
        .or_else(|| {
            zones
                .iter()
                .filter(|z| zone_type(z) == "x86_pkg_temp")
                .find_map(|z| read_millidegrees(&z.join("temp")))
        })
        .or_else(|| zones.iter().find_map(|z| read_millidegrees(&z.join("temp"))))
        .or_else(|| hwmon.iter().find_map(|chip| hwmon_chip_temperature(chip)))
}

// ---------------------------------------------------------------------------
// BSD
// ---------------------------------------------------------------------------

/// sysctl-based monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsdMonitor;

impl SystemMonitor for BsdMonitor {
    fn read(&self) -> SystemMetrics {
        let cpu_load = run_command("sysctl", &["-n", "vm.loadavg"])
            .and_then(|s| parse_vm_loadavg(&s))
            .or_else(libc_loadavg);
        let ram_pct = bsd_memory_pct(|key| {
            run_command("sysctl", &["-n", key]).and_then(|s| parse_number(s.trim()))
        });
        let temp_c = BSD_TEMPERATURE_KEYS.iter().find_map(|key| {
            run_command("sysctl", &["-n", key]).and_then(|s| parse_bsd_temperature(&s))
        });

        SystemMetrics {
            cpu_load: sanitize(cpu_load),
            ram_pct: sanitize(ram_pct),
            temp_c: sanitize(temp_c),
        }
    }
}

/// First value of `vm.loadavg` output, e.g. `{ 0.15 0.20 0.18 }`.
pub fn parse_vm_loadavg(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_start_matches('{')
        .split_whitespace()
        .next()
        .and_then(parse_number)
}

/// Used-memory percentage from page counters read one OID at a time.
///
/// A missing free, inactive or cache counter (`v_cache_count` is gone on
/// newer releases) counts as zero. A missing total yields `None`.
pub fn bsd_memory_pct<F>(read: F) -> Option<f64>
where
    F: Fn(&str) -> Option<f64>,
{
    let total = read(BSD_PAGE_KEYS[0]).filter(|t| *t > 0.0)?;
    let available: f64 = BSD_PAGE_KEYS[1..]
        .iter()
        .map(|&key| read(key).unwrap_or(0.0))
        .sum();
    Some((total - available).max(0.0) / total * 100.0)
}

/// `45.0C` style value; zero is treated as unavailable.
pub fn parse_bsd_temperature(raw: &str) -> Option<f64> {
    parse_number(raw).filter(|v| *v > 0.0)
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Monitor for platforms without known sources; always zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl SystemMonitor for NullMonitor {
    fn read(&self) -> SystemMetrics {
        SystemMetrics::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    #[test]
    fn test_meminfo_available() {
        let content = "MemTotal:       16000000 kB\nMemFree:         2000000 kB\nMemAvailable:    4000000 kB\n";
        assert_eq!(parse_meminfo(content), Some(75.0));
    }

    #[test]
    fn test_meminfo_without_available() {
        let content = "MemTotal: 1000 kB\nMemFree: 100 kB\nBuffers: 50 kB\nCached: 250 kB\nSwapCached: 999 kB\n";
        assert_eq!(parse_meminfo(content), Some(60.0));
    }

    #[test]
    fn test_meminfo_garbage() {
        assert_eq!(parse_meminfo(""), None);
        assert_eq!(parse_meminfo("MemTotal: 0 kB\nMemAvailable: 0 kB\n"), None);
    }

    #[test]
    fn test_bsd_memory() {
        fn counters(values: [Option<f64>; 4]) -> impl Fn(&str) -> Option<f64> {
            move |key| {
                let idx = BSD_PAGE_KEYS.iter().position(|k| *k == key)?;
                values[idx]
            }
        }
        assert_eq!(
            bsd_memory_pct(counters([Some(1000.0), Some(100.0), Some(200.0), Some(100.0)])),
            Some(60.0)
        );
        assert_eq!(bsd_memory_pct(counters([Some(0.0), None, None, None])), None);
        assert_eq!(bsd_memory_pct(counters([None, Some(100.0), None, None])), None);
    }

    #[test]
    fn test_bsd_memory_without_cache_counter() {
        let read = |key: &str| match key {
            "vm.stats.vm.v_page_count" => Some(1000.0),
            "vm.stats.vm.v_free_count" => Some(250.0),
            "vm.stats.vm.v_inactive_count" => Some(250.0),
            _ => None,
        };
        assert_eq!(bsd_memory_pct(read), Some(50.0));
    }

    // -----------------------------------------------------------------------
    // Load and temperature parsers
    // -----------------------------------------------------------------------

    #[test]
    fn test_vm_loadavg() {
        assert_eq!(parse_vm_loadavg("{ 0.15 0.20 0.18 }\n"), Some(0.15));
        assert_eq!(parse_vm_loadavg("{0,42 0,30 0,20}"), Some(0.42));
        assert_eq!(parse_vm_loadavg(""), None);
    }

    #[test]
    fn test_bsd_temperature() {
        assert_eq!(parse_bsd_temperature("45.0C\n"), Some(45.0));
        assert_eq!(parse_bsd_temperature("0.0C"), None);
        assert_eq!(parse_bsd_temperature("unknown"), None);
    }

    // -----------------------------------------------------------------------
    // Linux fixture tree
    // -----------------------------------------------------------------------

    #[test]
    fn test_linux_monitor_fixture() {
        let root = tempfile::tempdir().unwrap();
        let proc_root = root.path().join("proc");
        let sys_root = root.path().join("sys");
        write(&proc_root.join("loadavg"), "0.52 0.58 0.59 1/467 12345\n");
        write(
            &proc_root.join("meminfo"),
            "MemTotal: 8000 kB\nMemAvailable: 2000 kB\n",
        );
        write(&sys_root.join("class/thermal/thermal_zone0/type"), "acpitz\n");
        write(&sys_root.join("class/thermal/thermal_zone0/temp"), "40000\n");
        write(&sys_root.join("class/hwmon/hwmon3/name"), "coretemp\n");
        write(&sys_root.join("class/hwmon/hwmon3/temp1_input"), "52000\n");

        let metrics = LinuxMonitor::with_roots(&proc_root, &sys_root).read();
        assert_eq!(metrics.cpu_load, 0.52);
        assert_eq!(metrics.ram_pct, 75.0);
        assert_eq!(metrics.temp_c, 52.0);
    }

    #[test]
    fn test_temperature_fallback_order() {
        let root = tempfile::tempdir().unwrap();
        let sys = root.path();
        write(&sys.join("class/thermal/thermal_zone0/type"), "acpitz\n");
        write(&sys.join("class/thermal/thermal_zone0/temp"), "0\n");
        write(&sys.join("class/thermal/thermal_zone1/type"), "iwlwifi_1\n");
        write(&sys.join("class/thermal/thermal_zone1/temp"), "38000\n");
        write(&sys.join("class/thermal/thermal_zone2/type"), "x86_pkg_temp\n");
        write(&sys.join("class/thermal/thermal_zone2/temp"), "61000\n");
        assert_eq!(linux_temperature(sys), Some(61.0));

        fs::write(sys.join("class/thermal/thermal_zone2/temp"), "garbage\n").unwrap();
        assert_eq!(linux_temperature(sys), Some(38.0));
    }

    #[test]
    fn test_temperature_other_hwmon_last() {
        let root = tempfile::tempdir().unwrap();
        let sys = root.path();
        write(&sys.join("class/hwmon/hwmon0/name"), "nvme\n");
        write(&sys.join("class/hwmon/hwmon0/temp1_input"), "35850\n");
        assert_eq!(linux_temperature(sys), Some(35.85));
    }

    #[test]
    fn test_missing_everything_is_zero() {
        let root = tempfile::tempdir().unwrap();
        let monitor = LinuxMonitor::with_roots(root.path().join("proc"), root.path().join("sys"));
        let metrics = monitor.read();
        assert_eq!(metrics.ram_pct, 0.0);
        assert_eq!(metrics.temp_c, 0.0);
        assert!(metrics.cpu_load >= 0.0 && metrics.cpu_load.is_finite());
        assert_eq!(NullMonitor.read(), SystemMetrics::default());
    }
}
