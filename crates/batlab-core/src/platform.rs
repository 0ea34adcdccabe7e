//! Operating system detection and host description.
//!
//! The OS family is decided once at compile time; everything that depends on
//! it (battery readers, system monitors) is selected from [`OsFamily::current`]
//! at process start rather than branching on every call.

use serde::{Deserialize, Serialize};

use crate::sources::helpers::run_command;

/// Operating system family, as far as telemetry sources are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Linux,
    /// FreeBSD and relatives exposing `acpiconf` and `hw.acpi.*`.
    Bsd,
    /// Anything else; no battery readers are registered.
    Other,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(any(
            target_os = "freebsd",
            target_os = "dragonfly",
            target_os = "openbsd",
            target_os = "netbsd"
        )) {
            Self::Bsd
        } else {
            Self::Other
        }
    }

    /// Label used in run ids and as the filename `os` token.
    pub fn label(self) -> &'static str {
        match self {
            Self::Linux => "Linux",
            Self::Bsd => "FreeBSD",
            Self::Other => "Unknown",
        }
    }
}

impl std::fmt::Display for OsFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Host description captured at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub hostname: String,
    /// Human readable OS name, e.g. `Ubuntu 24.04.1 LTS` or `FreeBSD 14.1-RELEASE`.
    pub os: String,
    pub kernel: String,
    pub cpu: String,
    pub machine: String,
}

/// Detect host information (best-effort, never fails).
pub fn detect_system_info() -> SystemInfo {
    let uts = uname();
    let (sysname, kernel, machine) = uts.unwrap_or_default();

    let os = os_pretty_name().unwrap_or_else(|| {
        if sysname.is_empty() {
            OsFamily::current().label().to_string()
        } else {
            format!("{sysname} {kernel}")
        }
    });

    SystemInfo {
        hostname: hostname().unwrap_or_else(|| "unknown".to_string()),
        os,
        kernel,
        cpu: cpu_model().unwrap_or_else(|| "unknown".to_string()),
        machine: if machine.is_empty() {
            std::env::consts::ARCH.to_string()
        } else {
            machine
        },
    }
}

/// Host name from `gethostname(2)`.
pub fn hostname() -> Option<String> {
    #[cfg(unix)]
    {
        let mut buf = [0u8; 256];
        // SAFETY: the buffer is valid for `buf.len()` bytes; gethostname
        // writes at most that many and NUL-terminates on success.
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc != 0 {
            return None;
        }
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
        if name.is_empty() { None } else { Some(name) }
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").ok()
    }
}

/// `(sysname, release, machine)` from `uname(2)`.
fn uname() -> Option<(String, String, String)> {
    #[cfg(unix)]
    {
        // SAFETY: utsname is plain old data; zeroed is a valid initial state
        // and uname fills every field with a NUL-terminated string.
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::uname(&mut uts) };
        if rc != 0 {
            return None;
        }
        Some((
            c_chars_to_string(&uts.sysname),
            c_chars_to_string(&uts.release),
            c_chars_to_string(&uts.machine),
        ))
    }
    #[cfg(not(unix))]
    {
        None
    }
}

#[cfg(unix)]
fn c_chars_to_string(chars: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn os_pretty_name() -> Option<String> {
    match OsFamily::current() {
        OsFamily::Linux => std::fs::read_to_string("/etc/os-release")
            .ok()
            .and_then(|s| parse_os_release(&s)),
        OsFamily::Bsd => run_command("freebsd-version", &[])
            .map(|v| format!("FreeBSD {}", v.trim()))
            .filter(|v| v.len() > "FreeBSD ".len()),
        OsFamily::Other => None,
    }
}

fn cpu_model() -> Option<String> {
    match OsFamily::current() {
        OsFamily::Linux => std::fs::read_to_string("/proc/cpuinfo")
            .ok()
            .and_then(|s| parse_cpuinfo_model(&s)),
        OsFamily::Bsd => run_command("sysctl", &["-n", "hw.model"])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        OsFamily::Other => None,
    }
}

/// `PRETTY_NAME` from an os-release file.
pub(crate) fn parse_os_release(content: &str) -> Option<String> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("PRETTY_NAME="))
        .map(|v| v.trim().trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// First `model name` entry from `/proc/cpuinfo`.
pub(crate) fn parse_cpuinfo_model(content: &str) -> Option<String> {
    content
        .lines()
        .filter(|l| l.starts_with("model name"))
        .find_map(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
