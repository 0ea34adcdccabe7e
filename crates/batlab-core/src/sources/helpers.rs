//! Shared helpers used by multiple battery and system readers.
//!
//! Command execution lives here so every reader maps spawn failures the same
//! way, and the number/field extractors keep each reader's parser a small
//! pure function.

use std::io;
use std::path::Path;

// ---------------------------------------------------------------------------
// Shared command utilities
// ---------------------------------------------------------------------------

/// Check if a command exists by running `which`.
pub fn command_exists(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a command and return its stdout, keeping the failure kind.
///
/// A spawn failure keeps its `io::ErrorKind` (`NotFound` for a missing
/// binary). A non-zero exit whose stderr mentions a permission problem maps
/// to `PermissionDenied`; other non-zero exits are `Other`.
pub fn run_command_io(program: &str, args: &[&str]) -> io::Result<String> {
    let output = std::process::Command::new(program).args(args).output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let kind = if is_permission_message(&stderr) {
            io::ErrorKind::PermissionDenied
        } else {
            io::ErrorKind::Other
        };
        return Err(io::Error::new(
            kind,
            format!("{program} exited with {}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a subprocess command and return its stdout as a `String`.
///
/// Returns `None` if the command fails to execute or exits with a non-zero
/// status.
pub fn run_command(program: &str, args: &[&str]) -> Option<String> {
    run_command_io(program, args).ok()
}

fn is_permission_message(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("permission denied") || lower.contains("operation not permitted")
}

/// Read a small text file, trimmed. Empty files read as `Ok("")`.
pub fn read_trimmed(path: &Path) -> io::Result<String> {
    Ok(std::fs::read_to_string(path)?.trim().to_string())
}

/// Read the first whitespace token of a file as `f64`.
pub fn read_first_f64(path: &Path) -> Option<f64> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.split_whitespace().next().and_then(parse_number))
}

// ---------------------------------------------------------------------------
// Text extraction
// ---------------------------------------------------------------------------

/// Parse a number that may use `,` as decimal separator and carry a unit.
///
/// `"8,45 W"`, `"85%"`, `"45.0C"`, `"12500 mW"` and `"1,234.5"` all parse.
/// Returns `None` for anything without a leading numeric part or for
/// non-finite results.
pub fn parse_number(raw: &str) -> Option<f64> {
    let token: String = raw
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | ','))
        .collect();
    if !token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (token.contains(','), token.contains('.')) {
        // Both present: comma is a thousands separator.
        (true, true) => token.replace(',', ""),
        (true, false) if token.matches(',').count() == 1 => token.replace(',', "."),
        (true, false) => token.replace(',', ""),
        _ => token,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Split `"  key:   value  "` into trimmed `(key, value)`.
pub fn split_field(line: &str, sep: char) -> Option<(&str, &str)> {
    let (k, v) = line.split_once(sep)?;
    let k = k.trim();
    if k.is_empty() {
        None
    } else {
        Some((k, v.trim()))
    }
}

/// Value of the first `key<sep>value` line whose key matches case-insensitively.
pub fn find_field<'a>(content: &'a str, key: &str, sep: char) -> Option<&'a str> {
    content
        .lines()
        .filter_map(|l| split_field(l, sep))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Whether `word` appears as a whole whitespace-delimited token.
///
/// `"discharging"` does not contain the word `"charging"`.
pub fn contains_word(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|t| t.eq_ignore_ascii_case(word))
}
