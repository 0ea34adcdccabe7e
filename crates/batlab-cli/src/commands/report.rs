//! `batlab report`: per-run summaries and grouped comparison.

use std::io::Write;
use std::path::Path;

use batlab_core::{BatchReport, GroupBy, analyze_dir};

use super::{analysis_config, open_output};

pub struct ReportCommandConfig<'a> {
    pub dir: &'a str,
    pub group_by: &'a str,
    pub format: &'a str,
    pub output: Option<&'a str>,
    pub baseline: Option<&'a str>,
    pub min_samples: usize,
}

pub fn run(cmd: ReportCommandConfig<'_>) {
    let group_by: GroupBy = match cmd.group_by.parse() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let report = load_report(cmd.dir, group_by, cmd.baseline, cmd.min_samples);

    let mut out = open_output(cmd.output);
    let written = match cmd.format {
        "csv" => report.write_csv(&mut out).map_err(|e| e.to_string()),
        "json" => report
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| writeln!(out, "{json}").map_err(|e| e.to_string())),
        _ => write!(out, "{}", report.render_table(group_by)).map_err(|e| e.to_string()),
    };
    if let Err(e) = written.and_then(|()| out.flush().map_err(|e| e.to_string())) {
        eprintln!("Error writing report: {e}");
        std::process::exit(1);
    }
    if let Some(path) = cmd.output {
        eprintln!(
            "Report for {} run(s) written to {path}",
            report.summaries.len()
        );
    }
}

/// Analyze `dir`, exiting when nothing usable is found.
pub(crate) fn load_report(
    dir: &str,
    group_by: GroupBy,
    baseline: Option<&str>,
    min_samples: usize,
) -> BatchReport {
    if !Path::new(dir).is_dir() {
        eprintln!("No runs found in {dir}/");
        std::process::exit(1);
    }
    let report = match analyze_dir(Path::new(dir), &analysis_config(min_samples), group_by, baseline)
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if report.summaries.is_empty() {
        eprintln!(
            "No valid runs in {dir}/ ({} excluded)",
            report.excluded.len()
        );
        for ex in &report.excluded {
            eprintln!("  {}: {}", ex.run_id, ex.reason);
        }
        std::process::exit(1);
    }
    report
}
