//! `batlab export`: CSV summary of every valid run.

use std::io::Write;

use batlab_core::GroupBy;

use super::open_output;
use super::report::load_report;

pub fn run(dir: &str, output: Option<&str>, min_samples: usize) {
    let report = load_report(dir, GroupBy::default(), None, min_samples);

    let mut out = open_output(output);
    let result = report
        .write_csv(&mut out)
        .map_err(|e| e.to_string())
        .and_then(|()| out.flush().map_err(|e| e.to_string()));
    if let Err(e) = result {
        eprintln!("Error writing CSV: {e}");
        std::process::exit(1);
    }

    eprintln!(
        "Exported {} run(s) to {}",
        report.summaries.len(),
        output.unwrap_or("stdout")
    );
    if !report.excluded.is_empty() {
        eprintln!("  {} run(s) excluded", report.excluded.len());
    }
}
