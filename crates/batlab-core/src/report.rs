//! Cross-run reports.
//!
//! Loads every run in a data directory, summarizes each one and groups the
//! summaries by configuration, OS or workload. Runs that cannot be loaded or
//! summarized become [`Exclusion`]s; they never abort the batch.
//!
//! Output formats: a fixed-width table, the CSV summary export and JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::Statistics;

use crate::error::LoadError;
use crate::identity::RunIdentity;
use crate::loader::{discover_runs, load_run};
use crate::stats::{AnalysisConfig, RunSummary, summarize_with};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One summarized run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(flatten)]
    pub identity: RunIdentity,
    #[serde(flatten)]
    pub summary: RunSummary,
}

/// A run left out of the report, and why.
#[derive(Debug, Clone, Serialize)]
pub struct Exclusion {
    pub run_id: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Field used to group runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupBy {
    #[default]
    Config,
    Os,
    Workload,
}

impl GroupBy {
    /// Group key of a run. Runs without a workload group under `none`.
    pub fn key<'a>(self, identity: &'a RunIdentity) -> &'a str {
        match self {
            GroupBy::Config => &identity.config,
            GroupBy::Os => &identity.os,
            GroupBy::Workload => identity.workload.as_deref().unwrap_or("none"),
        }
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "config" => Ok(GroupBy::Config),
            "os" => Ok(GroupBy::Os),
            "workload" => Ok(GroupBy::Workload),
            other => Err(format!(
                "unknown grouping '{other}' (expected config, os or workload)"
            )),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GroupBy::Config => "config",
            GroupBy::Os => "os",
            GroupBy::Workload => "workload",
        })
    }
}

/// Statistics over the `avg_watts` of every run in one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub key: String,
    pub runs: usize,
    pub mean_watts: f64,
    /// Population standard deviation.
    pub std_watts: f64,
    /// Half-width of the 95% Student-t interval of the mean; needs two runs.
    pub ci95_half_width: Option<f64>,
    /// `(baseline - mean) / baseline * 100`; positive draws less power.
    pub efficiency_vs_baseline: Option<f64>,
}

/// Everything one `report` pass produces.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub summaries: Vec<RunReport>,
    pub groups: Vec<GroupStats>,
    pub excluded: Vec<Exclusion>,
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Load and summarize each log. Summaries come back sorted by run id.
pub fn analyze_runs(paths: &[PathBuf], base: &AnalysisConfig) -> (Vec<RunReport>, Vec<Exclusion>) {
    let mut reports = Vec::new();
    let mut excluded = Vec::new();

    for path in paths {
        let run = match load_run(path) {
            Ok(run) => run,
            Err(e) => {
                log::warn!("skipping {}: {e}", path.display());
                excluded.push(Exclusion {
                    run_id: stem(path),
                    path: path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let config = run.analysis_config(*base);
        match summarize_with(&run.samples, run.malformed_lines, &config) {
            Ok(summary) => reports.push(RunReport {
                identity: run.identity,
                summary,
            }),
            Err(e) => {
                log::info!("excluding {}: {e}", run.identity.run_id);
                excluded.push(Exclusion {
                    run_id: run.identity.run_id,
                    path: run.path,
                    reason: e.to_string(),
                });
            }
        }
    }

    reports.sort_by(|a, b| a.identity.run_id.cmp(&b.identity.run_id));
    (reports, excluded)
}

/// Analyze every run in `dir`.
pub fn analyze_dir(
    dir: &Path,
    base: &AnalysisConfig,
    group_by: GroupBy,
    baseline: Option<&str>,
) -> Result<BatchReport, LoadError> {
    let paths = discover_runs(dir)?;
    log::debug!("found {} run logs in {}", paths.len(), dir.display());
    let (summaries, excluded) = analyze_runs(&paths, base);
    let groups = group_stats(&summaries, group_by, baseline);
    Ok(BatchReport {
        summaries,
        groups,
        excluded,
    })
}

/// Per-group statistics, sorted by group key.
pub fn group_stats(runs: &[RunReport], group_by: GroupBy, baseline: Option<&str>) -> Vec<GroupStats> {
    let mut grouped: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for run in runs {
        grouped
            .entry(group_by.key(&run.identity))
            .or_default()
            .push(run.summary.avg_watts);
    }

    let baseline_mean = baseline.and_then(|name| match grouped.get(name) {
        Some(watts) => Some(watts.iter().mean()),
        None => {
            log::warn!("baseline group '{name}' not found for --group-by {group_by}");
            None
        }
    });

    grouped
        .into_iter()
        .map(|(key, watts)| {
            let mean = watts.iter().mean();
            GroupStats {
                key: key.to_string(),
                runs: watts.len(),
                mean_watts: mean,
                std_watts: watts.iter().population_std_dev(),
                ci95_half_width: ci95_half_width(&watts),
                efficiency_vs_baseline: baseline_mean
                    .filter(|b| *b > 0.0)
                    .map(|b| (b - mean) / b * 100.0),
            }
        })
        .collect()
}

fn ci95_half_width(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let t = StudentsT::new(0.0, 1.0, (n - 1) as f64).ok()?.inverse_cdf(0.975);
    let sd = values.iter().std_dev();
    Some(t * sd / (n as f64).sqrt())
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ExportRow<'a> {
    run_id: &'a str,
    os: &'a str,
    config: &'a str,
    workload: &'a str,
    duration_s: f64,
    avg_watts: f64,
    median_watts: f64,
    p95_watts: f64,
    avg_cpu_load: f64,
    avg_ram_pct: f64,
    avg_temp_c: f64,
    pct_drop: f64,
    samples_ok: usize,
    samples_total: usize,
}

impl<'a> From<&'a RunReport> for ExportRow<'a> {
    fn from(run: &'a RunReport) -> Self {
        let s = &run.summary;
        Self {
            run_id: &run.identity.run_id,
            os: &run.identity.os,
            config: &run.identity.config,
            workload: run.identity.workload_label(),
            duration_s: s.duration_s,
            avg_watts: s.avg_watts,
            median_watts: s.median_watts,
            p95_watts: s.p95_watts,
            avg_cpu_load: s.avg_cpu_load,
            avg_ram_pct: s.avg_ram_pct,
            avg_temp_c: s.avg_temp_c,
            pct_drop: s.pct_drop,
            samples_ok: s.samples_valid,
            samples_total: s.samples_total,
        }
    }
}

/// Write the CSV summary export, one row per run, with a header.
pub fn write_csv<W: Write>(runs: &[RunReport], out: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    if runs.is_empty() {
        writer.write_record(CSV_HEADER)?;
    }
    for run in runs {
        writer.serialize(ExportRow::from(run))?;
    }
    writer.flush()?;
    Ok(())
}

/// CSV export column order.
pub const CSV_HEADER: [&str; 14] = [
    "run_id",
    "os",
    "config",
    "workload",
    "duration_s",
    "avg_watts",
    "median_watts",
    "p95_watts",
    "avg_cpu_load",
    "avg_ram_pct",
    "avg_temp_c",
    "pct_drop",
    "samples_ok",
    "samples_total",
];

impl BatchReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write_csv<W: Write>(&self, out: W) -> csv::Result<()> {
        write_csv(&self.summaries, out)
    }

    /// Fixed-width text: runs, then groups, then exclusions.
    pub fn render_table(&self, group_by: GroupBy) -> String {
        let mut out = String::new();

        out.push_str("RUNS\n");
        out.push_str(&format!(
            "{:<44} {:<12} {:<10} {:>8} {:>7} {:>7} {:>7} {:>6} {:>6} {:>6}\n",
            "Run", "Config", "Workload", "Samples", "Avg W", "Med W", "P95 W", "CPU%", "Temp", "Drop%"
        ));
        out.push_str(&"-".repeat(122));
        out.push('\n');
        for run in &self.summaries {
            let s = &run.summary;
            out.push_str(&format!(
                "{:<44} {:<12} {:<10} {:>8} {:>7.2} {:>7.2} {:>7.2} {:>6.1} {:>6.1} {:>6.1}{}\n",
                truncate(&run.identity.run_id, 44),
                truncate(&run.identity.config, 12),
                truncate(run.identity.workload.as_deref().unwrap_or("-"), 10),
                format!("{}/{}", s.samples_valid, s.samples_total),
                s.avg_watts,
                s.median_watts,
                s.p95_watts,
                s.avg_cpu_load * 100.0,
                s.avg_temp_c,
                s.pct_drop,
                markers(s),
            ));
        }
        if self.summaries.iter().any(|r| !markers(&r.summary).is_empty()) {
            out.push_str("  * low confidence (<50% valid)   ~ slope-estimated watts   ! charging seen\n");
        }

        out.push('\n');
        out.push_str(&format!("GROUPS (by {group_by})\n"));
        out.push_str(&format!(
            "{:<24} {:>5} {:>10} {:>8} {:>9} {:>12}\n",
            "Group", "Runs", "Mean W", "Std", "±95%", "vs baseline"
        ));
        out.push_str(&"-".repeat(73));
        out.push('\n');
        for group in &self.groups {
            let ci = group
                .ci95_half_width
                .map(|h| format!("{h:.2}"))
                .unwrap_or_else(|| "-".to_string());
            let vs = group
                .efficiency_vs_baseline
                .map(|e| format!("{e:+.1}%"))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<24} {:>5} {:>10.2} {:>8.2} {:>9} {:>12}\n",
                truncate(&group.key, 24),
                group.runs,
                group.mean_watts,
                group.std_watts,
                ci,
                vs,
            ));
        }

        if !self.excluded.is_empty() {
            out.push('\n');
            out.push_str(&format!("EXCLUDED ({})\n", self.excluded.len()));
            for ex in &self.excluded {
                out.push_str(&format!("  {}: {}\n", ex.run_id, ex.reason));
            }
        }

        out
    }
}

fn markers(s: &RunSummary) -> String {
    let mut m = String::new();
    if s.low_confidence {
        m.push_str(" *");
    }
    if s.estimated_samples > 0 {
        m.push_str(" ~");
    }
    if s.charging_contaminated {
        m.push_str(" !");
    }
    m
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    }
}
