//! CLI for batlab: log battery telemetry under a named configuration and compare runs.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "batlab")]
#[command(about = "batlab: battery telemetry for comparing laptop power draw across configurations")]
#[command(version = batlab_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Take one sample and print it as JSON (smoke test for battery sources)
    Sample,

    /// Log telemetry continuously until Ctrl+C
    Log {
        /// Configuration label for this run (letters, digits, hyphens)
        config: String,

        /// Workload label, e.g. idle or web-browse
        #[arg(long)]
        workload: Option<String>,

        /// Sampling frequency in Hz (0.01-10.0)
        #[arg(long, default_value = "0.0167")]
        hz: f64,

        /// Log file path (default: <dir>/<run_id>.jsonl)
        #[arg(long)]
        output: Option<String>,

        /// Data directory for run logs
        #[arg(long, default_value = "data")]
        dir: String,

        /// Stop after this many samples
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        ticks: Option<u64>,
    },

    /// Summarize all runs and compare groups
    Report {
        /// Directory containing run logs
        #[arg(long, default_value = "data")]
        dir: String,

        /// Group runs by configuration, OS or workload
        #[arg(long, default_value = "config", value_parser = ["config", "os", "workload"])]
        group_by: String,

        /// Output format
        #[arg(long, default_value = "table", value_parser = ["table", "csv", "json"])]
        format: String,

        /// Write the report to a file instead of stdout
        #[arg(long)]
        output: Option<String>,

        /// Group to compare every other group against
        #[arg(long)]
        baseline: Option<String>,

        /// Minimum valid samples for a run to be summarized
        #[arg(long, default_value = "10")]
        min_samples: usize,
    },

    /// Export per-run summaries as CSV
    Export {
        /// Directory containing run logs
        #[arg(long, default_value = "data")]
        dir: String,

        /// CSV path (default: stdout)
        #[arg(long)]
        output: Option<String>,

        /// Minimum valid samples for a run to be exported
        #[arg(long, default_value = "1")]
        min_samples: usize,
    },

    /// Print detected system information as JSON
    Metadata,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sample => commands::sample::run(),
        Commands::Log {
            config,
            workload,
            hz,
            output,
            dir,
            ticks,
        } => commands::log::run(commands::log::LogCommandConfig {
            config: &config,
            workload: workload.as_deref(),
            hz,
            output: output.as_deref(),
            dir: &dir,
            ticks,
        }),
        Commands::Report {
            dir,
            group_by,
            format,
            output,
            baseline,
            min_samples,
        } => commands::report::run(commands::report::ReportCommandConfig {
            dir: &dir,
            group_by: &group_by,
            format: &format,
            output: output.as_deref(),
            baseline: baseline.as_deref(),
            min_samples,
        }),
        Commands::Export {
            dir,
            output,
            min_samples,
        } => commands::export::run(&dir, output.as_deref(), min_samples),
        Commands::Metadata => commands::metadata::run(),
    }
}
