//! `batlab log`: record a run until Ctrl+C or `--ticks`.

use std::path::PathBuf;

use batlab_core::{CancelToken, LogConfig, LogSession, Sampler, SessionError};

pub struct LogCommandConfig<'a> {
    pub config: &'a str,
    pub workload: Option<&'a str>,
    pub hz: f64,
    pub output: Option<&'a str>,
    pub dir: &'a str,
    pub ticks: Option<u64>,
}

pub fn run(cmd: LogCommandConfig<'_>) {
    let config = LogConfig {
        config: cmd.config.to_string(),
        workload: cmd.workload.map(str::to_string),
        sampling_hz: cmd.hz,
        output: cmd.output.map(PathBuf::from),
        data_dir: PathBuf::from(cmd.dir),
        ..LogConfig::default()
    };
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    ::log::debug!("{config:?}");

    let sampler = Sampler::for_current_platform();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        eprintln!("Error setting Ctrl+C handler: {e}");
        std::process::exit(1);
    }

    let session = match LogSession::start(&config, sampler, cancel) {
        Ok(s) => s,
        Err(SessionError::NoSources) => {
            eprintln!("Error: no battery source produced a reading");
            eprintln!("  Linux needs upower or /sys/class/power_supply/BAT*; FreeBSD needs acpiconf.");
            eprintln!("  Check that the machine has a battery and that the readers can access it.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error starting run: {e}");
            std::process::exit(1);
        }
    };

    let identity = session.identity();
    println!("Logging run {}", identity.run_id);
    println!("  Config:    {}", identity.config);
    println!("  Workload:  {}", identity.workload.as_deref().unwrap_or("-"));
    println!("  OS:        {}", session.metadata().os);
    println!("  Interval:  {:.1}s", 1.0 / config.sampling_hz);
    match cmd.ticks {
        Some(n) => println!("  Stop:      after {n} samples"),
        None => println!("  Stop:      Ctrl+C"),
    }
    println!("  Output:    {}", session.log_path().display());
    println!();

    let report = match session.run(cmd.ticks) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error finalizing run: {e}");
            std::process::exit(1);
        }
    };

    println!("Run {} saved to {}", report.run_id, report.log_path.display());
    println!(
        "  Samples:   {} in {:.1}s",
        report.ticks_written, report.elapsed_secs
    );
    let wins: Vec<String> = report
        .resolver
        .wins
        .iter()
        .map(|(src, n)| format!("{src}={n}"))
        .collect();
    println!("  Sources:   {}", wins.join(", "));
    println!(
        "  Fallbacks: {} slope, {} rejected outliers",
        report.resolver.fallbacks, report.resolver.rejected_outliers
    );
    if report.write_errors > 0 {
        eprintln!("Warning: {} samples failed to write", report.write_errors);
    }
}
