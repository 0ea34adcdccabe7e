pub mod export;
pub mod log;
pub mod metadata;
pub mod report;
pub mod sample;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use batlab_core::AnalysisConfig;

/// Analysis settings with a custom minimum sample count.
pub fn analysis_config(min_samples: usize) -> AnalysisConfig {
    AnalysisConfig {
        min_valid_samples: min_samples,
        ..AnalysisConfig::default()
    }
}

/// Writer for `--output`, or stdout.
pub fn open_output(output: Option<&str>) -> Box<dyn Write> {
    match output {
        Some(path) => {
            if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                eprintln!("Error creating {}: {e}", parent.display());
                std::process::exit(1);
            }
            match File::create(path) {
                Ok(file) => Box::new(BufWriter::new(file)),
                Err(e) => {
                    eprintln!("Error creating {path}: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => Box::new(io::stdout().lock()),
    }
}
