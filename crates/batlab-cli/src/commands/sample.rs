//! `batlab sample`: one-shot acquisition.

use batlab_core::{OsFamily, Sampler};

pub fn run() {
    let mut sampler = Sampler::for_current_platform();
    if !sampler.resolver().has_sources() {
        eprintln!(
            "Error: no battery sources available on this system ({})",
            OsFamily::current()
        );
        std::process::exit(1);
    }

    for info in sampler.resolver().source_infos() {
        eprintln!("  {:<10} {:<13} {}", info.name, info.role.to_string(), info.description);
    }
    let sample = sampler.sample();
    match serde_json::to_string_pretty(&sample) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing sample: {e}");
            std::process::exit(1);
        }
    }
}
