//! `batlab metadata`: print detected system information.

use batlab_core::detect_system_info;

pub fn run() {
    let info = detect_system_info();
    match serde_json::to_string_pretty(&info) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("Error serializing system info: {e}");
            std::process::exit(1);
        }
    }
}
