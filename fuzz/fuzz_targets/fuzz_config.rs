//! Fuzz target for config.toml parsing and validation.

#![no_main]

use std::path::Path;

use km_core::config::MonitorConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = MonitorConfig::from_toml_str(text, Path::new("fuzz.toml")) {
        let _ = config.validate();
        let _ = config.to_toml_string();
    }
});
