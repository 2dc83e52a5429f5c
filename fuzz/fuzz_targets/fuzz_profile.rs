//! Fuzz target for firing profile JSON.
//!
//! A profile that parses and validates must also interpolate without
//! panicking anywhere on its schedule.

#![no_main]

use km_common::Profile;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(profile) = Profile::from_json(text) {
        let end = profile.duration();
        for i in 0..=8 {
            let _ = profile.target_at(end * f64::from(i) / 8.0);
        }
        let _ = serde_json::to_string(&profile);
    }
});
