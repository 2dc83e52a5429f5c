//! Fuzz target for run record loading.
//!
//! Records are read back from disk for analysis and manual resends, so a
//! truncated or hand-edited file must produce an error, never a panic.

#![no_main]

use km_record::RecordStore;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = RecordStore::from_bytes(data);
});
