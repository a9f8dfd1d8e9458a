#![no_main]
use libfuzzer_sys::fuzz_target;

use ferro_tls::record::RecordLayer;

fuzz_target!(|data: &[u8]| {
    let mut layer = RecordLayer::new();
    let _ = layer.open(data);
});
