#![no_main]
use libfuzzer_sys::fuzz_target;

use ferro_tls::connection::{NullObserver, TlsClient};
use ferro_tls::TlsConfig;

fuzz_target!(|data: &[u8]| {
    let mut client = TlsClient::new(TlsConfig::default(), Box::new(NullObserver));
    if client.start().is_err() {
        return;
    }
    let _ = client.read_input(data);
    let _ = client.take_output();
});
