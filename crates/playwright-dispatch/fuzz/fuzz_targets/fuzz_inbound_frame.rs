#![no_main]

//! Fuzz harness for inbound frame classification.
//!
//! Arbitrary bytes are either classified as a response, control message or
//! event, or rejected with a protocol error.

use libfuzzer_sys::fuzz_target;
use playwright_dispatch::server::message::Inbound;

fuzz_target!(|data: &[u8]| {
    if let Ok(Inbound::Create { guid, .. } | Inbound::Adopt { guid, .. }) = Inbound::parse(data) {
        // Guids come straight from the frame; only their presence is checked
        let _ = guid.len();
    }
});
