#![no_main]

//! Fuzz harness for envelope decoding.
//!
//! Any JSON document must decode to a value or a decode error, never panic.
//! Once encoded, a value re-encodes to the same envelope (dates are
//! normalized to millisecond precision on the first pass).

use libfuzzer_sys::fuzz_target;
use playwright_dispatch::protocol::{parse_value, serialize_argument};

fuzz_target!(|data: &[u8]| {
    let Ok(json) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(value) = parse_value(&json, &[]) else {
        return;
    };

    let encoded = serialize_argument(&value);
    assert!(encoded.handles.is_empty());
    // Offsets can push a date outside four-digit years, which does not parse back
    if let Ok(decoded) = parse_value(&encoded.value, &[]) {
        assert_eq!(serialize_argument(&decoded), encoded);
    }
});
