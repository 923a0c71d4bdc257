//! Fuzz target for inbound envelope handling
//!
//! Feeds arbitrary bytes through JSON decoding, payload interpretation and
//! routing to find:
//! - Parser panics on malformed JSON
//! - Base64 or nonce length handling that slips past validation
//! - Router panics on unexpected field combinations
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use roomkey_client::MessageRouter;
use roomkey_proto::Envelope;

fuzz_target!(|data: &[u8]| {
    let Ok(json) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(envelope) = Envelope::decode(json) else {
        return;
    };

    let _ = envelope.payload();

    let mut router = MessageRouter::new("fuzzer", "general");
    let _ = router.route(&envelope);
});
