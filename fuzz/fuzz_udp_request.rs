//! Fuzz target for UDP request datagrams.
//!
//! Run with: cargo +nightly fuzz run fuzz_udp_request

#![no_main]

use ipkcp_core::codec::{MAX_PAYLOAD_LEN, RESPONSE_HEADER_LEN, decode_response};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|datagram: &[u8]| {
    let response = ipkcp_core::udp::handle_datagram(datagram);
    assert!(response.len() <= RESPONSE_HEADER_LEN + MAX_PAYLOAD_LEN);
    assert!(decode_response(&response).is_some());
});
