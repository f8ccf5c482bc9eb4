//! Fuzz target for the TOML configuration loader.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data)
        && let Ok(config) = ipkcp_config::AppConfig::parse(s)
    {
        // Anything that parses has already passed validation.
        assert_ne!(config.server.port, 0);
        assert!(config.limits.max_sessions >= 1);
    }
});
