#![deny(unsafe_code)]

//! Shared test utilities for the IPKCP workspace.
//!
//! Config builders, a loopback server fixture, and tracing setup, so that
//! integration tests stay short.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! ipkcp-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod server;
pub mod tracing_setup;
