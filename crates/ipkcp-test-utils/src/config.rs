//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use ipkcp_config::{AppConfig, TransportMode};

/// Fluent builder for [`AppConfig`] in tests.
///
/// Starts from a loopback address with an ephemeral port.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .mode(TransportMode::Udp)
///     .max_sessions(1)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.server.address = "127.0.0.1".to_string();
        config.server.port = 0;
        Self { config }
    }

    pub fn mode(mut self, mode: TransportMode) -> Self {
        self.config.server.mode = mode;
        self
    }

    pub fn max_sessions(mut self, n: usize) -> Self {
        self.config.limits.max_sessions = n;
        self
    }

    pub fn max_line_len(mut self, n: usize) -> Self {
        self.config.limits.max_line_len = n;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
