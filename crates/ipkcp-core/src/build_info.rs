//! Build-time metadata embedded by the build script.

/// The git commit hash at build time (short form).
pub const GIT_HASH: &str = env!("IPKCP_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("IPKCP_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("IPKCP_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version string logged by the server and client at startup.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_string_mentions_crate_version() {
        let v = version_string();
        assert!(v.starts_with(VERSION));
        assert!(v.contains(GIT_HASH));
    }

    #[test]
    fn test_build_timestamp_is_numeric() {
        assert!(BUILD_TIMESTAMP.chars().all(|c| c.is_ascii_digit()));
    }
}
