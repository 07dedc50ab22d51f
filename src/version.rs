#![allow(dead_code)]
/// Version information module containing package details
use std::fmt;

/// Build-time version information
pub struct VersionInfo {
    pub package_version: &'static str,
    pub package_name: &'static str,
}

impl VersionInfo {
    /// Get the current version information
    pub fn current() -> Self {
        VersionInfo {
            package_version: env!("CARGO_PKG_VERSION"),
            package_name: env!("CARGO_PKG_NAME"),
        }
    }

    /// Get a short version string
    pub fn short_version(&self) -> String {
        format!("{} {}", self.package_name, self.package_version)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_version())
    }
}
