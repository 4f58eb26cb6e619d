// Centralized version information

// Firmware version compared against the published version marker.
// Bump the Cargo.toml version for every image uploaded to the bucket.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const PACKAGE_NAME: &str = env!("CARGO_PKG_NAME");

// Version info string for logging
pub fn version_info() -> String {
    format!("{} v{}", PACKAGE_NAME, FIRMWARE_VERSION)
}
