// Version information: the uploader's own and the firmware's

use std::path::Path;

// Cargo package version from Cargo.toml
pub const CARGO_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Sent when no firmware version can be determined
pub const FALLBACK_FIRMWARE_VERSION: &str = "0.0.0";

// Version info string for logging
pub fn version_info() -> String {
    format!("tixel-ota {}", CARGO_VERSION)
}

/// Firmware version from `version.txt` (trimmed), or "0.0.0" with a warning.
pub fn read_firmware_version(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(contents) if !contents.trim().is_empty() => contents.trim().to_string(),
        Ok(_) => {
            log::warn!("{} is empty, using {}", path.display(), FALLBACK_FIRMWARE_VERSION);
            FALLBACK_FIRMWARE_VERSION.to_string()
        }
        Err(e) => {
            log::warn!(
                "Could not read version from {}: {}, using {}",
                path.display(),
                e,
                FALLBACK_FIRMWARE_VERSION
            );
            FALLBACK_FIRMWARE_VERSION.to_string()
        }
    }
}
