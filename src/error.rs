//! Error types for the OTA uploader.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Everything that can end (or, for polls, interrupt) an OTA run.
#[derive(Debug, Error)]
pub enum OtaError {
    /// Firmware path missing or not a regular file
    #[error("firmware file '{}' not found", .0.display())]
    FileNotFound(PathBuf),

    /// Firmware exists but could not be read
    #[error("failed to read firmware '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Request could not be sent or no response arrived in time
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Device answered the invite with something other than 200
    #[error("OTA invite rejected with HTTP {status}: {body}")]
    InviteRejected { status: u16, body: String },

    /// Device answered with an unexpected status code or payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Device reported that the update failed
    #[error("device reported OTA failure (status {0})")]
    Failed(String),

    /// No terminal status before the poll deadline
    #[error("OTA status polling timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Operator interrupted the run
    #[error("OTA interrupted")]
    Cancelled,

    /// The address the device should fetch from could not be determined
    #[error("could not determine local address: {0}")]
    LocalAddress(#[source] io::Error),

    /// The local file server could not be started
    #[error("file server error: {0}")]
    Server(#[source] io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OtaError {
    /// Poll errors that are logged and retried rather than ending the run.
    pub fn is_transient(&self) -> bool {
        matches!(self, OtaError::Network(_) | OtaError::Protocol(_))
    }

    /// Process exit code for this error. Every failure exits with 1.
    pub fn exit_code(&self) -> u8 {
        1
    }
}

pub type Result<T> = std::result::Result<T, OtaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(OtaError::Protocol("bad json".into()).is_transient());
        assert!(!OtaError::Timeout(Duration::from_secs(300)).is_transient());
        assert!(!OtaError::Failed("FAILED".into()).is_transient());
        assert!(!OtaError::Cancelled.is_transient());
    }

    #[test]
    fn test_messages_distinguish_timeout_and_failure() {
        let timeout = OtaError::Timeout(Duration::from_secs(300)).to_string();
        let failed = OtaError::Failed("OTA_FAILED".into()).to_string();
        assert!(timeout.contains("timed out after 300s"));
        assert!(failed.contains("OTA_FAILED"));
        assert_ne!(timeout, failed);
    }

    #[test]
    fn test_file_not_found_message() {
        let err = OtaError::FileNotFound(PathBuf::from("build/firmware.bin"));
        assert_eq!(err.to_string(), "firmware file 'build/firmware.bin' not found");
        assert_eq!(err.exit_code(), 1);
    }
}
