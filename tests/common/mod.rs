//! Shared fixtures for the OTA flow tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tixel_ota::ota::{DeviceAddress, OtaUpdater, StatusReport};
use tixel_ota::progress::Reporter;
use tixel_ota::{OtaConfig, OtaError};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

/// Reporter that records what the operator would have seen.
#[derive(Default)]
pub struct RecordingReporter {
    pub statuses: Mutex<Vec<StatusReport>>,
    pub invites: Mutex<Vec<u16>>,
    pub poll_errors: AtomicUsize,
    pub stopped: AtomicUsize,
}

impl RecordingReporter {
    pub fn status_lines(&self) -> Vec<(String, u8)> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.label.clone(), r.progress))
            .collect()
    }

    pub fn stop_count(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn poll_error_count(&self) -> usize {
        self.poll_errors.load(Ordering::SeqCst)
    }
}

impl Reporter for RecordingReporter {
    fn invite_answered(&self, status: u16, _body: &str) {
        self.invites.lock().unwrap().push(status);
    }

    fn status_changed(&self, report: &StatusReport) {
        self.statuses.lock().unwrap().push(report.clone());
    }

    fn poll_error(&self, _error: &OtaError) {
        self.poll_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn server_stopped(&self) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// A firmware image in a temp dir, plus the dir guard.
pub struct Firmware {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
    pub data: Vec<u8>,
}

pub fn firmware(len: usize) -> Firmware {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("firmware.bin");
    let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
    std::fs::write(&path, &data).unwrap();
    Firmware {
        _dir: dir,
        path,
        data,
    }
}

/// Firmware linked into its directory: `firmware.bin -> v1/fw-1.bin`.
#[cfg(unix)]
pub fn linked_firmware(len: usize) -> Firmware {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("v1")).unwrap();
    let data: Vec<u8> = (0..len).map(|i| (i % 241) as u8).collect();
    std::fs::write(dir.path().join("v1").join("fw-1.bin"), &data).unwrap();
    let path = dir.path().join("firmware.bin");
    std::os::unix::fs::symlink("v1/fw-1.bin", &path).unwrap();
    Firmware {
        _dir: dir,
        path,
        data,
    }
}

/// Fast polling against a local device.
pub fn test_config() -> OtaConfig {
    OtaConfig {
        poll_interval_ms: 20,
        poll_timeout_ms: 5_000,
        status_request_timeout_ms: 1_000,
        invite_timeout_ms: 5_000,
        firmware_version: Some("2.0.1".to_string()),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        advertise_host: Some("127.0.0.1".parse().unwrap()),
        shutdown_grace_ms: 500,
        ..OtaConfig::default()
    }
}

pub fn device(server: &MockServer) -> DeviceAddress {
    let addr = server.address();
    DeviceAddress::new(addr.ip().to_string(), addr.port())
}

pub fn updater(
    config: OtaConfig,
    reporter: &Arc<RecordingReporter>,
    cancel: CancellationToken,
) -> OtaUpdater {
    OtaUpdater::new(config, reporter.clone(), cancel).unwrap()
}
