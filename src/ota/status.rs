// Device-side OTA status and the poller that waits for a terminal state

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::device::DeviceAddress;
use crate::error::{OtaError, Result};
use crate::progress::Reporter;

pub const STATUS_PATH: &str = "/ota/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    Unknown,
    Idle,
    InProgress,
    Success,
    Failed,
}

impl OtaStatus {
    /// Map a device status label (any case) to a status.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_uppercase().as_str() {
            "SUCCESS" | "OTA_SUCCESS" => OtaStatus::Success,
            "FAILED" | "OTA_FAILED" => OtaStatus::Failed,
            "IDLE" => OtaStatus::Idle,
            "IN_PROGRESS" | "OTA_IN_PROGRESS" | "DOWNLOADING" | "WRITING" | "VERIFYING" => {
                OtaStatus::InProgress
            }
            _ => OtaStatus::Unknown,
        }
    }

    /// IDLE means the device already rebooted into the new image.
    pub fn is_success(self) -> bool {
        matches!(self, OtaStatus::Success | OtaStatus::Idle)
    }

    pub fn is_terminal(self) -> bool {
        self.is_success() || self == OtaStatus::Failed
    }
}

/// One parsed `/ota/status` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: OtaStatus,
    /// Upper-cased label as sent by the device
    pub label: String,
    /// 0..=100
    pub progress: u8,
}

#[derive(Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<serde_json::Value>,
}

/// Devices send the percentage as a number or a numeric string.
fn progress_percent(value: Option<&serde_json::Value>) -> u8 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    };
    match raw {
        Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
        _ => 0,
    }
}

impl StatusReport {
    pub fn parse(body: &[u8]) -> Result<Self> {
        let body: StatusBody = serde_json::from_slice(body)
            .map_err(|e| OtaError::Protocol(format!("JSON decode error: {}", e)))?;

        let label = body
            .status
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        let progress = progress_percent(body.progress.as_ref());

        Ok(Self {
            status: OtaStatus::from_label(&label),
            label,
            progress,
        })
    }

    fn same_as(&self, other: &StatusReport) -> bool {
        self.label == other.label && self.progress == other.progress
    }
}

/// Polls `GET /ota/status` until success, failure, the deadline or cancellation.
pub struct StatusPoller {
    client: Client,
    url: String,
    interval: Duration,
    timeout: Duration,
    request_timeout: Duration,
}

impl StatusPoller {
    pub fn new(
        client: Client,
        device: &DeviceAddress,
        interval: Duration,
        timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            url: device.endpoint(STATUS_PATH),
            interval,
            timeout,
            request_timeout,
        }
    }

    /// Returns the terminal report on success, `Failed`, `Timeout` or `Cancelled` otherwise.
    pub async fn wait_for_completion(
        &self,
        reporter: &dyn Reporter,
        cancel: &CancellationToken,
    ) -> Result<StatusReport> {
        let deadline = Instant::now() + self.timeout;
        let mut last: Option<StatusReport> = None;

        log::info!("Polling {} every {:?} (timeout {:?})", self.url, self.interval, self.timeout);

        while Instant::now() < deadline {
            if cancel.is_cancelled() {
                return Err(OtaError::Cancelled);
            }

            match self.poll_once().await {
                Ok(report) => {
                    if last.as_ref().map_or(true, |prev| !prev.same_as(&report)) {
                        reporter.status_changed(&report);
                    }
                    if report.status.is_success() {
                        return Ok(report);
                    }
                    if report.status == OtaStatus::Failed {
                        return Err(OtaError::Failed(report.label));
                    }
                    last = Some(report);
                }
                Err(e) if e.is_transient() => {
                    log::warn!("Status poll failed: {}", e);
                    reporter.poll_error(&e);
                }
                Err(e) => return Err(e),
            }

            let wake = (Instant::now() + self.interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return Err(OtaError::Cancelled),
                _ = tokio::time::sleep_until(wake) => {}
            }
        }

        Err(OtaError::Timeout(self.timeout))
    }

    async fn poll_once(&self) -> Result<StatusReport> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let code = response.status();
        if !code.is_success() {
            return Err(OtaError::Protocol(format!(
                "status endpoint answered HTTP {}",
                code.as_u16()
            )));
        }

        let body = response.bytes().await?;
        StatusReport::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_mapping() {
        assert_eq!(OtaStatus::from_label("success"), OtaStatus::Success);
        assert_eq!(OtaStatus::from_label("OTA_SUCCESS"), OtaStatus::Success);
        assert_eq!(OtaStatus::from_label("OTA_FAILED"), OtaStatus::Failed);
        assert_eq!(OtaStatus::from_label("idle"), OtaStatus::Idle);
        assert_eq!(OtaStatus::from_label("in_progress"), OtaStatus::InProgress);
        assert_eq!(OtaStatus::from_label("DOWNLOADING"), OtaStatus::InProgress);
        assert_eq!(OtaStatus::from_label("REBOOTING"), OtaStatus::Unknown);
    }

    #[test]
    fn test_terminal_states() {
        assert!(OtaStatus::Idle.is_success());
        assert!(OtaStatus::Failed.is_terminal());
        assert!(!OtaStatus::Failed.is_success());
        assert!(!OtaStatus::InProgress.is_terminal());
        assert!(!OtaStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_parse_report() {
        let report = StatusReport::parse(br#"{"status":"in_progress","progress":42}"#).unwrap();
        assert_eq!(report.status, OtaStatus::InProgress);
        assert_eq!(report.label, "IN_PROGRESS");
        assert_eq!(report.progress, 42);
    }

    #[test]
    fn test_parse_defaults_and_clamping() {
        let report = StatusReport::parse(b"{}").unwrap();
        assert_eq!(report.status, OtaStatus::Unknown);
        assert_eq!(report.label, "UNKNOWN");
        assert_eq!(report.progress, 0);

        let report = StatusReport::parse(br#"{"status":"SUCCESS","progress":250}"#).unwrap();
        assert_eq!(report.progress, 100);

        let report = StatusReport::parse(br#"{"status":"WRITING","progress":-3}"#).unwrap();
        assert_eq!(report.progress, 0);
    }

    #[test]
    fn test_non_numeric_progress_keeps_status() {
        let report = StatusReport::parse(br#"{"status":"SUCCESS","progress":"100"}"#).unwrap();
        assert_eq!(report.status, OtaStatus::Success);
        assert_eq!(report.progress, 100);

        let report = StatusReport::parse(br#"{"status":"IN_PROGRESS","progress":"42%"}"#).unwrap();
        assert_eq!(report.progress, 42);

        let report = StatusReport::parse(br#"{"status":"SUCCESS","progress":"done"}"#).unwrap();
        assert_eq!(report.status, OtaStatus::Success);
        assert_eq!(report.progress, 0);

        let report = StatusReport::parse(br#"{"status":"SUCCESS","progress":null}"#).unwrap();
        assert_eq!(report.progress, 0);
    }

    #[test]
    fn test_parse_malformed() {
        let err = StatusReport::parse(b"<html>busy</html>").unwrap_err();
        assert!(matches!(err, OtaError::Protocol(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_unknown_labels_are_kept() {
        let report = StatusReport::parse(br#"{"status":"rebooting"}"#).unwrap();
        assert_eq!(report.status, OtaStatus::Unknown);
        assert_eq!(report.label, "REBOOTING");
    }
}
