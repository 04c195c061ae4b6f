use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::network::local_ip::DEFAULT_PROBE_ADDR;
use crate::ota::invite::InviteFormat;

/// Settings for one OTA run. Every field has a default, so a config file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtaConfig {
    // Invite
    pub invite_format: InviteFormat,
    pub invite_timeout_ms: u64,

    // Status polling
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub status_request_timeout_ms: u64,

    // Firmware version sent with the JSON invite
    pub version_file: PathBuf,
    pub firmware_version: Option<String>,

    // Local file server
    pub bind_addr: SocketAddr,
    /// Address advertised to the device; discovered when unset
    pub advertise_host: Option<IpAddr>,
    /// Target of the UDP route lookup used for discovery
    pub probe_addr: SocketAddr,
    pub shutdown_grace_ms: u64,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            invite_format: InviteFormat::Json,
            invite_timeout_ms: 600_000,
            poll_interval_ms: 10_000,
            poll_timeout_ms: 300_000,
            status_request_timeout_ms: 5_000,
            version_file: PathBuf::from("version.txt"),
            firmware_version: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            advertise_host: None,
            probe_addr: DEFAULT_PROBE_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([8, 8, 8, 8], 80))),
            shutdown_grace_ms: 2_000,
        }
    }
}

impl OtaConfig {
    /// Load a JSON config file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: OtaConfig = serde_json::from_slice(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll interval must be greater than zero");
        }
        if self.poll_timeout_ms == 0 {
            anyhow::bail!("poll timeout must be greater than zero");
        }
        if self.invite_timeout_ms == 0 || self.status_request_timeout_ms == 0 {
            anyhow::bail!("request timeouts must be greater than zero");
        }
        if let Some(version) = &self.firmware_version {
            if version.trim().is_empty() {
                anyhow::bail!("firmware version cannot be empty");
            }
        }
        Ok(())
    }

    pub fn invite_timeout(&self) -> Duration {
        Duration::from_millis(self.invite_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn status_request_timeout(&self) -> Duration {
        Duration::from_millis(self.status_request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
