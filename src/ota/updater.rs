// One OTA run: checksum -> serve -> invite -> poll -> shut down the server

use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use reqwest::Client;
use tokio_util::sync::CancellationToken;

use super::device::DeviceAddress;
use super::firmware::FirmwareImage;
use super::invite::{send_invite, InviteRequest, InviteStrategy};
use super::status::{StatusPoller, StatusReport};
use crate::config::OtaConfig;
use crate::error::{OtaError, Result};
use crate::network::file_server::ServeSession;
use crate::network::local_ip::outbound_ip;
use crate::network::validators;
use crate::progress::Reporter;
use crate::version;

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OtaOutcome {
    /// Device reported a successful status on `/ota/status`
    Reported(StatusReport),
    /// Device accepted an invite that completes the flash before answering
    Accepted,
}

pub struct OtaUpdater {
    client: Client,
    config: OtaConfig,
    strategy: Box<dyn InviteStrategy>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl OtaUpdater {
    pub fn new(config: OtaConfig, reporter: Arc<dyn Reporter>, cancel: CancellationToken) -> Result<Self> {
        let client = Client::builder().build()?;
        let strategy = config.invite_format.strategy();
        Ok(Self {
            client,
            config,
            strategy,
            reporter,
            cancel,
        })
    }

    /// Push `firmware` to `device`. The file server, once started, is shut down
    /// exactly once whatever the outcome.
    pub async fn run(&self, firmware: &Path, device: &DeviceAddress) -> Result<OtaOutcome> {
        let image = FirmwareImage::load(firmware)?;
        if image.is_empty() {
            log::warn!("Firmware image {} is empty", image.path().display());
        }
        let file_name = image.file_name();
        validators::validate_filename(&file_name)
            .map_err(|e| OtaError::Config(format!("cannot serve '{}': {}", file_name, e)))?;

        let version = self.firmware_version();
        let host = self.advertise_host()?;

        log::info!(
            "Updating {} with {} ({} bytes, md5 {}, version {})",
            device,
            image.path().display(),
            image.len(),
            image.md5(),
            version
        );

        let server = ServeSession::start(image.directory(), self.config.bind_addr, self.reporter.clone())
            .await?
            .with_grace(self.config.shutdown_grace());

        let invite = InviteRequest::new(image.md5(), host, server.port(), &file_name).with_version(version);

        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(OtaError::Cancelled),
            result = self.invite_and_poll(device, &invite) => result,
        };

        server.shutdown().await;
        result
    }

    async fn invite_and_poll(&self, device: &DeviceAddress, invite: &InviteRequest) -> Result<OtaOutcome> {
        send_invite(
            &self.client,
            self.strategy.as_ref(),
            device,
            invite,
            self.config.invite_timeout(),
            self.reporter.as_ref(),
        )
        .await?;

        if !self.strategy.reports_status() {
            return Ok(OtaOutcome::Accepted);
        }

        let poller = StatusPoller::new(
            self.client.clone(),
            device,
            self.config.poll_interval(),
            self.config.poll_timeout(),
            self.config.status_request_timeout(),
        );
        poller
            .wait_for_completion(self.reporter.as_ref(), &self.cancel)
            .await
            .map(OtaOutcome::Reported)
    }

    fn firmware_version(&self) -> String {
        match &self.config.firmware_version {
            Some(version) => version.clone(),
            None => version::read_firmware_version(&self.config.version_file),
        }
    }

    fn advertise_host(&self) -> Result<IpAddr> {
        if let Some(host) = self.config.advertise_host {
            return Ok(host);
        }
        let ip = outbound_ip(self.config.probe_addr).map_err(OtaError::LocalAddress)?;
        log::debug!("Advertising {} to the device", ip);
        Ok(ip)
    }
}

/// Process exit code for a finished run: 0 on success, 1 otherwise.
pub fn exit_code(result: &Result<OtaOutcome>) -> u8 {
    match result {
        Ok(_) => 0,
        Err(e) => e.exit_code(),
    }
}
