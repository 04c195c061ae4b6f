use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

use tixel_ota::config::OtaConfig;
use tixel_ota::logging;
use tixel_ota::ota::{exit_code, DeviceAddress, InviteFormat, OtaOutcome, OtaUpdater};
use tixel_ota::progress::ConsoleReporter;
use tixel_ota::system::ShutdownSignal;
use tixel_ota::version;
use tixel_ota::OtaError;

#[derive(Parser)]
#[command(name = "ota")]
#[command(about = "Tixel OTA firmware uploader", long_about = None, version)]
struct Cli {
    /// Firmware image to upload
    firmware: PathBuf,

    /// Device address (ip or host, optionally with :port)
    device: String,

    /// Invite wire format
    #[arg(long, value_enum, env = "OTA_INVITE")]
    invite: Option<InviteFormat>,

    /// Give up status polling after this many seconds
    #[arg(long, env = "OTA_TIMEOUT")]
    timeout: Option<u64>,

    /// Seconds between status polls
    #[arg(long, env = "OTA_INTERVAL")]
    interval: Option<u64>,

    /// Address the device should download from (auto-detected by default)
    #[arg(long, env = "OTA_HOST")]
    host: Option<IpAddr>,

    /// File holding the firmware version
    #[arg(long, env = "OTA_VERSION_FILE")]
    version_file: Option<PathBuf>,

    /// Firmware version to announce (skips the version file)
    #[arg(long, env = "OTA_FW_VERSION")]
    fw_version: Option<String>,

    /// JSON config file
    #[arg(short, long, env = "OTA_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", env = "OTA_LOG")]
    log_level: String,
}

impl Cli {
    /// Config file (or defaults) with command line overrides applied
    fn resolve_config(&self) -> Result<OtaConfig> {
        let mut config = OtaConfig::load_or_default(self.config.as_deref())?;

        if let Some(invite) = self.invite {
            config.invite_format = invite;
        }
        if let Some(secs) = self.timeout {
            config.poll_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = self.interval {
            config.poll_interval_ms = secs.saturating_mul(1000);
        }
        if let Some(host) = self.host {
            config.advertise_host = Some(host);
        }
        if let Some(path) = &self.version_file {
            config.version_file = path.clone();
        }
        if let Some(version) = &self.fw_version {
            config.firmware_version = Some(version.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(level) = logging::parse_level(&cli.log_level) else {
        eprintln!("{} Unknown log level '{}'", "❌".red(), cli.log_level);
        return ExitCode::from(1);
    };
    if let Err(e) = logging::init_logger(level) {
        eprintln!("Logger already initialized: {}", e);
    }
    log::debug!("{}", version::version_info());

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", "❌".red(), e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let config = cli.resolve_config()?;
    let device: DeviceAddress = cli.device.parse()?;

    println!("{} Tixel OTA Update", "🚀".blue());
    println!("{}Device: {}", "   ".dimmed(), device);
    println!("{}Firmware: {}", "   ".dimmed(), cli.firmware.display());
    println!("{}Invite: {:?}", "   ".dimmed(), config.invite_format);

    let shutdown = ShutdownSignal::new();
    shutdown.watch_ctrl_c();

    let updater = OtaUpdater::new(config, Arc::new(ConsoleReporter::new()), shutdown.token())
        .context("creating HTTP client")?;
    let result = updater.run(&cli.firmware, &device).await;

    report_outcome(&result);
    Ok(exit_code(&result))
}

fn report_outcome(result: &tixel_ota::Result<OtaOutcome>) {
    match result {
        Ok(OtaOutcome::Reported(report)) => {
            println!("\n{} OTA completed successfully! ({})", "✅".green(), report.label);
        }
        Ok(OtaOutcome::Accepted) => {
            println!("\n{} Firmware accepted, device will restart.", "✅".green());
        }
        Err(OtaError::FileNotFound(path)) => {
            eprintln!("{} Firmware not found: {}", "❌".red(), path.display());
        }
        Err(OtaError::Timeout(_)) => {
            eprintln!("\n{} OTA status polling timed out.", "⏳".yellow());
        }
        Err(OtaError::Failed(label)) => {
            eprintln!("\n{} OTA failed ({}).", "❌".red(), label);
        }
        Err(OtaError::Cancelled) => {
            eprintln!("\n{} OTA interrupted.", "🛑".red());
        }
        Err(e) => {
            eprintln!("\n{} Error: {}", "❌".red(), e);
        }
    }
}
