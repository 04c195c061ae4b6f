// Operator-facing progress reporting, kept out of the transfer and poll logic

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::OtaError;
use crate::ota::status::StatusReport;

/// Progress of one file download served to the device.
pub trait TransferProgress: Send {
    fn advance(&mut self, bytes: u64);
}

/// Receives the events of an OTA run. Only `status_changed` is mandatory.
pub trait Reporter: Send + Sync {
    fn invite_sent(&self, _method: &str, _url: &str) {}

    fn invite_answered(&self, _status: u16, _body: &str) {}

    /// Called once per download the file server starts.
    fn transfer_started(&self, _file: &str, _total: u64) -> Box<dyn TransferProgress> {
        Box::new(NoProgress)
    }

    /// Called only when status label or progress differ from the previous poll.
    fn status_changed(&self, report: &StatusReport);

    /// Transient poll failure; polling continues.
    fn poll_error(&self, _error: &OtaError) {}

    /// The file server has been shut down.
    fn server_stopped(&self) {}
}

pub struct NoProgress;

impl TransferProgress for NoProgress {
    fn advance(&mut self, _bytes: u64) {}
}

/// Colored console output with an indicatif bar per download.
#[derive(Default)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        Self
    }
}

impl Reporter for ConsoleReporter {
    fn invite_sent(&self, method: &str, url: &str) {
        println!("{} OTA Invite: {} {}", "→".cyan(), method, url);
    }

    fn invite_answered(&self, status: u16, body: &str) {
        let line = format!("← HTTP {}", status);
        if status == 200 {
            println!("{}", line.green());
        } else {
            println!("{}", line.red());
        }
        if !body.is_empty() {
            println!("{}", body);
        }
    }

    fn transfer_started(&self, file: &str, total: u64) -> Box<dyn TransferProgress> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        bar.set_style(style);
        bar.set_message(format!("[Server] Uploading {}", file));
        Box::new(ConsoleTransfer { bar })
    }

    fn status_changed(&self, report: &StatusReport) {
        println!("📶 OTA status: {} ({}%)", report.label.bold(), report.progress);
    }

    fn poll_error(&self, error: &OtaError) {
        println!("{}  Polling error: {}", "⚠️".yellow(), error);
    }

    fn server_stopped(&self) {
        println!("{}", "HTTP server stopped".dimmed());
    }
}

struct ConsoleTransfer {
    bar: ProgressBar,
}

impl TransferProgress for ConsoleTransfer {
    fn advance(&mut self, bytes: u64) {
        self.bar.inc(bytes);
    }
}

impl Drop for ConsoleTransfer {
    fn drop(&mut self) {
        // Device may hang up mid-download
        if self.bar.length().map_or(false, |len| self.bar.position() >= len) {
            self.bar.finish();
        } else {
            self.bar.abandon();
        }
    }
}
