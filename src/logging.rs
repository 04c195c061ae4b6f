use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use colored::*;
use log::{Level, LevelFilter, Metadata, Record};

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Colored, timestamped log lines on stderr
struct HostLogger;

impl log::Log for HostLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Time since start
        let elapsed = START_TIME.get_or_init(Instant::now).elapsed();
        let seconds = elapsed.as_secs();
        let millis = elapsed.subsec_millis();
        let ts_compact = if seconds < 60 {
            format!("{:>3}.{:03}s", seconds, millis)
        } else {
            format!("{:>2}m{:02}s", seconds / 60, seconds % 60)
        };

        let module = record
            .module_path()
            .unwrap_or("unknown")
            .split("::")
            .last()
            .unwrap_or("unknown");
        let module_display = if module.len() > 12 { &module[..12] } else { module };

        let line = format!(
            "{} [{}] {:>12} | {}",
            ts_compact,
            level_char(record.level()),
            module_display,
            record.args()
        );
        let line = match record.level() {
            Level::Error => line.bright_red(),
            Level::Warn => line.bright_yellow(),
            Level::Info => line.bright_green(),
            Level::Debug => line.bright_blue(),
            Level::Trace => line.bright_black(),
        };

        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

fn level_char(level: Level) -> char {
    match level {
        Level::Error => 'E',
        Level::Warn => 'W',
        Level::Info => 'I',
        Level::Debug => 'D',
        Level::Trace => 'T',
    }
}

static LOGGER: HostLogger = HostLogger;

/// Install the logger with the given level
pub fn init_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let _ = START_TIME.set(Instant::now());
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Parse a level name (case-insensitive); `None` if unknown
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    let lf = match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    };
    Some(lf)
}
