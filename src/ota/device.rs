// Address of the device being updated

use std::fmt;
use std::str::FromStr;

use crate::error::OtaError;

pub const DEFAULT_DEVICE_PORT: u16 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    pub host: String,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `http://host:port` without a trailing slash
    pub fn base_url(&self) -> String {
        format!("http://{}", self)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for DeviceAddress {
    type Err = OtaError;

    /// Accepts `host`, `host:port` and `http://host[:port]/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        let trimmed = trimmed.trim_end_matches('/');

        if trimmed.is_empty() || trimmed.contains('/') {
            return Err(OtaError::Config(format!("invalid device address '{}'", s)));
        }

        match trimmed.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| OtaError::Config(format!("invalid port in device address '{}'", s)))?;
                if host.is_empty() || host.contains(':') || port == 0 {
                    return Err(OtaError::Config(format!("invalid device address '{}'", s)));
                }
                Ok(Self::new(host, port))
            }
            None => Ok(Self::new(trimmed, DEFAULT_DEVICE_PORT)),
        }
    }
}
