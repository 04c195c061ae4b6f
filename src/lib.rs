//! Tixel OTA - host-side firmware uploader
//!
//! Hashes a firmware image, serves it from a transient HTTP server, invites
//! the device to pull it and polls the device until the update finishes.

pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod ota;
pub mod progress;
pub mod system;
pub mod version;

pub use config::OtaConfig;
pub use error::{OtaError, Result};
