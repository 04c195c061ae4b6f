use anyhow::{anyhow, Result};

pub const MAX_FILENAME_LEN: usize = 128;

/// Only plain names inside the served directory are allowed.
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(anyhow!("Filename cannot be empty"));
    }
    if filename.contains("..") {
        return Err(anyhow!("Filename cannot contain '..'"));
    }
    if filename.chars().any(|c| matches!(c, '/' | '\\' | '\0')) {
        return Err(anyhow!("Filename contains invalid characters"));
    }
    if filename.len() > MAX_FILENAME_LEN {
        return Err(anyhow!("Filename must be {} characters or less", MAX_FILENAME_LEN));
    }
    Ok(())
}
