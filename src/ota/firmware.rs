// Firmware image metadata and the MD5 digest the device checks after download

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use md5::{Digest, Md5};

use crate::error::{OtaError, Result};

/// Read size used while hashing
pub const CHECKSUM_CHUNK_SIZE: usize = 8 * 1024;

/// A firmware file on disk together with its size and digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    path: PathBuf,
    len: u64,
    md5: String,
}

impl FirmwareImage {
    /// Stat and hash the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(OtaError::FileNotFound(path.to_path_buf())),
        };

        let md5 = calc_md5(path).map_err(|source| OtaError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        log::debug!("Firmware {} ({} bytes) md5={}", path.display(), metadata.len(), md5);

        Ok(Self {
            path: path.to_path_buf(),
            len: metadata.len(),
            md5,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lowercase hex MD5 of the file contents
    pub fn md5(&self) -> &str {
        &self.md5
    }

    /// Directory the file server is rooted at.
    pub fn directory(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Name the device requests from the file server.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Stream a file through MD5 in fixed-size chunks and return the lowercase hex digest.
pub fn calc_md5(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    md5_reader(file)
}

/// Same as [`calc_md5`] for any reader.
pub fn md5_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHECKSUM_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
