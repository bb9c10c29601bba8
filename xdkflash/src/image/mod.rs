//! Firmware images.
//!
//! The XDK110 bootloader takes a raw application binary; no container format
//! is parsed. The image is read into memory once so its length is known
//! before the upload starts.

use crate::error::Result;
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Raw application binary plus the name it is reported under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    name: String,
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Load an image from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading firmware image from: {}", path.display());

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;

        Ok(Self::from_bytes(path.display().to_string(), data))
    }

    /// Wrap bytes already in memory.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }

    /// Name used in messages, usually the file path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image contents.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the image is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let image = FirmwareImage::from_bytes("app.bin", vec![0xAA; 300]);
        assert_eq!(image.name(), "app.bin");
        assert_eq!(image.len(), 300);
        assert!(!image.is_empty());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.bin");
        std::fs::write(&path, [1, 2, 3, 4]).unwrap();

        let image = FirmwareImage::from_file(&path).unwrap();

        assert_eq!(image.data(), &[1, 2, 3, 4]);
        assert_eq!(image.name(), path.display().to_string());
    }

    #[test]
    fn test_from_missing_file() {
        let err = FirmwareImage::from_file("/nonexistent/xdkflash/app.bin").unwrap_err();
        assert!(matches!(err, crate::Error::Io(_)));
    }
}
