//! Disk-image stand-ins for real block devices.
//!
//! Hardware purge paths need real ATA/NVMe targets, but everything in the
//! software overwrite pipeline and the dispatcher's refusal/dry-run logic
//! can be exercised against temp-file images.

use std::io::Write;
use tempfile::NamedTempFile;

pub struct MockImage {
    temp: NamedTempFile,
    size: u64,
}

impl MockImage {
    /// Create an image of `size` bytes filled with `fill`.
    pub fn create(size: usize, fill: u8) -> std::io::Result<Self> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(&vec![fill; size])?;
        temp.flush()?;
        Ok(Self {
            temp,
            size: size as u64,
        })
    }

    pub fn path_str(&self) -> &str {
        self.temp.path().to_str().expect("temp path is valid UTF-8")
    }

    pub fn size_bytes(&self) -> u64 {
        self.size
    }

    pub fn read_all(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.temp.path())
    }
}

/// All bytes equal to `expected`.
pub fn is_filled_with(data: &[u8], expected: u8) -> bool {
    data.iter().all(|&b| b == expected)
}

/// Shannon entropy in bits per byte.
pub fn entropy(data: &[u8]) -> f64 {
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let length = data.len() as f64;
    let mut entropy = 0.0;
    for &count in &counts {
        if count > 0 {
            let p = count as f64 / length;
            entropy -= p * p.log2();
        }
    }
    entropy
}
