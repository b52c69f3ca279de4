//! Device probe: read-only identification of the sanitization target.
//!
//! The probe never writes and is idempotent; two consecutive probes of the
//! same device return the same profile. Regular files are classified as
//! `Unknown` so the overwrite pipeline can run against disk images while
//! hardware purge stays refused.

use crate::drives::raw::{open_device, OpenMode};
use crate::{DeviceInfo, DeviceType, EngineResult};
use serde::{Deserialize, Serialize};

/// Product strings that indicate a self-encrypting drive.
const SED_MARKERS: [&str; 4] = ["SED", "Opal", "TCG", "Encrypted"];

/// Everything the dispatcher needs to know about a device before choosing a
/// method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub path: String,
    pub size_bytes: u64,
    pub sector_size: u64,
    pub device_type: DeviceType,
    pub model: String,
    pub hw_encryption: bool,
}

pub struct DeviceProbe;

impl DeviceProbe {
    /// Probe a device (or image file). Non-destructive.
    pub fn probe(path: &str) -> EngineResult<DeviceProfile> {
        let dev = open_device(path, OpenMode::Probe)?;
        let size_bytes = dev.size();
        let sector_size = dev.sector_size();

        let (device_type, model) = if dev.is_block_device() {
            classify(path)?
        } else {
            (DeviceType::Unknown, String::new())
        };

        let hw_encryption = has_encryption_marker(&model);

        Ok(DeviceProfile {
            path: path.to_string(),
            size_bytes,
            sector_size,
            device_type,
            model,
            hw_encryption,
        })
    }

    /// Compact record for the `device_info` entry point.
    pub fn device_info(path: &str) -> EngineResult<DeviceInfo> {
        let profile = Self::probe(path)?;
        Ok(DeviceInfo {
            path: profile.path,
            size_bytes: profile.size_bytes,
            size_gb: profile.size_bytes as f64 / (1024.0 * 1024.0 * 1024.0),
            bus_type: profile.device_type,
        })
    }
}

/// Heuristic SED indicator from the product string.
pub fn has_encryption_marker(model: &str) -> bool {
    SED_MARKERS.iter().any(|marker| model.contains(marker))
}

// ============= LINUX CLASSIFICATION (sysfs) =============

#[cfg(target_os = "linux")]
fn classify(path: &str) -> EngineResult<(DeviceType, String)> {
    let name = match std::path::Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
    {
        Some(n) => n.to_string(),
        None => return Ok((DeviceType::Unknown, String::new())),
    };

    let sys = format!("/sys/block/{}", name);
    let model = std::fs::read_to_string(format!("{}/device/model", sys))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    if name.starts_with("nvme") {
        return Ok((DeviceType::Nvme, model));
    }

    // The device symlink walks the physical topology; a USB bridge shows up
    // in it regardless of what protocol the bridged disk speaks.
    let link = std::fs::read_link(format!("{}/device", sys))
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    if link.contains("usb") {
        return Ok((DeviceType::Usb, model));
    }

    let rotational = std::fs::read_to_string(format!("{}/queue/rotational", sys))
        .map(|s| s.trim() == "1")
        .unwrap_or(true);

    if link.contains("ata") {
        let device_type = if rotational {
            DeviceType::SataHdd
        } else {
            DeviceType::SataSsd
        };
        return Ok((device_type, model));
    }

    if name.starts_with("sd") {
        return Ok((DeviceType::Scsi, model));
    }

    Ok((DeviceType::Unknown, model))
}

// ============= WINDOWS CLASSIFICATION (storage properties) =============

#[cfg(windows)]
fn classify(path: &str) -> EngineResult<(DeviceType, String)> {
    use crate::drives::raw::windows::{
        DeviceSeekPenaltyDescriptor, StorageAdapterDescriptor, WindowsDevice,
    };

    // STORAGE_BUS_TYPE values
    const BUS_TYPE_SCSI: u8 = 0x01;
    const BUS_TYPE_ATA: u8 = 0x03;
    const BUS_TYPE_USB: u8 = 0x07;
    const BUS_TYPE_SATA: u8 = 0x0B;
    const BUS_TYPE_NVME: u8 = 0x11;

    const STORAGE_ADAPTER_PROPERTY: u32 = 1;
    const STORAGE_DEVICE_SEEK_PENALTY_PROPERTY: u32 = 7;

    let dev = WindowsDevice::open(path, OpenMode::Probe)?;

    let mut adapter: StorageAdapterDescriptor = unsafe { std::mem::zeroed() };
    dev.query_property(STORAGE_ADAPTER_PROPERTY, &mut adapter)?;

    let device_type = match adapter.bus_type {
        BUS_TYPE_NVME => DeviceType::Nvme,
        BUS_TYPE_USB => DeviceType::Usb,
        BUS_TYPE_SCSI => DeviceType::Scsi,
        BUS_TYPE_SATA | BUS_TYPE_ATA => {
            // Absence of a seek penalty reclassifies the disk as solid
            // state; an unanswered query leaves it a spinning drive.
            let mut seek: DeviceSeekPenaltyDescriptor = unsafe { std::mem::zeroed() };
            let incurs_penalty = dev
                .query_property(STORAGE_DEVICE_SEEK_PENALTY_PROPERTY, &mut seek)
                .map(|_| seek.incurs_seek_penalty != 0)
                .unwrap_or(true);
            if incurs_penalty {
                DeviceType::SataHdd
            } else {
                DeviceType::SataSsd
            }
        }
        _ => DeviceType::Unknown,
    };

    Ok((device_type, query_model(&dev).unwrap_or_default()))
}

#[cfg(windows)]
fn query_model(dev: &crate::drives::raw::windows::WindowsDevice) -> EngineResult<String> {
    const STORAGE_DEVICE_PROPERTY: u32 = 0;

    // STORAGE_DEVICE_DESCRIPTOR with trailing raw property bytes; the
    // product id lives at a self-describing offset.
    let mut buffer = [0u8; 1024];
    dev.query_property(STORAGE_DEVICE_PROPERTY, &mut buffer)?;

    let product_id_offset = u32::from_le_bytes([buffer[12], buffer[13], buffer[14], buffer[15]]);
    if product_id_offset == 0 || product_id_offset as usize >= buffer.len() {
        return Ok(String::new());
    }

    let tail = &buffer[product_id_offset as usize..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    Ok(String::from_utf8_lossy(&tail[..end]).trim().to_string())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn classify(_path: &str) -> EngineResult<(DeviceType, String)> {
    Ok((DeviceType::Unknown, String::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_probe_regular_file() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 16384]).unwrap();
        temp.flush().unwrap();

        let profile = DeviceProbe::probe(temp.path().to_str().unwrap()).unwrap();
        assert_eq!(profile.device_type, DeviceType::Unknown);
        assert_eq!(profile.size_bytes, 16384);
        assert_eq!(profile.sector_size, 1);
        assert!(!profile.hw_encryption);
    }

    #[test]
    fn test_probe_is_idempotent() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 4096]).unwrap();
        temp.flush().unwrap();
        let path = temp.path().to_str().unwrap();

        let first = DeviceProbe::probe(path).unwrap();
        let second = DeviceProbe::probe(path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_device_info_round_trip() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&[0u8; 8192]).unwrap();
        temp.flush().unwrap();
        let path = temp.path().to_str().unwrap();

        let a = DeviceProbe::device_info(path).unwrap();
        let b = DeviceProbe::device_info(path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size_bytes, 8192);
    }

    #[test]
    fn test_probe_missing_device() {
        assert!(DeviceProbe::probe("/nonexistent/disk").is_err());
    }

    #[test]
    fn test_encryption_markers() {
        assert!(has_encryption_marker("Samsung SSD 860 EVO SED 1TB"));
        assert!(has_encryption_marker("WDC Opal 2.0 Drive"));
        assert!(has_encryption_marker("TCG Enterprise Disk"));
        assert!(has_encryption_marker("SelfEncrypted Drive")); // contains "Encrypted"
        assert!(!has_encryption_marker("WDC WD10EZEX-08WN4A0"));
        assert!(!has_encryption_marker(""));
    }
}
