//! Crypto-erase strategy selection.
//!
//! The strongest instant-erase channel per device class: NVMe controllers
//! get Sanitize with the crypto action (Format NVM crypto-erase as the
//! execution-time fallback), self-encrypting SATA drives would get a TCG
//! Opal Revert — full Opal session management is not implemented, so they
//! fall back to ATA Secure Erase with the fallback recorded — and plain
//! SATA drives get ATA Secure Erase directly.

use super::ata;
use super::nvme::{self, NvmeSanitizeDriver};
use crate::drives::probe::DeviceProfile;
use crate::drives::raw::{open_device, OpenMode};
use crate::{DeviceType, EngineError, PurgeMethod, PurgeResult};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoEraseStrategy {
    NvmeSanitizeCrypto,
    TcgOpalRevert,
    AtaSecureErase,
    NotSupported,
}

/// Selection table keyed on device class and the SED heuristic.
pub fn select_strategy(device_type: DeviceType, hw_encryption: bool) -> CryptoEraseStrategy {
    match device_type {
        DeviceType::Nvme => CryptoEraseStrategy::NvmeSanitizeCrypto,
        DeviceType::SataHdd | DeviceType::SataSsd => {
            if hw_encryption {
                CryptoEraseStrategy::TcgOpalRevert
            } else {
                CryptoEraseStrategy::AtaSecureErase
            }
        }
        _ => CryptoEraseStrategy::NotSupported,
    }
}

pub fn crypto_erase(profile: &DeviceProfile) -> PurgeResult {
    let path = profile.path.as_str();

    match select_strategy(profile.device_type, profile.hw_encryption) {
        CryptoEraseStrategy::NvmeSanitizeCrypto => nvme_crypto(profile),
        CryptoEraseStrategy::TcgOpalRevert => {
            // Stub: revoking the media key needs an Opal session
            // (StartSession, authenticate with MSID, Revert, CloseSession),
            // which this engine does not speak
            let mut result = ata::secure_erase(profile, false);
            result.reason = if result.reason.is_empty() {
                "TCG Opal Revert not implemented; fell back to ATA Secure Erase".to_string()
            } else {
                format!(
                    "TCG Opal Revert not implemented; fell back to ATA Secure Erase ({})",
                    result.reason
                )
            };
            result
        }
        CryptoEraseStrategy::AtaSecureErase => ata::secure_erase(profile, false),
        CryptoEraseStrategy::NotSupported => PurgeResult::unsupported(
            path,
            profile.device_type,
            PurgeMethod::CryptoErase,
            profile.device_type.unsupported_reason(),
        ),
    }
}

/// NVMe crypto erase: Sanitize(crypto) first; a controller that rejects the
/// Sanitize opcode gets Format NVM with SES = crypto erase instead.
fn nvme_crypto(profile: &DeviceProfile) -> PurgeResult {
    let path = profile.path.as_str();
    let started = Instant::now();

    let mut dev = match open_device(path, OpenMode::ExclusiveWrite) {
        Ok(dev) => dev,
        Err(e) => {
            return PurgeResult::from_engine_error(
                path,
                profile.device_type,
                PurgeMethod::NvmeSanitizeCrypto,
                &e,
            )
        }
    };

    let driver = NvmeSanitizeDriver::new();
    match driver.submit(dev.as_mut(), crate::SanitizeAction::Crypto) {
        Ok(()) => {}
        Err(EngineError::CommandFailed(submit_err)) => {
            // Capability overestimate: the controller may not actually
            // implement Sanitize
            return match nvme::format_crypto(dev.as_mut()) {
                Ok(()) => {
                    let mut result = PurgeResult::completed(
                        path,
                        profile.device_type,
                        PurgeMethod::NvmeFormatCrypto,
                        "NVMe Format cryptographic erase completed",
                        started.elapsed().as_secs_f64(),
                    );
                    result.reason = format!(
                        "Sanitize rejected ({}); fell back to Format NVM crypto erase",
                        submit_err
                    );
                    result
                }
                Err(e) => PurgeResult::from_engine_error(
                    path,
                    profile.device_type,
                    PurgeMethod::NvmeFormatCrypto,
                    &e,
                ),
            };
        }
        Err(e) => {
            return PurgeResult::from_engine_error(
                path,
                profile.device_type,
                PurgeMethod::NvmeSanitizeCrypto,
                &e,
            )
        }
    }

    match driver.wait_complete(dev.as_mut(), None) {
        Ok(()) => PurgeResult::completed(
            path,
            profile.device_type,
            PurgeMethod::NvmeSanitizeCrypto,
            "NVMe Sanitize crypto erase completed",
            started.elapsed().as_secs_f64(),
        ),
        Err(EngineError::Timeout(reason)) => PurgeResult::timeout(
            path,
            profile.device_type,
            PurgeMethod::NvmeSanitizeCrypto,
            reason,
            started.elapsed().as_secs_f64(),
        ),
        Err(e) => PurgeResult::from_engine_error(
            path,
            profile.device_type,
            PurgeMethod::NvmeSanitizeCrypto,
            &e,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PurgeStatus;

    #[test]
    fn test_selection_table() {
        // NVMe always sanitizes regardless of SED indication
        assert_eq!(
            select_strategy(DeviceType::Nvme, false),
            CryptoEraseStrategy::NvmeSanitizeCrypto
        );
        assert_eq!(
            select_strategy(DeviceType::Nvme, true),
            CryptoEraseStrategy::NvmeSanitizeCrypto
        );

        assert_eq!(
            select_strategy(DeviceType::SataSsd, true),
            CryptoEraseStrategy::TcgOpalRevert
        );
        assert_eq!(
            select_strategy(DeviceType::SataHdd, true),
            CryptoEraseStrategy::TcgOpalRevert
        );
        assert_eq!(
            select_strategy(DeviceType::SataSsd, false),
            CryptoEraseStrategy::AtaSecureErase
        );
        assert_eq!(
            select_strategy(DeviceType::SataHdd, false),
            CryptoEraseStrategy::AtaSecureErase
        );

        assert_eq!(
            select_strategy(DeviceType::Usb, false),
            CryptoEraseStrategy::NotSupported
        );
        assert_eq!(
            select_strategy(DeviceType::Usb, true),
            CryptoEraseStrategy::NotSupported
        );
        assert_eq!(
            select_strategy(DeviceType::Unknown, false),
            CryptoEraseStrategy::NotSupported
        );
        assert_eq!(
            select_strategy(DeviceType::Scsi, false),
            CryptoEraseStrategy::NotSupported
        );
    }

    #[test]
    fn test_unsupported_device_result() {
        let profile = DeviceProfile {
            path: "/dev/sdz".to_string(),
            size_bytes: 16 << 30,
            sector_size: 4096,
            device_type: DeviceType::Usb,
            model: "Generic Flash Disk".to_string(),
            hw_encryption: false,
        };

        let result = crypto_erase(&profile);
        assert_eq!(result.status, PurgeStatus::Unsupported);
        assert!(!result.supported);
        assert!(!result.executed);
        assert!(result.reason.contains("USB"));
    }
}
