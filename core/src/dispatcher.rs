//! Method dispatcher and result shaper.
//!
//! Every entry point probes the device first, refuses early when the
//! requested method cannot apply to the device class, and otherwise hands
//! off to the matching driver. Dry runs stop after probing: no write-mode
//! open is performed and the device contents are untouched.

use crate::algorithms::{self, gutmann, random};
use crate::drives::capability::CapabilityQuery;
use crate::drives::probe::{DeviceProbe, DeviceProfile};
use crate::drives::raw::{open_device, OpenMode};
use crate::drives::volumes::VolumePreparer;
use crate::overwrite::{OverwritePipeline, ProgressCallback};
use crate::purge::crypto_erase::CryptoEraseStrategy;
use crate::purge::{ata, crypto_erase, nvme};
use crate::{
    CancelToken, ClearMethod, DeviceInfo, DeviceType, EngineResult, PurgeMethod, PurgeResult,
    SanitizeAction,
};
use std::time::Instant;

/// 100 MiB regions at both ends of the device cover the MBR, the primary
/// GPT and the backup GPT.
const CRITICAL_REGION_SIZE: u64 = 100 * 1024 * 1024;

/// Host-supplied hooks for software overwrite runs.
#[derive(Default)]
pub struct WipeOptions {
    pub progress: Option<ProgressCallback>,
    pub cancel: Option<CancelToken>,
}

/// Software overwrite (Clear tier) over the full device or image.
pub fn wipe(path: &str, method: ClearMethod) -> PurgeResult {
    wipe_with(path, method, WipeOptions::default())
}

pub fn wipe_with(path: &str, method: ClearMethod, options: WipeOptions) -> PurgeResult {
    let purge_method = method.method();
    let started = Instant::now();

    let profile = match DeviceProbe::probe(path) {
        Ok(profile) => profile,
        Err(e) => {
            return PurgeResult::from_engine_error(path, DeviceType::Unknown, purge_method, &e)
        }
    };

    let passes = algorithms::schedule(method);
    let mut pipeline = OverwritePipeline::new();
    if let Some(progress) = options.progress {
        pipeline = pipeline.with_progress(progress);
    }
    if let Some(cancel) = options.cancel {
        pipeline = pipeline.with_cancel(cancel);
    }

    match pipeline.run(path, &passes) {
        Ok(_) => PurgeResult::completed(
            path,
            profile.device_type,
            purge_method,
            format!("Software overwrite completed ({} passes)", passes.len()),
            started.elapsed().as_secs_f64(),
        ),
        Err(e) => PurgeResult::from_engine_error(path, profile.device_type, purge_method, &e)
            .with_duration(started.elapsed().as_secs_f64()),
    }
}

/// ATA Secure Erase entry point.
pub fn ata_secure_erase(path: &str, enhanced: bool, dry_run: bool) -> PurgeResult {
    let requested_method = if enhanced {
        PurgeMethod::AtaSecureEraseEnhanced
    } else {
        PurgeMethod::AtaSecureErase
    };

    let profile = match DeviceProbe::probe(path) {
        Ok(profile) => profile,
        Err(e) => {
            return PurgeResult::from_engine_error(path, DeviceType::Unknown, requested_method, &e)
        }
    };

    match profile.device_type {
        DeviceType::SataHdd | DeviceType::SataSsd => {}
        DeviceType::Nvme => {
            return PurgeResult::unsupported(
                path,
                profile.device_type,
                requested_method,
                "device reports NVMe; ATA Secure Erase applies to SATA devices only. \
                 Use NVMe Sanitize instead.",
            );
        }
        other => {
            return PurgeResult::unsupported(
                path,
                other,
                requested_method,
                other.unsupported_reason(),
            );
        }
    }

    if dry_run {
        return ata_dry_run(&profile, enhanced, requested_method);
    }

    ata::secure_erase(&profile, enhanced)
}

fn ata_dry_run(profile: &DeviceProfile, enhanced: bool, requested: PurgeMethod) -> PurgeResult {
    let path = profile.path.as_str();

    // Read-only open; probing must never take the write path
    let security = match open_device(path, OpenMode::Probe)
        .and_then(|mut dev| CapabilityQuery::ata_security(dev.as_mut()))
    {
        Ok(security) => security,
        Err(e) => {
            return PurgeResult::from_engine_error(path, profile.device_type, requested, &e)
        }
    };

    if !security.supported {
        return PurgeResult::unsupported(
            path,
            profile.device_type,
            requested,
            "drive does not support the ATA security feature set",
        );
    }

    let method = ata::effective_method(&security, enhanced);
    let mut notes = vec![format!(
        "security word 0x{:04X}: supported, enabled={}, locked={}, frozen={}, enhanced={}",
        security.raw_security_word,
        security.enabled,
        security.locked,
        security.frozen,
        security.enhanced_supported
    )];
    if enhanced && !security.enhanced_supported {
        notes.push("enhanced erase would be demoted to normal".to_string());
    }
    if security.frozen {
        notes.push("drive is frozen; a real erase would be blocked until power-cycle".to_string());
    }
    if security.locked {
        notes.push("drive is locked; a real erase would be blocked".to_string());
    }

    PurgeResult::dry_run(path, profile.device_type, method, notes.join("; "))
}

/// NVMe Sanitize entry point.
pub fn nvme_sanitize(path: &str, action: SanitizeAction, dry_run: bool) -> PurgeResult {
    let method = action.method();

    let profile = match DeviceProbe::probe(path) {
        Ok(profile) => profile,
        Err(e) => return PurgeResult::from_engine_error(path, DeviceType::Unknown, method, &e),
    };

    if profile.device_type != DeviceType::Nvme {
        return PurgeResult::unsupported(
            path,
            profile.device_type,
            method,
            profile.device_type.unsupported_reason(),
        );
    }

    if dry_run {
        let caps = match open_device(path, OpenMode::Probe)
            .and_then(|mut dev| CapabilityQuery::nvme_sanitize(dev.as_mut()))
        {
            Ok(caps) => caps,
            Err(e) => return PurgeResult::from_engine_error(path, profile.device_type, method, &e),
        };

        let mut reason =
            "all sanitize actions assumed supported (SANICAP not decoded)".to_string();
        if caps.sanitize_in_progress {
            reason.push_str("; a sanitize operation is already in progress");
        }
        return PurgeResult::dry_run(path, profile.device_type, method, reason);
    }

    nvme::sanitize(&profile, action)
}

/// Crypto-erase entry point (strategy chosen per device class).
pub fn crypto_erase(path: &str, dry_run: bool) -> PurgeResult {
    let profile = match DeviceProbe::probe(path) {
        Ok(profile) => profile,
        Err(e) => {
            return PurgeResult::from_engine_error(
                path,
                DeviceType::Unknown,
                PurgeMethod::CryptoErase,
                &e,
            )
        }
    };

    let strategy = crypto_erase::select_strategy(profile.device_type, profile.hw_encryption);

    if strategy == CryptoEraseStrategy::NotSupported {
        return PurgeResult::unsupported(
            path,
            profile.device_type,
            PurgeMethod::CryptoErase,
            profile.device_type.unsupported_reason(),
        );
    }

    if dry_run {
        return match strategy {
            CryptoEraseStrategy::NvmeSanitizeCrypto => PurgeResult::dry_run(
                path,
                profile.device_type,
                PurgeMethod::NvmeSanitizeCrypto,
                "would issue NVMe Sanitize with the crypto action",
            ),
            CryptoEraseStrategy::TcgOpalRevert => {
                let mut result = ata_dry_run(&profile, false, PurgeMethod::AtaSecureErase);
                result.reason = format!(
                    "SED detected but TCG Opal Revert not implemented; \
                     would fall back to ATA Secure Erase ({})",
                    result.reason
                );
                result
            }
            CryptoEraseStrategy::AtaSecureErase => {
                ata_dry_run(&profile, false, PurgeMethod::AtaSecureErase)
            }
            CryptoEraseStrategy::NotSupported => unreachable!(),
        };
    }

    crypto_erase::crypto_erase(&profile)
}

/// NIST 800-88 Destroy tier: Gutmann, both partition-structure regions,
/// one final random pass. Refuses without explicit confirmation, before
/// the device is even opened.
pub fn destroy(path: &str, confirm: bool) -> PurgeResult {
    if !confirm {
        let mut result = PurgeResult::error(
            path,
            DeviceType::Unknown,
            PurgeMethod::Destroy,
            "destroy requires explicit confirmation; the drive would be left unusable",
            0,
        );
        result.supported = false;
        return result;
    }

    let started = Instant::now();
    let profile = match DeviceProbe::probe(path) {
        Ok(profile) => profile,
        Err(e) => {
            return PurgeResult::from_engine_error(path, DeviceType::Unknown, PurgeMethod::Destroy, &e)
        }
    };

    match destroy_sequence(path) {
        Ok(()) => PurgeResult::completed(
            path,
            profile.device_type,
            PurgeMethod::Destroy,
            "Destroy completed: 35-pass overwrite, partition structures destroyed, final random pass",
            started.elapsed().as_secs_f64(),
        ),
        Err((step, e)) => {
            let mut result =
                PurgeResult::from_engine_error(path, profile.device_type, PurgeMethod::Destroy, &e)
                    .with_duration(started.elapsed().as_secs_f64());
            result.reason = format!("{} failed: {}", step, result.reason);
            result
        }
    }
}

fn destroy_sequence(path: &str) -> Result<(), (&'static str, crate::EngineError)> {
    VolumePreparer::prepare(path).map_err(|e| ("volume preparation", e))?;
    let mut dev = open_device(path, OpenMode::ExclusiveWrite).map_err(|e| ("device open", e))?;
    let size = dev.size();
    let mut pipeline = OverwritePipeline::new();

    // Step 1: Gutmann 35-pass overwrite
    pipeline
        .run_on_device(dev.as_mut(), &gutmann::passes())
        .map_err(|e| ("Gutmann overwrite", e))?;

    // Step 2: random overwrite of the MBR / primary GPT region
    let head = CRITICAL_REGION_SIZE.min(size);
    pipeline
        .overwrite_region(dev.as_mut(), 0, head)
        .map_err(|e| ("primary partition-structure overwrite", e))?;

    // Step 3: random overwrite of the backup GPT region
    if size > CRITICAL_REGION_SIZE {
        pipeline
            .overwrite_region(dev.as_mut(), size - CRITICAL_REGION_SIZE, CRITICAL_REGION_SIZE)
            .map_err(|e| ("backup partition-structure overwrite", e))?;
    }

    // Step 4: one final random pass over everything
    pipeline
        .run_on_device(dev.as_mut(), &random::passes())
        .map_err(|e| ("final random pass", e))?;

    Ok(())
}

/// Read-only device description.
pub fn device_info(path: &str) -> EngineResult<DeviceInfo> {
    DeviceProbe::device_info(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PurgeStatus;
    use std::io::{Read, Write};
    use tempfile::NamedTempFile;

    fn image(len: usize) -> NamedTempFile {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&vec![0xA5u8; len]).unwrap();
        temp.flush().unwrap();
        temp
    }

    #[test]
    fn test_destroy_refuses_without_confirmation() {
        // Path does not even need to exist: the refusal happens first
        let result = destroy("/dev/definitely-not-a-device", false);
        assert_eq!(result.status, PurgeStatus::Error);
        assert!(!result.executed);
        assert!(!result.success);
        assert!(result.reason.contains("confirmation"));
    }

    #[test]
    fn test_wipe_zero_on_image() {
        let temp = image(32 * 1024);
        let result = wipe(temp.path().to_str().unwrap(), ClearMethod::Zero);

        assert_eq!(result.status, PurgeStatus::Success);
        assert!(result.success && result.executed);
        assert_eq!(result.method, PurgeMethod::ClearZero);
        assert_eq!(result.device_type, DeviceType::Unknown);
        assert!(result.duration_seconds >= 0.0);

        let mut data = Vec::new();
        std::fs::File::open(temp.path())
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert!(data.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_wipe_missing_target() {
        let result = wipe("/nonexistent/image.bin", ClearMethod::Zero);
        assert_eq!(result.status, PurgeStatus::Error);
        assert!(result.reason.contains("failed to open device"));
    }

    #[test]
    fn test_ata_secure_erase_rejects_image_target() {
        // A regular file probes as Unknown; hardware purge must refuse it
        let temp = image(4096);
        let before = std::fs::read(temp.path()).unwrap();

        let result = ata_secure_erase(temp.path().to_str().unwrap(), false, true);
        assert_eq!(result.status, PurgeStatus::Unsupported);
        assert!(!result.supported);
        assert!(!result.executed);

        // Dry-run invariant: contents byte-identical
        assert_eq!(std::fs::read(temp.path()).unwrap(), before);
    }

    #[test]
    fn test_nvme_sanitize_rejects_image_target() {
        let temp = image(4096);
        let result = nvme_sanitize(temp.path().to_str().unwrap(), SanitizeAction::Crypto, true);
        assert_eq!(result.status, PurgeStatus::Unsupported);
        assert_eq!(result.method, PurgeMethod::NvmeSanitizeCrypto);
    }

    #[test]
    fn test_crypto_erase_rejects_image_target() {
        let temp = image(4096);
        let result = crypto_erase(temp.path().to_str().unwrap(), true);
        assert_eq!(result.status, PurgeStatus::Unsupported);
        assert_eq!(result.method, PurgeMethod::CryptoErase);
    }

    #[test]
    fn test_device_info_round_trip() {
        let temp = image(10 * 1024);
        let path = temp.path().to_str().unwrap();
        let a = device_info(path).unwrap();
        let b = device_info(path).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size_bytes, 10 * 1024);
        assert_eq!(a.bus_type, DeviceType::Unknown);
    }

    #[test]
    fn test_dry_run_results_are_stable() {
        let temp = image(4096);
        let path = temp.path().to_str().unwrap();

        let first = ata_secure_erase(path, false, true);
        let second = ata_secure_erase(path, false, true);
        assert_eq!(first.supported, second.supported);
        assert_eq!(first.device_type, second.device_type);
        assert_eq!(first.status, second.status);
    }
}
