/// Dispatcher-level behavior: refusals, dry-run discipline, result
/// serialization
use scour::{
    ata_secure_erase, crypto_erase, device_info, nvme_sanitize, wipe, ClearMethod, DeviceType,
    PurgeStatus, SanitizeAction,
};

#[path = "common/mod.rs"]
mod common;

use common::mock_device::{is_filled_with, MockImage};

#[test]
fn test_purge_entries_refuse_unknown_device_class() {
    // A regular file probes as Unknown; every hardware purge entry point
    // must refuse it without opening for write, dry run or not
    let image = MockImage::create(8 * 1024, 0xC3).unwrap();

    for dry_run in [true, false] {
        let ata = ata_secure_erase(image.path_str(), false, dry_run);
        assert_eq!(ata.status, PurgeStatus::Unsupported);
        assert!(!ata.supported && !ata.executed && !ata.success);

        let nvme = nvme_sanitize(image.path_str(), SanitizeAction::Crypto, dry_run);
        assert_eq!(nvme.status, PurgeStatus::Unsupported);
        assert!(!nvme.executed);

        let crypto = crypto_erase(image.path_str(), dry_run);
        assert_eq!(crypto.status, PurgeStatus::Unsupported);
        assert!(!crypto.executed);
    }

    assert!(is_filled_with(&image.read_all().unwrap(), 0xC3));
}

#[test]
fn test_unsupported_reason_names_device_class() {
    let image = MockImage::create(4096, 0x00).unwrap();
    let result = nvme_sanitize(image.path_str(), SanitizeAction::Crypto, true);
    assert_eq!(result.device_type, DeviceType::Unknown);
    assert!(result.reason.contains("Device type could not be determined"));
}

#[test]
fn test_missing_device_yields_error_result() {
    for result in [
        ata_secure_erase("/dev/does-not-exist", false, true),
        nvme_sanitize("/dev/does-not-exist", SanitizeAction::Block, true),
        crypto_erase("/dev/does-not-exist", true),
        wipe("/dev/does-not-exist", ClearMethod::Zero),
    ] {
        assert_eq!(result.status, PurgeStatus::Error);
        assert!(!result.success);
        assert!(result.reason.contains("failed to open device"));
    }
}

#[test]
fn test_result_json_wire_format() {
    let image = MockImage::create(4 * 1024, 0xFF).unwrap();
    let result = wipe(image.path_str(), ClearMethod::Zero);
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["status"], "success");
    assert_eq!(json["method"], "CLEAR_ZERO");
    assert_eq!(json["device_type"], "Unknown");
    assert_eq!(json["success"], true);
    assert_eq!(json["executed"], true);
    assert_eq!(json["device_path"], image.path_str());
    assert!(json["duration_seconds"].as_f64().unwrap() >= 0.0);
    assert!(json["error_code"].as_u64().is_some());
}

#[test]
fn test_device_info_fields() {
    let image = MockImage::create(3 * 1024 * 1024, 0x00).unwrap();
    let info = device_info(image.path_str()).unwrap();

    assert_eq!(info.path, image.path_str());
    assert_eq!(info.size_bytes, 3 * 1024 * 1024);
    assert!((info.size_gb - 3.0 / 1024.0).abs() < 1e-9);
    assert_eq!(info.bus_type, DeviceType::Unknown);

    // Two consecutive calls return equal records
    assert_eq!(info, device_info(image.path_str()).unwrap());
}

#[test]
fn test_repeated_dry_runs_equal() {
    let image = MockImage::create(4096, 0x11).unwrap();

    let first = ata_secure_erase(image.path_str(), true, true);
    let second = ata_secure_erase(image.path_str(), true, true);
    assert_eq!(first.supported, second.supported);
    assert_eq!(first.device_type, second.device_type);
    assert_eq!(first.status, second.status);
    assert_eq!(first.method, second.method);
}
