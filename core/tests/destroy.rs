/// Destroy-tier integration tests
use scour::{destroy, DeviceType, PurgeMethod, PurgeStatus};
use serial_test::serial;

#[path = "common/mod.rs"]
mod common;

use common::mock_device::{entropy, is_filled_with, MockImage};

#[test]
fn test_destroy_without_confirmation_is_refused() {
    let image = MockImage::create(4096, 0xEE).unwrap();
    let result = destroy(image.path_str(), false);

    assert_eq!(result.status, PurgeStatus::Error);
    assert!(!result.success);
    assert!(!result.executed);
    assert!(!result.supported);
    assert!(result.reason.contains("confirmation"));
    assert_eq!(result.method, PurgeMethod::Destroy);

    // The device was never opened: contents byte-identical
    assert!(is_filled_with(&image.read_all().unwrap(), 0xEE));
}

#[test]
fn test_destroy_refusal_does_not_need_the_device() {
    let result = destroy("/nonexistent/drive", false);
    assert_eq!(result.status, PurgeStatus::Error);
    assert!(result.reason.contains("confirmation"));
}

#[test]
#[serial]
fn test_destroy_full_sequence_on_image() {
    let image = MockImage::create(256 * 1024, 0x00).unwrap();
    let result = destroy(image.path_str(), true);

    assert!(result.success, "destroy failed: {}", result.reason);
    assert!(result.executed);
    assert_eq!(result.status, PurgeStatus::Success);
    assert_eq!(result.method, PurgeMethod::Destroy);
    assert_eq!(result.device_type, DeviceType::Unknown);
    assert!(result.duration_seconds > 0.0);

    // Image size unchanged, contents fully randomized by the final pass
    let data = image.read_all().unwrap();
    assert_eq!(data.len(), 256 * 1024);
    assert!(entropy(&data) > 7.0);
}

#[test]
fn test_destroy_unwritable_target_names_failing_step() {
    // A directory survives the read-only probe but cannot be opened for
    // writing, so the sequence dies at the device-open step
    let dir = tempfile::tempdir().unwrap();
    let result = destroy(dir.path().to_str().unwrap(), true);

    assert_eq!(result.status, PurgeStatus::Error);
    assert!(!result.success);
    assert!(
        result.reason.contains("device open"),
        "reason should identify the failing step: {}",
        result.reason
    );
}
