/// Software overwrite (Clear tier) integration tests against disk images
use scour::algorithms::{dod, gutmann, PatternPass};
use scour::overwrite::OverwritePipeline;
use scour::ui::progress::ProgressSample;
use scour::{wipe, wipe_with, CancelToken, ClearMethod, PurgeMethod, PurgeStatus, WipeOptions};
use serial_test::serial;
use std::sync::{Arc, Mutex};

#[path = "common/mod.rs"]
mod common;

use common::mock_device::{entropy, is_filled_with, MockImage};

#[test]
fn test_dod_pass_contents_in_order() {
    // Run the DoD schedule pass by pass and check the bytes the device
    // holds after each one
    let image = MockImage::create(12 * 1024, 0xA5).unwrap();
    let passes = dod::passes();

    let mut pipeline = OverwritePipeline::new();
    pipeline.run(image.path_str(), &passes[..1]).unwrap();
    assert!(is_filled_with(&image.read_all().unwrap(), 0x00));

    pipeline.run(image.path_str(), &passes[1..2]).unwrap();
    assert!(is_filled_with(&image.read_all().unwrap(), 0xFF));

    pipeline.run(image.path_str(), &passes[2..]).unwrap();
    let data = image.read_all().unwrap();
    assert!(!is_filled_with(&data, 0x00) && !is_filled_with(&data, 0xFF));
}

#[test]
fn test_dod_wipe_result_shape() {
    let image = MockImage::create(12 * 1024, 0xA5).unwrap();
    let result = wipe(image.path_str(), ClearMethod::DoD5220);

    assert!(result.success);
    assert!(result.executed);
    assert_eq!(result.status, PurgeStatus::Success);
    assert_eq!(result.method, PurgeMethod::DoD5220);
    assert_eq!(result.device_path, image.path_str());
    assert!(result.message.contains("3 passes"));
    assert_eq!(image.read_all().unwrap().len(), 12 * 1024);
}

#[test]
#[serial]
fn test_gutmann_wipe_completes() {
    let image = MockImage::create(64 * 1024, 0x00).unwrap();
    let result = wipe(image.path_str(), ClearMethod::Gutmann);

    assert!(result.success);
    assert_eq!(result.method, PurgeMethod::Gutmann);
    assert!(result.message.contains("35 passes"));

    // The final six Gutmann passes are random fills
    let data = image.read_all().unwrap();
    assert!(entropy(&data) > 7.0);
}

#[test]
fn test_gutmann_fixed_prefix_then_random_tail() {
    let image = MockImage::create(8 * 1024, 0x00).unwrap();
    let passes = gutmann::passes();

    // After pass 29 (the last fixed one, 0x00) the image is deterministic
    let mut pipeline = OverwritePipeline::new();
    pipeline.run(image.path_str(), &passes[..29]).unwrap();
    assert!(is_filled_with(&image.read_all().unwrap(), 0x00));

    pipeline.run(image.path_str(), &passes[29..]).unwrap();
    assert!(entropy(&image.read_all().unwrap()) > 7.0);
}

#[test]
fn test_every_lba_written_per_pass() {
    // A pattern pass must reach the very last byte of an odd-sized image
    let image = MockImage::create(10_000, 0x00).unwrap();
    let mut pipeline = OverwritePipeline::new();
    pipeline
        .run(image.path_str(), &[PatternPass::fixed(0x5C)])
        .unwrap();

    let data = image.read_all().unwrap();
    assert_eq!(data.len() as u64, image.size_bytes());
    assert!(is_filled_with(&data, 0x5C));
}

#[test]
fn test_progress_samples_cover_all_passes() {
    let image = MockImage::create(16 * 1024, 0x00).unwrap();
    let samples: Arc<Mutex<Vec<ProgressSample>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = samples.clone();

    let options = WipeOptions {
        progress: Some(Box::new(move |s: &ProgressSample| {
            sink.lock().unwrap().push(*s);
        })),
        cancel: None,
    };
    let result = wipe_with(image.path_str(), ClearMethod::DoD5220, options);
    assert!(result.success);

    let samples = samples.lock().unwrap();
    let final_passes: Vec<usize> = samples
        .iter()
        .filter(|s| s.percent == 100.0)
        .map(|s| s.pass_index)
        .collect();
    assert_eq!(final_passes, vec![1, 2, 3]);
    assert!(samples.iter().all(|s| s.pass_count == 3));
    assert!(samples.iter().all(|s| s.total_bytes == 16 * 1024));
}

#[test]
fn test_cancelled_wipe_maps_to_error_result() {
    let image = MockImage::create(8 * 1024, 0xA5).unwrap();
    let token = CancelToken::new();
    token.cancel();

    let options = WipeOptions {
        progress: None,
        cancel: Some(token),
    };
    let result = wipe_with(image.path_str(), ClearMethod::Zero, options);

    assert_eq!(result.status, PurgeStatus::Error);
    assert_eq!(result.reason, "cancelled");
    assert!(!result.success);

    // Cancellation before the first write leaves the image untouched
    assert!(is_filled_with(&image.read_all().unwrap(), 0xA5));
}

#[test]
fn test_wipe_empty_image() {
    let image = MockImage::create(0, 0x00).unwrap();
    let result = wipe(image.path_str(), ClearMethod::Zero);
    assert!(result.success);
    assert_eq!(image.read_all().unwrap().len(), 0);
}
