use crabscan::config::CrabScanConfig;
use crabscan::errors::ScanError;
use crabscan::types::{ImageEncoding, Viewport};
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("crabscan.toml");

    let mut config = CrabScanConfig::default();
    config.capture.image_format = "jpeg".to_string();
    config.capture.jpeg_quality = 75;
    config.recognition.languages = vec!["eng".to_string(), "deu".to_string()];
    config.scanning.continuous = true;
    config.scanning.interval_ms = 500;

    config.save_to_file(&path).unwrap();
    let loaded = CrabScanConfig::load_from_file(&path).unwrap();

    assert_eq!(loaded, config);
    assert_eq!(loaded.encoding(), ImageEncoding::Jpeg { quality: 75 });
    assert_eq!(loaded.recognition_options().language_spec(), "deu+eng");
    assert_eq!(
        loaded.scan_policy().continuous,
        Some(Duration::from_millis(500))
    );
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let loaded = CrabScanConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, CrabScanConfig::default());
}

#[test]
fn test_malformed_file_is_a_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crabscan.toml");
    std::fs::write(&path, "[capture\nviewport = ").unwrap();

    assert!(matches!(
        CrabScanConfig::load_from_file(&path),
        Err(ScanError::Config(_))
    ));
}

#[test]
fn test_invalid_values_are_rejected_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("crabscan.toml");

    let mut config = CrabScanConfig::default();
    config.capture.jpeg_quality = 0;
    let toml_string = toml::to_string_pretty(&config).unwrap();
    std::fs::write(&path, toml_string).unwrap();

    assert!(matches!(
        CrabScanConfig::load_from_file(&path),
        Err(ScanError::Config(_))
    ));
}

#[test]
fn test_zero_viewport_falls_back() {
    let mut config = CrabScanConfig::default();
    config.capture.viewport = [0, 0];
    assert_eq!(config.viewport(), Viewport::FALLBACK);
    assert_eq!((Viewport::FALLBACK.width, Viewport::FALLBACK.height), (620, 480));
}
