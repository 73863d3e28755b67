//! Capture source manager lifecycle against fake devices

use crabscan::capabilities::{RawRange, TrackCapabilities};
use crabscan::constraints::ConstraintRequest;
use crabscan::errors::ScanError;
use crabscan::invariant_ppt::{clear_invariant_log, contract_test};
use crabscan::platform::PlatformError;
use crabscan::session::{ApplyOutcome, CaptureSourceManager};
use crabscan::testing::{FakeMediaDevices, FakeStream};
use crabscan::types::{DeviceDescriptor, DeviceKind};
use std::sync::Arc;
use std::time::Duration;

fn zoom_and_torch() -> TrackCapabilities {
    TrackCapabilities {
        torch: Some(true),
        zoom: Some(RawRange {
            min: Some(1.0),
            max: Some(4.0),
        }),
        focus_mode: Vec::new(),
    }
}

#[tokio::test]
async fn test_no_video_input_is_reported() {
    let devices = FakeMediaDevices::with_devices(vec![DeviceDescriptor {
        id: "mic0".to_string(),
        label: "Microphone".to_string(),
        kind: DeviceKind::AudioInput,
    }]);
    let manager = CaptureSourceManager::new(Arc::new(devices));

    assert_eq!(manager.select_device().await, Err(ScanError::NoDeviceFound));
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_empty_device_list() {
    let manager = CaptureSourceManager::new(Arc::new(FakeMediaDevices::empty()));
    assert_eq!(manager.select_device().await, Err(ScanError::NoDeviceFound));
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_permission_denied_maps_to_acquisition_failure() {
    let devices = FakeMediaDevices::single("cam0", TrackCapabilities::default())
        .failing_with(PlatformError::PermissionDenied("user said no".to_string()));
    let manager = CaptureSourceManager::new(Arc::new(devices));

    let error = manager.acquire("cam0").await.unwrap_err();
    assert_eq!(error, ScanError::PermissionDenied("user said no".to_string()));
    assert!(error.is_acquisition_failure());
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_busy_device_maps_to_unavailable() {
    let devices = FakeMediaDevices::single("cam0", TrackCapabilities::default())
        .failing_with(PlatformError::Busy("in use".to_string()));
    let manager = CaptureSourceManager::new(Arc::new(devices));

    assert!(matches!(
        manager.acquire("cam0").await,
        Err(ScanError::DeviceUnavailable(_))
    ));
}

#[tokio::test]
async fn test_release_twice_stops_once() {
    let stream = FakeStream::new(TrackCapabilities::default());
    let manager =
        CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream("cam0", stream.clone())));
    let session = manager.acquire("cam0").await.unwrap();

    manager.release(&session);
    manager.release(&session);

    assert_eq!(stream.stop_count(), 1);
    assert!(!session.is_live());
    assert!(manager.current().is_none());
}

#[tokio::test]
async fn test_dropping_manager_releases_stream() {
    let stream = FakeStream::new(TrackCapabilities::default());
    {
        let manager = CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream(
            "cam0",
            stream.clone(),
        )));
        manager.acquire("cam0").await.unwrap();
    }
    assert!(stream.is_stopped());
}

#[tokio::test]
async fn test_capabilities_are_derived_before_constraints() {
    let stream = FakeStream::new(zoom_and_torch());
    let manager =
        CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream("cam0", stream.clone())));
    let session = manager.acquire("cam0").await.unwrap();

    assert!(session.capabilities().torch_available);
    assert!(!session.has_applied_constraints());
    assert!(stream.applied().is_empty());
}

#[tokio::test]
async fn test_empty_request_is_not_pushed() {
    let stream = FakeStream::new(zoom_and_torch());
    let manager =
        CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream("cam0", stream.clone())));
    let session = manager.acquire("cam0").await.unwrap();

    let outcome = manager
        .apply_constraints(&session, ConstraintRequest::empty())
        .await;

    assert_eq!(outcome, ApplyOutcome::Empty);
    assert!(stream.applied().is_empty());
}

#[tokio::test]
async fn test_newer_request_supersedes_waiting_one() {
    let stream = FakeStream::new(zoom_and_torch()).with_apply_delay(Duration::from_millis(20));
    let manager =
        CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream("cam0", stream.clone())));
    let session = manager.acquire("cam0").await.unwrap();

    let zoom = |level: f64| ConstraintRequest {
        zoom: Some(level),
        ..Default::default()
    };
    let (first, second, third) = tokio::join!(
        manager.apply_constraints(&session, zoom(2.0)),
        manager.apply_constraints(&session, zoom(3.0)),
        manager.apply_constraints(&session, zoom(4.0)),
    );

    assert_eq!(first, ApplyOutcome::Applied);
    assert_eq!(second, ApplyOutcome::Superseded);
    assert_eq!(third, ApplyOutcome::Applied);
    assert_eq!(stream.current_zoom(), Some(4.0));
    assert_eq!(session.effective_constraints().zoom, Some(4.0));
}

#[tokio::test]
async fn test_fully_rejected_request_keeps_previous_constraints() {
    let stream = FakeStream::new(zoom_and_torch()).rejecting_zoom();
    let manager =
        CaptureSourceManager::new(Arc::new(FakeMediaDevices::with_stream("cam0", stream.clone())));
    let session = manager.acquire("cam0").await.unwrap();

    let torch = ConstraintRequest {
        torch: Some(true),
        ..Default::default()
    };
    assert_eq!(
        manager.apply_constraints(&session, torch).await,
        ApplyOutcome::Applied
    );

    let zoom_only = ConstraintRequest {
        zoom: Some(2.0),
        ..Default::default()
    };
    assert_eq!(
        manager.apply_constraints(&session, zoom_only).await,
        ApplyOutcome::Rejected
    );
    assert_eq!(session.effective_constraints().torch, Some(true));
    assert_eq!(stream.current_torch(), Some(true));
}

#[tokio::test]
async fn contract_single_live_session() {
    clear_invariant_log();

    let devices = Arc::new(FakeMediaDevices::single("cam0", TrackCapabilities::default()));
    let manager = CaptureSourceManager::new(devices.clone());
    for _ in 0..3 {
        manager.acquire("cam0").await.unwrap();
    }

    let streams = devices.streams();
    assert_eq!(streams.len(), 3);
    assert_eq!(streams.iter().filter(|s| !s.is_stopped()).count(), 1);

    contract_test("session lifecycle", &["At most one capture session is live"]);
}

#[tokio::test]
async fn test_concurrent_acquisitions_never_overlap() {
    let devices = Arc::new(
        FakeMediaDevices::single("cam0", TrackCapabilities::default())
            .with_open_delay(Duration::from_millis(30)),
    );
    let manager = CaptureSourceManager::new(devices.clone());

    let (first, second) = tokio::join!(manager.acquire("cam0"), manager.acquire("cam0"));
    let first = first.unwrap();
    let second = second.unwrap();

    assert_eq!(devices.peak_live(), 1);
    assert!(!first.is_live());
    assert!(second.is_live());
    assert_eq!(manager.current().unwrap().id(), second.id());

    let streams = devices.streams();
    assert_eq!(streams.len(), 2);
    assert!(streams[0].is_stopped());
    assert!(!streams[1].is_stopped());
}
