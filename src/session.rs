//! Capture source management
//!
//! The [`CaptureSourceManager`] owns the camera lifecycle for one logical
//! scanner: it selects a device, acquires a stream, derives the stream's
//! capabilities, pushes constraints and releases the stream. At most one
//! [`CaptureSession`] is live per manager.

use crate::assert_invariant;
use crate::capabilities::CapabilityModel;
use crate::constraints::ConstraintRequest;
use crate::errors::ScanError;
use crate::platform::{MediaDevices, MediaStream, PlatformError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// A live handle to an acquired camera stream and its derived capabilities
pub struct CaptureSession {
    id: Uuid,
    device_id: String,
    capabilities: CapabilityModel,
    stream: Arc<dyn MediaStream>,
    released: AtomicBool,
    /// Ticket of the most recently requested constraint application
    latest_ticket: AtomicU64,
    /// Serializes constraint applications against the track
    apply_lock: tokio::sync::Mutex<()>,
    effective: Mutex<ConstraintRequest>,
    constraints_applied: AtomicBool,
}

impl CaptureSession {
    fn new(device_id: String, stream: Arc<dyn MediaStream>) -> Self {
        // Derived exactly once, before any constraint can reach the track.
        let capabilities = CapabilityModel::from_track(&stream.capabilities());

        Self {
            id: Uuid::new_v4(),
            device_id,
            capabilities,
            stream,
            released: AtomicBool::new(false),
            latest_ticket: AtomicU64::new(0),
            apply_lock: tokio::sync::Mutex::new(()),
            effective: Mutex::new(ConstraintRequest::empty()),
            constraints_applied: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn capabilities(&self) -> &CapabilityModel {
        &self.capabilities
    }

    pub fn stream(&self) -> &Arc<dyn MediaStream> {
        &self.stream
    }

    pub fn is_live(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Constraints the device has accepted so far
    pub fn effective_constraints(&self) -> ConstraintRequest {
        self.effective
            .lock()
            .map(|effective| *effective)
            .unwrap_or_default()
    }

    /// Whether any constraint application has reached the track
    pub fn has_applied_constraints(&self) -> bool {
        self.constraints_applied.load(Ordering::Acquire)
    }

    fn record_effective(&self, accepted: &ConstraintRequest) {
        if let Ok(mut effective) = self.effective.lock() {
            effective.merge(accepted);
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("device_id", &self.device_id)
            .field("capabilities", &self.capabilities)
            .field("live", &self.is_live())
            .finish()
    }
}

/// What happened to a constraint application
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ApplyOutcome {
    /// Nothing to push
    Empty,
    /// The full request was accepted
    Applied,
    /// The device rejected part of the request; the accepted fields are kept
    Partial {
        accepted: ConstraintRequest,
        rejected: ConstraintRequest,
    },
    /// The device rejected every field; previous constraints stay in effect
    Rejected,
    /// A newer request arrived before this one reached the device
    Superseded,
    /// The session was released before the request reached the device
    Released,
}

/// Owns the single capture session of a scanner
pub struct CaptureSourceManager {
    devices: Arc<dyn MediaDevices>,
    live: Mutex<Option<Arc<CaptureSession>>>,
    /// Held for the whole of an acquisition, device open included
    acquiring: tokio::sync::Mutex<()>,
}

impl CaptureSourceManager {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            live: Mutex::new(None),
            acquiring: tokio::sync::Mutex::new(()),
        }
    }

    /// Pick the last enumerated video input; the last entry is most often the
    /// rear-facing camera on devices that have one.
    pub async fn select_device(&self) -> Result<String, ScanError> {
        let devices = self
            .devices
            .enumerate_devices()
            .await
            .map_err(map_acquisition_error)?;

        let selected = devices
            .into_iter()
            .rev()
            .find(|device| device.is_video_input())
            .ok_or(ScanError::NoDeviceFound)?;

        log::info!("Selected video input {} ({})", selected.id, selected.label);
        Ok(selected.id)
    }

    /// Acquire a stream for `device_id`, releasing any session still live.
    ///
    /// Acquisitions are serialized: a second caller waits until the first
    /// has installed its session, then releases it before opening a device.
    pub async fn acquire(&self, device_id: &str) -> Result<Arc<CaptureSession>, ScanError> {
        let _acquiring = self.acquiring.lock().await;

        let previous = self.take_live();
        if let Some(previous) = &previous {
            log::info!(
                "Releasing session {} before acquiring device {}",
                previous.id(),
                device_id
            );
            self.release(previous);
        }
        assert_invariant!(
            previous.map_or(true, |p| !p.is_live()),
            "At most one capture session is live",
            "session::acquire"
        );

        let stream = self.devices.get_stream(device_id).await.map_err(|e| {
            log::error!("Failed to acquire device {}: {}", device_id, e);
            map_acquisition_error(e)
        })?;

        let session = Arc::new(CaptureSession::new(device_id.to_string(), stream));
        log::info!(
            "Acquired session {} on device {} with capabilities {:?}",
            session.id(),
            device_id,
            session.capabilities()
        );

        let mut live = self.live_slot();
        assert_invariant!(
            live.is_none(),
            "At most one capture session is live",
            "session::acquire"
        );
        *live = Some(session.clone());
        drop(live);

        Ok(session)
    }

    /// Currently live session, if any
    pub fn current(&self) -> Option<Arc<CaptureSession>> {
        self.live_slot().clone()
    }

    /// Push `request` to the session's track.
    ///
    /// Only the most recent request is guaranteed to take effect: a request
    /// that is overtaken while waiting for an earlier application is dropped.
    /// A rejected request leaves the previous effective constraints in place,
    /// and fields the device does accept are still applied one by one.
    pub async fn apply_constraints(
        &self,
        session: &CaptureSession,
        request: ConstraintRequest,
    ) -> ApplyOutcome {
        if request.is_empty() {
            return ApplyOutcome::Empty;
        }
        self.apply_with(session, move || request).await
    }

    /// Like [`apply_constraints`](Self::apply_constraints), but the request is
    /// built only once this call owns the track, so it always reflects the
    /// newest settings at the moment it is pushed.
    pub async fn apply_with<F>(&self, session: &CaptureSession, build_request: F) -> ApplyOutcome
    where
        F: FnOnce() -> ConstraintRequest + Send,
    {
        let ticket = session.latest_ticket.fetch_add(1, Ordering::AcqRel) + 1;
        let _guard = session.apply_lock.lock().await;

        if !session.is_live() {
            return ApplyOutcome::Released;
        }
        if session.latest_ticket.load(Ordering::Acquire) != ticket {
            log::debug!("Constraint request {} superseded", ticket);
            return ApplyOutcome::Superseded;
        }

        let request = build_request();
        if request.is_empty() {
            return ApplyOutcome::Empty;
        }

        session.constraints_applied.store(true, Ordering::Release);
        match session.stream.apply_constraints(&request).await {
            Ok(()) => {
                session.record_effective(&request);
                log::debug!("Applied constraints {:?} to session {}", request, session.id());
                return ApplyOutcome::Applied;
            }
            Err(e) => {
                log::warn!(
                    "{}",
                    ScanError::ConstraintRejected(format!("{:?}: {}", request, e))
                );
            }
        }

        let mut accepted = ConstraintRequest::empty();
        let mut rejected = ConstraintRequest::empty();
        for part in request.split() {
            if !session.is_live() {
                return ApplyOutcome::Released;
            }
            match session.stream.apply_constraints(&part).await {
                Ok(()) => accepted.merge(&part),
                Err(e) => {
                    log::warn!("Dropping rejected constraint {:?}: {}", part, e);
                    rejected.merge(&part);
                }
            }
        }

        if accepted.is_empty() {
            ApplyOutcome::Rejected
        } else {
            session.record_effective(&accepted);
            ApplyOutcome::Partial { accepted, rejected }
        }
    }

    /// Stop all tracks of `session`. Releasing twice is a no-op.
    pub fn release(&self, session: &CaptureSession) {
        if session.released.swap(true, Ordering::AcqRel) {
            log::debug!("Session {} already released", session.id());
            return;
        }

        session.stream.stop();

        let mut live = self.live_slot();
        if live.as_ref().is_some_and(|current| current.id() == session.id()) {
            *live = None;
        }
        log::info!("Released session {} on device {}", session.id(), session.device_id());
    }

    /// Release whichever session is live
    pub fn release_current(&self) {
        if let Some(session) = self.take_live() {
            self.release(&session);
        }
    }

    fn take_live(&self) -> Option<Arc<CaptureSession>> {
        self.live_slot().take()
    }

    fn live_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<CaptureSession>>> {
        // Poisoning only happens if a holder panicked; the slot itself is
        // still a valid Option.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for CaptureSourceManager {
    fn drop(&mut self) {
        self.release_current();
    }
}

fn map_acquisition_error(error: PlatformError) -> ScanError {
    match error {
        PlatformError::PermissionDenied(message) => ScanError::PermissionDenied(message),
        other => ScanError::DeviceUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{RawRange, TrackCapabilities};
    use crate::testing::{FakeMediaDevices, FakeStream};
    use crate::types::DeviceDescriptor;

    fn torch_and_zoom() -> TrackCapabilities {
        TrackCapabilities {
            torch: Some(true),
            zoom: Some(RawRange {
                min: Some(1.0),
                max: Some(3.0),
            }),
            focus_mode: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_select_prefers_last_video_input() {
        let devices = FakeMediaDevices::with_devices(vec![
            DeviceDescriptor::video_input("camA", "Front"),
            DeviceDescriptor::video_input("camB", "Back"),
        ]);
        let manager = CaptureSourceManager::new(Arc::new(devices));
        assert_eq!(manager.select_device().await.unwrap(), "camB");
    }

    #[tokio::test]
    async fn test_acquire_releases_previous_session() {
        let devices = Arc::new(FakeMediaDevices::single("cam0", TrackCapabilities::default()));
        let manager = CaptureSourceManager::new(devices.clone());

        let first = manager.acquire("cam0").await.unwrap();
        let second = manager.acquire("cam0").await.unwrap();

        assert!(!first.is_live());
        assert!(second.is_live());
        assert_eq!(devices.streams()[0].stop_count(), 1);
        assert_eq!(manager.current().unwrap().id(), second.id());
    }

    #[tokio::test]
    async fn test_rejected_zoom_keeps_torch() {
        let stream = FakeStream::new(torch_and_zoom()).rejecting_zoom();
        let devices = FakeMediaDevices::with_stream("cam0", stream.clone());
        let manager = CaptureSourceManager::new(Arc::new(devices));
        let session = manager.acquire("cam0").await.unwrap();

        let request = ConstraintRequest {
            focus_mode: None,
            torch: Some(true),
            zoom: Some(2.0),
        };
        let outcome = manager.apply_constraints(&session, request).await;

        match outcome {
            ApplyOutcome::Partial { accepted, rejected } => {
                assert_eq!(accepted.torch, Some(true));
                assert_eq!(rejected.zoom, Some(2.0));
            }
            other => panic!("expected partial application, got {:?}", other),
        }
        assert_eq!(session.effective_constraints().torch, Some(true));
        assert_eq!(session.effective_constraints().zoom, None);
        assert_eq!(stream.current_torch(), Some(true));
    }

    #[tokio::test]
    async fn test_apply_after_release_is_dropped() {
        let stream = FakeStream::new(torch_and_zoom());
        let devices = FakeMediaDevices::with_stream("cam0", stream.clone());
        let manager = CaptureSourceManager::new(Arc::new(devices));
        let session = manager.acquire("cam0").await.unwrap();

        manager.release(&session);
        let outcome = manager
            .apply_constraints(
                &session,
                ConstraintRequest {
                    torch: Some(true),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(outcome, ApplyOutcome::Released);
        assert!(stream.applied().is_empty());
    }
}
