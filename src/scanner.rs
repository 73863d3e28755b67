//! Logical scanner instance
//!
//! A [`Scanner`] ties the capture source manager, snapshotter, recognition
//! service and scan controller together for one presentation surface. It owns
//! the user's [`DesiredSettings`] and re-applies them to the live session
//! whenever the user toggles the torch or cycles the zoom.

use crate::capabilities::{CapabilityModel, ControlVisibility};
use crate::config::CrabScanConfig;
use crate::constraints::{self, DesiredSettings, ZoomPolicy};
use crate::controller::{
    CycleOutcome, ScanController, ScanEvent, ScanPolicy, ScanState, EVENT_CAPACITY,
};
use crate::errors::ScanError;
use crate::platform::MediaDevices;
use crate::recognition::RecognitionService;
use crate::session::{ApplyOutcome, CaptureSession, CaptureSourceManager};
use crate::snapshot::FrameSnapshotter;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

pub struct Scanner {
    manager: CaptureSourceManager,
    snapshotter: FrameSnapshotter,
    recognizer: RecognitionService,
    zoom_policy: ZoomPolicy,
    scan_policy: ScanPolicy,
    desired: Mutex<DesiredSettings>,
    controller: Mutex<Option<Arc<ScanController>>>,
    /// Shared by every controller this scanner starts
    events: broadcast::Sender<ScanEvent>,
}

impl Scanner {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        recognizer: RecognitionService,
        config: &CrabScanConfig,
    ) -> Self {
        let zoom_policy = config.zoom_policy();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            manager: CaptureSourceManager::new(devices),
            snapshotter: FrameSnapshotter::new(config.viewport(), config.encoding()),
            recognizer,
            zoom_policy,
            scan_policy: config.scan_policy(),
            desired: Mutex::new(DesiredSettings::with_policy(&zoom_policy)),
            controller: Mutex::new(None),
            events,
        }
    }

    /// Select a camera and start scanning on it.
    pub async fn start(&self) -> Result<Arc<CaptureSession>, ScanError> {
        let device_id = self.manager.select_device().await?;
        self.start_with_device(&device_id).await
    }

    /// Start scanning on a specific camera, replacing any running session.
    pub async fn start_with_device(&self, device_id: &str) -> Result<Arc<CaptureSession>, ScanError> {
        self.stop_controller();

        let session = self.manager.acquire(device_id).await?;
        *self.lock_desired() = DesiredSettings::with_policy(&self.zoom_policy);

        let outcome = self.push_desired(&session).await;
        log::info!(
            "Scanner started on {} (initial constraints: {:?}, controls: {:?})",
            device_id,
            outcome,
            session.capabilities().controls()
        );

        let controller = Arc::new(ScanController::with_events(
            session.clone(),
            self.snapshotter,
            self.recognizer.clone(),
            self.scan_policy,
            self.events.clone(),
        ));
        if let Some(previous) = self.controller_slot().replace(controller.clone()) {
            previous.stop();
        }
        controller.start_continuous();

        Ok(session)
    }

    /// Run one recognition cycle on the live session.
    pub async fn trigger_scan(&self) -> CycleOutcome {
        match self.controller() {
            Some(controller) => controller.trigger().await,
            None => {
                log::debug!("Scan triggered without a running scanner");
                CycleOutcome::Stopped
            }
        }
    }

    /// Flip the torch and push the new settings to the device.
    pub async fn toggle_torch(&self) -> Result<ApplyOutcome, ScanError> {
        let session = self.live_session()?;
        let torch_on = self.lock_desired().toggle_torch();
        log::debug!("Torch toggled {}", if torch_on { "on" } else { "off" });
        Ok(self.push_desired(&session).await)
    }

    /// Step the zoom level, wrapping past the device maximum.
    pub async fn cycle_zoom(&self) -> Result<ApplyOutcome, ScanError> {
        let session = self.live_session()?;
        let level = self
            .lock_desired()
            .cycle_zoom(session.capabilities(), &self.zoom_policy);
        log::debug!("Zoom level set to {}", level);
        Ok(self.push_desired(&session).await)
    }

    /// Controls to render for the live session
    pub fn controls(&self) -> Option<ControlVisibility> {
        self.manager
            .current()
            .map(|session| session.capabilities().controls())
    }

    pub fn capabilities(&self) -> Option<CapabilityModel> {
        self.manager
            .current()
            .map(|session| session.capabilities().clone())
    }

    pub fn desired_settings(&self) -> DesiredSettings {
        *self.lock_desired()
    }

    /// State of the running controller; `Stopped` when nothing runs
    pub fn state(&self) -> ScanState {
        self.controller()
            .map(|controller| controller.state())
            .unwrap_or(ScanState::Stopped)
    }

    /// Events of every session this scanner runs. Subscribe before `start`
    /// to see the first continuous cycle.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn current_session(&self) -> Option<Arc<CaptureSession>> {
        self.manager.current()
    }

    /// Tear down: cancel the timer, discard in-flight results, stop the stream.
    pub fn stop(&self) {
        self.stop_controller();
        self.manager.release_current();
    }

    /// Build from the newest settings once the track is ours; overlapping
    /// toggles collapse into the last one.
    async fn push_desired(&self, session: &CaptureSession) -> ApplyOutcome {
        self.manager
            .apply_with(session, || {
                constraints::build(session.capabilities(), &self.desired_settings())
            })
            .await
    }

    fn live_session(&self) -> Result<Arc<CaptureSession>, ScanError> {
        self.manager
            .current()
            .filter(|session| session.is_live())
            .ok_or(ScanError::SessionReleased)
    }

    fn controller(&self) -> Option<Arc<ScanController>> {
        self.controller_slot().clone()
    }

    fn stop_controller(&self) {
        if let Some(controller) = self.controller_slot().take() {
            controller.stop();
        }
    }

    fn controller_slot(&self) -> MutexGuard<'_, Option<Arc<ScanController>>> {
        self.controller
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_desired(&self) -> MutexGuard<'_, DesiredSettings> {
        self.desired
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}
