//! In-memory fakes for the injected boundaries

use super::synthetic_data::synthetic_frame;
use crate::capabilities::TrackCapabilities;
use crate::constraints::ConstraintRequest;
use crate::errors::ScanError;
use crate::platform::{MediaDevices, MediaStream, PlatformError};
use crate::recognition::{EngineFactory, RecognitionEngine, RecognitionOptions};
use crate::types::{DeviceDescriptor, StillImage};
use async_trait::async_trait;
use image::RgbImage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

enum StreamSource {
    /// A new stream per acquisition
    Fresh(TrackCapabilities),
    /// The same stream for every acquisition
    Shared(FakeStream),
}

/// Scripted device list and stream factory
pub struct FakeMediaDevices {
    devices: Vec<DeviceDescriptor>,
    source: StreamSource,
    failure: Option<PlatformError>,
    open_delay: Option<Duration>,
    opened: Mutex<Vec<FakeStream>>,
    peak_live: AtomicUsize,
}

impl FakeMediaDevices {
    /// Devices that open streams with no capabilities
    pub fn with_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices,
            source: StreamSource::Fresh(TrackCapabilities::default()),
            failure: None,
            open_delay: None,
            opened: Mutex::new(Vec::new()),
            peak_live: AtomicUsize::new(0),
        }
    }

    /// No devices at all
    pub fn empty() -> Self {
        Self::with_devices(Vec::new())
    }

    /// One camera; every acquisition opens a fresh stream with `capabilities`
    pub fn single(device_id: &str, capabilities: TrackCapabilities) -> Self {
        Self {
            source: StreamSource::Fresh(capabilities),
            ..Self::with_devices(vec![DeviceDescriptor::video_input(device_id, "Fake camera")])
        }
    }

    /// One camera that always hands out `stream`
    pub fn with_stream(device_id: &str, stream: FakeStream) -> Self {
        Self {
            source: StreamSource::Shared(stream),
            ..Self::with_devices(vec![DeviceDescriptor::video_input(device_id, "Fake camera")])
        }
    }

    /// Make every `get_stream` call fail with `error`
    pub fn failing_with(mut self, error: PlatformError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Make every `get_stream` call take `delay` before the device opens
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Most streams that were ever open and unstopped at the same time
    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::Acquire)
    }

    /// Streams handed out so far, oldest first
    pub fn streams(&self) -> Vec<FakeStream> {
        self.opened.lock().map(|opened| opened.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, PlatformError> {
        Ok(self.devices.clone())
    }

    async fn get_stream(&self, device_id: &str) -> Result<Arc<dyn MediaStream>, PlatformError> {
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        if !self.devices.iter().any(|device| device.id == device_id) {
            return Err(PlatformError::NotFound(device_id.to_string()));
        }

        let stream = match &self.source {
            StreamSource::Fresh(capabilities) => FakeStream::new(capabilities.clone()),
            StreamSource::Shared(stream) => stream.clone(),
        };
        if let Ok(mut opened) = self.opened.lock() {
            if !opened.iter().any(|s| s.same_stream(&stream)) {
                opened.push(stream.clone());
            }
            let live = opened.iter().filter(|s| !s.is_stopped()).count();
            self.peak_live.fetch_max(live, Ordering::AcqRel);
        }
        Ok(Arc::new(stream))
    }
}

struct FakeStreamState {
    capabilities: TrackCapabilities,
    frame: Mutex<Option<RgbImage>>,
    applied: Mutex<Vec<ConstraintRequest>>,
    current: Mutex<ConstraintRequest>,
    reject_zoom: AtomicBool,
    apply_delay: Mutex<Option<Duration>>,
    stopped: AtomicBool,
    stops: AtomicUsize,
    frame_reader: Mutex<Option<ThreadId>>,
}

/// A stream that records what was applied to it
#[derive(Clone)]
pub struct FakeStream {
    state: Arc<FakeStreamState>,
}

impl FakeStream {
    /// A stream that already has a 64x48 frame
    pub fn new(capabilities: TrackCapabilities) -> Self {
        Self {
            state: Arc::new(FakeStreamState {
                capabilities,
                frame: Mutex::new(Some(synthetic_frame(64, 48, 0))),
                applied: Mutex::new(Vec::new()),
                current: Mutex::new(ConstraintRequest::empty()),
                reject_zoom: AtomicBool::new(false),
                apply_delay: Mutex::new(None),
                stopped: AtomicBool::new(false),
                stops: AtomicUsize::new(0),
                frame_reader: Mutex::new(None),
            }),
        }
    }

    /// No frame has been produced yet
    pub fn without_frame(self) -> Self {
        self.set_frame(None);
        self
    }

    /// Reject any request that touches zoom
    pub fn rejecting_zoom(self) -> Self {
        self.state.reject_zoom.store(true, Ordering::Release);
        self
    }

    /// Hold every constraint application for `delay`
    pub fn with_apply_delay(self, delay: Duration) -> Self {
        if let Ok(mut slot) = self.state.apply_delay.lock() {
            *slot = Some(delay);
        }
        self
    }

    pub fn set_frame(&self, frame: Option<RgbImage>) {
        if let Ok(mut slot) = self.state.frame.lock() {
            *slot = frame;
        }
    }

    /// Requests the stream accepted, in order
    pub fn applied(&self) -> Vec<ConstraintRequest> {
        self.state.applied.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn current_torch(&self) -> Option<bool> {
        self.state.current.lock().ok().and_then(|c| c.torch)
    }

    pub fn current_zoom(&self) -> Option<f64> {
        self.state.current.lock().ok().and_then(|c| c.zoom)
    }

    /// How many times `stop` was called
    pub fn stop_count(&self) -> usize {
        self.state.stops.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::Acquire)
    }

    /// Thread that last read a frame
    pub fn last_frame_reader(&self) -> Option<ThreadId> {
        self.state.frame_reader.lock().ok().and_then(|reader| *reader)
    }

    fn same_stream(&self, other: &FakeStream) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[async_trait]
impl MediaStream for FakeStream {
    fn capabilities(&self) -> TrackCapabilities {
        self.state.capabilities.clone()
    }

    async fn apply_constraints(&self, request: &ConstraintRequest) -> Result<(), PlatformError> {
        let delay = self.state.apply_delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.is_stopped() {
            return Err(PlatformError::Other("stream stopped".to_string()));
        }
        if request.zoom.is_some() && self.state.reject_zoom.load(Ordering::Acquire) {
            return Err(PlatformError::Unsupported("zoom".to_string()));
        }
        if request.torch.is_some() && self.state.capabilities.torch != Some(true) {
            return Err(PlatformError::Unsupported("torch".to_string()));
        }

        if let Ok(mut applied) = self.state.applied.lock() {
            applied.push(*request);
        }
        if let Ok(mut current) = self.state.current.lock() {
            current.merge(request);
        }
        Ok(())
    }

    fn current_frame(&self) -> Option<RgbImage> {
        if let Ok(mut reader) = self.state.frame_reader.lock() {
            *reader = Some(std::thread::current().id());
        }
        if self.is_stopped() {
            return None;
        }
        self.state.frame.lock().ok().and_then(|frame| frame.clone())
    }

    fn stop(&self) {
        self.state.stopped.store(true, Ordering::Release);
        self.state.stops.fetch_add(1, Ordering::AcqRel);
    }
}

struct ScriptState {
    replies: Mutex<VecDeque<Result<String, ScanError>>>,
    fallback: Result<String, ScanError>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    created: AtomicUsize,
    terminated: AtomicUsize,
}

/// Recognition engine factory that replays scripted answers
#[derive(Clone)]
pub struct ScriptedEngineFactory {
    state: Arc<ScriptState>,
}

impl ScriptedEngineFactory {
    /// Answer with `replies` in order, then keep repeating the last one
    pub fn replying<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replies: VecDeque<Result<String, ScanError>> =
            replies.into_iter().map(|reply| Ok(reply.into())).collect();
        let fallback = replies.back().cloned().unwrap_or_else(|| Ok(String::new()));
        Self::from_script(replies, fallback)
    }

    /// Fail every recognition
    pub fn failing(message: &str) -> Self {
        Self::from_script(
            VecDeque::new(),
            Err(ScanError::RecognitionFailed(message.to_string())),
        )
    }

    fn from_script(
        replies: VecDeque<Result<String, ScanError>>,
        fallback: Result<String, ScanError>,
    ) -> Self {
        Self {
            state: Arc::new(ScriptState {
                replies: Mutex::new(replies),
                fallback,
                delay: Mutex::new(None),
                calls: AtomicUsize::new(0),
                created: AtomicUsize::new(0),
                terminated: AtomicUsize::new(0),
            }),
        }
    }

    /// Make each recognition take `delay`
    pub fn with_delay(self, delay: Duration) -> Self {
        if let Ok(mut slot) = self.state.delay.lock() {
            *slot = Some(delay);
        }
        self
    }

    /// Recognitions started
    pub fn calls(&self) -> usize {
        self.state.calls.load(Ordering::Acquire)
    }

    pub fn engines_created(&self) -> usize {
        self.state.created.load(Ordering::Acquire)
    }

    pub fn engines_terminated(&self) -> usize {
        self.state.terminated.load(Ordering::Acquire)
    }
}

#[async_trait]
impl EngineFactory for ScriptedEngineFactory {
    async fn create(
        &self,
        _options: &RecognitionOptions,
    ) -> Result<Box<dyn RecognitionEngine>, ScanError> {
        self.state.created.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(ScriptedEngine {
            state: self.state.clone(),
        }))
    }
}

struct ScriptedEngine {
    state: Arc<ScriptState>,
}

#[async_trait]
impl RecognitionEngine for ScriptedEngine {
    async fn recognize_text(
        &mut self,
        _image: &StillImage,
        _options: &RecognitionOptions,
    ) -> Result<String, ScanError> {
        self.state.calls.fetch_add(1, Ordering::AcqRel);

        let delay = self.state.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.state.replies.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| self.state.fallback.clone())
    }

    async fn terminate(&mut self) {
        self.state.terminated.fetch_add(1, Ordering::AcqRel);
    }
}
