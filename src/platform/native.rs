//! Native camera backend over `nokhwa`
//!
//! Streams run on nokhwa's callback thread; the callback only keeps the most
//! recent raw buffer, which is decoded on demand when a snapshot is taken.

use super::{MediaDevices, MediaStream, PlatformError};
use crate::capabilities::{RawRange, TrackCapabilities};
use crate::constraints::{ConstraintRequest, FocusMode};
use crate::types::DeviceDescriptor;
use async_trait::async_trait;
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraControl, CameraIndex, ControlValueDescription, ControlValueSetter,
        KnownCameraControl, RequestedFormat, RequestedFormatType,
    },
    Buffer, CallbackCamera,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Enumerates and opens cameras through the platform's native API
#[derive(Debug, Default, Clone)]
pub struct NativeMediaDevices;

impl NativeMediaDevices {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaDevices for NativeMediaDevices {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, PlatformError> {
        tokio::task::spawn_blocking(|| {
            let cameras = query(ApiBackend::Auto).map_err(map_nokhwa_error)?;
            log::debug!("Native backend enumerated {} cameras", cameras.len());

            Ok(cameras
                .into_iter()
                .map(|info| DeviceDescriptor::video_input(info.index().to_string(), info.human_name()))
                .collect())
        })
        .await
        .map_err(|e| PlatformError::Other(format!("Task join error: {}", e)))?
    }

    async fn get_stream(&self, device_id: &str) -> Result<Arc<dyn MediaStream>, PlatformError> {
        let device_id = device_id.to_string();
        let stream = tokio::task::spawn_blocking(move || NativeStream::open(&device_id))
            .await
            .map_err(|e| PlatformError::Other(format!("Task join error: {}", e)))??;

        Ok(Arc::new(stream))
    }
}

/// A running nokhwa callback stream
pub struct NativeStream {
    camera: Arc<NativeCamera>,
    /// Read once at open; nokhwa control queries block
    capabilities: TrackCapabilities,
    latest: Arc<Mutex<Option<Buffer>>>,
    stopped: AtomicBool,
}

/// The camera handle, shared with blocking tasks that write controls
struct NativeCamera {
    device_id: String,
    camera: Mutex<CallbackCamera>,
}

impl NativeStream {
    fn open(device_id: &str) -> Result<Self, PlatformError> {
        let index = match device_id.parse::<u32>() {
            Ok(index) => CameraIndex::Index(index),
            Err(_) => CameraIndex::String(device_id.to_string()),
        };

        let latest: Arc<Mutex<Option<Buffer>>> = Arc::new(Mutex::new(None));
        let sink = latest.clone();
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);

        let mut camera = CallbackCamera::new(index, requested, move |buffer| {
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(buffer);
            }
        })
        .map_err(map_nokhwa_error)?;

        camera.open_stream().map_err(map_nokhwa_error)?;
        log::info!("Opened native stream for device {}", device_id);

        let camera = NativeCamera {
            device_id: device_id.to_string(),
            camera: Mutex::new(camera),
        };
        let capabilities = camera.capabilities();
        log::debug!("Device {} capabilities: {:?}", device_id, capabilities);

        Ok(Self {
            camera: Arc::new(camera),
            capabilities,
            latest,
            stopped: AtomicBool::new(false),
        })
    }
}

impl NativeCamera {
    fn controls(&self) -> Vec<CameraControl> {
        let camera = match self.camera.lock() {
            Ok(camera) => camera,
            Err(_) => return Vec::new(),
        };
        camera.camera_controls().unwrap_or_else(|e| {
            log::debug!("Device {} exposes no controls: {}", self.device_id, e);
            Vec::new()
        })
    }

    fn capabilities(&self) -> TrackCapabilities {
        let mut capabilities = TrackCapabilities::default();

        for control in self.controls() {
            match control.control() {
                KnownCameraControl::Zoom => {
                    capabilities.zoom = match control.description() {
                        ControlValueDescription::IntegerRange { min, max, .. } => Some(RawRange {
                            min: Some(*min as f64),
                            max: Some(*max as f64),
                        }),
                        ControlValueDescription::FloatRange { min, max, .. } => Some(RawRange {
                            min: Some(*min),
                            max: Some(*max),
                        }),
                        _ => None,
                    };
                }
                KnownCameraControl::Focus => {
                    capabilities.focus_mode = vec!["manual".to_string(), FocusMode::SingleShot.as_str().to_string()];
                }
                _ => {}
            }
        }

        capabilities
    }

    fn set_control(&self, id: KnownCameraControl, value: ControlValueSetter) -> Result<(), PlatformError> {
        let mut camera = self
            .camera
            .lock()
            .map_err(|_| PlatformError::Other("camera lock poisoned".to_string()))?;
        camera
            .set_camera_control(id, value)
            .map_err(|e| PlatformError::Unsupported(format!("{:?}: {}", id, e)))
    }

    fn apply_blocking(&self, request: &ConstraintRequest) -> Result<(), PlatformError> {
        if request.torch.is_some() {
            return Err(PlatformError::Unsupported("torch".to_string()));
        }

        let controls = self.controls();
        let find = |id: KnownCameraControl| controls.iter().find(|c| c.control() == id);

        if let Some(FocusMode::SingleShot) = request.focus_mode {
            // One-shot focus: re-seat the focus motor at its default position.
            let focus = find(KnownCameraControl::Focus)
                .ok_or_else(|| PlatformError::Unsupported("focus".to_string()))?;
            if let ControlValueDescription::IntegerRange { default, .. } = focus.description() {
                self.set_control(KnownCameraControl::Focus, ControlValueSetter::Integer(*default))?;
            }
        }

        if let Some(level) = request.zoom {
            let zoom = find(KnownCameraControl::Zoom)
                .ok_or_else(|| PlatformError::Unsupported("zoom".to_string()))?;
            let setter = match zoom.description() {
                ControlValueDescription::IntegerRange { min, max, .. } => {
                    ControlValueSetter::Integer((level.round() as i64).clamp(*min, *max))
                }
                ControlValueDescription::FloatRange { min, max, .. } => {
                    ControlValueSetter::Float(level.clamp(*min, *max))
                }
                other => {
                    return Err(PlatformError::Unsupported(format!("zoom control {:?}", other)));
                }
            };
            self.set_control(KnownCameraControl::Zoom, setter)?;
        }

        Ok(())
    }
}

#[async_trait]
impl MediaStream for NativeStream {
    fn capabilities(&self) -> TrackCapabilities {
        self.capabilities.clone()
    }

    async fn apply_constraints(&self, request: &ConstraintRequest) -> Result<(), PlatformError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PlatformError::Other("stream stopped".to_string()));
        }

        let camera = self.camera.clone();
        let request = *request;
        tokio::task::spawn_blocking(move || camera.apply_blocking(&request))
            .await
            .map_err(|e| PlatformError::Other(format!("Task join error: {}", e)))?
    }

    fn current_frame(&self) -> Option<RgbImage> {
        let buffer = self.latest.lock().ok()?.clone()?;
        let resolution = buffer.resolution();
        match buffer.decode_image::<RgbFormat>() {
            Ok(decoded) => RgbImage::from_raw(resolution.width_x, resolution.height_y, decoded.into_raw()),
            Err(e) => {
                log::debug!("Failed to decode frame from {}: {}", self.camera.device_id, e);
                None
            }
        }
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut camera) = self.camera.camera.lock() {
            if let Err(e) = camera.stop_stream() {
                log::warn!("Failed to stop stream for {}: {}", self.camera.device_id, e);
            }
        }
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
        log::info!("Stopped native stream for device {}", self.camera.device_id);
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn map_nokhwa_error(error: nokhwa::NokhwaError) -> PlatformError {
    let message = error.to_string();
    let lowered = message.to_lowercase();

    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("not authorized") {
        PlatformError::PermissionDenied(message)
    } else if lowered.contains("busy") || lowered.contains("in use") {
        PlatformError::Busy(message)
    } else if lowered.contains("not found") || lowered.contains("no such") {
        PlatformError::NotFound(message)
    } else {
        PlatformError::Other(message)
    }
}
