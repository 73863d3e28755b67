//! Injected media-device boundary
//!
//! The capture source manager never talks to a camera API directly. It is
//! handed a [`MediaDevices`] implementation that enumerates devices and opens
//! streams, and each opened [`MediaStream`] exposes its capabilities, accepts
//! constraints, hands out the latest frame and can be stopped. The
//! [`native`] backend implements both over `nokhwa`; tests use the fakes in
//! [`crate::testing`].

pub mod native;

use crate::capabilities::TrackCapabilities;
use crate::constraints::ConstraintRequest;
use crate::types::DeviceDescriptor;
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;

pub use native::NativeMediaDevices;

/// Failures reported by a platform backend
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("device busy: {0}")]
    Busy(String),
    #[error("constraint not supported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Other(String),
}

/// Device enumeration and stream acquisition
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// All media devices known to the platform, in platform order
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>, PlatformError>;

    /// Open a live video stream bound to `device_id`
    async fn get_stream(&self, device_id: &str) -> Result<Arc<dyn MediaStream>, PlatformError>;
}

/// A live video stream with a single video track
#[async_trait]
pub trait MediaStream: Send + Sync {
    /// Snapshot of the track's advisory capabilities
    fn capabilities(&self) -> TrackCapabilities;

    /// Push constraints to the video track
    async fn apply_constraints(&self, request: &ConstraintRequest) -> Result<(), PlatformError>;

    /// Most recent decoded frame, or `None` before the first frame arrives.
    /// Must not pause or otherwise disturb the stream.
    fn current_frame(&self) -> Option<RgbImage>;

    /// Stop every track and release the underlying device
    fn stop(&self);
}
