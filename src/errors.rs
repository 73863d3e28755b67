use thiserror::Error;

/// Errors produced by the scanning pipeline.
///
/// Acquisition-time failures (`NoDeviceFound`, `PermissionDenied`,
/// `DeviceUnavailable`) end the session and reach the presentation layer.
/// Cycle-local failures (`NoFrameAvailable`, `RecognitionFailed`) are absorbed
/// by the scan controller, and `ConstraintRejected` is absorbed by the capture
/// source manager.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("No video input device found")]
    NoDeviceFound,
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("No frame available yet")]
    NoFrameAvailable,
    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),
    #[error("Constraint rejected: {0}")]
    ConstraintRejected(String),
    #[error("Capture session already released")]
    SessionReleased,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

impl ScanError {
    /// Failures that end the acquisition attempt; never retried automatically.
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            ScanError::NoDeviceFound
                | ScanError::PermissionDenied(_)
                | ScanError::DeviceUnavailable(_)
        )
    }

    /// Failures that only skip the current recognition cycle.
    pub fn is_cycle_local(&self) -> bool {
        matches!(
            self,
            ScanError::NoFrameAvailable | ScanError::RecognitionFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ScanError::NoDeviceFound.is_acquisition_failure());
        assert!(ScanError::PermissionDenied("x".into()).is_acquisition_failure());
        assert!(ScanError::DeviceUnavailable("x".into()).is_acquisition_failure());
        assert!(!ScanError::NoFrameAvailable.is_acquisition_failure());

        assert!(ScanError::NoFrameAvailable.is_cycle_local());
        assert!(ScanError::RecognitionFailed("x".into()).is_cycle_local());
        assert!(!ScanError::ConstraintRejected("zoom".into()).is_cycle_local());
        assert!(!ScanError::ConstraintRejected("zoom".into()).is_acquisition_failure());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ScanError::PermissionDenied("user dismissed prompt".into()).to_string(),
            "Permission denied error: user dismissed prompt"
        );
        assert_eq!(
            ScanError::NoDeviceFound.to_string(),
            "No video input device found"
        );
    }
}
