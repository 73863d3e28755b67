#[cfg(test)]
mod error_tests {
    use crabscan::errors::ScanError;
    use std::error::Error;

    #[test]
    fn test_permission_denied_message() {
        let error = ScanError::PermissionDenied("Access denied".to_string());
        assert!(error.to_string().contains("Permission denied"));
        assert!(error.to_string().contains("Access denied"));
    }

    #[test]
    fn test_no_device_message() {
        assert_eq!(
            ScanError::NoDeviceFound.to_string(),
            "No video input device found"
        );
    }

    #[test]
    fn test_constraint_rejected_is_neither_fatal_nor_cycle_local() {
        let error = ScanError::ConstraintRejected("zoom".to_string());
        assert!(!error.is_acquisition_failure());
        assert!(!error.is_cycle_local());
    }

    #[test]
    fn test_taxonomy_is_disjoint() {
        let all = [
            ScanError::NoDeviceFound,
            ScanError::PermissionDenied("p".into()),
            ScanError::DeviceUnavailable("d".into()),
            ScanError::NoFrameAvailable,
            ScanError::RecognitionFailed("r".into()),
            ScanError::ConstraintRejected("c".into()),
            ScanError::SessionReleased,
            ScanError::Config("c".into()),
            ScanError::Backend("b".into()),
        ];
        for error in &all {
            assert!(
                !(error.is_acquisition_failure() && error.is_cycle_local()),
                "{:?} classified twice",
                error
            );
        }
        assert_eq!(all.iter().filter(|e| e.is_acquisition_failure()).count(), 3);
        assert_eq!(all.iter().filter(|e| e.is_cycle_local()).count(), 2);
    }

    #[test]
    fn test_error_trait_object() {
        let error: Box<dyn Error> = Box::new(ScanError::NoFrameAvailable);
        assert!(error.source().is_none());
        assert_eq!(error.to_string(), "No frame available yet");
    }
}
