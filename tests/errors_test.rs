#[cfg(test)]
mod error_tests {
    use boothcam::errors::CameraError;
    use std::error::Error;

    #[test]
    fn test_unknown_pixel_format_names_the_code() {
        let error = CameraError::UnknownPixelFormat(22);
        assert_eq!(error.to_string(), "Unknown pixel format code: 22");
    }

    #[test]
    fn test_device_not_active_names_the_device() {
        let error = CameraError::DeviceNotActive("USB Camera".to_string());
        assert!(error.to_string().contains("USB Camera"));
    }

    #[test]
    fn test_camera_error_debug_format() {
        let error = CameraError::DeviceStart("Debug test".to_string());
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("DeviceStart"));
        assert!(debug_str.contains("Debug test"));
    }

    #[test]
    fn test_camera_error_implements_error_trait() {
        let error = CameraError::NoDeviceAvailable;
        let _error_trait: &dyn Error = &error;
        assert!(error.source().is_none());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(CameraError::NoDeviceAvailable.is_not_found());
        assert!(CameraError::DeviceNotFound("x".to_string()).is_not_found());
        assert!(!CameraError::UnknownPixelFormat(1).is_not_found());
        assert!(!CameraError::NoActiveSession.is_not_found());
    }

    #[test]
    fn test_all_error_variants_display() {
        let errors = vec![
            CameraError::NoDeviceAvailable,
            CameraError::DeviceNotFound("a".to_string()),
            CameraError::UnknownPixelFormat(99),
            CameraError::UnknownPixelFormatName("NV12".to_string()),
            CameraError::NoActiveSession,
            CameraError::DeviceNotActive("b".to_string()),
            CameraError::DeviceStart("c".to_string()),
            CameraError::Enumeration("d".to_string()),
            CameraError::Query("e".to_string()),
            CameraError::Configuration("f".to_string()),
            CameraError::Config("g".to_string()),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
