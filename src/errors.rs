use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by [`CameraController`](crate::controller::CameraController).
///
/// This is a closed set: every failure of the setup chain or of preview
/// attachment is reported as one of these cases and handed to the caller
/// unchanged. Nothing is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum CameraControllerError {
    #[error("capture session is already running")]
    CaptureSessionAlreadyRunning,
    #[error("capture session is missing or not running")]
    CaptureSessionIsMissing,
    #[error("camera inputs are invalid")]
    InputsAreInvalid,
    #[error("invalid operation")]
    InvalidOperation,
    #[error("no camera available")]
    NoCameraAvailable,
    #[error("unknown camera error")]
    Unknown,
}

/// Errors reported by camera backends, sessions and outputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera initialization error: {0}")]
    InitializationError(String),
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Capture error: {0}")]
    CaptureError(String),
    #[error("Camera control error: {0}")]
    ControlError(String),
    #[error("Stream error: {0}")]
    StreamError(String),
    #[error("Encoding error: {0}")]
    EncodingError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_errors_have_distinct_messages() {
        let all = [
            CameraControllerError::CaptureSessionAlreadyRunning,
            CameraControllerError::CaptureSessionIsMissing,
            CameraControllerError::InputsAreInvalid,
            CameraControllerError::InvalidOperation,
            CameraControllerError::NoCameraAvailable,
            CameraControllerError::Unknown,
        ];
        let mut messages: Vec<String> = all.iter().map(|e| e.to_string()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), all.len());
    }

    #[test]
    fn camera_error_display() {
        let error = CameraError::StreamError("device busy".to_string());
        assert_eq!(error.to_string(), "Stream error: device busy");
    }
}
