// Error types for the emotion tracker

use thiserror::Error;

/// Main error type for the emotion tracker
#[derive(Debug, Error)]
pub enum EmotionTrackerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Emotion classification failed: {0}")]
    Classification(String),

    #[error("Face detection failed: {0}")]
    FaceDetection(String),

    #[error("Frame source failed: {0}")]
    FrameSource(String),

    #[cfg(feature = "camera")]
    #[error("Camera initialization failed: {0}")]
    CameraInit(String),

    #[cfg(feature = "onnx")]
    #[error("ONNX Runtime error: {0}")]
    OnnxRuntime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decoding error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("Config parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for emotion tracker operations
pub type Result<T> = std::result::Result<T, EmotionTrackerError>;

// Conversion from nokhwa errors
#[cfg(feature = "camera")]
impl From<nokhwa::NokhwaError> for EmotionTrackerError {
    fn from(err: nokhwa::NokhwaError) -> Self {
        match err {
            nokhwa::NokhwaError::OpenDeviceError(device, error) => {
                EmotionTrackerError::CameraInit(format!("Device {device}: {error}"))
            }
            nokhwa::NokhwaError::StructureError { structure, error } => {
                EmotionTrackerError::CameraInit(format!("{structure}: {error}"))
            }
            _ => EmotionTrackerError::CameraInit(err.to_string()),
        }
    }
}

// Conversion from ONNX Runtime errors
#[cfg(feature = "onnx")]
impl From<ort::Error> for EmotionTrackerError {
    fn from(err: ort::Error) -> Self {
        EmotionTrackerError::OnnxRuntime(err.to_string())
    }
}
