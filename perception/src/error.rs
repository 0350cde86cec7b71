//! Error types for the perception pipeline

use thiserror::Error;

/// Result type alias for the perception crates
pub type Result<T> = std::result::Result<T, PerceptionError>;

/// Errors that can occur while processing a frame
#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("Detector failed: {0}")]
    DetectorError(String),

    #[error("Image preprocessing failed: {0}")]
    PreprocessingError(String),

    #[error("Localization failed: {0}")]
    LocalizationError(String),

    #[error("Invalid class table: expected {expected} classes, got {actual}")]
    ClassTableMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Image processing error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PerceptionError {
    pub fn detector<S: Into<String>>(msg: S) -> Self {
        Self::DetectorError(msg.into())
    }

    pub fn preprocessing<S: Into<String>>(msg: S) -> Self {
        Self::PreprocessingError(msg.into())
    }

    pub fn localization<S: Into<String>>(msg: S) -> Self {
        Self::LocalizationError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }
}
