//! Error types for the segmask-core library.
//!
//! This module provides granular error variants for different failure modes,
//! enabling precise error handling and user-friendly error messages.

use thiserror::Error;

/// Message shown to the user for any failed segmentation attempt.
///
/// Service and transport details go to the log, not the UI.
pub const SEGMENTATION_FAILED_MESSAGE: &str = "Segmentation failed. Adjust the selection or try again.";

/// Errors that can occur within the segmask-core library.
///
/// Each variant represents a specific failure mode with contextual information
/// to help diagnose and handle errors appropriately.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (invalid URLs, unreadable settings).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The uploaded file could not be read into a displayable image.
    #[error("Could not read image: {0}")]
    UploadRead(String),

    /// Transport-level failure talking to the segmentation service.
    #[error("Request to segmentation service failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The segmentation service answered with a non-success status.
    #[error("Segmentation service returned HTTP {status}")]
    HttpStatus {
        /// Numeric HTTP status code.
        status: u16,
        /// Raw response body, kept for logging.
        body: String,
    },

    /// The response body was not JSON or lacked the mask field.
    #[error("Malformed segmentation response: {0}")]
    ResponseParse(String),

    /// A segmentation attempt ended without a usable mask.
    #[error("{0}")]
    Segmentation(String),

    /// The returned mask payload could not be decoded into an image.
    #[error("Mask decode failed: {0}")]
    MaskDecode(String),

    /// Image processing or encoding failed.
    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    /// UI-related errors (rendering, window management).
    #[error("UI error: {0}")]
    Ui(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an upload read error with the given message.
    pub fn upload(msg: impl Into<String>) -> Self {
        Self::UploadRead(msg.into())
    }

    /// Creates a response parse error with the given message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ResponseParse(msg.into())
    }

    /// Creates a mask decode error with the given message.
    pub fn mask(msg: impl Into<String>) -> Self {
        Self::MaskDecode(msg.into())
    }

    /// Creates an image processing error with the given message.
    pub fn image(msg: impl Into<String>) -> Self {
        Self::ImageProcessing(msg.into())
    }

    /// Creates a UI error with the given message.
    pub fn ui(msg: impl Into<String>) -> Self {
        Self::Ui(msg.into())
    }

    /// Whether this error came out of a segmentation round-trip.
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::HttpStatus { .. } | Self::ResponseParse(_) | Self::Json(_)
        )
    }

    /// Text suitable for the error banner.
    ///
    /// Request and parse failures collapse into [`SEGMENTATION_FAILED_MESSAGE`];
    /// everything else shows its own description.
    pub fn user_message(&self) -> String {
        if self.is_request_failure() {
            SEGMENTATION_FAILED_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
