//! Error types for the geoconv library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while converting coordinates or heights.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// Input coordinate or height is outside its valid range or not finite.
    #[error("Invalid coordinate: {message}")]
    InvalidCoordinate { message: String },

    /// The geoid model file does not exist or is not a regular file.
    #[error("Geoid model file not found: {path}")]
    ModelNotFound { path: PathBuf },

    /// The geoid model exists but cannot be decoded as a georeferenced raster.
    #[error("Cannot read geoid model {path}: {reason}")]
    ModelUnreadable { path: PathBuf, reason: String },

    /// The sampled raster value is the model's no-data sentinel.
    #[error("No geoid data available at coordinates ({lat}, {lon})")]
    NoData { lat: f64, lon: f64 },

    /// The sampled raster value is NaN or infinite.
    #[error("Invalid geoid value at coordinates ({lat}, {lon}): {value}")]
    InvalidSample { lat: f64, lon: f64, value: f64 },

    /// Batch upload with a content type other than CSV or XLSX.
    #[error("Unsupported file type: {content_type}. Only CSV or Excel files are supported")]
    UnsupportedFileType { content_type: String },

    /// Batch upload that cannot be parsed as a table.
    #[error("Error reading file: {reason}")]
    MalformedFile { reason: String },

    /// Batch upload lacking one or more required columns.
    #[error("Missing required columns: {}", columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    /// Batch upload in which every row failed.
    #[error("No rows could be converted: {}", errors.join("; "))]
    NoValidRows { errors: Vec<String> },

    /// The projection engine rejected the transform.
    #[error("Coordinate transformation failed: {message}")]
    ConversionFailure { message: String },

    /// IO error when reading files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConversionError {
    pub(crate) fn invalid_coordinate(message: impl Into<String>) -> Self {
        ConversionError::InvalidCoordinate {
            message: message.into(),
        }
    }

    /// Whether the error was caused by the caller's input rather than by the
    /// service or its geoid model.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConversionError::InvalidCoordinate { .. }
                | ConversionError::UnsupportedFileType { .. }
                | ConversionError::MalformedFile { .. }
                | ConversionError::MissingColumns { .. }
                | ConversionError::NoValidRows { .. }
        )
    }
}

/// Result type alias using [`ConversionError`].
pub type Result<T> = std::result::Result<T, ConversionError>;
