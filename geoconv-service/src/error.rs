//! Mapping of conversion errors to HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use geoconv::ConversionError;

use crate::handlers::ErrorResponse;

/// Message returned for failures that should not leak details.
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Error returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// Failure reported by the conversion library.
    Conversion(ConversionError),
    /// Malformed request outside the library's validation (e.g. missing form field).
    BadRequest(String),
    /// Unexpected failure inside the service.
    Internal(String),
}

impl From<ConversionError> for ApiError {
    fn from(e: ConversionError) -> Self {
        ApiError::Conversion(e)
    }
}

impl ApiError {
    /// Status code and client-facing message.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::Conversion(e) if e.is_client_error() => {
                (StatusCode::BAD_REQUEST, e.to_string())
            }
            ApiError::Conversion(ConversionError::Io(_)) | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_ERROR_MESSAGE.to_string(),
            ),
            ApiError::Conversion(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        match &self {
            ApiError::Conversion(e) if status.is_server_error() => {
                tracing::error!(error = %e, "Conversion failed");
            }
            ApiError::Internal(detail) => tracing::error!(error = %detail, "Internal error"),
            _ => tracing::warn!(status = status.as_u16(), error = %message, "Request rejected"),
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_client_errors_are_bad_request() {
        let err = ApiError::from(ConversionError::MissingColumns {
            columns: vec!["latitude".to_string()],
        });
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Missing required columns: latitude");
    }

    #[test]
    fn test_model_errors_surface_message() {
        let err = ApiError::from(ConversionError::ModelNotFound {
            path: PathBuf::from("/data/egm2008.tif"),
        });
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("/data/egm2008.tif"));
    }

    #[test]
    fn test_io_errors_are_generic() {
        let err = ApiError::from(ConversionError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk on fire",
        )));
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, GENERIC_ERROR_MESSAGE);
    }
}
