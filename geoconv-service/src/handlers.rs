//! HTTP request handlers for the conversion service.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Multipart, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use geoconv::batch::{self, Direction, CSV_CONTENT_TYPE};
use geoconv::projection::TransformationInfo;
use geoconv::{transformation_info, GeographicPoint, ProjectedPoint};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::AppState;

/// Header carrying the request processing time in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

const API_NAME: &str = "Geospatial Coordinate Conversion API";
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WGS84 point with optional ellipsoidal height.
#[derive(Debug, Deserialize, ToSchema)]
pub struct Wgs84Request {
    /// Latitude in decimal degrees (-90 to 90).
    #[schema(example = -20.16)]
    pub latitude: f64,
    /// Longitude in decimal degrees (-180 to 180).
    #[schema(example = 57.5)]
    pub longitude: f64,
    /// Height above the WGS84 ellipsoid in meters. Defaults to 0.
    #[serde(default)]
    #[schema(example = 85.0)]
    pub ellipsoid_height: Option<f64>,
}

/// UTM Zone 40S point with orthometric height.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Utm40sResponse {
    /// Easting in meters.
    pub easting: f64,
    /// Northing in meters.
    pub northing: f64,
    /// Height above the geoid in meters.
    pub orthometric_height: f64,
    /// Geoid separation used for the conversion, in meters.
    pub geoid_separation: Option<f64>,
}

/// UTM Zone 40S point with optional orthometric height.
#[derive(Debug, Deserialize, ToSchema)]
pub struct Utm40sRequest {
    /// Easting in meters.
    #[schema(example = 552_300.0)]
    pub easting: f64,
    /// Northing in meters.
    #[schema(example = 7_770_000.0)]
    pub northing: f64,
    /// Height above the geoid in meters. Defaults to 0.
    #[serde(default)]
    #[schema(example = 60.0)]
    pub orthometric_height: Option<f64>,
}

/// WGS84 point with ellipsoidal height.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Wgs84Response {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Height above the WGS84 ellipsoid in meters.
    pub ellipsoid_height: f64,
    /// Geoid separation used for the conversion, in meters.
    pub geoid_separation: Option<f64>,
}

/// Multipart form of the upload endpoints.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    /// CSV or XLSX file.
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
}

/// Welcome response.
#[derive(Debug, Serialize, ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub status: String,
    pub documentation: String,
    pub health_check: String,
}

/// Status of individual service components.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthComponents {
    pub api: String,
    pub geoid_model: String,
    pub coordinate_transformations: String,
}

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` when the geoid model is usable, `degraded` otherwise.
    pub status: String,
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub components: HealthComponents,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

/// API identification.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiDescription {
    pub name: String,
    pub version: String,
    pub status: String,
}

/// Availability of height conversions.
#[derive(Debug, Serialize, ToSchema)]
pub struct HeightCapabilities {
    pub ellipsoidal_to_orthometric: bool,
    pub orthometric_to_ellipsoidal: bool,
}

/// Limits of the upload endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchCapabilities {
    pub csv_upload: bool,
    pub excel_upload: bool,
    pub max_file_size_mb: u64,
}

/// Service capabilities.
#[derive(Debug, Serialize, ToSchema)]
pub struct Capabilities {
    #[schema(value_type = Object)]
    pub coordinate_transformations: TransformationInfo,
    pub height_conversions: HeightCapabilities,
    pub batch_processing: BatchCapabilities,
}

/// Endpoint listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct Endpoints {
    pub single_conversion: Vec<String>,
    pub batch_conversion: Vec<String>,
    pub utility: Vec<String>,
}

/// API information response.
#[derive(Debug, Serialize, ToSchema)]
pub struct InfoResponse {
    pub api: ApiDescription,
    pub capabilities: Capabilities,
    /// Geoid model report, or `{"error": ...}` when the model is unusable.
    #[schema(value_type = Object)]
    pub geoid_model: serde_json::Value,
    pub endpoints: Endpoints,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Convert WGS84 coordinates to UTM Zone 40S.
///
/// The ellipsoidal height is converted to an orthometric height with the
/// configured geoid model.
#[utoipa::path(
    post,
    path = "/convert/wgs84-to-utm40s",
    request_body = Wgs84Request,
    responses(
        (status = 200, description = "Converted point", body = Utm40sResponse),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 500, description = "Geoid model or transformation failure", body = ErrorResponse)
    ),
    tag = "conversion"
)]
pub async fn wgs84_to_utm40s(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Wgs84Request>,
) -> Result<Json<Utm40sResponse>, ApiError> {
    tracing::debug!(
        lat = request.latitude,
        lon = request.longitude,
        height = ?request.ellipsoid_height,
        "WGS84 -> UTM40S request"
    );

    let point = GeographicPoint::new(
        request.latitude,
        request.longitude,
        request.ellipsoid_height,
    )?;
    let result = state.converter.wgs84_to_utm40s(&point)?;

    Ok(Json(Utm40sResponse {
        easting: result.easting,
        northing: result.northing,
        orthometric_height: result.orthometric_height,
        geoid_separation: Some(result.geoid_separation),
    }))
}

/// Convert UTM Zone 40S coordinates to WGS84.
///
/// The orthometric height is converted to an ellipsoidal height with the
/// configured geoid model.
#[utoipa::path(
    post,
    path = "/convert/utm40s-to-wgs84",
    request_body = Utm40sRequest,
    responses(
        (status = 200, description = "Converted point", body = Wgs84Response),
        (status = 400, description = "Invalid coordinates", body = ErrorResponse),
        (status = 500, description = "Geoid model or transformation failure", body = ErrorResponse)
    ),
    tag = "conversion"
)]
pub async fn utm40s_to_wgs84(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Utm40sRequest>,
) -> Result<Json<Wgs84Response>, ApiError> {
    tracing::debug!(
        easting = request.easting,
        northing = request.northing,
        height = ?request.orthometric_height,
        "UTM40S -> WGS84 request"
    );

    let point = ProjectedPoint::new(
        request.easting,
        request.northing,
        request.orthometric_height,
    )?;
    let result = state.converter.utm40s_to_wgs84(&point)?;

    Ok(Json(Wgs84Response {
        latitude: result.latitude,
        longitude: result.longitude,
        ellipsoid_height: result.ellipsoid_height,
        geoid_separation: Some(result.geoid_separation),
    }))
}

/// Convert an uploaded WGS84 table to UTM Zone 40S.
///
/// Columns `latitude` and `longitude` are required; `ellipsoid_height` is
/// optional. Rows that fail are skipped and logged.
#[utoipa::path(
    post,
    path = "/upload/wgs84-to-utm40s",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted CSV attachment", body = String, content_type = "text/csv"),
        (status = 400, description = "Unsupported, malformed or unconvertible file", body = ErrorResponse),
        (status = 500, description = "Geoid model or transformation failure", body = ErrorResponse)
    ),
    tag = "batch"
)]
pub async fn upload_wgs84_to_utm40s(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    upload(state, multipart, Direction::Wgs84ToUtm40s).await
}

/// Convert an uploaded UTM Zone 40S table to WGS84.
///
/// Columns `easting` and `northing` are required; `orthometric_height` is
/// optional. Rows that fail are skipped and logged.
#[utoipa::path(
    post,
    path = "/upload/utm40s-to-wgs84",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Converted CSV attachment", body = String, content_type = "text/csv"),
        (status = 400, description = "Unsupported, malformed or unconvertible file", body = ErrorResponse),
        (status = 500, description = "Geoid model or transformation failure", body = ErrorResponse)
    ),
    tag = "batch"
)]
pub async fn upload_utm40s_to_wgs84(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    upload(state, multipart, Direction::Utm40sToWgs84).await
}

async fn upload(
    state: Arc<AppState>,
    mut multipart: Multipart,
    direction: Direction,
) -> Result<Response, ApiError> {
    let mut file: Option<(Vec<u8>, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
        file = Some((bytes.to_vec(), content_type));
    }

    let (bytes, content_type) =
        file.ok_or_else(|| ApiError::BadRequest("Missing 'file' field".to_string()))?;

    tracing::info!(
        size = bytes.len(),
        content_type = %content_type,
        ?direction,
        "Batch upload received"
    );

    let converter = state.converter.clone();
    let converted = tokio::task::spawn_blocking(move || {
        batch::convert_file(&converter, &bytes, &content_type, direction)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Batch task failed: {}", e)))??;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, CSV_CONTENT_TYPE)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", direction.output_filename()),
        )
        .body(Body::from(converted.csv))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Health check endpoint.
///
/// Reports `degraded` when the geoid model cannot be read.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service health", body = HealthResponse)),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (geoid_model, warnings) = match state.converter.model_info() {
        Ok(_) => ("available", None),
        Err(e) => {
            tracing::error!(error = %e, "Geoid model health check failed");
            ("unavailable", Some(vec![format!("Geoid model issue: {}", e)]))
        }
    };

    let status = match warnings {
        None => "healthy",
        Some(_) => "degraded",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        version: VERSION.to_string(),
        components: HealthComponents {
            api: "operational".to_string(),
            geoid_model: geoid_model.to_string(),
            coordinate_transformations: "operational".to_string(),
        },
        warnings,
    })
}

/// Detailed API capabilities and configuration.
#[utoipa::path(
    get,
    path = "/info",
    responses((status = 200, description = "API information", body = InfoResponse)),
    tag = "system"
)]
pub async fn api_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let (geoid_model, geoid_available) = match state.converter.model_info() {
        Ok(info) => match serde_json::to_value(&info) {
            Ok(value) => (value, true),
            Err(e) => (serde_json::json!({ "error": e.to_string() }), true),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Geoid model not available");
            (
                serde_json::json!({ "error": "Geoid model not available" }),
                false,
            )
        }
    };

    Json(InfoResponse {
        api: ApiDescription {
            name: API_NAME.to_string(),
            version: VERSION.to_string(),
            status: "operational".to_string(),
        },
        capabilities: Capabilities {
            coordinate_transformations: transformation_info(),
            height_conversions: HeightCapabilities {
                ellipsoidal_to_orthometric: geoid_available,
                orthometric_to_ellipsoidal: geoid_available,
            },
            batch_processing: BatchCapabilities {
                csv_upload: true,
                excel_upload: true,
                max_file_size_mb: state.max_upload_mb,
            },
        },
        geoid_model,
        endpoints: Endpoints {
            single_conversion: strings(&["/convert/wgs84-to-utm40s", "/convert/utm40s-to-wgs84"]),
            batch_conversion: strings(&["/upload/wgs84-to-utm40s", "/upload/utm40s-to-wgs84"]),
            utility: strings(&["/health", "/info", "/docs"]),
        },
    })
}

/// Welcome endpoint.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome message", body = RootResponse)),
    tag = "system"
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Welcome to the Geospatial Coordinate Converter API!".to_string(),
        version: VERSION.to_string(),
        status: "operational".to_string(),
        documentation: "/docs".to_string(),
        health_check: "/health".to_string(),
    })
}

/// Middleware adding the processing time to every response.
pub async fn process_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;

    let elapsed = format!("{:.4}", start.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }

    response
}
