//! geoconv Service Library
//!
//! HTTP handlers, routing and error mapping for the coordinate conversion
//! service. This library is used by both the geoconv-service binary and
//! integration tests.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use geoconv::Converter;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Default upload body limit in megabytes.
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 10;

/// Application state shared across handlers.
pub struct AppState {
    /// Conversion pipeline.
    pub converter: Converter,
    /// Upload body limit in megabytes.
    pub max_upload_mb: u64,
}

impl AppState {
    pub fn new(converter: Converter) -> Self {
        Self {
            converter,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

/// OpenAPI documentation for the conversion service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Geospatial Coordinate Conversion API",
        version = "0.1.0",
        description = "WGS84 ↔ UTM Zone 40S coordinate conversion with ellipsoidal ↔ orthometric height conversion using a geoid model.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        handlers::wgs84_to_utm40s,
        handlers::utm40s_to_wgs84,
        handlers::upload_wgs84_to_utm40s,
        handlers::upload_utm40s_to_wgs84,
        handlers::health_check,
        handlers::api_info,
        handlers::root,
    ),
    components(
        schemas(
            handlers::Wgs84Request,
            handlers::Utm40sResponse,
            handlers::Utm40sRequest,
            handlers::Wgs84Response,
            handlers::UploadForm,
            handlers::ErrorResponse,
            handlers::RootResponse,
            handlers::HealthResponse,
            handlers::InfoResponse,
        )
    ),
    tags(
        (name = "conversion", description = "Single point conversion endpoints"),
        (name = "batch", description = "File upload conversion endpoints"),
        (name = "system", description = "System and health endpoints")
    )
)]
pub struct ApiDoc;

/// Build the application router with documentation and middleware.
pub fn app(state: Arc<AppState>) -> Router {
    let body_limit = (state.max_upload_mb * 1024 * 1024) as usize;

    Router::new()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/info", get(handlers::api_info))
        .route("/convert/wgs84-to-utm40s", post(handlers::wgs84_to_utm40s))
        .route("/convert/utm40s-to-wgs84", post(handlers::utm40s_to_wgs84))
        .route(
            "/upload/wgs84-to-utm40s",
            post(handlers::upload_wgs84_to_utm40s),
        )
        .route(
            "/upload/utm40s-to-wgs84",
            post(handlers::upload_utm40s_to_wgs84),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods([Method::GET, Method::POST])
                        .allow_headers(Any)
                        .expose_headers([header::CONTENT_DISPOSITION]),
                )
                .layer(middleware::from_fn(handlers::process_time))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

// Re-export commonly used types for convenience
pub use error::ApiError;
pub use handlers::{
    ErrorResponse, HealthResponse, InfoResponse, Utm40sRequest, Utm40sResponse, Wgs84Request,
    Wgs84Response,
};
