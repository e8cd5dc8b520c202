//! geoconv Service - HTTP microservice for coordinate and height conversion.
//!
//! Converts between WGS84 and UTM Zone 40S, and between ellipsoidal and
//! orthometric heights using a geoid model such as EGM2008.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `GEOID_PATH` | Path to the geoid GeoTIFF | `egm2008.tif` (with a warning) |
//! | `GEOID_RESAMPLING` | `nearest` or `bilinear` | `nearest` |
//! | `GEOCONV_PORT` | HTTP server port | 8000 |
//! | `GEOCONV_MAX_UPLOAD_MB` | Upload body limit in megabytes | 10 |
//! | `RUST_LOG` | Log level (e.g., "info", "debug") | "info" |
//!
//! ## Endpoints
//!
//! - `POST /convert/wgs84-to-utm40s` - Single point WGS84 → UTM Zone 40S
//! - `POST /convert/utm40s-to-wgs84` - Single point UTM Zone 40S → WGS84
//! - `POST /upload/wgs84-to-utm40s` - CSV/XLSX batch WGS84 → UTM Zone 40S
//! - `POST /upload/utm40s-to-wgs84` - CSV/XLSX batch UTM Zone 40S → WGS84
//! - `GET /health` - Health check
//! - `GET /info` - API capabilities and geoid model report
//! - `GET /docs` - OpenAPI documentation (Swagger UI)

use std::net::SocketAddr;
use std::sync::Arc;

use geoconv::ConverterBuilder;
use geoconv_service::{app, AppState, DEFAULT_MAX_UPLOAD_MB};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_GEOID_PATH: &str = "egm2008.tif";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoconv_service=info,geoconv=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Service-specific config
    let port: u16 = std::env::var("GEOCONV_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8000);
    let max_upload_mb: u64 = std::env::var("GEOCONV_MAX_UPLOAD_MB")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_UPLOAD_MB);

    // The library handles GEOID_PATH and GEOID_RESAMPLING
    let converter = match ConverterBuilder::from_env() {
        Ok(builder) => builder.build()?,
        Err(_) => {
            tracing::warn!("GEOID_PATH not set, using {}", DEFAULT_GEOID_PATH);
            ConverterBuilder::new(DEFAULT_GEOID_PATH).build()?
        }
    };

    tracing::info!(
        geoid_path = %converter.model_path().display(),
        port = port,
        max_upload_mb = max_upload_mb,
        "Starting geoconv service"
    );

    match converter.model_info() {
        Ok(info) => tracing::info!(
            path = %info.file_path,
            width = info.width,
            height = info.height,
            "Geoid model validated"
        ),
        Err(e) => {
            tracing::error!(error = %e, "Geoid model validation failed");
            tracing::warn!("Service will start but height conversions may fail");
        }
    }

    let state = Arc::new(AppState {
        converter,
        max_upload_mb,
    });
    let router = app(state.clone());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.converter.clear_cache();
    tracing::info!("Cleared geoid model cache");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down geoconv service");
}
