//! Integration tests for the HTTP API.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use geoconv::geoid::{Bounds, Resolution};
use geoconv::{
    ConversionError, ConverterBuilder, GeoidModelInfo, GeoidSampler, Resampling,
    TiffGeoidSampler,
};
use geoconv_service::{app, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;

const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Geoid sampler returning a constant separation everywhere.
struct ConstantGeoid {
    separation: f64,
    path: PathBuf,
}

impl GeoidSampler for ConstantGeoid {
    fn sample(&self, lat: f64, lon: f64) -> geoconv::Result<f64> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ConversionError::InvalidCoordinate {
                message: format!("({}, {}) out of range", lat, lon),
            });
        }
        Ok(self.separation)
    }

    fn sample_bulk(&self, coords: &[(f64, f64)]) -> geoconv::Result<Vec<geoconv::Result<f64>>> {
        Ok(coords
            .iter()
            .map(|&(lat, lon)| self.sample(lat, lon))
            .collect())
    }

    fn model_info(&self) -> geoconv::Result<GeoidModelInfo> {
        Ok(GeoidModelInfo {
            file_path: self.path.display().to_string(),
            file_size_mb: 0.0,
            width: 360,
            height: 180,
            bands: 1,
            bounds: Bounds {
                west: -180.0,
                east: 180.0,
                south: -90.0,
                north: 90.0,
            },
            resolution: Resolution { x: 1.0, y: 1.0 },
            crs: Some("EPSG:4326".to_string()),
            dtype: "float32".to_string(),
            nodata: None,
            valid: true,
            sample_value: Some(self.separation),
        })
    }

    fn model_path(&self) -> &Path {
        &self.path
    }
}

/// Server whose geoid separation is -30 m everywhere.
fn create_test_server() -> TestServer {
    let sampler = Arc::new(ConstantGeoid {
        separation: -30.0,
        path: PathBuf::from("constant.tif"),
    });
    let converter = ConverterBuilder::new("constant.tif")
        .sampler(sampler)
        .build()
        .unwrap();

    TestServer::new(app(Arc::new(AppState::new(converter)))).unwrap()
}

/// Server configured with a geoid model path that does not exist.
fn create_server_without_model(temp_dir: &TempDir) -> TestServer {
    let sampler = Arc::new(TiffGeoidSampler::new(
        temp_dir.path().join("missing.tif"),
        Resampling::Nearest,
    ));
    let converter = ConverterBuilder::new(temp_dir.path().join("missing.tif"))
        .sampler(sampler)
        .build()
        .unwrap();

    TestServer::new(app(Arc::new(AppState::new(converter)))).unwrap()
}

/// Single-sheet workbook with a text header row and numeric data rows.
/// `None` leaves the cell empty.
fn xlsx_workbook(headers: &[&str], rows: &[Vec<Option<f64>>]) -> Vec<u8> {
    use std::io::Write;

    let column = |c: usize| (b'A' + c as u8) as char;
    let mut sheet = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1">"#,
    );
    for (c, header) in headers.iter().enumerate() {
        sheet.push_str(&format!(
            r#"<c r="{}1" t="inlineStr"><is><t>{}</t></is></c>"#,
            column(c),
            header
        ));
    }
    sheet.push_str("</row>");
    for (r, row) in rows.iter().enumerate() {
        sheet.push_str(&format!(r#"<row r="{}">"#, r + 2));
        for (c, value) in row.iter().enumerate() {
            if let Some(value) = value {
                sheet.push_str(&format!(r#"<c r="{}{}"><v>{}</v></c>"#, column(c), r + 2, value));
            }
        }
        sheet.push_str("</row>");
    }
    sheet.push_str("</sheetData></worksheet>");

    let parts = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
        ),
        (
            "_rels/.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#.to_string(),
        ),
        (
            "xl/workbook.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Points" sheetId="1" r:id="rId1"/></sheets></workbook>"#.to_string(),
        ),
        (
            "xl/_rels/workbook.xml.rels",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/></Relationships>"#.to_string(),
        ),
        ("xl/worksheets/sheet1.xml", sheet),
    ];

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, contents) in parts {
        zip.start_file(name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn csv_form(contents: &str) -> MultipartForm {
    MultipartForm::new().add_part(
        "file",
        Part::bytes(contents.as_bytes().to_vec())
            .file_name("points.csv")
            .mime_type("text/csv"),
    )
}

#[tokio::test]
async fn test_root() {
    let server = create_test_server();

    let response = server.get("/").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "operational");
    assert_eq!(json["documentation"], "/docs");
    assert_eq!(json["health_check"], "/health");
}

#[tokio::test]
async fn test_health_healthy() {
    let server = create_test_server();

    let response = server.get("/health").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["components"]["geoid_model"], "available");
    assert!(json.get("warnings").is_none());
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_health_degraded_without_model() {
    let temp_dir = TempDir::new().unwrap();
    let server = create_server_without_model(&temp_dir);

    let response = server.get("/health").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["components"]["geoid_model"], "unavailable");
    assert!(json["warnings"][0]
        .as_str()
        .unwrap()
        .contains("Geoid model file not found"));
}

#[tokio::test]
async fn test_info() {
    let server = create_test_server();

    let response = server.get("/info").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(
        json["capabilities"]["coordinate_transformations"]["target_crs"]["epsg"],
        32740
    );
    assert_eq!(
        json["capabilities"]["height_conversions"]["ellipsoidal_to_orthometric"],
        true
    );
    assert_eq!(json["capabilities"]["batch_processing"]["max_file_size_mb"], 10);
    assert_eq!(json["geoid_model"]["dtype"], "float32");
    assert_eq!(json["endpoints"]["utility"][2], "/docs");
}

#[tokio::test]
async fn test_info_without_model() {
    let temp_dir = TempDir::new().unwrap();
    let server = create_server_without_model(&temp_dir);

    let response = server.get("/info").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert_eq!(json["geoid_model"]["error"], "Geoid model not available");
    assert_eq!(
        json["capabilities"]["height_conversions"]["orthometric_to_ellipsoidal"],
        false
    );
}

#[tokio::test]
async fn test_wgs84_to_utm40s() {
    let server = create_test_server();

    let response = server
        .post("/convert/wgs84-to-utm40s")
        .json(&json!({"latitude": 24.8607, "longitude": 67.0011, "ellipsoid_height": 85.0}))
        .await;
    response.assert_status_ok();

    let json: Value = response.json();
    let easting = json["easting"].as_f64().unwrap();
    let northing = json["northing"].as_f64().unwrap();
    assert!(easting > 1_400_000.0 && easting < 1_600_000.0, "easting = {}", easting);
    assert!(northing > 12_700_000.0 && northing < 12_900_000.0, "northing = {}", northing);
    assert_eq!(json["orthometric_height"], 115.0);
    assert_eq!(json["geoid_separation"], -30.0);
}

#[tokio::test]
async fn test_wgs84_to_utm40s_default_height() {
    let server = create_test_server();

    let response = server
        .post("/convert/wgs84-to-utm40s")
        .json(&json!({"latitude": -20.0, "longitude": 57.0}))
        .await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert!((json["easting"].as_f64().unwrap() - 500_000.0).abs() < 0.01);
    assert_eq!(json["orthometric_height"], 30.0);
}

#[tokio::test]
async fn test_wgs84_to_utm40s_invalid_latitude() {
    let server = create_test_server();

    let response = server
        .post("/convert/wgs84-to-utm40s")
        .json(&json!({"latitude": 95.0, "longitude": 57.0}))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("Latitude 95"));
}

#[tokio::test]
async fn test_convert_malformed_json() {
    let server = create_test_server();

    let response = server
        .post("/convert/wgs84-to-utm40s")
        .json(&json!({"latitude": "north"}))
        .await;
    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_utm40s_to_wgs84_roundtrip() {
    let server = create_test_server();

    let forward: Value = server
        .post("/convert/wgs84-to-utm40s")
        .json(&json!({"latitude": -20.16, "longitude": 57.5, "ellipsoid_height": 85.0}))
        .await
        .json();

    let response = server
        .post("/convert/utm40s-to-wgs84")
        .json(&json!({
            "easting": forward["easting"],
            "northing": forward["northing"],
            "orthometric_height": forward["orthometric_height"],
        }))
        .await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert!((json["latitude"].as_f64().unwrap() + 20.16).abs() < 1e-6);
    assert!((json["longitude"].as_f64().unwrap() - 57.5).abs() < 1e-6);
    assert!((json["ellipsoid_height"].as_f64().unwrap() - 85.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_missing_model_is_server_error() {
    let temp_dir = TempDir::new().unwrap();
    let server = create_server_without_model(&temp_dir);

    let response = server
        .post("/convert/utm40s-to-wgs84")
        .json(&json!({"easting": 500000.0, "northing": 7800000.0}))
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    let json: Value = response.json();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Geoid model file not found"));
}

#[tokio::test]
async fn test_process_time_header() {
    let server = create_test_server();

    let response = server.get("/health").await;
    let value = response.header("x-process-time");
    let seconds: f64 = value.to_str().unwrap().parse().unwrap();
    assert!(seconds >= 0.0);
}

#[tokio::test]
async fn test_upload_wgs84_skips_bad_row() {
    let server = create_test_server();

    let csv = "latitude,longitude,ellipsoid_height\n\
               -20.1,57.1,10\n\
               -20.2,57.2,20\n\
               95.0,57.3,30\n\
               -20.4,57.4,40\n\
               -20.5,57.5,50\n";

    let response = server
        .post("/upload/wgs84-to-utm40s")
        .multipart(csv_form(csv))
        .await;
    response.assert_status_ok();

    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=converted.csv"
    );

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(
        lines[0],
        "latitude,longitude,ellipsoid_height,easting,northing,orthometric_height,geoid_separation"
    );
    assert!(lines[1].starts_with("-20.1,57.1,10.0,"));
    assert!(lines[1].ends_with(",40.0,-30.0"));
    assert!(lines.iter().all(|line| !line.starts_with("95")));
}

#[tokio::test]
async fn test_upload_utm40s_to_wgs84() {
    let server = create_test_server();

    let csv = "easting,northing,orthometric_height\n500000,7787000,100\n500000,7787000,\n";

    let response = server
        .post("/upload/utm40s-to-wgs84")
        .multipart(csv_form(csv))
        .await;
    response.assert_status_ok();

    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=utm40s_to_wgs84.csv"
    );

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with(",70.0,-30.0"));
    assert!(lines[2].ends_with(",-30.0,-30.0"));
}

#[tokio::test]
async fn test_upload_missing_columns() {
    let server = create_test_server();

    let response = server
        .post("/upload/wgs84-to-utm40s")
        .multipart(csv_form("lat,lon\n-20,57\n"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let json: Value = response.json();
    assert_eq!(
        json["error"],
        "Missing required columns: latitude, longitude"
    );
}

#[tokio::test]
async fn test_upload_unsupported_type() {
    let server = create_test_server();

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"{}".to_vec())
            .file_name("points.json")
            .mime_type("application/json"),
    );
    let response = server.post("/upload/wgs84-to-utm40s").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let json: Value = response.json();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported file type"));
}

#[tokio::test]
async fn test_upload_xlsx_wgs84_to_utm40s() {
    let server = create_test_server();

    let workbook = xlsx_workbook(
        &["latitude", "longitude", "ellipsoid_height"],
        &[
            vec![Some(-20.1), Some(57.1), Some(10.0)],
            vec![Some(-20.2), Some(57.2), None],
            vec![Some(95.0), Some(57.3), Some(30.0)],
        ],
    );
    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(workbook)
            .file_name("points.xlsx")
            .mime_type(XLSX),
    );

    let response = server.post("/upload/wgs84-to-utm40s").multipart(form).await;
    response.assert_status_ok();

    let text = response.text();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("-20.1,57.1,10.0,"));
    assert!(lines[1].ends_with(",40.0,-30.0"));
    assert!(lines[2].starts_with("-20.2,57.2,0.0,"));
    assert!(lines[2].ends_with(",30.0,-30.0"));
}

#[tokio::test]
async fn test_upload_malformed_xlsx() {
    let server = create_test_server();

    let form = MultipartForm::new().add_part(
        "file",
        Part::bytes(b"not really a workbook".to_vec())
            .file_name("points.xlsx")
            .mime_type(XLSX),
    );
    let response = server.post("/upload/wgs84-to-utm40s").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let json: Value = response.json();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Error reading file"));
}

#[tokio::test]
async fn test_upload_no_valid_rows() {
    let server = create_test_server();

    let response = server
        .post("/upload/wgs84-to-utm40s")
        .multipart(csv_form("latitude,longitude\n95,57\nabc,57\n"))
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let json: Value = response.json();
    let error = json["error"].as_str().unwrap();
    assert!(error.contains("Row 1:"));
    assert!(error.contains("Row 2:"));
}

#[tokio::test]
async fn test_upload_missing_file_field() {
    let server = create_test_server();

    let form = MultipartForm::new().add_text("note", "no file here");
    let response = server.post("/upload/wgs84-to-utm40s").multipart(form).await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document() {
    let server = create_test_server();

    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();

    let json: Value = response.json();
    assert!(json["paths"]["/convert/wgs84-to-utm40s"].is_object());
    assert!(json["paths"]["/upload/utm40s-to-wgs84"].is_object());
}
