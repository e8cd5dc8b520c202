//! Batch conversion of tabular files.
//!
//! A CSV or XLSX file is read into a [`Table`], each data row is parsed into a
//! point, and the points are converted in bulk. Rows that fail are collected
//! as [`RowError`]s next to the converted rows in a [`BatchOutcome`]; only a
//! file-level problem (unsupported type, unreadable table, missing columns,
//! unusable geoid model) fails the whole batch.

use std::io::{Cursor, Write};
use std::ops::Range;
use std::path::Path;

use calamine::{Data, Reader, Xlsx};
use serde::Serialize;

use crate::converter::Converter;
use crate::error::{ConversionError, Result};
use crate::point::{GeographicPoint, ProjectedPoint};

/// Content type of CSV uploads.
pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// Content type of XLSX uploads.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Number of row errors reported when no row converts.
const MAX_REPORTED_ERRORS: usize = 5;

/// Supported input file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
}

impl FileKind {
    /// Determine the format from a MIME type, ignoring parameters such as
    /// `charset`.
    pub fn from_content_type(content_type: &str) -> Result<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        match essence.as_str() {
            "text/csv" | "application/csv" => Ok(FileKind::Csv),
            XLSX_CONTENT_TYPE => Ok(FileKind::Xlsx),
            _ => Err(ConversionError::UnsupportedFileType {
                content_type: content_type.to_string(),
            }),
        }
    }

    /// Determine the format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" => Ok(FileKind::Xlsx),
            _ => Err(ConversionError::UnsupportedFileType {
                content_type: format!(".{}", extension),
            }),
        }
    }
}

/// Direction of a batch conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// WGS84 + ellipsoidal height → UTM Zone 40S + orthometric height.
    Wgs84ToUtm40s,
    /// UTM Zone 40S + orthometric height → WGS84 + ellipsoidal height.
    Utm40sToWgs84,
}

impl Direction {
    /// Columns that must be present in the input.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            Direction::Wgs84ToUtm40s => &["latitude", "longitude"],
            Direction::Utm40sToWgs84 => &["easting", "northing"],
        }
    }

    /// Optional input height column; absent columns and empty cells mean 0.0.
    pub fn height_column(self) -> &'static str {
        match self {
            Direction::Wgs84ToUtm40s => "ellipsoid_height",
            Direction::Utm40sToWgs84 => "orthometric_height",
        }
    }

    /// File name suggested for the converted output.
    pub fn output_filename(self) -> &'static str {
        match self {
            Direction::Wgs84ToUtm40s => "converted.csv",
            Direction::Utm40sToWgs84 => "utm40s_to_wgs84.csv",
        }
    }
}

/// A table of string cells with a header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Read a table from file contents.
    pub fn read(bytes: &[u8], kind: FileKind) -> Result<Self> {
        match kind {
            FileKind::Csv => read_csv(bytes),
            FileKind::Xlsx => read_xlsx(bytes),
        }
    }

    /// Number of data rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, matched case-insensitively after trimming.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    /// Index of a column that must exist.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| ConversionError::MissingColumns {
                columns: vec![name.to_string()],
            })
    }

    /// Fail with [`ConversionError::MissingColumns`] unless every column is
    /// present.
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<String> = names
            .iter()
            .filter(|name| self.column(name).is_none())
            .map(|name| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConversionError::MissingColumns { columns: missing })
        }
    }
}

fn malformed(reason: impl ToString) -> ConversionError {
    ConversionError::MalformedFile {
        reason: reason.to_string(),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();

    let rows = reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect::<Vec<String>>())
                .map_err(malformed)
        })
        .collect::<Result<Vec<Vec<String>>>>()?;

    Ok(Table { headers, rows })
}

fn read_xlsx(bytes: &[u8]) -> Result<Table> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(malformed)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| malformed("workbook has no worksheets"))?
        .map_err(malformed)?;

    let mut rows = range.rows().map(|row| {
        row.iter()
            .map(|cell| match cell {
                Data::Empty => String::new(),
                other => other.to_string().trim().to_string(),
            })
            .collect::<Vec<String>>()
    });

    let headers = rows.next().unwrap_or_default();
    let rows = rows
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    Ok(Table { headers, rows })
}

/// A data row that could not be converted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    /// 1-based data row number (the header is not counted).
    pub row: usize,
    pub message: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Converted rows and per-row failures of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<R> {
    pub rows: Vec<R>,
    pub errors: Vec<RowError>,
}

impl<R> Default for BatchOutcome<R> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl<R> BatchOutcome<R> {
    /// Append another outcome, e.g. from the next slice of the same table.
    pub fn merge(&mut self, other: BatchOutcome<R>) {
        self.rows.extend(other.rows);
        self.errors.extend(other.errors);
    }

    /// Fail with [`ConversionError::NoValidRows`] when nothing converted.
    pub fn ensure_rows(self) -> Result<Self> {
        if self.rows.is_empty() {
            return Err(ConversionError::NoValidRows {
                errors: self
                    .errors
                    .iter()
                    .take(MAX_REPORTED_ERRORS)
                    .map(RowError::to_string)
                    .collect(),
            });
        }
        Ok(self)
    }
}

/// Output row of a WGS84 → UTM Zone 40S batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtmRow {
    pub latitude: f64,
    pub longitude: f64,
    pub ellipsoid_height: f64,
    pub easting: f64,
    pub northing: f64,
    pub orthometric_height: f64,
    pub geoid_separation: f64,
}

/// Output row of a UTM Zone 40S → WGS84 batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Wgs84Row {
    pub easting: f64,
    pub northing: f64,
    pub orthometric_height: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub ellipsoid_height: f64,
    pub geoid_separation: f64,
}

fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Parse a required numeric cell.
fn required_number(row: &[String], index: usize, column: &str) -> Result<f64> {
    let value = cell(row, index);
    if value.is_empty() {
        return Err(ConversionError::invalid_coordinate(format!(
            "Missing value in column '{}'",
            column
        )));
    }
    parse_number(value, column)
}

/// Parse an optional numeric cell, defaulting to 0.0.
fn optional_number(row: &[String], index: Option<usize>, column: &str) -> Result<f64> {
    match index.map(|i| cell(row, i)) {
        Some(value) if !value.is_empty() => parse_number(value, column),
        _ => Ok(0.0),
    }
}

fn parse_number(value: &str, column: &str) -> Result<f64> {
    value.parse::<f64>().map_err(|_| {
        ConversionError::invalid_coordinate(format!(
            "Invalid number '{}' in column '{}'",
            value, column
        ))
    })
}

/// Parse rows, convert the valid ones in one bulk call and split the results
/// into rows and row errors. Row numbers are `first_row + index + 1`.
fn fold<P, R>(
    parsed: Vec<Result<P>>,
    first_row: usize,
    convert: impl FnOnce(&[P]) -> Result<Vec<Result<R>>>,
) -> Result<BatchOutcome<R>> {
    let mut outcome = BatchOutcome::default();
    let mut points = Vec::with_capacity(parsed.len());
    let mut point_rows = Vec::with_capacity(parsed.len());

    for (index, result) in parsed.into_iter().enumerate() {
        let row = first_row + index + 1;
        match result {
            Ok(point) => {
                points.push(point);
                point_rows.push(row);
            }
            Err(e) => outcome.errors.push(RowError {
                row,
                message: e.to_string(),
            }),
        }
    }

    for (row, result) in point_rows.into_iter().zip(convert(&points)?) {
        match result {
            Ok(converted) => outcome.rows.push(converted),
            Err(e) => outcome.errors.push(RowError {
                row,
                message: e.to_string(),
            }),
        }
    }

    outcome.errors.sort_by_key(|e| e.row);
    for error in &outcome.errors {
        tracing::warn!(row = error.row, error = %error.message, "Batch row failed");
    }

    Ok(outcome)
}

fn clamp_range(rows: Range<usize>, len: usize) -> Range<usize> {
    let end = rows.end.min(len);
    rows.start.min(end)..end
}

/// Convert the given rows of a table with `latitude`, `longitude` and an
/// optional `ellipsoid_height` column.
pub fn convert_to_utm_rows(
    converter: &Converter,
    table: &Table,
    rows: Range<usize>,
) -> Result<BatchOutcome<UtmRow>> {
    let direction = Direction::Wgs84ToUtm40s;
    table.require_columns(direction.required_columns())?;
    let lat_idx = table.require_column("latitude")?;
    let lon_idx = table.require_column("longitude")?;
    let height_idx = table.column(direction.height_column());

    let rows = clamp_range(rows, table.len());
    let first_row = rows.start;
    let parsed = table.rows[rows]
        .iter()
        .map(|row| {
            let lat = required_number(row, lat_idx, "latitude")?;
            let lon = required_number(row, lon_idx, "longitude")?;
            let height = optional_number(row, height_idx, direction.height_column())?;
            GeographicPoint::new(lat, lon, Some(height))
        })
        .collect();

    fold(parsed, first_row, |points| {
        Ok(converter
            .wgs84_to_utm40s_bulk(points)?
            .into_iter()
            .zip(points)
            .map(|(result, point)| {
                result.map(|c| UtmRow {
                    latitude: point.lat,
                    longitude: point.lon,
                    ellipsoid_height: point.height.unwrap_or(0.0),
                    easting: c.easting,
                    northing: c.northing,
                    orthometric_height: c.orthometric_height,
                    geoid_separation: c.geoid_separation,
                })
            })
            .collect())
    })
}

/// Convert the given rows of a table with `easting`, `northing` and an
/// optional `orthometric_height` column.
pub fn convert_to_wgs84_rows(
    converter: &Converter,
    table: &Table,
    rows: Range<usize>,
) -> Result<BatchOutcome<Wgs84Row>> {
    let direction = Direction::Utm40sToWgs84;
    table.require_columns(direction.required_columns())?;
    let east_idx = table.require_column("easting")?;
    let north_idx = table.require_column("northing")?;
    let height_idx = table.column(direction.height_column());

    let rows = clamp_range(rows, table.len());
    let first_row = rows.start;
    let parsed = table.rows[rows]
        .iter()
        .map(|row| {
            let easting = required_number(row, east_idx, "easting")?;
            let northing = required_number(row, north_idx, "northing")?;
            let height = optional_number(row, height_idx, direction.height_column())?;
            ProjectedPoint::new(easting, northing, Some(height))
        })
        .collect();

    fold(parsed, first_row, |points| {
        Ok(converter
            .utm40s_to_wgs84_bulk(points)?
            .into_iter()
            .zip(points)
            .map(|(result, point)| {
                result.map(|c| Wgs84Row {
                    easting: point.easting,
                    northing: point.northing,
                    orthometric_height: point.height.unwrap_or(0.0),
                    latitude: c.latitude,
                    longitude: c.longitude,
                    ellipsoid_height: c.ellipsoid_height,
                    geoid_separation: c.geoid_separation,
                })
            })
            .collect())
    })
}

/// Convert every row of a WGS84 table.
pub fn convert_to_utm(converter: &Converter, table: &Table) -> Result<BatchOutcome<UtmRow>> {
    convert_to_utm_rows(converter, table, 0..table.len())
}

/// Convert every row of a UTM Zone 40S table.
pub fn convert_to_wgs84(converter: &Converter, table: &Table) -> Result<BatchOutcome<Wgs84Row>> {
    convert_to_wgs84_rows(converter, table, 0..table.len())
}

/// Serialize rows as CSV with a header line.
pub fn write_csv<R: Serialize, W: Write>(rows: &[R], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row).map_err(std::io::Error::from)?;
    }
    writer.flush()?;
    Ok(())
}

/// CSV output of a converted file.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub csv: Vec<u8>,
    pub rows: usize,
    pub errors: Vec<RowError>,
}

/// Convert a whole uploaded file: check its type, read it, convert all rows
/// and serialize the successful ones.
///
/// # Errors
///
/// Fails with [`ConversionError::NoValidRows`] if no row converts, and with
/// the file-level errors of [`Table::read`] and [`Table::require_columns`].
pub fn convert_file(
    converter: &Converter,
    bytes: &[u8],
    content_type: &str,
    direction: Direction,
) -> Result<ConvertedFile> {
    let kind = FileKind::from_content_type(content_type)?;
    let table = Table::read(bytes, kind)?;

    tracing::info!(rows = table.len(), ?kind, ?direction, "Processing batch file");

    let mut csv = Vec::new();
    let (rows, errors) = match direction {
        Direction::Wgs84ToUtm40s => {
            let outcome = convert_to_utm(converter, &table)?.ensure_rows()?;
            write_csv(&outcome.rows, &mut csv)?;
            (outcome.rows.len(), outcome.errors)
        }
        Direction::Utm40sToWgs84 => {
            let outcome = convert_to_wgs84(converter, &table)?.ensure_rows()?;
            write_csv(&outcome.rows, &mut csv)?;
            (outcome.rows.len(), outcome.errors)
        }
    };

    tracing::info!(converted = rows, failed = errors.len(), "Batch conversion complete");

    Ok(ConvertedFile { csv, rows, errors })
}
