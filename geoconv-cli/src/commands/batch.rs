use anyhow::{Context, Result};
use geoconv::batch::{convert_to_utm_rows, convert_to_wgs84_rows, write_csv};
use geoconv::{BatchOutcome, Converter, Direction, FileKind, Resampling, RowError, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::ops::Range;
use std::path::{Path, PathBuf};

use super::build_converter;
use crate::BatchDirection;

/// Rows converted per bulk call.
const CHUNK_SIZE: usize = 1000;

pub fn run(
    geoid_path: Option<PathBuf>,
    resampling: Resampling,
    input: PathBuf,
    output: Option<PathBuf>,
    direction: BatchDirection,
) -> Result<()> {
    let kind = FileKind::from_path(&input)?;
    let bytes = std::fs::read(&input).context("Failed to open input file")?;
    let table = Table::read(&bytes, kind).context("Failed to read input file")?;

    let required = match direction {
        BatchDirection::ToUtm => Direction::Wgs84ToUtm40s,
        BatchDirection::ToWgs84 => Direction::Utm40sToWgs84,
    }
    .required_columns();
    table.require_columns(required)?;

    let converter = build_converter(geoid_path, resampling)?;

    let output_path = output.unwrap_or_else(|| default_output_path(&input));

    match direction {
        BatchDirection::ToUtm => process(&converter, &table, &output_path, convert_to_utm_rows)?,
        BatchDirection::ToWgs84 => {
            process(&converter, &table, &output_path, convert_to_wgs84_rows)?
        }
    }

    println!("Output written to: {}", output_path.display());
    Ok(())
}

fn process<R, F>(converter: &Converter, table: &Table, output_path: &Path, convert: F) -> Result<()>
where
    R: Serialize,
    F: Fn(&Converter, &Table, Range<usize>) -> geoconv::Result<BatchOutcome<R>>,
{
    let pb = ProgressBar::new(table.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let mut outcome = BatchOutcome::default();
    for start in (0..table.len()).step_by(CHUNK_SIZE) {
        let end = (start + CHUNK_SIZE).min(table.len());
        outcome.merge(convert(converter, table, start..end)?);
        pb.inc((end - start) as u64);
    }
    pb.finish_with_message("done");

    report_errors(&outcome.errors);
    let outcome = outcome.ensure_rows()?;

    let output_file = File::create(output_path).context("Failed to create output file")?;
    write_csv(&outcome.rows, BufWriter::new(output_file)).context("Failed to write output")?;

    println!("Converted {} of {} rows", outcome.rows.len(), table.len());
    Ok(())
}

fn report_errors(errors: &[RowError]) {
    for error in errors {
        eprintln!("{}", error);
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}_converted.csv", stem))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoconv::{ConverterBuilder, GeoidModelInfo, GeoidSampler};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Geoid with a constant separation of 25 m.
    struct FlatGeoid;

    impl GeoidSampler for FlatGeoid {
        fn sample(&self, lat: f64, lon: f64) -> geoconv::Result<f64> {
            geoconv::point::validate_lat_lon(lat, lon)?;
            Ok(25.0)
        }

        fn sample_bulk(&self, coords: &[(f64, f64)]) -> geoconv::Result<Vec<geoconv::Result<f64>>> {
            Ok(coords.iter().map(|&(lat, lon)| self.sample(lat, lon)).collect())
        }

        fn model_info(&self) -> geoconv::Result<GeoidModelInfo> {
            Err(geoconv::ConversionError::ModelNotFound {
                path: PathBuf::from("flat.tif"),
            })
        }

        fn model_path(&self) -> &Path {
            Path::new("flat.tif")
        }
    }

    fn flat_converter() -> Converter {
        ConverterBuilder::new("flat.tif")
            .sampler(Arc::new(FlatGeoid))
            .build()
            .unwrap()
    }

    #[test]
    fn test_process_converts_across_chunks() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("points_converted.csv");

        let mut csv = String::from("latitude,longitude,ellipsoid_height\n");
        for i in 0..2500 {
            let lat = if i == 1500 { 95.0 } else { -20.0 };
            csv.push_str(&format!("{},57.0,{}\n", lat, i));
        }
        let table = Table::read(csv.as_bytes(), FileKind::Csv).unwrap();

        process(&flat_converter(), &table, &output, convert_to_utm_rows).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2500);
        assert!(lines[0].starts_with("latitude,longitude,ellipsoid_height,easting"));
        assert!(lines[1].starts_with("-20.0,57.0,0.0,"));
        assert!(lines[1].ends_with(",-25.0,25.0"));
        assert!(lines[2499].starts_with("-20.0,57.0,2499.0,"));
        assert!(lines.iter().all(|line| !line.starts_with("95")));
    }

    #[test]
    fn test_process_fails_when_no_row_converts() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.csv");
        let table = Table::read(b"easting,northing\nabc,7787000\n", FileKind::Csv).unwrap();

        let err = process(&flat_converter(), &table, &output, convert_to_wgs84_rows).unwrap_err();
        assert!(err.to_string().contains("No rows could be converted"));
        assert!(!output.exists());
    }

    #[test]
    fn test_default_output_path() {
        let path = default_output_path(Path::new("/data/survey.xlsx"));
        assert_eq!(path, PathBuf::from("/data/survey_converted.csv"));
    }
}
