use anyhow::{Context, Result};
use geoconv::{transformation_info, Resampling};
use std::path::PathBuf;

use super::build_converter;

pub fn run(geoid_path: Option<PathBuf>, resampling: Resampling) -> Result<()> {
    let converter = build_converter(geoid_path, resampling)?;
    let info = converter
        .model_info()
        .context("Failed to read geoid model")?;

    let file_size = std::fs::metadata(converter.model_path())
        .map(|m| m.len())
        .context("Failed to read geoid model metadata")?;

    println!("Geoid model: {}", info.file_path);
    println!("File size: {}", format_size(file_size));
    println!();
    println!(
        "Dimensions: {}x{} ({} band{})",
        info.width,
        info.height,
        info.bands,
        if info.bands == 1 { "" } else { "s" }
    );
    println!("Data type: {}", info.dtype);
    println!(
        "Bounds: {:.4}..{:.4} lon, {:.4}..{:.4} lat",
        info.bounds.west, info.bounds.east, info.bounds.south, info.bounds.north
    );
    println!(
        "Resolution: {:.6}° x {:.6}°",
        info.resolution.x, info.resolution.y
    );
    println!("CRS: {}", info.crs.as_deref().unwrap_or("unknown"));
    if let Some(nodata) = info.nodata {
        println!("NoData: {}", nodata);
    }
    println!("Resampling: {:?}", resampling);
    println!();

    match info.sample_value {
        Some(value) => println!("Sample separation: {:.3} m", value),
        None => println!("Sample separation: unavailable"),
    }
    println!("Valid: {}", if info.valid { "yes" } else { "no" });

    let transform = transformation_info();
    println!();
    println!(
        "Transformation: EPSG:{} ({}) -> EPSG:{} ({})",
        transform.source_crs.epsg,
        transform.source_crs.name,
        transform.target_crs.epsg,
        transform.target_crs.name
    );

    Ok(())
}

fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
    }
}
