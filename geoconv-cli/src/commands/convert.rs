use anyhow::{Context, Result};
use geoconv::{GeographicPoint, ProjectedPoint, Resampling, UtmRow, Wgs84Row};
use std::path::PathBuf;

use super::build_converter;

pub fn to_utm(
    geoid_path: Option<PathBuf>,
    resampling: Resampling,
    lat: f64,
    lon: f64,
    height: f64,
    json: bool,
) -> Result<()> {
    let point = GeographicPoint::new(lat, lon, Some(height)).context("Invalid coordinate")?;
    let converter = build_converter(geoid_path, resampling)?;

    let result = converter
        .wgs84_to_utm40s(&point)
        .context("Conversion failed")?;

    if json {
        let response = UtmRow {
            latitude: lat,
            longitude: lon,
            ellipsoid_height: height,
            easting: result.easting,
            northing: result.northing,
            orthometric_height: result.orthometric_height,
            geoid_separation: result.geoid_separation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("Easting: {:.3} m", result.easting);
        println!("Northing: {:.3} m", result.northing);
        println!("Orthometric height: {:.3} m", result.orthometric_height);
        println!("Geoid separation: {:.3} m", result.geoid_separation);
    }

    Ok(())
}

pub fn to_wgs84(
    geoid_path: Option<PathBuf>,
    resampling: Resampling,
    easting: f64,
    northing: f64,
    height: f64,
    json: bool,
) -> Result<()> {
    let point =
        ProjectedPoint::new(easting, northing, Some(height)).context("Invalid coordinate")?;
    let converter = build_converter(geoid_path, resampling)?;

    let result = converter
        .utm40s_to_wgs84(&point)
        .context("Conversion failed")?;

    if json {
        let response = Wgs84Row {
            easting,
            northing,
            orthometric_height: height,
            latitude: result.latitude,
            longitude: result.longitude,
            ellipsoid_height: result.ellipsoid_height,
            geoid_separation: result.geoid_separation,
        };
        println!("{}", serde_json::to_string(&response)?);
    } else {
        println!("Latitude: {:.8}", result.latitude);
        println!("Longitude: {:.8}", result.longitude);
        println!("Ellipsoid height: {:.3} m", result.ellipsoid_height);
        println!("Geoid separation: {:.3} m", result.geoid_separation);
    }

    Ok(())
}
