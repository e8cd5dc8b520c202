//! Point types and coordinate range validation.

use crate::error::{ConversionError, Result};

/// Valid latitude range in decimal degrees.
pub const LATITUDE_RANGE: std::ops::RangeInclusive<f64> = -90.0..=90.0;

/// Valid longitude range in decimal degrees.
pub const LONGITUDE_RANGE: std::ops::RangeInclusive<f64> = -180.0..=180.0;

/// A WGS84 geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeographicPoint {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Height in meters; ellipsoidal or orthometric depending on context.
    pub height: Option<f64>,
}

impl GeographicPoint {
    /// Create a validated geographic point.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidCoordinate`] if latitude or longitude
    /// is outside its range, or if any component is not finite.
    pub fn new(lat: f64, lon: f64, height: Option<f64>) -> Result<Self> {
        validate_lat_lon(lat, lon)?;
        if let Some(h) = height {
            validate_height(h)?;
        }
        Ok(Self { lat, lon, height })
    }
}

/// A UTM Zone 40S projected point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectedPoint {
    /// Easting in meters.
    pub easting: f64,
    /// Northing in meters.
    pub northing: f64,
    /// Height in meters; ellipsoidal or orthometric depending on context.
    pub height: Option<f64>,
}

impl ProjectedPoint {
    /// Create a projected point with finite components.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::InvalidCoordinate`] if any component is not finite.
    pub fn new(easting: f64, northing: f64, height: Option<f64>) -> Result<Self> {
        validate_easting_northing(easting, northing)?;
        if let Some(h) = height {
            validate_height(h)?;
        }
        Ok(Self {
            easting,
            northing,
            height,
        })
    }
}

/// Check latitude and longitude against their valid ranges.
pub fn validate_lat_lon(lat: f64, lon: f64) -> Result<()> {
    if !LATITUDE_RANGE.contains(&lat) {
        return Err(ConversionError::invalid_coordinate(format!(
            "Latitude {} outside valid range [-90, 90] degrees",
            lat
        )));
    }
    if !LONGITUDE_RANGE.contains(&lon) {
        return Err(ConversionError::invalid_coordinate(format!(
            "Longitude {} outside valid range [-180, 180] degrees",
            lon
        )));
    }
    Ok(())
}

/// Check that easting and northing are finite numbers.
pub fn validate_easting_northing(easting: f64, northing: f64) -> Result<()> {
    if !easting.is_finite() || !northing.is_finite() {
        return Err(ConversionError::invalid_coordinate(format!(
            "Projected coordinates must be finite, got easting={}, northing={}",
            easting, northing
        )));
    }
    Ok(())
}

/// Check that a height is a finite number.
pub fn validate_height(height: f64) -> Result<()> {
    if !height.is_finite() {
        return Err(ConversionError::invalid_coordinate(format!(
            "Height must be finite, got {}",
            height
        )));
    }
    Ok(())
}
