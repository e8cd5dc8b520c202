//! WGS84 ↔ UTM Zone 40S coordinate transformation.
//!
//! The projection mathematics are delegated to [`proj4rs`]. This module only
//! validates inputs, converts between degrees and radians, and flags results
//! that fall outside the envelope usually seen for the zone.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::Serialize;

use crate::error::{ConversionError, Result};
use crate::point::{validate_easting_northing, validate_lat_lon, LATITUDE_RANGE, LONGITUDE_RANGE};

/// EPSG code of WGS84 geographic coordinates.
pub const EPSG_WGS84: u32 = 4326;

/// EPSG code of WGS84 / UTM Zone 40S.
pub const EPSG_UTM_40S: u32 = 32740;

const WGS84_PROJ_STRING: &str = "+proj=longlat +datum=WGS84 +no_defs";
const UTM_40S_PROJ_STRING: &str = "+proj=utm +zone=40 +south +datum=WGS84 +units=m +no_defs";

/// Typical easting envelope of a UTM zone, in meters.
const ZONE_EASTING_RANGE: std::ops::RangeInclusive<f64> = 160_000.0..=834_000.0;

/// Typical northing envelope of a southern-hemisphere UTM zone, in meters.
const ZONE_NORTHING_RANGE: std::ops::RangeInclusive<f64> = 1_100_000.0..=10_000_000.0;

/// Envelope of projected input accepted without a warning.
const INPUT_EASTING_RANGE: std::ops::RangeInclusive<f64> = 0.0..=1_000_000.0;
const INPUT_NORTHING_RANGE: std::ops::RangeInclusive<f64> = 0.0..=10_000_000.0;

/// Forward and inverse planar projection.
///
/// Implementations must be shareable across request handlers.
pub trait Projector: Send + Sync {
    /// Convert a geographic point to `(easting, northing)` in meters.
    fn to_projected(&self, lat: f64, lon: f64) -> Result<(f64, f64)>;

    /// Convert `(easting, northing)` in meters to `(lat, lon)` in degrees.
    fn to_geographic(&self, easting: f64, northing: f64) -> Result<(f64, f64)>;
}

/// Transformer pair between EPSG:4326 and EPSG:32740.
///
/// # Example
///
/// ```ignore
/// use geoconv::{Projector, Utm40sTransformer};
///
/// let transformer = Utm40sTransformer::new()?;
/// let (easting, northing) = transformer.to_projected(-20.16, 57.5)?;
/// let (lat, lon) = transformer.to_geographic(easting, northing)?;
/// ```
pub struct Utm40sTransformer {
    geographic: Proj,
    projected: Proj,
}

impl std::fmt::Debug for Utm40sTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Utm40sTransformer")
            .field("source_epsg", &EPSG_WGS84)
            .field("target_epsg", &EPSG_UTM_40S)
            .finish_non_exhaustive()
    }
}

impl Utm40sTransformer {
    /// Initialize both CRS definitions.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::ConversionFailure`] if the projection engine
    /// rejects either definition.
    pub fn new() -> Result<Self> {
        let geographic = Proj::from_proj_string(WGS84_PROJ_STRING).map_err(|e| {
            ConversionError::ConversionFailure {
                message: format!("Invalid projection EPSG:{EPSG_WGS84}: {e:?}"),
            }
        })?;
        let projected = Proj::from_proj_string(UTM_40S_PROJ_STRING).map_err(|e| {
            ConversionError::ConversionFailure {
                message: format!("Invalid projection EPSG:{EPSG_UTM_40S}: {e:?}"),
            }
        })?;

        tracing::debug!("CRS transformers initialized");

        Ok(Self {
            geographic,
            projected,
        })
    }
}

impl Projector for Utm40sTransformer {
    fn to_projected(&self, lat: f64, lon: f64) -> Result<(f64, f64)> {
        validate_lat_lon(lat, lon)?;

        if !is_within_zone(lat, lon) {
            tracing::warn!(lat, lon, "Point outside UTM Zone 40S, projection distortion is high");
        }

        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.geographic, &self.projected, &mut point).map_err(|e| {
            ConversionError::ConversionFailure {
                message: format!("Failed to convert WGS84({lat}, {lon}) to UTM40S: {e:?}"),
            }
        })?;
        let (easting, northing) = (point.0, point.1);

        if !ZONE_EASTING_RANGE.contains(&easting) {
            tracing::warn!(easting, "Easting outside typical Zone 40S range");
        }
        if !ZONE_NORTHING_RANGE.contains(&northing) {
            tracing::warn!(northing, "Northing outside typical southern hemisphere range");
        }

        tracing::debug!(lat, lon, easting, northing, "WGS84 -> UTM40S");

        Ok((easting, northing))
    }

    fn to_geographic(&self, easting: f64, northing: f64) -> Result<(f64, f64)> {
        validate_easting_northing(easting, northing)?;

        if !INPUT_EASTING_RANGE.contains(&easting) {
            tracing::warn!(easting, "Easting outside reasonable UTM range");
        }
        if !INPUT_NORTHING_RANGE.contains(&northing) {
            tracing::warn!(northing, "Northing outside reasonable UTM range");
        }

        let mut point = (easting, northing, 0.0);
        transform(&self.projected, &self.geographic, &mut point).map_err(|e| {
            ConversionError::ConversionFailure {
                message: format!(
                    "Failed to convert UTM40S({easting}, {northing}) to WGS84: {e:?}"
                ),
            }
        })?;
        let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());

        if !LATITUDE_RANGE.contains(&lat) {
            return Err(ConversionError::invalid_coordinate(format!(
                "Transformation resulted in invalid latitude: {lat}"
            )));
        }
        if !LONGITUDE_RANGE.contains(&lon) {
            return Err(ConversionError::invalid_coordinate(format!(
                "Transformation resulted in invalid longitude: {lon}"
            )));
        }

        tracing::debug!(easting, northing, lat, lon, "UTM40S -> WGS84");

        Ok((lat, lon))
    }
}

/// Whether a geographic point lies inside UTM Zone 40S (54°E to 60°E, south
/// of the equator).
pub fn is_within_zone(lat: f64, lon: f64) -> bool {
    lat < 0.0 && (54.0..60.0).contains(&lon)
}

/// Description of a coordinate reference system.
#[derive(Debug, Clone, Serialize)]
pub struct CrsInfo {
    pub epsg: u32,
    pub name: &'static str,
    pub unit: &'static str,
}

/// Area covered by the projected zone.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneCoverage {
    pub longitude_range: &'static str,
    pub hemisphere: &'static str,
    pub description: &'static str,
}

/// Summary of the supported transformation.
#[derive(Debug, Clone, Serialize)]
pub struct TransformationInfo {
    pub source_crs: CrsInfo,
    pub target_crs: CrsInfo,
    pub zone_coverage: ZoneCoverage,
}

/// Describe the WGS84 ↔ UTM Zone 40S transformation.
pub fn transformation_info() -> TransformationInfo {
    TransformationInfo {
        source_crs: CrsInfo {
            epsg: EPSG_WGS84,
            name: "WGS84 Geographic",
            unit: "degrees",
        },
        target_crs: CrsInfo {
            epsg: EPSG_UTM_40S,
            name: "UTM Zone 40S",
            unit: "meters",
        },
        zone_coverage: ZoneCoverage {
            longitude_range: "54°E to 60°E",
            hemisphere: "Southern",
            description: "UTM Zone 40S covers parts of the Indian Ocean, including Mauritius and Réunion",
        },
    }
}
