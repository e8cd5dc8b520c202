//! Conversion pipeline fusing projection and height conversion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ConversionError, Result};
use crate::geoid::{GeoidModelInfo, GeoidSampler, Resampling, TiffGeoidSampler};
use crate::height::HeightConverter;
use crate::point::{GeographicPoint, ProjectedPoint};
use crate::projection::{Projector, Utm40sTransformer};

/// Result of converting a WGS84 point to UTM Zone 40S.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtmConversion {
    pub easting: f64,
    pub northing: f64,
    pub orthometric_height: f64,
    pub geoid_separation: f64,
}

/// Result of converting a UTM Zone 40S point to WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Wgs84Conversion {
    pub latitude: f64,
    pub longitude: f64,
    pub ellipsoid_height: f64,
    pub geoid_separation: f64,
}

/// WGS84 ↔ UTM Zone 40S converter with geoid-based height conversion.
///
/// A missing input height is treated as 0.0 meters.
///
/// # Example
///
/// ```ignore
/// use geoconv::{ConverterBuilder, GeographicPoint};
///
/// let converter = ConverterBuilder::new("/data/egm2008.tif").build()?;
/// let point = GeographicPoint::new(-20.16, 57.5, Some(85.0))?;
/// let utm = converter.wgs84_to_utm40s(&point)?;
/// println!("{:.3} {:.3} H={:.3}", utm.easting, utm.northing, utm.orthometric_height);
/// ```
#[derive(Clone)]
pub struct Converter {
    projector: Arc<dyn Projector>,
    heights: HeightConverter,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("heights", &self.heights)
            .finish_non_exhaustive()
    }
}

impl Converter {
    pub fn new(projector: Arc<dyn Projector>, sampler: Arc<dyn GeoidSampler>) -> Self {
        Self {
            projector,
            heights: HeightConverter::new(sampler),
        }
    }

    /// Path of the geoid model.
    pub fn model_path(&self) -> &Path {
        self.heights.sampler().model_path()
    }

    /// Validate and describe the geoid model.
    pub fn model_info(&self) -> Result<GeoidModelInfo> {
        self.heights.sampler().model_info()
    }

    /// Drop cached geoid model metadata.
    pub fn clear_cache(&self) {
        self.heights.sampler().clear_cache();
    }

    /// Convert a WGS84 point with ellipsoidal height to UTM Zone 40S with
    /// orthometric height.
    pub fn wgs84_to_utm40s(&self, point: &GeographicPoint) -> Result<UtmConversion> {
        let (easting, northing) = self.projector.to_projected(point.lat, point.lon)?;
        let (orthometric_height, geoid_separation) =
            self.heights
                .ellipsoid_to_orthometric(point.lat, point.lon, point.height.unwrap_or(0.0))?;

        tracing::info!(
            lat = point.lat,
            lon = point.lon,
            easting,
            northing,
            "Converted WGS84 -> UTM40S"
        );

        Ok(UtmConversion {
            easting,
            northing,
            orthometric_height,
            geoid_separation,
        })
    }

    /// Convert a UTM Zone 40S point with orthometric height to WGS84 with
    /// ellipsoidal height.
    pub fn utm40s_to_wgs84(&self, point: &ProjectedPoint) -> Result<Wgs84Conversion> {
        let (latitude, longitude) = self.projector.to_geographic(point.easting, point.northing)?;
        let (ellipsoid_height, geoid_separation) =
            self.heights
                .orthometric_to_ellipsoid(latitude, longitude, point.height.unwrap_or(0.0))?;

        tracing::info!(
            easting = point.easting,
            northing = point.northing,
            lat = latitude,
            lon = longitude,
            "Converted UTM40S -> WGS84"
        );

        Ok(Wgs84Conversion {
            latitude,
            longitude,
            ellipsoid_height,
            geoid_separation,
        })
    }

    /// Convert many WGS84 points, opening the geoid model once.
    ///
    /// The outer error reports a model-level failure; each inner result
    /// reports the outcome for the point at the same index.
    pub fn wgs84_to_utm40s_bulk(
        &self,
        points: &[GeographicPoint],
    ) -> Result<Vec<Result<UtmConversion>>> {
        let heights = self.heights.ellipsoid_to_orthometric_bulk(
            &points
                .iter()
                .map(|p| (p.lat, p.lon, p.height.unwrap_or(0.0)))
                .collect::<Vec<_>>(),
        )?;

        Ok(points
            .iter()
            .zip(heights)
            .map(|(point, height)| {
                let (easting, northing) = self.projector.to_projected(point.lat, point.lon)?;
                let (orthometric_height, geoid_separation) = height?;
                Ok(UtmConversion {
                    easting,
                    northing,
                    orthometric_height,
                    geoid_separation,
                })
            })
            .collect())
    }

    /// Convert many UTM Zone 40S points, opening the geoid model once.
    ///
    /// The outer error reports a model-level failure; each inner result
    /// reports the outcome for the point at the same index.
    pub fn utm40s_to_wgs84_bulk(
        &self,
        points: &[ProjectedPoint],
    ) -> Result<Vec<Result<Wgs84Conversion>>> {
        let geographic: Vec<Result<(f64, f64)>> = points
            .iter()
            .map(|p| self.projector.to_geographic(p.easting, p.northing))
            .collect();

        // Only points that projected successfully are sampled, in order
        let samples: Vec<(f64, f64, f64)> = geographic
            .iter()
            .zip(points)
            .filter_map(|(g, p)| {
                g.as_ref()
                    .ok()
                    .map(|&(lat, lon)| (lat, lon, p.height.unwrap_or(0.0)))
            })
            .collect();
        let mut heights = self
            .heights
            .orthometric_to_ellipsoid_bulk(&samples)?
            .into_iter();

        Ok(geographic
            .into_iter()
            .map(|g| {
                let (latitude, longitude) = g?;
                let (ellipsoid_height, geoid_separation) =
                    heights.next().ok_or_else(|| ConversionError::ConversionFailure {
                        message: "geoid sample missing for projected point".to_string(),
                    })??;
                Ok(Wgs84Conversion {
                    latitude,
                    longitude,
                    ellipsoid_height,
                    geoid_separation,
                })
            })
            .collect())
    }
}

/// Builder for [`Converter`].
///
/// # Example
///
/// ```ignore
/// use geoconv::{ConverterBuilder, Resampling};
///
/// let converter = ConverterBuilder::new("/data/egm2008.tif")
///     .resampling(Resampling::Bilinear)
///     .build()?;
/// ```
pub struct ConverterBuilder {
    geoid_path: PathBuf,
    resampling: Resampling,
    projector: Option<Arc<dyn Projector>>,
    sampler: Option<Arc<dyn GeoidSampler>>,
}

impl ConverterBuilder {
    /// Create a new builder with the path of the geoid model.
    pub fn new<P: AsRef<Path>>(geoid_path: P) -> Self {
        Self {
            geoid_path: geoid_path.as_ref().to_path_buf(),
            resampling: Resampling::default(),
            projector: None,
            sampler: None,
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `GEOID_PATH` | Path to the geoid GeoTIFF (e.g. EGM2008) | Required |
    /// | `GEOID_RESAMPLING` | `nearest` or `bilinear` | `nearest` |
    ///
    /// # Errors
    ///
    /// Returns an error if `GEOID_PATH` is not set.
    pub fn from_env() -> Result<Self> {
        let geoid_path = std::env::var("GEOID_PATH").map_err(|_| {
            ConversionError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "GEOID_PATH environment variable not set",
            ))
        })?;

        let resampling = match std::env::var("GEOID_RESAMPLING") {
            Ok(value) => value.parse().unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Falling back to nearest resampling");
                Resampling::Nearest
            }),
            Err(_) => Resampling::default(),
        };

        Ok(Self::new(geoid_path).resampling(resampling))
    }

    /// Set the raster resampling method.
    pub fn resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }

    /// Use a custom projector instead of [`Utm40sTransformer`].
    pub fn projector(mut self, projector: Arc<dyn Projector>) -> Self {
        self.projector = Some(projector);
        self
    }

    /// Use a custom geoid sampler instead of [`TiffGeoidSampler`].
    pub fn sampler(mut self, sampler: Arc<dyn GeoidSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Build the converter.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::ConversionFailure`] if the projection
    /// definitions cannot be initialized. The geoid model is not opened here.
    pub fn build(self) -> Result<Converter> {
        let projector = match self.projector {
            Some(projector) => projector,
            None => Arc::new(Utm40sTransformer::new()?),
        };
        let sampler = self.sampler.unwrap_or_else(|| {
            Arc::new(TiffGeoidSampler::new(&self.geoid_path, self.resampling))
        });

        tracing::debug!(
            geoid_path = %self.geoid_path.display(),
            resampling = ?self.resampling,
            "Converter built"
        );

        Ok(Converter::new(projector, sampler))
    }
}
