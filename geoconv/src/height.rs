//! Ellipsoidal ↔ orthometric height conversion.
//!
//! Uses `H = h - N` and `h = H + N`, where `h` is the height above the WGS84
//! ellipsoid, `H` the height above the geoid and `N` the geoid separation
//! sampled from a [`GeoidSampler`].

use std::sync::Arc;

use crate::error::Result;
use crate::geoid::GeoidSampler;
use crate::point::{validate_height, validate_lat_lon};

/// Heights beyond this magnitude are logged as unusual.
const UNUSUAL_HEIGHT_METERS: f64 = 20_000.0;

/// Input heights beyond this magnitude are logged by [`check_height_range`].
const REASONABLE_HEIGHT_METERS: f64 = 15_000.0;

/// Converts heights using a shared geoid sampler.
#[derive(Clone)]
pub struct HeightConverter {
    sampler: Arc<dyn GeoidSampler>,
}

impl std::fmt::Debug for HeightConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeightConverter")
            .field("model_path", &self.sampler.model_path())
            .finish()
    }
}

impl HeightConverter {
    pub fn new(sampler: Arc<dyn GeoidSampler>) -> Self {
        Self { sampler }
    }

    /// The underlying geoid sampler.
    pub fn sampler(&self) -> &Arc<dyn GeoidSampler> {
        &self.sampler
    }

    /// Geoid separation `N` at a point.
    pub fn geoid_separation(&self, lat: f64, lon: f64) -> Result<f64> {
        self.sampler.sample(lat, lon)
    }

    /// Orthometric height `H = h - N`, returned with the separation `N` used.
    pub fn ellipsoid_to_orthometric(
        &self,
        lat: f64,
        lon: f64,
        ellipsoid_height: f64,
    ) -> Result<(f64, f64)> {
        validate_lat_lon(lat, lon)?;
        validate_height(ellipsoid_height)?;
        check_height_range(ellipsoid_height, "ellipsoid");

        let geoid_height = self.sampler.sample(lat, lon)?;
        let orthometric_height = ellipsoid_height - geoid_height;
        warn_if_unusual(orthometric_height, "orthometric");

        tracing::debug!(
            lat,
            lon,
            ellipsoid_height,
            geoid_height,
            orthometric_height,
            "Ellipsoid -> orthometric"
        );

        Ok((orthometric_height, geoid_height))
    }

    /// Ellipsoidal height `h = H + N`, returned with the separation `N` used.
    pub fn orthometric_to_ellipsoid(
        &self,
        lat: f64,
        lon: f64,
        orthometric_height: f64,
    ) -> Result<(f64, f64)> {
        validate_lat_lon(lat, lon)?;
        validate_height(orthometric_height)?;
        check_height_range(orthometric_height, "orthometric");

        let geoid_height = self.sampler.sample(lat, lon)?;
        let ellipsoid_height = orthometric_height + geoid_height;
        warn_if_unusual(ellipsoid_height, "ellipsoid");

        tracing::debug!(
            lat,
            lon,
            orthometric_height,
            geoid_height,
            ellipsoid_height,
            "Orthometric -> ellipsoid"
        );

        Ok((ellipsoid_height, geoid_height))
    }

    /// `(H, N)` for many `(lat, lon, h)` points, sampling the geoid model once.
    pub fn ellipsoid_to_orthometric_bulk(
        &self,
        points: &[(f64, f64, f64)],
    ) -> Result<Vec<Result<(f64, f64)>>> {
        self.bulk(points, "ellipsoid", |h, n| h - n)
    }

    /// `(h, N)` for many `(lat, lon, H)` points, sampling the geoid model once.
    pub fn orthometric_to_ellipsoid_bulk(
        &self,
        points: &[(f64, f64, f64)],
    ) -> Result<Vec<Result<(f64, f64)>>> {
        self.bulk(points, "orthometric", |h, n| h + n)
    }

    fn bulk(
        &self,
        points: &[(f64, f64, f64)],
        kind: &str,
        apply: impl Fn(f64, f64) -> f64,
    ) -> Result<Vec<Result<(f64, f64)>>> {
        let coords: Vec<(f64, f64)> = points.iter().map(|&(lat, lon, _)| (lat, lon)).collect();
        let separations = self.sampler.sample_bulk(&coords)?;

        Ok(points
            .iter()
            .zip(separations)
            .map(|(&(_, _, height), separation)| {
                validate_height(height)?;
                check_height_range(height, kind);
                let separation = separation?;
                Ok((apply(height, separation), separation))
            })
            .collect())
    }
}

fn warn_if_unusual(height: f64, kind: &str) {
    if height.abs() > UNUSUAL_HEIGHT_METERS {
        tracing::warn!(height, kind, "Unusual height result");
    }
}

/// Log a warning for heights outside the range seen on Earth's surface.
///
/// Returns whether the height is within range.
pub fn check_height_range(height: f64, kind: &str) -> bool {
    if height.abs() > REASONABLE_HEIGHT_METERS {
        tracing::warn!(height, kind, "Height outside reasonable range");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConversionError;
    use std::path::Path;

    /// Sampler returning a constant separation.
    struct ConstantGeoid(f64);

    impl GeoidSampler for ConstantGeoid {
        fn sample(&self, lat: f64, lon: f64) -> Result<f64> {
            validate_lat_lon(lat, lon)?;
            Ok(self.0)
        }

        fn sample_bulk(&self, coords: &[(f64, f64)]) -> Result<Vec<Result<f64>>> {
            Ok(coords.iter().map(|&(lat, lon)| self.sample(lat, lon)).collect())
        }

        fn model_info(&self) -> Result<crate::geoid::GeoidModelInfo> {
            Err(ConversionError::ModelNotFound {
                path: "constant".into(),
            })
        }

        fn model_path(&self) -> &Path {
            Path::new("constant")
        }
    }

    fn converter(n: f64) -> HeightConverter {
        HeightConverter::new(Arc::new(ConstantGeoid(n)))
    }

    #[test]
    fn test_ellipsoid_to_orthometric() {
        let c = converter(-12.5);
        assert_eq!(
            c.ellipsoid_to_orthometric(-20.0, 57.0, 100.0).unwrap(),
            (112.5, -12.5)
        );
    }

    #[test]
    fn test_orthometric_to_ellipsoid() {
        let c = converter(-12.5);
        assert_eq!(
            c.orthometric_to_ellipsoid(-20.0, 57.0, 112.5).unwrap(),
            (100.0, -12.5)
        );
    }

    #[test]
    fn test_heights_are_inverse() {
        let c = converter(27.25);
        let h = 431.75;
        let (big_h, n) = c.ellipsoid_to_orthometric(-20.0, 57.0, h).unwrap();
        let (back, _) = c.orthometric_to_ellipsoid(-20.0, 57.0, big_h).unwrap();
        assert_eq!(big_h + n, h);
        assert!((back - h).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_height_rejected() {
        let c = converter(0.0);
        let err = c.ellipsoid_to_orthometric(-20.0, 57.0, f64::NAN).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_invalid_coordinate_rejected() {
        let c = converter(0.0);
        let err = c.orthometric_to_ellipsoid(-91.0, 57.0, 0.0).unwrap_err();
        assert!(matches!(err, ConversionError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_bulk_keeps_per_point_outcomes() {
        let c = converter(10.0);
        let results = c
            .ellipsoid_to_orthometric_bulk(&[
                (-20.0, 57.0, 50.0),
                (100.0, 57.0, 50.0),
                (-20.0, 57.0, f64::INFINITY),
            ])
            .unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), (40.0, 10.0));
        assert!(results[1].is_err());
        assert!(results[2].is_err());

        let results = c.orthometric_to_ellipsoid_bulk(&[(-20.0, 57.0, 40.0)]).unwrap();
        assert_eq!(*results[0].as_ref().unwrap(), (50.0, 10.0));
    }

    #[test]
    fn test_out_of_range_height_still_converts() {
        let c = converter(-20.0);
        assert_eq!(
            c.ellipsoid_to_orthometric(-20.0, 57.0, 16_000.0).unwrap(),
            (16_020.0, -20.0)
        );

        let results = c.orthometric_to_ellipsoid_bulk(&[(-20.0, 57.0, -16_000.0)]).unwrap();
        assert_eq!(*results[0].as_ref().unwrap(), (-16_020.0, -20.0));
    }

    #[test]
    fn test_check_height_range() {
        assert!(check_height_range(8_848.0, "ellipsoid"));
        assert!(check_height_range(-11_000.0, "orthometric"));
        assert!(!check_height_range(15_001.0, "ellipsoid"));
    }
}
