//! # geoconv - WGS84 ↔ UTM Zone 40S Conversion Library
//!
//! Converts coordinates between WGS84 geographic coordinates (EPSG:4326) and
//! UTM Zone 40S (EPSG:32740), together with the height datum: ellipsoidal
//! heights above WGS84 on one side, orthometric heights above the geoid on the
//! other.
//!
//! ## Features
//!
//! - **Projection**: Pure-Rust transverse Mercator via `proj4rs`
//! - **Geoid Sampling**: Reads EGM2008-style GeoTIFF models through a memory map
//! - **Batch**: CSV and XLSX tables converted row by row with per-row errors
//!
//! ## Quick Start
//!
//! ```ignore
//! use geoconv::{ConverterBuilder, GeographicPoint};
//!
//! let converter = ConverterBuilder::new("/data/egm2008.tif").build()?;
//!
//! let point = GeographicPoint::new(-20.16, 57.5, Some(85.0))?;
//! let utm = converter.wgs84_to_utm40s(&point)?;
//! println!(
//!     "E={:.3} N={:.3} H={:.3} (N={:.3})",
//!     utm.easting, utm.northing, utm.orthometric_height, utm.geoid_separation
//! );
//! ```
//!
//! ## Heights
//!
//! With `h` the ellipsoidal height, `H` the orthometric height and `N` the
//! geoid separation sampled from the model:
//!
//! - `H = h - N`
//! - `h = H + N`
//!
//! ## Geoid Models
//!
//! Any single-band GeoTIFF in geographic coordinates works. EGM2008 grids are
//! available from <https://earth-info.nga.mil/>.

pub mod batch;
pub mod converter;
pub mod error;
pub mod geoid;
pub mod height;
pub mod point;
pub mod projection;

// Re-export main types at crate root for convenience
pub use batch::{BatchOutcome, Direction, FileKind, RowError, Table, UtmRow, Wgs84Row};
pub use converter::{Converter, ConverterBuilder, UtmConversion, Wgs84Conversion};
pub use error::{ConversionError, Result};
pub use geoid::{GeoidModelInfo, GeoidSampler, RasterMetadata, Resampling, TiffGeoidSampler};
pub use height::HeightConverter;
pub use point::{GeographicPoint, ProjectedPoint};
pub use projection::{transformation_info, Projector, TransformationInfo, Utm40sTransformer};
