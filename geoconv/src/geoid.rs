//! Geoid separation sampling from GeoTIFF models.
//!
//! This module provides [`TiffGeoidSampler`], which reads the geoid separation
//! `N` from a single-band GeoTIFF such as EGM2008. The raster is memory-mapped
//! and decoded with the [`tiff`] crate; georeferencing is taken from the
//! `ModelTiepoint`/`ModelPixelScale` (or `ModelTransformation`) tags and the
//! no-data sentinel from the `GDAL_NODATA` tag.
//!
//! The file is opened for each call to [`GeoidSampler::sample`] and once per
//! call to [`GeoidSampler::sample_bulk`]. Raster metadata is memoized in a
//! single-slot cache until [`GeoidSampler::clear_cache`] is called.

use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use memmap2::Mmap;
use moka::sync::Cache;
use serde::Serialize;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

use crate::error::{ConversionError, Result};
use crate::point::validate_lat_lon;

/// `ModelPixelScaleTag` (GeoTIFF).
pub(crate) const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// `ModelTiepointTag` (GeoTIFF).
pub(crate) const TAG_MODEL_TIEPOINT: u16 = 33922;
/// `ModelTransformationTag` (GeoTIFF).
pub(crate) const TAG_MODEL_TRANSFORMATION: u16 = 34264;
/// `GeoKeyDirectoryTag` (GeoTIFF).
pub(crate) const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
/// `GDAL_NODATA`, an ASCII no-data value written by GDAL.
pub(crate) const TAG_GDAL_NODATA: u16 = 42113;

const GEO_KEY_RASTER_TYPE: u16 = 1025;
const GEO_KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const GEO_KEY_PROJECTED_CS_TYPE: u16 = 3072;

/// `GTRasterTypeGeoKey` value for rasters whose tiepoints mark pixel centres.
const RASTER_PIXEL_IS_POINT: u16 = 2;

/// Geoid separations beyond this magnitude are logged as unusual.
const UNUSUAL_SEPARATION_METERS: f64 = 200.0;

pub(crate) fn geo_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Interpolation used when sampling the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    /// Value of the pixel containing the point.
    #[default]
    Nearest,
    /// Bilinear interpolation between the four surrounding pixel centres.
    Bilinear,
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest" => Ok(Resampling::Nearest),
            "bilinear" => Ok(Resampling::Bilinear),
            other => Err(format!(
                "Unknown resampling method '{}', expected 'nearest' or 'bilinear'",
                other
            )),
        }
    }
}

/// Geographic extent of a raster in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub west: f64,
    pub east: f64,
    pub south: f64,
    pub north: f64,
}

impl Bounds {
    /// Whether the point lies inside (or on the edge of) the extent.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.west..=self.east).contains(&lon) && (self.south..=self.north).contains(&lat)
    }
}

/// Pixel size in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    pub x: f64,
    pub y: f64,
}

/// Georeferencing and layout of a geoid raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMetadata {
    /// Raster width in pixels.
    pub width: u32,
    /// Raster height in pixels.
    pub height: u32,
    /// Longitude of the west edge of the first column.
    pub origin_x: f64,
    /// Latitude of the north edge of the first row.
    pub origin_y: f64,
    /// Pixel width in degrees.
    pub pixel_width: f64,
    /// Pixel height in degrees (positive; rows run north to south).
    pub pixel_height: f64,
    /// No-data sentinel, if the raster declares one.
    pub nodata: Option<f64>,
    /// Sample type name (e.g. `float32`, `int16`).
    pub data_type: String,
    /// `EPSG:xxxx` from the GeoKey directory, if present.
    pub crs: Option<String>,
}

impl RasterMetadata {
    /// Extent covered by the raster.
    pub fn bounds(&self) -> Bounds {
        Bounds {
            west: self.origin_x,
            east: self.origin_x + self.pixel_width * self.width as f64,
            south: self.origin_y - self.pixel_height * self.height as f64,
            north: self.origin_y,
        }
    }

    /// Pixel size.
    pub fn resolution(&self) -> Resolution {
        Resolution {
            x: self.pixel_width,
            y: self.pixel_height,
        }
    }

    /// Fractional `(column, row)` of a point, measured from the raster's
    /// north-west corner.
    pub fn pixel_position(&self, lat: f64, lon: f64) -> (f64, f64) {
        let col = (lon - self.origin_x) / self.pixel_width;
        let row = (self.origin_y - lat) / self.pixel_height;
        (col, row)
    }

    /// Shift a longitude by a full turn when the raster uses the other
    /// longitude convention (0..360 vs -180..180).
    fn normalize_lon(&self, lon: f64) -> f64 {
        let bounds = self.bounds();
        let covers = |lon: f64| (bounds.west..=bounds.east).contains(&lon);
        if covers(lon) {
            return lon;
        }
        [lon + 360.0, lon - 360.0]
            .into_iter()
            .find(|&shifted| covers(shifted))
            .unwrap_or(lon)
    }

    fn is_nodata(&self, value: f64) -> bool {
        match self.nodata {
            Some(nd) if nd.is_nan() => value.is_nan(),
            Some(nd) => value == nd,
            None => false,
        }
    }
}

/// Report describing a geoid model file.
#[derive(Debug, Clone, Serialize)]
pub struct GeoidModelInfo {
    pub file_path: String,
    pub file_size_mb: f64,
    pub width: u32,
    pub height: u32,
    pub bands: u16,
    pub bounds: Bounds,
    pub resolution: Resolution,
    pub crs: Option<String>,
    pub dtype: String,
    pub nodata: Option<f64>,
    pub valid: bool,
    /// Value sampled at the centre of the raster, if readable.
    pub sample_value: Option<f64>,
}

/// Source of geoid separation values.
///
/// Implementations must be shareable across request handlers.
pub trait GeoidSampler: Send + Sync {
    /// Geoid separation `N` in meters at a point.
    fn sample(&self, lat: f64, lon: f64) -> Result<f64>;

    /// Geoid separations for many `(lat, lon)` points.
    ///
    /// The outer error reports a model-level failure; each inner result
    /// reports the outcome for the point at the same index.
    fn sample_bulk(&self, coords: &[(f64, f64)]) -> Result<Vec<Result<f64>>>;

    /// Validate the model and describe it.
    fn model_info(&self) -> Result<GeoidModelInfo>;

    /// Path of the model being sampled.
    fn model_path(&self) -> &Path;

    /// Drop any cached model metadata.
    fn clear_cache(&self) {}
}

/// An open geoid raster. Dropping it releases the file mapping.
struct GeoidRaster {
    path: PathBuf,
    decoder: Decoder<Cursor<Mmap>>,
    metadata: Arc<RasterMetadata>,
    chunk_width: u32,
    chunk_height: u32,
    chunks_across: u32,
    /// Decoded chunks, so that each chunk is decoded at most once per open.
    chunks: HashMap<u32, DecodingResult>,
}

impl GeoidRaster {
    fn open(path: &Path, metadata_cache: &Cache<PathBuf, Arc<RasterMetadata>>) -> Result<Self> {
        if !path.is_file() {
            return Err(ConversionError::ModelNotFound {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path).map_err(|_| ConversionError::ModelNotFound {
            path: path.to_path_buf(),
        })?;

        // SAFETY: The geoid model is a read-only asset; the mapping is private
        // to this value and never handed out.
        let mmap = unsafe { Mmap::map(&file)? };

        let unreadable = |reason: String| ConversionError::ModelUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let mut decoder = Decoder::new(Cursor::new(mmap))
            .map_err(|e| unreadable(e.to_string()))?
            .with_limits(Limits::unlimited());

        let metadata = match metadata_cache.get(path) {
            Some(metadata) => metadata,
            None => {
                let metadata = Arc::new(read_metadata(&mut decoder).map_err(unreadable)?);
                metadata_cache.insert(path.to_path_buf(), metadata.clone());
                tracing::debug!(path = %path.display(), "Cached geoid model metadata");
                metadata
            }
        };

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        if chunk_width == 0 || chunk_height == 0 {
            return Err(unreadable("raster has empty chunks".to_string()));
        }
        let chunks_across = metadata.width.div_ceil(chunk_width);

        Ok(Self {
            path: path.to_path_buf(),
            decoder,
            metadata,
            chunk_width,
            chunk_height,
            chunks_across,
            chunks: HashMap::new(),
        })
    }

    /// Raw raster value at a pixel.
    fn pixel(&mut self, col: u32, row: u32) -> Result<f64> {
        let chunk_index = (row / self.chunk_height) * self.chunks_across + col / self.chunk_width;

        if !self.chunks.contains_key(&chunk_index) {
            let chunk = self.decoder.read_chunk(chunk_index).map_err(|e| {
                ConversionError::ModelUnreadable {
                    path: self.path.clone(),
                    reason: format!("failed to decode chunk {}: {}", chunk_index, e),
                }
            })?;
            self.chunks.insert(chunk_index, chunk);
        }

        // Edge tiles are cropped to the image, so their row stride may be narrower
        let (stride, _) = self.decoder.chunk_data_dimensions(chunk_index);
        let offset =
            ((row % self.chunk_height) * stride + col % self.chunk_width) as usize;

        self.chunks
            .get(&chunk_index)
            .and_then(|chunk| decoded_value(chunk, offset))
            .ok_or_else(|| ConversionError::ModelUnreadable {
                path: self.path.clone(),
                reason: format!("pixel ({}, {}) outside decoded chunk", col, row),
            })
    }

    /// Geoid separation at a validated point.
    fn sample(&mut self, lat: f64, lon: f64, resampling: Resampling) -> Result<f64> {
        let metadata = self.metadata.clone();
        let lon_in_raster = metadata.normalize_lon(lon);

        if !metadata.bounds().contains(lat, lon_in_raster) {
            tracing::warn!(
                lat,
                lon,
                bounds = ?metadata.bounds(),
                "Coordinates outside geoid model bounds"
            );
        }

        let (col, row) = metadata.pixel_position(lat, lon_in_raster);
        let max_col = metadata.width.saturating_sub(1);
        let max_row = metadata.height.saturating_sub(1);

        let value = match resampling {
            Resampling::Nearest => {
                let c = clamp_index(col.floor(), max_col);
                let r = clamp_index(row.floor(), max_row);
                let v = self.pixel(c, r)?;
                if metadata.is_nodata(v) {
                    return Err(ConversionError::NoData { lat, lon });
                }
                v
            }
            Resampling::Bilinear => {
                // Pixel centres sit half a pixel in from the edges
                let x = (col - 0.5).clamp(0.0, max_col as f64);
                let y = (row - 0.5).clamp(0.0, max_row as f64);
                let c0 = clamp_index(x.floor(), max_col.saturating_sub(1));
                let r0 = clamp_index(y.floor(), max_row.saturating_sub(1));
                let c1 = (c0 + 1).min(max_col);
                let r1 = (r0 + 1).min(max_row);
                let tx = (x - c0 as f64).clamp(0.0, 1.0);
                let ty = (y - r0 as f64).clamp(0.0, 1.0);

                let corners = [
                    self.pixel(c0, r0)?,
                    self.pixel(c1, r0)?,
                    self.pixel(c0, r1)?,
                    self.pixel(c1, r1)?,
                ];
                if corners.iter().any(|&v| metadata.is_nodata(v)) {
                    return Err(ConversionError::NoData { lat, lon });
                }

                let top = corners[0] * (1.0 - tx) + corners[1] * tx;
                let bottom = corners[2] * (1.0 - tx) + corners[3] * tx;
                top * (1.0 - ty) + bottom * ty
            }
        };

        if !value.is_finite() {
            return Err(ConversionError::InvalidSample { lat, lon, value });
        }

        if value.abs() > UNUSUAL_SEPARATION_METERS {
            tracing::warn!(lat, lon, geoid_height = value, "Unusual geoid height");
        }

        tracing::debug!(lat, lon, geoid_height = value, "Sampled geoid height");

        Ok(value)
    }
}

fn clamp_index(value: f64, max: u32) -> u32 {
    if value <= 0.0 {
        0
    } else if value >= max as f64 {
        max
    } else {
        value as u32
    }
}

fn decoded_value(chunk: &DecodingResult, index: usize) -> Option<f64> {
    match chunk {
        DecodingResult::U8(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::U16(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::U32(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::U64(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::I8(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::I16(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::I32(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::I64(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::F32(v) => v.get(index).map(|&x| x as f64),
        DecodingResult::F64(v) => v.get(index).copied(),
    }
}

fn find_f64_vec<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    code: u16,
) -> std::result::Result<Option<Vec<f64>>, String> {
    match decoder.find_tag(geo_tag(code)) {
        Ok(Some(value)) => value.into_f64_vec().map(Some).map_err(|e| e.to_string()),
        Ok(None) => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

/// Read georeferencing, layout and no-data value from the first image.
fn read_metadata<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> std::result::Result<RasterMetadata, String> {
    let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;

    let bits = match decoder.colortype().map_err(|e| e.to_string())? {
        ColorType::Gray(bits) => bits,
        other => return Err(format!("expected a single-band raster, found {:?}", other)),
    };

    let sample_format = decoder
        .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)
        .map_err(|e| e.to_string())?
        .and_then(|formats| formats.first().copied())
        .unwrap_or(1);
    let data_type = match sample_format {
        2 => format!("int{}", bits),
        3 => format!("float{}", bits),
        _ => format!("uint{}", bits),
    };

    let geo_keys = decoder
        .find_tag_unsigned_vec::<u16>(geo_tag(TAG_GEO_KEY_DIRECTORY))
        .ok()
        .flatten()
        .unwrap_or_default();

    let (mut origin_x, mut origin_y, pixel_width, pixel_height) =
        match find_f64_vec(decoder, TAG_MODEL_TRANSFORMATION)? {
            Some(m) if m.len() >= 8 => (m[3], m[7], m[0], -m[5]),
            _ => {
                let scale = find_f64_vec(decoder, TAG_MODEL_PIXEL_SCALE)?
                    .filter(|s| s.len() >= 2)
                    .ok_or("missing ModelPixelScale tag")?;
                let tiepoint = find_f64_vec(decoder, TAG_MODEL_TIEPOINT)?
                    .filter(|t| t.len() >= 6)
                    .ok_or("missing ModelTiepoint tag")?;
                let (sx, sy) = (scale[0], scale[1]);
                (
                    tiepoint[3] - tiepoint[0] * sx,
                    tiepoint[4] + tiepoint[1] * sy,
                    sx,
                    sy,
                )
            }
        };

    if !(pixel_width > 0.0 && pixel_height > 0.0) {
        return Err(format!(
            "invalid pixel size ({}, {})",
            pixel_width, pixel_height
        ));
    }

    // Tiepoints of PixelIsPoint rasters mark the centre of the first pixel
    if geo_key_value(&geo_keys, GEO_KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        origin_x -= pixel_width / 2.0;
        origin_y += pixel_height / 2.0;
    }

    let nodata = match decoder.find_tag(geo_tag(TAG_GDAL_NODATA)) {
        Ok(Some(value)) => value
            .into_string()
            .ok()
            .and_then(|s| s.trim_end_matches('\0').trim().parse::<f64>().ok()),
        _ => None,
    };

    let crs = crs_from_geo_keys(&geo_keys);

    Ok(RasterMetadata {
        width,
        height,
        origin_x,
        origin_y,
        pixel_width,
        pixel_height,
        nodata,
        data_type,
        crs,
    })
}

/// Inline value of a key in a GeoKey directory. Entries are
/// `[key id, tag location, count, value]` after a four-short header.
fn geo_key_value(keys: &[u16], key: u16) -> Option<u16> {
    keys.get(4..)?
        .chunks_exact(4)
        .find(|e| e[0] == key && e[1] == 0)
        .map(|e| e[3])
}

/// EPSG code of the projected or geographic CRS in a GeoKey directory.
fn crs_from_geo_keys(keys: &[u16]) -> Option<String> {
    [GEO_KEY_PROJECTED_CS_TYPE, GEO_KEY_GEOGRAPHIC_TYPE]
        .iter()
        .filter_map(|&key| geo_key_value(keys, key))
        .find(|&code| code != 0 && code != 32767)
        .map(|code| format!("EPSG:{}", code))
}

/// Geoid sampler backed by a GeoTIFF file.
///
/// # Example
///
/// ```ignore
/// use geoconv::{GeoidSampler, Resampling, TiffGeoidSampler};
///
/// let sampler = TiffGeoidSampler::new("/data/egm2008.tif", Resampling::Nearest);
/// let n = sampler.sample(-20.16, 57.5)?;
/// println!("Geoid separation: {:.3}m", n);
/// ```
pub struct TiffGeoidSampler {
    path: PathBuf,
    resampling: Resampling,
    /// Single-slot cache of the model's metadata.
    metadata_cache: Cache<PathBuf, Arc<RasterMetadata>>,
}

impl TiffGeoidSampler {
    /// Create a sampler for the model at `path`. The file is not opened until
    /// the first sample.
    pub fn new<P: AsRef<Path>>(path: P, resampling: Resampling) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            resampling,
            metadata_cache: Cache::builder().max_capacity(1).build(),
        }
    }

    /// Metadata of the model, from the cache or read from disk.
    pub fn metadata(&self) -> Result<Arc<RasterMetadata>> {
        Ok(GeoidRaster::open(&self.path, &self.metadata_cache)?.metadata)
    }

    fn open(&self) -> Result<GeoidRaster> {
        GeoidRaster::open(&self.path, &self.metadata_cache)
    }
}

impl GeoidSampler for TiffGeoidSampler {
    fn sample(&self, lat: f64, lon: f64) -> Result<f64> {
        validate_lat_lon(lat, lon)?;
        tracing::debug!(lat, lon, path = %self.path.display(), "Sampling geoid height");

        let mut raster = self.open()?;
        raster.sample(lat, lon, self.resampling)
    }

    fn sample_bulk(&self, coords: &[(f64, f64)]) -> Result<Vec<Result<f64>>> {
        if coords.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(count = coords.len(), path = %self.path.display(), "Bulk sampling geoid heights");

        let mut raster = self.open()?;
        let results: Vec<Result<f64>> = coords
            .iter()
            .map(|&(lat, lon)| {
                validate_lat_lon(lat, lon)?;
                raster.sample(lat, lon, self.resampling)
            })
            .collect();

        tracing::debug!(
            sampled = results.iter().filter(|r| r.is_ok()).count(),
            chunks_decoded = raster.chunks.len(),
            "Bulk sampling complete"
        );

        Ok(results)
    }

    fn model_info(&self) -> Result<GeoidModelInfo> {
        let mut raster = self.open()?;
        let metadata = raster.metadata.clone();
        let file_size = std::fs::metadata(&self.path)?.len();

        let bounds = metadata.bounds();
        let center_lat = (bounds.south + bounds.north) / 2.0;
        let center_lon = (bounds.west + bounds.east) / 2.0;
        let sample_value = match raster.sample(center_lat, center_lon, Resampling::Nearest) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(error = %e, "Could not sample test point from geoid model");
                None
            }
        };

        tracing::info!(path = %self.path.display(), "Geoid model validation successful");

        Ok(GeoidModelInfo {
            file_path: self.path.display().to_string(),
            file_size_mb: file_size as f64 / (1024.0 * 1024.0),
            width: metadata.width,
            height: metadata.height,
            bands: 1,
            bounds,
            resolution: metadata.resolution(),
            crs: metadata.crs.clone(),
            dtype: metadata.data_type.clone(),
            nodata: metadata.nodata,
            valid: true,
            sample_value,
        })
    }

    fn model_path(&self) -> &Path {
        &self.path
    }

    fn clear_cache(&self) {
        self.metadata_cache.invalidate_all();
        tracing::debug!("Geoid dataset cache cleared");
    }
}
