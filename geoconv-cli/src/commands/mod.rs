pub mod batch;
pub mod convert;
pub mod info;

use anyhow::{Context, Result};
use geoconv::{Converter, ConverterBuilder, Resampling};
use std::path::PathBuf;

/// Build the converter from CLI options, falling back to the environment.
pub fn build_converter(geoid_path: Option<PathBuf>, resampling: Resampling) -> Result<Converter> {
    let builder = match geoid_path {
        Some(path) => ConverterBuilder::new(path),
        None => ConverterBuilder::from_env()
            .context("GEOID_PATH environment variable not set. Use --geoid-path or set GEOID_PATH")?,
    };

    builder
        .resampling(resampling)
        .build()
        .context("Failed to create converter")
}
