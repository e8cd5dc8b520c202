use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use geoconv::Resampling;
use std::path::PathBuf;

mod commands;

/// WGS84 / UTM Zone 40S coordinate and height conversion tool
#[derive(Parser)]
#[command(name = "geoconv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the geoid model GeoTIFF (e.g. EGM2008)
    #[arg(short, long, env = "GEOID_PATH", global = true)]
    geoid_path: Option<PathBuf>,

    /// Geoid sampling method
    #[arg(
        short,
        long,
        env = "GEOID_RESAMPLING",
        default_value = "nearest",
        global = true
    )]
    resampling: Resampling,

    #[command(subcommand)]
    command: Commands,
}

/// Conversion direction for batch files.
#[derive(Clone, Copy, ValueEnum)]
pub enum BatchDirection {
    /// latitude, longitude[, ellipsoid_height] → UTM Zone 40S
    ToUtm,
    /// easting, northing[, orthometric_height] → WGS84
    ToWgs84,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a WGS84 coordinate to UTM Zone 40S with orthometric height
    ToUtm {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Ellipsoidal height in meters
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        height: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Convert a UTM Zone 40S coordinate to WGS84 with ellipsoidal height
    ToWgs84 {
        /// Easting in meters
        #[arg(long)]
        easting: f64,

        /// Northing in meters
        #[arg(long)]
        northing: f64,

        /// Orthometric height in meters
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        height: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Convert every row of a CSV or XLSX file
    Batch {
        /// Input file (.csv or .xlsx)
        input: PathBuf,

        /// Output CSV file (defaults to <input>_converted.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Conversion direction
        #[arg(short, long, value_enum, default_value = "to-utm")]
        direction: BatchDirection,
    },

    /// Display information about the geoid model
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ToUtm {
            lat,
            lon,
            height,
            json,
        } => commands::convert::to_utm(cli.geoid_path, cli.resampling, lat, lon, height, json),
        Commands::ToWgs84 {
            easting,
            northing,
            height,
            json,
        } => commands::convert::to_wgs84(
            cli.geoid_path,
            cli.resampling,
            easting,
            northing,
            height,
            json,
        ),
        Commands::Batch {
            input,
            output,
            direction,
        } => commands::batch::run(cli.geoid_path, cli.resampling, input, output, direction),
        Commands::Info => commands::info::run(cli.geoid_path, cli.resampling),
    }
}
