//! Defines command-line interface options using `clap` for the aqgrid application.

use clap::Parser;
use std::path::PathBuf;

/// Regional PM2.5 statistics from satellite NetCDF grids
#[derive(Parser, Debug)]
#[command(
    version,
    name = "aqgrid",
    about = "Aggregate gridded PM2.5 concentrations over GeoJSON regions"
)]
pub struct Args {
    /// GeoJSON file with the polygon regions
    #[arg(short, long, required_unless_present_any = ["list_cache", "clear_cache"])]
    pub regions: Option<PathBuf>,

    /// Year of the composite
    #[arg(short, long, required_unless_present_any = ["list_cache", "clear_cache"])]
    pub year: Option<i32>,

    /// Month (1-12); omit for the annual composite
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..=12))]
    pub month: Option<u32>,

    /// Attribute(s) to group polygons by, e.g. `state,district` or repeated flags
    #[arg(short, long, value_delimiter = ',', value_parser = parse_attribute_name, conflicts_with = "combine")]
    pub group_by: Vec<String>,

    /// Merge all polygons into one region
    #[arg(short, long)]
    pub combine: bool,

    /// Attribute that labels each row when polygons are not grouped [default: NAME_1, then name]
    #[arg(long, value_parser = parse_attribute_name)]
    pub id_field: Option<String>,

    /// Directory with the NetCDF files [env: AQGRID_DATA_DIR, default: pm25_data]
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Concentration variable to read instead of PM25/GWRPM25
    #[arg(long)]
    pub variable: Option<String>,

    /// Save the result as .csv or .json. If not set, prints to terminal.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Number of threads to use for parallel processing. Defaults to number of CPU cores.
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// List the NetCDF files in the data directory
    #[arg(long)]
    pub list_cache: bool,

    /// Delete the NetCDF files in the data directory
    #[arg(long, conflicts_with = "list_cache")]
    pub clear_cache: bool,
}

fn parse_attribute_name(s: &str) -> Result<String, String> {
    let name = s.trim();
    if name.is_empty() {
        Err("Invalid format: attribute names must not be empty".to_string())
    } else {
        Ok(name.to_string())
    }
}
