//! NetCDF-backed raster provider for the satellite PM2.5 product
//!
//! Files live in a local data directory and follow the product naming scheme
//! `V6GL02.04.CNNPM25.GL.{YYYY}01-{YYYY}12.nc` for annual composites and
//! `V6GL02.04.CNNPM25.GL.{YYYY}{MM}-{YYYY}{MM}.nc` for monthly ones.

use super::grid::{GeoTransform, RasterGrid, TimeSelection};
use super::provider::RasterProvider;
use crate::errors::{AqGridError, Result};
use crate::geometry::Crs;
use ndarray::Array2;
use netcdf::{AttributeValue, File, Variable};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Product prefix of the annual and monthly files
pub const FILE_PREFIX: &str = "V6GL02.04.CNNPM25.GL";

/// Concentration variables, in order of preference
pub const VARIABLE_CANDIDATES: [&str; 2] = ["PM25", "GWRPM25"];

const COORDINATE_PAIRS: [(&str, &str); 2] = [("latitude", "longitude"), ("lat", "lon")];

/// A raster file found in the data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Reads PM2.5 grids from NetCDF files in a data directory
#[derive(Debug, Clone)]
pub struct NetCdfProvider {
    data_dir: PathBuf,
    variable: Option<String>,
}

impl NetCdfProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), variable: None }
    }

    /// Read `variable` instead of detecting the concentration variable
    #[must_use]
    pub fn with_variable(mut self, variable: Option<String>) -> Self {
        self.variable = variable;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File name of the composite for `selection`
    pub fn file_name(selection: TimeSelection) -> String {
        let year = selection.year();
        match selection.month() {
            Some(m) => format!("{FILE_PREFIX}.{year}{m:02}-{year}{m:02}.nc"),
            None => format!("{FILE_PREFIX}.{year}01-{year}12.nc"),
        }
    }

    pub fn path_for(&self, selection: TimeSelection) -> PathBuf {
        self.data_dir.join(Self::file_name(selection))
    }

    /// NetCDF files present in the data directory, sorted by name. A missing
    /// directory holds no files.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Io`] if the directory cannot be listed.
    pub fn list_cached_files(&self) -> Result<Vec<CachedFile>> {
        if !self.data_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("nc") || !path.is_file() {
                continue;
            }
            files.push(CachedFile {
                name: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: entry.metadata()?.len(),
                path,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Delete every NetCDF file in the data directory. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Io`] if listing or removal fails.
    pub fn clear_cache(&self) -> Result<usize> {
        let files = self.list_cached_files()?;
        for file in &files {
            fs::remove_file(&file.path)?;
        }
        log::info!("Removed {} file(s) from {}", files.len(), self.data_dir.display());
        Ok(files.len())
    }
}

impl RasterProvider for NetCdfProvider {
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>> {
        let path = self.path_for(selection);
        if !path.is_file() {
            return Err(AqGridError::DataUnavailable(format!(
                "no PM2.5 file for {selection}: {} not found",
                path.display()
            )));
        }
        log::info!("Reading {selection} grid from {}", path.display());
        let grid = read_grid(&path, self.variable.as_deref()).map_err(|e| {
            if matches!(e, AqGridError::VariableNotFound { .. } | AqGridError::InvalidInput(_)) {
                AqGridError::DataUnavailable(format!("{}: {e}", path.display()))
            } else {
                e
            }
        })?;
        Ok(Arc::new(grid))
    }
}

/// Load the concentration grid of one NetCDF file.
///
/// The variable must have a latitude and a longitude dimension, in either
/// order; any other dimension must have length 1. Rows follow latitude, columns
/// longitude, both in file order.
///
/// # Errors
///
/// - [`AqGridError::VariableNotFound`] if no concentration variable exists
/// - [`AqGridError::InvalidInput`] for missing or irregular coordinates
/// - [`AqGridError::NetCDF`] for read failures
pub fn read_grid(path: &Path, variable: Option<&str>) -> Result<RasterGrid> {
    let file = netcdf::open(path)?;
    let var = find_variable(&file, variable)?;

    let dim_names: Vec<String> = var.dimensions().iter().map(|d| d.name().to_string()).collect();
    let shape: Vec<usize> = var.dimensions().iter().map(netcdf::Dimension::len).collect();

    let (lat_name, lon_name) = COORDINATE_PAIRS
        .iter()
        .find(|(lat, lon)| dim_names.iter().any(|d| d == lat) && dim_names.iter().any(|d| d == lon))
        .ok_or_else(|| {
            AqGridError::InvalidInput(format!(
                "could not find latitude/longitude dimensions on '{}' (dimensions: {})",
                var.name(),
                dim_names.join(", ")
            ))
        })?;

    let lat_axis = position(&dim_names, lat_name);
    let lon_axis = position(&dim_names, lon_name);
    for (axis, (name, len)) in dim_names.iter().zip(&shape).enumerate() {
        if axis != lat_axis && axis != lon_axis && *len != 1 {
            return Err(AqGridError::InvalidInput(format!(
                "dimension '{name}' of '{}' has length {len}; select a single time step",
                var.name()
            )));
        }
    }

    let lats = read_axis(&file, lat_name)?;
    let lons = read_axis(&file, lon_name)?;
    let (n_lat, n_lon) = (shape[lat_axis], shape[lon_axis]);
    if lats.len() != n_lat || lons.len() != n_lon {
        return Err(AqGridError::InvalidInput(
            "coordinate variables do not match the data dimensions".into(),
        ));
    }

    let data: Vec<f64> = var.get_values::<f64, _>(..)?;
    let values = if lat_axis < lon_axis {
        Array2::from_shape_vec((n_lat, n_lon), data)?
    } else {
        Array2::from_shape_vec((n_lon, n_lat), data)?
            .reversed_axes()
            .as_standard_layout()
            .into_owned()
    };

    let transform = GeoTransform::from_axis_centers(&lons, &lats)?;
    let nodata = fill_value(&var);
    log::debug!(
        "Grid '{}' {}x{} step ({}, {}) nodata {:?}",
        var.name(),
        n_lat,
        n_lon,
        transform.dx,
        transform.dy,
        nodata
    );
    Ok(RasterGrid::new(values, Crs::wgs84(), transform, nodata))
}

fn position(names: &[String], name: &str) -> usize {
    names.iter().position(|n| n == name).unwrap_or_default()
}

fn find_variable<'f>(file: &'f File, requested: Option<&str>) -> Result<Variable<'f>> {
    let candidates: Vec<&str> = match requested {
        Some(name) => vec![name],
        None => VARIABLE_CANDIDATES.to_vec(),
    };
    candidates
        .iter()
        .find_map(|name| file.variable(name))
        .ok_or_else(|| AqGridError::VariableNotFound {
            var: candidates.join(" or "),
            available: file.variables().map(|v| v.name()).collect::<Vec<_>>().join(", "),
        })
}

fn read_axis(file: &File, name: &str) -> Result<Vec<f64>> {
    let var = file.variable(name).ok_or_else(|| {
        AqGridError::InvalidInput(format!("coordinate variable '{name}' is missing"))
    })?;
    Ok(var.get_values::<f64, _>(..)?)
}

/// `_FillValue`, else `missing_value`
fn fill_value(var: &Variable<'_>) -> Option<f64> {
    ["_FillValue", "missing_value"].iter().find_map(|attr_name| {
        let value = var.attribute(attr_name)?.value().ok()?;
        match value {
            AttributeValue::Float(v) => Some(f64::from(v)),
            AttributeValue::Double(v) => Some(v),
            AttributeValue::Short(v) => Some(f64::from(v)),
            AttributeValue::Int(v) => Some(f64::from(v)),
            _ => None,
        }
    })
}
