//! Centralized error handling for aqgrid
//!
//! Two families of errors exist:
//!
//! - [`AqGridError`] aborts a run. It covers unreadable or empty region sources,
//!   rasters that cannot be supplied and contract violations between a grid and
//!   a mask.
//! - [`RegionError`] only affects one analysis region. The pipeline records it
//!   in a [`FailedRegion`] and carries on with the sibling regions.

use crate::attributes::GroupKey;
use serde::Serialize;
use thiserror::Error;

/// Main error type for aqgrid operations
#[derive(Debug, Error)]
pub enum AqGridError {
    /// Malformed, unreadable or empty geometry source
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The requested year/month grid cannot be supplied
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// CRS definition or coordinate transform failure
    #[error("Projection error: {0}")]
    Projection(String),

    /// Geometry could not be repaired or combined
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Grid and mask disagree; indicates a bug rather than bad input
    #[error("Aggregation error: {0}")]
    Aggregation(String),

    /// Variable not found in a NetCDF file
    #[error("Variable '{var}' not found in file (available: {available})")]
    VariableNotFound { var: String, available: String },

    /// NetCDF file operation errors
    #[error("NetCDF error: {0}")]
    NetCDF(#[from] netcdf::Error),

    /// I/O operation errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Array shape or dimension error
    #[error("Array error: {0}")]
    Array(#[from] ndarray::ShapeError),

    /// Thread pool configuration error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// Invalid run configuration (environment or flags)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AqGridError {
    /// Whether this error must abort the whole pipeline.
    ///
    /// Projection and geometry errors are scoped to a single region and are
    /// turned into [`RegionError`]s before they reach the orchestrator.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Projection(_) | Self::Geometry(_))
    }
}

/// Result type alias for aqgrid operations
pub type Result<T> = std::result::Result<T, AqGridError>;

/// Failure confined to one analysis region
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum RegionError {
    /// The union of the member geometries failed, even after repair
    #[error("union of member geometries failed: {0}")]
    Union(String),

    /// The region could not be brought into the raster's CRS
    #[error("projection failed: {0}")]
    Projection(String),

    /// The region geometry is invalid and could not be repaired
    #[error("geometry repair failed: {0}")]
    Geometry(String),
}

impl From<AqGridError> for RegionError {
    fn from(error: AqGridError) -> Self {
        match error {
            AqGridError::Projection(msg) => Self::Projection(msg),
            AqGridError::Geometry(msg) => Self::Geometry(msg),
            other => Self::Geometry(other.to_string()),
        }
    }
}

/// A region that was excluded from the results, with the reason
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRegion {
    /// Position of the region in the resolver's output order
    pub index: usize,
    /// Grouping key of the region (empty outside group-by mode)
    pub key: GroupKey,
    pub error: RegionError,
}

impl FailedRegion {
    pub fn new(index: usize, key: GroupKey, error: RegionError) -> Self {
        Self { index, key, error }
    }
}
