//! aqgrid: regional statistics of gridded air-quality rasters
//!
//! aqgrid loads polygon regions from GeoJSON, optionally groups or merges them,
//! rasterizes each region onto a PM2.5 concentration grid and computes count,
//! mean, population standard deviation, min and max of the covered cells.
//!
//! ## Key Features
//!
//! - **Parallel Processing**: one Rayon task per region on a bounded pool, with
//!   results returned in a deterministic order
//! - **Grouping**: per polygon, by one or more attributes, or all combined
//! - **Partial failure**: a region that cannot be projected, repaired or
//!   unioned is reported as failed while the others are still computed
//! - **NetCDF input**: annual and monthly satellite composites, with an
//!   explicit LRU cache of loaded grids
//! - **Outputs**: CSV, JSON or a printed table
//!
//! ## Module Organization
//!
//! - [`geometry`]: GeoJSON loading, CRS handling and geometry repair
//! - [`attributes`]: attribute values and grouping keys
//! - [`grouping`]: turning polygon records into analysis regions
//! - [`raster`]: grids, providers and the NetCDF reader
//! - [`mask`]: rasterizing regions into cell masks
//! - [`statistics`]: numerically stable, parallel aggregation
//! - [`report`]: result table assembly and writers
//! - [`pipeline`]: the orchestrating state machine
//! - [`parallel`]: worker pool configuration
//! - [`config`]: run configuration
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use aqgrid::prelude::*;
//! use std::path::Path;
//!
//! let provider = NetCdfProvider::new("pm25_data");
//! let report = aqgrid::pipeline::aggregate(
//!     &provider,
//!     Path::new("states.geojson"),
//!     2019,
//!     None,
//!     &["state".to_string()],
//!     false,
//! )
//! .unwrap();
//!
//! for row in &report.rows {
//!     println!("{} -> {:?}", row.key, row.stats.mean);
//! }
//! ```

// Core modules
pub mod attributes;
pub mod config;
pub mod errors;
pub mod geometry;
pub mod grouping;
pub mod mask;
pub mod parallel;
pub mod pipeline;
pub mod raster;
pub mod report;
pub mod statistics;

pub mod cli;

// Direct re-exports for the public API
pub use errors::*;
pub use pipeline::aggregate;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::attributes::{AttrValue, AttributeTable, GroupKey};
    pub use crate::errors::{AqGridError, FailedRegion, RegionError, Result};
    pub use crate::geometry::{load_regions, Crs, PolygonRecord};
    pub use crate::grouping::{AnalysisRegion, GroupingMode};
    pub use crate::parallel::ParallelConfig;
    pub use crate::pipeline::{PipelineState, RegionalAggregator};
    pub use crate::raster::{
        CachedProvider, GeoTransform, MemoryProvider, NetCdfProvider, RasterGrid, RasterProvider,
        TimeSelection,
    };
    pub use crate::report::{AggregationReport, ResultRow};
    pub use crate::statistics::RegionStats;
}
