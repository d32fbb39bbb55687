//! Raster grids and the providers that supply them
//!
//! - [`grid`]: [`RasterGrid`], its affine [`GeoTransform`] and [`TimeSelection`]
//! - [`provider`]: the [`RasterProvider`] trait, an LRU cache and an in-memory provider
//! - [`netcdf`]: the PM2.5 NetCDF file provider

pub mod grid;
pub mod netcdf;
pub mod provider;

pub use self::grid::{GeoTransform, RasterGrid, TimeSelection};
pub use self::netcdf::{read_grid, CachedFile, NetCdfProvider};
pub use self::provider::{CachedProvider, MemoryProvider, RasterProvider};
