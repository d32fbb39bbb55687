//! Run configuration from defaults, the environment and `.env`
//!
//! Command-line flags are applied on top by the binary.

use crate::errors::{AqGridError, Result};
use crate::parallel::ParallelConfig;
use crate::raster::NetCdfProvider;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DATA_DIR: &str = "pm25_data";
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

pub const ENV_DATA_DIR: &str = "AQGRID_DATA_DIR";
pub const ENV_VARIABLE: &str = "AQGRID_VARIABLE";
pub const ENV_CACHE_CAPACITY: &str = "AQGRID_CACHE_CAPACITY";
pub const ENV_THREADS: &str = "AQGRID_THREADS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Directory holding the PM2.5 NetCDF files
    pub data_dir: PathBuf,
    /// Concentration variable override
    pub variable: Option<String>,
    /// Grids kept in memory by the LRU cache
    pub cache_capacity: usize,
    /// Worker threads; `None` uses every core
    pub threads: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            variable: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            threads: None,
        }
    }
}

impl RunConfig {
    /// Defaults overridden by the process environment, after loading `.env`
    /// from the working directory if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Config`] for a malformed numeric value.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Config`] for a malformed numeric value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let threads = parse_var::<usize>(ENV_THREADS, non_empty(ENV_THREADS))?;
        if threads == Some(0) {
            return Err(AqGridError::Config(format!("{ENV_THREADS} must be at least 1")));
        }

        Ok(Self {
            data_dir: non_empty(ENV_DATA_DIR).map_or(defaults.data_dir, PathBuf::from),
            variable: non_empty(ENV_VARIABLE),
            cache_capacity: parse_var(ENV_CACHE_CAPACITY, non_empty(ENV_CACHE_CAPACITY))?
                .unwrap_or(defaults.cache_capacity),
            threads,
        })
    }

    pub fn parallel(&self) -> ParallelConfig {
        ParallelConfig::new(self.threads)
    }

    /// NetCDF provider over [`Self::data_dir`]
    pub fn provider(&self) -> NetCdfProvider {
        NetCdfProvider::new(&self.data_dir).with_variable(self.variable.clone())
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| AqGridError::Config(format!("{key}='{v}' is not a valid number")))
        })
        .transpose()
}
