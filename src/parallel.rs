//! Parallel processing configuration and management
//!
//! Region tasks run on a Rayon pool built per run, so a library caller's global
//! pool is never reconfigured.

use crate::errors::{AqGridError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker count; `None` means one per available core
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self { num_threads: Some(num_cpus::get()) }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self { num_threads: Some(num_threads) }
    }

    /// Number of workers the pool will have
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Build a bounded pool for one run.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::ThreadPool`] if `num_threads` is zero or the pool
    /// cannot be created.
    pub fn build_pool(&self) -> Result<ThreadPool> {
        if self.num_threads == Some(0) {
            return Err(AqGridError::ThreadPool("thread count must be at least 1".into()));
        }
        let num_threads = self.effective_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("aqgrid-worker-{i}"))
            .build()
            .map_err(|e| {
                AqGridError::ThreadPool(format!(
                    "Failed to initialize thread pool with {num_threads} threads: {e}"
                ))
            })?;
        log::debug!("Built worker pool with {num_threads} threads");
        Ok(pool)
    }
}

/// Get information about the current parallel configuration
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    /// Log parallel processing information at debug level
    pub fn log_info(&self) {
        log::debug!(
            "Parallel processing: {} current threads, {} CPU cores, parallelism {}",
            self.current_threads,
            self.available_cores,
            self.available_parallelism
        );
    }
}
