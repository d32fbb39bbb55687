//! Sources of raster grids
//!
//! The pipeline fetches exactly one grid per run through [`RasterProvider`].
//! Caching is explicit: wrap any provider in a [`CachedProvider`] to keep the
//! most recently used grids in memory.

use super::grid::{RasterGrid, TimeSelection};
use crate::errors::{AqGridError, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Supplies the grid for a (year, month) selection
pub trait RasterProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`AqGridError::DataUnavailable`] when no grid exists for
    /// `selection`.
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>>;
}

impl<P: RasterProvider + ?Sized> RasterProvider for &P {
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>> {
        (**self).get_grid(selection)
    }
}

impl<P: RasterProvider + ?Sized> RasterProvider for Arc<P> {
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>> {
        (**self).get_grid(selection)
    }
}

impl<P: RasterProvider + ?Sized> RasterProvider for Box<P> {
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>> {
        (**self).get_grid(selection)
    }
}

/// Least-recently-used cache in front of another provider
pub struct CachedProvider<P> {
    inner: P,
    capacity: usize,
    // Front is least recently used.
    entries: Mutex<IndexMap<TimeSelection, Arc<RasterGrid>>>,
}

impl<P: RasterProvider> CachedProvider<P> {
    /// A capacity of zero disables caching.
    pub fn new(inner: P, capacity: usize) -> Self {
        Self { inner, capacity, entries: Mutex::new(IndexMap::new()) }
    }

    /// Number of grids currently held
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached grid
    pub fn clear(&self) {
        self.lock().clear();
    }

    // Entries are only inserted or removed whole, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, IndexMap<TimeSelection, Arc<RasterGrid>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: RasterProvider> RasterProvider for CachedProvider<P> {
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>> {
        if self.capacity == 0 {
            return self.inner.get_grid(selection);
        }

        {
            let mut entries = self.lock();
            if let Some(grid) = entries.shift_remove(&selection) {
                log::debug!("Raster cache hit for {selection}");
                entries.insert(selection, Arc::clone(&grid));
                return Ok(grid);
            }
        }

        // The lock is not held while reading from the inner provider.
        let grid = self.inner.get_grid(selection)?;

        let mut entries = self.lock();
        entries.insert(selection, Arc::clone(&grid));
        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                log::debug!("Raster cache evicted {evicted}");
            }
        }
        Ok(grid)
    }
}

/// Grids held in memory, keyed by selection. Counts every fetch.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    grids: HashMap<TimeSelection, Arc<RasterGrid>>,
    fallback: Option<Arc<RasterGrid>>,
    fetches: AtomicUsize,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that answers every selection with `grid`
    pub fn uniform(grid: RasterGrid) -> Self {
        Self { fallback: Some(Arc::new(grid)), ..Self::default() }
    }

    #[must_use]
    pub fn with_grid(mut self, selection: TimeSelection, grid: RasterGrid) -> Self {
        self.grids.insert(selection, Arc::new(grid));
        self
    }

    /// How many times [`RasterProvider::get_grid`] has been called
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl RasterProvider for MemoryProvider {
    fn get_grid(&self, selection: TimeSelection) -> Result<Arc<RasterGrid>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.grids
            .get(&selection)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| AqGridError::DataUnavailable(format!("no grid loaded for {selection}")))
    }
}
