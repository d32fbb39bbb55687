//! Pipeline orchestration
//!
//! ```text
//! LOADING -> GROUPING -> MASKING(i) -> AGGREGATING(i) -> ASSEMBLING -> DONE
//! ```
//!
//! `MASKING(i)`/`AGGREGATING(i)` run once per analysis region, in parallel on a
//! bounded worker pool. Each task only reads the shared grid and returns its
//! own outcome; outcomes are collected in region order. A per-region failure
//! is recorded and does not stop the run. `FAILED` is reached only through a
//! fatal error: an unusable region source, a missing grid, or a grid/mask
//! contract violation.

use crate::errors::{AqGridError, RegionError, Result};
use crate::geometry::{load_regions, PolygonRecord};
use crate::grouping::{resolve_regions, AnalysisRegion, GroupingMode};
use crate::mask::mask_region;
use crate::parallel::ParallelConfig;
use crate::raster::{RasterGrid, RasterProvider, TimeSelection};
use crate::report::{assemble, AggregationReport};
use crate::statistics::{aggregate_masked, RegionStats};
use rayon::prelude::*;
use std::fmt;
use std::path::Path;
use std::sync::Mutex;

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading,
    Grouping,
    Masking(usize),
    Aggregating(usize),
    Assembling,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("IDLE"),
            Self::Loading => f.write_str("LOADING"),
            Self::Grouping => f.write_str("GROUPING"),
            Self::Masking(i) => write!(f, "MASKING({i})"),
            Self::Aggregating(i) => write!(f, "AGGREGATING({i})"),
            Self::Assembling => f.write_str("ASSEMBLING"),
            Self::Done => f.write_str("DONE"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// Runs the whole pipeline against one raster provider
pub struct RegionalAggregator<P> {
    provider: P,
    parallel: ParallelConfig,
    state: Mutex<PipelineState>,
}

impl<P: RasterProvider> RegionalAggregator<P> {
    pub fn new(provider: P) -> Self {
        Self::with_parallel(provider, ParallelConfig::default())
    }

    pub fn with_parallel(provider: P, parallel: ParallelConfig) -> Self {
        Self { provider, parallel, state: Mutex::new(PipelineState::Idle) }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Last pipeline-level state reached. Per-region states are only logged.
    pub fn state(&self) -> PipelineState {
        self.state.lock().map_or(PipelineState::Failed, |s| *s)
    }

    fn transition(&self, next: PipelineState) {
        log::info!("Pipeline state: {next}");
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn fail(&self, error: AqGridError) -> AqGridError {
        log::error!("Pipeline aborted: {error}");
        self.transition(PipelineState::Failed);
        error
    }

    /// Load `regions_path` and aggregate the grid of `selection` over it.
    ///
    /// # Errors
    ///
    /// Fatal errors only: [`AqGridError::InvalidInput`] for an unusable region
    /// source (no raster is fetched in that case), [`AqGridError::DataUnavailable`]
    /// when the grid cannot be supplied, [`AqGridError::Aggregation`] on a
    /// grid/mask mismatch.
    pub fn aggregate(
        &self,
        regions_path: &Path,
        selection: TimeSelection,
        mode: &GroupingMode,
    ) -> Result<AggregationReport> {
        self.transition(PipelineState::Loading);
        let records = load_regions(regions_path).map_err(|e| self.fail(e))?;
        self.aggregate_records(&records, selection, mode)
    }

    /// Same as [`Self::aggregate`], for records that are already loaded.
    ///
    /// # Errors
    ///
    /// See [`Self::aggregate`].
    pub fn aggregate_records(
        &self,
        records: &[PolygonRecord],
        selection: TimeSelection,
        mode: &GroupingMode,
    ) -> Result<AggregationReport> {
        self.transition(PipelineState::Grouping);
        let resolution = resolve_regions(records, mode).map_err(|e| self.fail(e))?;

        let grid = self.provider.get_grid(selection).map_err(|e| self.fail(e))?;
        let (rows, cols) = grid.shape();
        log::info!(
            "Processing {} region(s) against a {rows}x{cols} grid for {selection}",
            resolution.regions.len()
        );

        let pool = self.parallel.build_pool().map_err(|e| self.fail(e))?;
        let outcomes = pool
            .install(|| {
                resolution
                    .regions
                    .par_iter()
                    .map(|region| process_region(region, &grid))
                    .collect::<Result<Vec<_>>>()
            })
            .map_err(|e| self.fail(e))?;

        self.transition(PipelineState::Assembling);
        let report = assemble(selection, mode, &resolution.regions, outcomes, resolution.failed)
            .map_err(|e| self.fail(e))?;

        self.transition(PipelineState::Done);
        log::info!(
            "Computed {} region(s), {} failed",
            report.rows.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

/// Mask and aggregate one region. The outer error is fatal, the inner one only
/// fails this region.
fn process_region(
    region: &AnalysisRegion,
    grid: &RasterGrid,
) -> Result<std::result::Result<RegionStats, RegionError>> {
    let index = region.index();
    log::debug!("Region {index} {}: {}", region.key(), PipelineState::Masking(index));
    let mask = match mask_region(region, grid) {
        Ok(mask) => mask,
        Err(error) => {
            log::warn!("Region {index} {} excluded: {error}", region.key());
            return Ok(Err(error));
        }
    };

    log::debug!("Region {index} {}: {}", region.key(), PipelineState::Aggregating(index));
    let stats = aggregate_masked(grid, &mask)?;
    log::debug!("Region {index} {}: {} valid cell(s)", region.key(), stats.count);
    Ok(Ok(stats))
}

/// One-call entry point.
///
/// `month = None` selects the annual composite. Grouping attributes take
/// precedence over `combine`.
///
/// # Errors
///
/// [`AqGridError::InvalidInput`] for a month outside `1..=12`, otherwise see
/// [`RegionalAggregator::aggregate`].
pub fn aggregate<P: RasterProvider>(
    provider: P,
    regions_path: &Path,
    year: i32,
    month: Option<u32>,
    group_by: &[String],
    combine: bool,
) -> Result<AggregationReport> {
    let selection = TimeSelection::new(year, month)?;
    let mode = GroupingMode::from_options(group_by, combine);
    RegionalAggregator::new(provider).aggregate(regions_path, selection, &mode)
}
