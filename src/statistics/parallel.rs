//! Parallel reduction of masked grid cells
//!
//! Rows are split into fixed-size chunks that are reduced in parallel and then
//! merged in chunk order. The chunking does not depend on the number of
//! threads, so results are bit-for-bit identical between runs.

use super::operations::{RegionStats, StatsAccumulator};
use crate::errors::{AqGridError, Result};
use crate::mask::CellMask;
use crate::raster::RasterGrid;
use ndarray::{s, ArrayView2, Axis};
use rayon::prelude::*;

/// Rows per parallel work item
pub const CHUNK_ROWS: usize = 64;

/// Statistics of the cells where `mask` is set and the value is valid for `grid`.
///
/// Only the window stored in the mask is visited.
///
/// # Errors
///
/// Returns [`AqGridError::Aggregation`] if the mask and grid shapes differ.
pub fn aggregate_masked(grid: &RasterGrid, mask: &CellMask) -> Result<RegionStats> {
    if mask.dim() != grid.shape() {
        return Err(AqGridError::Aggregation(format!(
            "mask shape {:?} does not match grid shape {:?}",
            mask.dim(),
            grid.shape()
        )));
    }
    let values = grid.values().slice(s![mask.rows(), mask.cols()]);
    let acc = parallel_masked_accumulate(values, mask.window(), |v| grid.is_valid_value(v));
    Ok(acc.finish())
}

/// Accumulate `values` where `mask` is set and `is_valid` holds.
///
/// Callers must pass arrays of equal shape.
pub fn parallel_masked_accumulate<F>(
    values: ArrayView2<'_, f64>,
    mask: ArrayView2<'_, bool>,
    is_valid: F,
) -> StatsAccumulator
where
    F: Fn(f64) -> bool + Sync,
{
    let rows = values.len_of(Axis(0));
    let partials: Vec<StatsAccumulator> = (0..rows.div_ceil(CHUNK_ROWS))
        .into_par_iter()
        .map(|chunk| {
            let span = chunk * CHUNK_ROWS..((chunk + 1) * CHUNK_ROWS).min(rows);
            let value_rows = values.slice(s![span.clone(), ..]);
            let mask_rows = mask.slice(s![span, ..]);
            let mut acc = StatsAccumulator::new();
            for (&value, &inside) in value_rows.iter().zip(mask_rows.iter()) {
                if inside && is_valid(value) {
                    acc.push(value);
                }
            }
            acc
        })
        .collect();

    partials.iter().fold(StatsAccumulator::new(), |mut total, part| {
        total.merge(part);
        total
    })
}
