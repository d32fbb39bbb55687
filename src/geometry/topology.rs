//! Validity checks, zero-distance-buffer repair and unions
//!
//! Boolean operations are run behind `catch_unwind`: a degenerate input can make
//! the overlay panic, and that must only fail the region being processed.

use crate::errors::{AqGridError, Result};
use geo::{BooleanOps, CoordsIter, MultiPolygon, Validation};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// All vertices are finite numbers
pub fn has_finite_coords(shape: &MultiPolygon<f64>) -> bool {
    shape.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}

/// OGC validity plus finite coordinates
pub fn is_valid(shape: &MultiPolygon<f64>) -> bool {
    has_finite_coords(shape) && shape.is_valid()
}

fn guarded<F>(what: &str, op: F) -> Result<MultiPolygon<f64>>
where
    F: FnOnce() -> MultiPolygon<f64>,
{
    let out = catch_unwind(AssertUnwindSafe(op))
        .map_err(|_| AqGridError::Geometry(format!("{what} aborted on degenerate input")))?;
    if has_finite_coords(&out) {
        Ok(out)
    } else {
        Err(AqGridError::Geometry(format!("{what} produced non-finite coordinates")))
    }
}

/// Repair a geometry the way a zero-distance buffer does: re-node the rings and
/// rebuild the covered area.
///
/// # Errors
///
/// Returns [`AqGridError::Geometry`] if the input has non-finite vertices, the
/// overlay fails, or the repaired geometry collapses to nothing.
pub fn repair(shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
    if !has_finite_coords(shape) {
        return Err(AqGridError::Geometry("geometry has non-finite coordinates".into()));
    }
    let empty = MultiPolygon::<f64>::new(Vec::new());
    let repaired = guarded("repair", || shape.union(&empty))?;
    if repaired.0.is_empty() {
        return Err(AqGridError::Geometry("geometry collapses to empty after repair".into()));
    }
    Ok(repaired)
}

/// Union of all shapes.
///
/// # Errors
///
/// Returns [`AqGridError::InvalidInput`] for an empty slice and
/// [`AqGridError::Geometry`] for non-finite input or when the overlay fails.
pub fn union_all(shapes: &[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>> {
    if !shapes.iter().all(|shape| has_finite_coords(shape)) {
        return Err(AqGridError::Geometry("union input has non-finite coordinates".into()));
    }
    match shapes {
        [] => Err(AqGridError::InvalidInput("union of zero geometries".into())),
        [single] => Ok((*single).clone()),
        [first, rest @ ..] => guarded("union", || {
            rest.iter().fold((*first).clone(), |acc, shape| acc.union(*shape))
        }),
    }
}

/// Union that retries once on repaired inputs.
///
/// # Errors
///
/// Returns the error of the second attempt, or the repair error of the first
/// member that could not be repaired.
pub fn union_with_repair(shapes: &[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>> {
    union_with_retry(shapes, union_all)
}

/// Run `union`, and once more on repaired inputs if it fails with a geometry error.
fn union_with_retry<F>(shapes: &[&MultiPolygon<f64>], union: F) -> Result<MultiPolygon<f64>>
where
    F: Fn(&[&MultiPolygon<f64>]) -> Result<MultiPolygon<f64>>,
{
    match union(shapes) {
        Ok(union) => Ok(union),
        Err(AqGridError::Geometry(first)) => {
            log::debug!("union failed ({first}), retrying on repaired members");
            let repaired = shapes
                .iter()
                .map(|shape| repair(shape))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&MultiPolygon<f64>> = repaired.iter().collect();
            union(&refs)
        }
        Err(other) => Err(other),
    }
}
