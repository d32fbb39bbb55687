//! Georeferenced 2-D grids and their affine transform

use crate::errors::{AqGridError, Result};
use crate::geometry::Crs;
use geo::{coord, Coord, Polygon, Rect};
use ndarray::Array2;
use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// Relative tolerance when checking that coordinate axes are evenly spaced
const SPACING_TOLERANCE: f64 = 1e-3;

/// North-up affine transform mapping `(col, row)` to `(x, y)`.
///
/// `origin` is the outer corner of cell `(0, 0)`. Steps are signed: a grid
/// stored north-to-south has a negative `dy`, one stored south-to-north a
/// positive `dy`. The values are never re-sorted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub dx: f64,
    pub origin_y: f64,
    pub dy: f64,
}

impl GeoTransform {
    /// # Errors
    ///
    /// Returns [`AqGridError::InvalidInput`] if a step is zero or not finite.
    pub fn new(origin_x: f64, dx: f64, origin_y: f64, dy: f64) -> Result<Self> {
        let all_finite = [origin_x, dx, origin_y, dy].iter().all(|v| v.is_finite());
        if !all_finite || dx == 0.0 || dy == 0.0 {
            return Err(AqGridError::InvalidInput(format!(
                "degenerate affine transform (origin {origin_x}, {origin_y}; steps {dx}, {dy})"
            )));
        }
        Ok(Self { origin_x, dx, origin_y, dy })
    }

    /// Build a transform from the cell-centre coordinates of both axes.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::InvalidInput`] if an axis has fewer than two
    /// samples or is not regularly spaced.
    pub fn from_axis_centers(xs: &[f64], ys: &[f64]) -> Result<Self> {
        let dx = regular_step("x", xs)?;
        let dy = regular_step("y", ys)?;
        Self::new(xs[0] - dx / 2.0, dx, ys[0] - dy / 2.0, dy)
    }

    /// Fractional `(col, row)` to `(x, y)`
    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        coord! { x: self.origin_x + col * self.dx, y: self.origin_y + row * self.dy }
    }

    /// `(x, y)` to fractional `(col, row)`
    pub fn invert(&self, point: Coord<f64>) -> (f64, f64) {
        ((point.x - self.origin_x) / self.dx, (point.y - self.origin_y) / self.dy)
    }

    pub fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Footprint of one cell as a closed polygon
    pub fn cell_polygon(&self, row: usize, col: usize) -> Polygon<f64> {
        Rect::new(
            self.apply(col as f64, row as f64),
            self.apply(col as f64 + 1.0, row as f64 + 1.0),
        )
        .to_polygon()
    }

    /// Area of one cell in CRS units
    pub fn cell_area(&self) -> f64 {
        (self.dx * self.dy).abs()
    }
}

fn regular_step(axis: &str, centers: &[f64]) -> Result<f64> {
    if centers.len() < 2 {
        return Err(AqGridError::InvalidInput(format!(
            "{axis} axis needs at least 2 samples, found {}",
            centers.len()
        )));
    }
    let step = (centers[centers.len() - 1] - centers[0]) / (centers.len() - 1) as f64;
    let irregular = centers
        .windows(2)
        .any(|w| ((w[1] - w[0]) - step).abs() > step.abs() * SPACING_TOLERANCE);
    if step == 0.0 || !step.is_finite() || irregular {
        return Err(AqGridError::InvalidInput(format!("{axis} axis is not regularly spaced")));
    }
    Ok(step)
}

/// One (year, month) raster. Read-only once built.
#[derive(Debug, Clone)]
pub struct RasterGrid {
    values: Array2<f64>,
    crs: Crs,
    transform: GeoTransform,
    nodata: Option<f64>,
}

impl RasterGrid {
    /// Rows follow the transform's `y` axis, columns its `x` axis.
    pub fn new(values: Array2<f64>, crs: Crs, transform: GeoTransform, nodata: Option<f64>) -> Self {
        Self { values, crs, transform, nodata }
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// A value counts unless it is NaN, infinite or the nodata sentinel.
    pub fn is_valid_value(&self, value: f64) -> bool {
        value.is_finite() && self.nodata.map_or(true, |nd| value != nd)
    }

    /// Rows and columns of the cells whose footprint touches `bbox`, clipped to
    /// the grid. `None` when the box lies outside the grid.
    pub fn window_for(&self, bbox: &Rect<f64>) -> Option<(Range<usize>, Range<usize>)> {
        let (rows, cols) = self.shape();
        let (c0, r0) = self.transform.invert(bbox.min());
        let (c1, r1) = self.transform.invert(bbox.max());
        let row_range = clip_span(r0, r1, rows)?;
        let col_range = clip_span(c0, c1, cols)?;
        Some((row_range, col_range))
    }
}

fn clip_span(a: f64, b: f64, len: usize) -> Option<Range<usize>> {
    let (lo, hi) = (a.min(b), a.max(b));
    if !lo.is_finite() || !hi.is_finite() || hi < 0.0 || lo > len as f64 {
        return None;
    }
    let start = lo.floor().max(0.0) as usize;
    let mut end = (hi.ceil().min(len as f64)) as usize;
    if end <= start {
        end = start + 1;
    }
    (start < len).then(|| start..end.min(len))
}

/// Which composite to fetch: an annual one, or a single month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeSelection {
    year: i32,
    month: Option<u32>,
}

impl TimeSelection {
    /// # Errors
    ///
    /// Returns [`AqGridError::InvalidInput`] if `month` is outside `1..=12`.
    pub fn new(year: i32, month: Option<u32>) -> Result<Self> {
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(AqGridError::InvalidInput(format!(
                    "month must be between 1 and 12, got {m}"
                )));
            }
        }
        Ok(Self { year, month })
    }

    pub fn annual(year: i32) -> Self {
        Self { year, month: None }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }
}

impl fmt::Display for TimeSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.month {
            Some(m) => write!(f, "{}-{m:02}", self.year),
            None => write!(f, "{}", self.year),
        }
    }
}
