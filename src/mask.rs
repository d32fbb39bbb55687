//! Rasterizing analysis regions onto a grid
//!
//! A cell belongs to a region when its centre falls inside the region. Centre
//! tests are done per row with a scanline (even-odd rule, so holes are
//! honoured). A polygon part smaller than one cell, or one that contains no
//! cell centre at all, falls back to any-overlap: every cell whose footprint
//! shares area with the part is included.

use crate::errors::RegionError;
use crate::geometry::{reproject_multipolygon, topology};
use crate::grouping::AnalysisRegion;
use crate::raster::{GeoTransform, RasterGrid};
use geo::{Area, BoundingRect, MultiPolygon, Polygon, Relate};
use ndarray::{s, Array2, ArrayView2};
use std::ops::{Index, Range};

/// Membership of each grid cell in one region.
///
/// Only the window of rows and columns around the region is stored; every
/// cell outside it is `false`. [`CellMask::dim`] is always the full grid shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellMask {
    shape: (usize, usize),
    rows: Range<usize>,
    cols: Range<usize>,
    cells: Array2<bool>,
}

impl CellMask {
    /// All-`false` mask over a grid of `shape`
    pub fn empty(shape: (usize, usize)) -> Self {
        Self { shape, rows: 0..0, cols: 0..0, cells: Array2::from_elem((0, 0), false) }
    }

    /// Mask whose window is the whole array
    pub fn from_array(cells: Array2<bool>) -> Self {
        let shape = cells.dim();
        Self { shape, rows: 0..shape.0, cols: 0..shape.1, cells }
    }

    fn with_window(shape: (usize, usize), rows: Range<usize>, cols: Range<usize>) -> Self {
        let cells = Array2::from_elem((rows.len(), cols.len()), false);
        Self { shape, rows, cols, cells }
    }

    /// `(rows, cols)` of the grid the mask belongs to
    pub fn dim(&self) -> (usize, usize) {
        self.shape
    }

    /// Grid rows covered by the stored window
    pub fn rows(&self) -> Range<usize> {
        self.rows.clone()
    }

    /// Grid columns covered by the stored window
    pub fn cols(&self) -> Range<usize> {
        self.cols.clone()
    }

    /// The stored window, indexed relative to [`Self::rows`] and [`Self::cols`]
    pub fn window(&self) -> ArrayView2<'_, bool> {
        self.cells.view()
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.local(row, col).map_or(false, |idx| self.cells[idx])
    }

    /// Number of cells set
    pub fn count(&self) -> usize {
        self.cells.iter().filter(|&&m| m).count()
    }

    /// Full-size boolean array
    pub fn to_array(&self) -> Array2<bool> {
        let mut full = Array2::from_elem(self.shape, false);
        full.slice_mut(s![self.rows(), self.cols()]).assign(&self.cells);
        full
    }

    fn local(&self, row: usize, col: usize) -> Option<[usize; 2]> {
        (self.rows.contains(&row) && self.cols.contains(&col))
            .then(|| [row - self.rows.start, col - self.cols.start])
    }

    fn set(&mut self, row: usize, col: usize) {
        if let Some(idx) = self.local(row, col) {
            self.cells[idx] = true;
        }
    }
}

impl Index<[usize; 2]> for CellMask {
    type Output = bool;

    fn index(&self, [row, col]: [usize; 2]) -> &bool {
        match self.local(row, col) {
            Some(idx) => &self.cells[idx],
            None => &false,
        }
    }
}

/// Mask of the cells covered by `region`.
///
/// The geometry is reprojected into the grid's CRS when they differ, then
/// repaired if it is not valid. A region outside the grid gets an all-`false`
/// mask.
///
/// # Errors
///
/// [`RegionError::Projection`] if reprojection fails, [`RegionError::Geometry`]
/// if the geometry cannot be repaired.
pub fn mask_region(region: &AnalysisRegion, grid: &RasterGrid) -> Result<CellMask, RegionError> {
    let shape = prepare_geometry(region, grid)?;
    Ok(rasterize(&shape, grid))
}

/// The region geometry in grid coordinates, valid and non-empty.
///
/// # Errors
///
/// See [`mask_region`].
pub fn prepare_geometry(
    region: &AnalysisRegion,
    grid: &RasterGrid,
) -> Result<MultiPolygon<f64>, RegionError> {
    let shape = reproject_multipolygon(region.geometry(), region.source_crs(), grid.crs())
        .map_err(|e| RegionError::Projection(e.to_string()))?;

    if topology::is_valid(&shape) && !shape.0.is_empty() {
        return Ok(shape);
    }
    log::debug!("Region {} {} is invalid, repairing", region.index(), region.key());
    topology::repair(&shape).map_err(|e| RegionError::Geometry(e.to_string()))
}

/// Mark the cells covered by `shape`, which must already be in grid coordinates.
///
/// The stored window is the part of the grid under the bounding box of `shape`.
pub fn rasterize(shape: &MultiPolygon<f64>, grid: &RasterGrid) -> CellMask {
    let window = shape.bounding_rect().and_then(|bbox| grid.window_for(&bbox));
    let Some((rows, cols)) = window else {
        return CellMask::empty(grid.shape());
    };
    let mut mask = CellMask::with_window(grid.shape(), rows, cols);
    let transform = grid.transform();
    let cell_area = transform.cell_area();

    for part in shape {
        let Some(bbox) = part.bounding_rect() else { continue };
        let Some((rows, cols)) = grid.window_for(&bbox) else { continue };

        let captured = fill_centers(part, transform, rows.clone(), cols.clone(), &mut mask);
        if captured == 0 || part.unsigned_area() < cell_area {
            fill_overlaps(part, transform, rows, cols, &mut mask);
        }
    }
    mask
}

/// Scanline fill of cell centres. Returns how many centres fell inside.
fn fill_centers(
    part: &Polygon<f64>,
    transform: &GeoTransform,
    rows: Range<usize>,
    cols: Range<usize>,
    mask: &mut CellMask,
) -> usize {
    let edges: Vec<(f64, f64, f64, f64)> = std::iter::once(part.exterior())
        .chain(part.interiors())
        .flat_map(|ring| ring.lines())
        .map(|l| (l.start.x, l.start.y, l.end.x, l.end.y))
        .collect();

    let mut captured = 0;
    let mut crossings: Vec<f64> = Vec::new();
    for row in rows {
        let y = transform.cell_center(row, 0).y;
        crossings.clear();
        for &(x1, y1, x2, y2) in &edges {
            if (y1 > y) != (y2 > y) {
                crossings.push(x1 + (y - y1) * (x2 - x1) / (y2 - y1));
            }
        }
        crossings.sort_by(f64::total_cmp);

        for pair in crossings.chunks_exact(2) {
            // Fractional column of each crossing, measured from cell centres
            let a = (pair[0] - transform.origin_x) / transform.dx - 0.5;
            let b = (pair[1] - transform.origin_x) / transform.dx - 0.5;
            let start = clamp_col(a.min(b).ceil(), &cols);
            let end = clamp_col(a.max(b).ceil(), &cols);
            for col in start..end {
                mask.set(row, col);
            }
            captured += end - start;
        }
    }
    captured
}

fn clamp_col(col: f64, cols: &Range<usize>) -> usize {
    col.clamp(cols.start as f64, cols.end as f64) as usize
}

fn fill_overlaps(
    part: &Polygon<f64>,
    transform: &GeoTransform,
    rows: Range<usize>,
    cols: Range<usize>,
    mask: &mut CellMask,
) {
    for row in rows {
        for col in cols.clone() {
            if mask.get(row, col) {
                continue;
            }
            let matrix = part.relate(&transform.cell_polygon(row, col));
            // Sharing only an edge or a corner does not count.
            if matrix.is_intersects() && !matrix.is_touches() {
                mask.set(row, col);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Crs;
    use geo::polygon;

    fn grid(rows: usize, cols: usize) -> RasterGrid {
        // Row 0 is the northern edge at y = rows
        let t = GeoTransform::new(0.0, 1.0, rows as f64, -1.0).unwrap();
        RasterGrid::new(Array2::zeros((rows, cols)), Crs::wgs84(), t, None)
    }

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x0, y: y0), (x: x1, y: y0), (x: x1, y: y1), (x: x0, y: y1), (x: x0, y: y0),
        ]])
    }

    #[test]
    fn centres_inside_are_selected() {
        let g = grid(4, 4);
        let mask = rasterize(&rect(0.0, 0.0, 2.0, 2.0), &g);
        // Southern two rows, western two columns
        assert_eq!(mask.count(), 4);
        assert!(mask[[2, 0]] && mask[[2, 1]] && mask[[3, 0]] && mask[[3, 1]]);
    }

    #[test]
    fn tiny_polygon_falls_back_to_overlap() {
        let g = grid(4, 4);
        let mask = rasterize(&rect(1.1, 1.1, 1.2, 1.2), &g);
        assert_eq!(mask.count(), 1);
        assert!(mask[[2, 1]]);
    }

    #[test]
    fn holes_are_excluded() {
        let g = grid(3, 3);
        let outer = rect(0.0, 0.0, 3.0, 3.0).0.remove(0);
        let hole = rect(1.0, 1.0, 2.0, 2.0).0.remove(0);
        let donut = MultiPolygon::new(vec![Polygon::new(outer.exterior().clone(), vec![hole.exterior().clone()])]);
        let mask = rasterize(&donut, &g);
        assert_eq!(mask.count(), 8);
        assert!(!mask[[1, 1]]);
    }

    #[test]
    fn outside_extent_gives_empty_mask() {
        let g = grid(2, 2);
        let mask = rasterize(&rect(10.0, 10.0, 12.0, 12.0), &g);
        assert_eq!(mask.dim(), (2, 2));
        assert_eq!(mask.count(), 0);
        assert!(mask.to_array().iter().all(|&m| !m));
    }

    #[test]
    fn window_covers_only_the_region() {
        let g = grid(200, 300);
        let mask = rasterize(&rect(10.0, 20.0, 13.0, 22.0), &g);
        assert_eq!(mask.dim(), (200, 300));
        assert_eq!(mask.count(), 6);
        let (rows, cols) = mask.window().dim();
        assert!(rows <= 3 && cols <= 4, "window {rows}x{cols}");
        // Row 178 spans y in 21..22
        assert!(mask[[178, 10]] && mask[[179, 12]]);
        assert!(!mask[[0, 0]] && !mask[[178, 13]]);

        let full = mask.to_array();
        assert_eq!(full.iter().filter(|&&m| m).count(), 6);
        assert!(full[[178, 10]]);
    }
}
