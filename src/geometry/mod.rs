//! Vector regions: loading, CRS handling and topology helpers
//!
//! - [`geojson`]: reads GeoJSON region files into [`PolygonRecord`]s
//! - [`crs`]: CRS catalogue and reprojection through `proj4rs`
//! - [`topology`]: validity checks, zero-buffer repair and unions

pub mod crs;
pub mod geojson;
pub mod topology;

pub use crs::{reproject_multipolygon, Crs, Reprojector};
pub use geojson::{load_regions, parse_regions};

use crate::attributes::AttributeTable;
use geo::MultiPolygon;

/// One input region as loaded from a vector file. Immutable after load.
#[derive(Debug, Clone)]
pub struct PolygonRecord {
    geometry: MultiPolygon<f64>,
    attributes: AttributeTable,
    source_crs: Crs,
}

impl PolygonRecord {
    /// Polygons are stored as single-part multipolygons.
    pub fn new(geometry: MultiPolygon<f64>, attributes: AttributeTable, source_crs: Crs) -> Self {
        Self { geometry, attributes, source_crs }
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    pub fn source_crs(&self) -> &Crs {
        &self.source_crs
    }
}
