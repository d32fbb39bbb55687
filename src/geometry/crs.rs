//! Coordinate reference systems and polygon reprojection
//!
//! Only a small catalogue of EPSG codes is understood (geographic WGS84/NAD83,
//! Web Mercator and the UTM families). A CRS outside that catalogue can still be
//! carried around, but any attempt to transform it fails with
//! [`AqGridError::Projection`].

use crate::errors::{AqGridError, Result};
use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::{proj::Proj, transform::transform};
use std::fmt;

/// A coordinate reference system
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Crs {
    /// Identified by EPSG code
    Epsg(u32),
    /// Explicit PROJ.4 definition
    Proj4(String),
}

impl Crs {
    /// Geographic WGS84 longitude/latitude (the satellite grid's CRS)
    #[must_use]
    pub const fn wgs84() -> Self {
        Self::Epsg(4326)
    }

    /// Parse a CRS name as found in legacy GeoJSON `crs` members or on the CLI.
    ///
    /// Accepts `EPSG:4326`, `urn:ogc:def:crs:EPSG::4326`, `urn:ogc:def:crs:OGC:1.3:CRS84`
    /// and raw PROJ.4 strings starting with `+proj=`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.starts_with("+proj=") {
            return Some(Self::Proj4(name.to_string()));
        }
        let upper = name.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Self::wgs84());
        }
        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG"))?;
        code.parse().ok().map(Self::Epsg)
    }

    /// PROJ.4 definition for this CRS.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Projection`] for EPSG codes outside the catalogue.
    pub fn proj4_definition(&self) -> Result<String> {
        let definition = match self {
            Self::Proj4(def) => def.clone(),
            Self::Epsg(4326) => "+proj=longlat +datum=WGS84 +no_defs +type=crs".to_string(),
            Self::Epsg(4269) => "+proj=longlat +datum=NAD83 +no_defs +type=crs".to_string(),
            Self::Epsg(3857) => {
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs"
                    .to_string()
            }
            Self::Epsg(code @ 32601..=32660) => {
                format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs", code - 32600)
            }
            Self::Epsg(code @ 32701..=32760) => format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs",
                code - 32700
            ),
            Self::Epsg(code @ 26901..=26923) => {
                format!("+proj=utm +zone={} +datum=NAD83 +units=m +no_defs +type=crs", code - 26900)
            }
            Self::Epsg(code) => {
                return Err(AqGridError::Projection(format!("unsupported CRS EPSG:{code}")))
            }
        };
        Ok(definition)
    }

    /// Whether coordinates are longitude/latitude degrees
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        match self {
            Self::Epsg(code) => matches!(code, 4326 | 4269),
            Self::Proj4(def) => def.contains("+proj=longlat") || def.contains("+proj=latlong"),
        }
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epsg(code) => write!(f, "EPSG:{code}"),
            Self::Proj4(def) => f.write_str(def),
        }
    }
}

/// Precompiled transform between two CRSs
pub struct Reprojector {
    from: Proj,
    to: Proj,
    from_geographic: bool,
    to_geographic: bool,
    label: String,
}

impl Reprojector {
    /// Build a transform from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Projection`] if either CRS is unsupported or its
    /// definition cannot be parsed.
    pub fn new(source: &Crs, target: &Crs) -> Result<Self> {
        let build = |crs: &Crs| -> Result<Proj> {
            let definition = crs.proj4_definition()?;
            Proj::from_proj_string(&definition).map_err(|e| {
                AqGridError::Projection(format!("failed to build PROJ.4 '{definition}': {e}"))
            })
        };

        Ok(Self {
            from: build(source)?,
            to: build(target)?,
            from_geographic: source.is_geographic(),
            to_geographic: target.is_geographic(),
            label: format!("{source} -> {target}"),
        })
    }

    /// Transform one coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`AqGridError::Projection`] if the point cannot be transformed.
    pub fn transform_coord(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        // proj4rs works in radians on geographic systems
        let mut point = if self.from_geographic {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        } else {
            (coord.x, coord.y, 0.0)
        };

        transform(&self.from, &self.to, &mut point).map_err(|e| {
            AqGridError::Projection(format!(
                "transform {} failed at ({:.6}, {:.6}): {e}",
                self.label, coord.x, coord.y
            ))
        })?;

        let out = if self.to_geographic {
            Coord { x: point.0.to_degrees(), y: point.1.to_degrees() }
        } else {
            Coord { x: point.0, y: point.1 }
        };

        if out.x.is_finite() && out.y.is_finite() {
            Ok(out)
        } else {
            Err(AqGridError::Projection(format!(
                "transform {} produced a non-finite coordinate for ({:.6}, {:.6})",
                self.label, coord.x, coord.y
            )))
        }
    }

    /// Transform every vertex of a polygon set.
    ///
    /// # Errors
    ///
    /// Fails on the first vertex that cannot be transformed.
    pub fn reproject(&self, shape: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>> {
        shape.try_map_coords(|coord| self.transform_coord(coord))
    }
}

/// Reproject `shape` from `source` into `target`, skipping the work when both agree.
///
/// # Errors
///
/// Returns [`AqGridError::Projection`] when the transform cannot be built or applied.
pub fn reproject_multipolygon(
    shape: &MultiPolygon<f64>,
    source: &Crs,
    target: &Crs,
) -> Result<MultiPolygon<f64>> {
    if source == target {
        return Ok(shape.clone());
    }
    Reprojector::new(source, target)?.reproject(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_crs_names() {
        assert_eq!(Crs::parse("EPSG:3857"), Some(Crs::Epsg(3857)));
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::32643"), Some(Crs::Epsg(32643)));
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84"), Some(Crs::wgs84()));
        assert_eq!(Crs::parse("not a crs"), None);
    }

    #[test]
    fn unsupported_epsg_is_a_projection_error() {
        let err = Crs::Epsg(9999).proj4_definition().unwrap_err();
        assert!(matches!(err, AqGridError::Projection(_)));
        assert!(Reprojector::new(&Crs::Epsg(9999), &Crs::wgs84()).is_err());
    }

    #[test]
    fn web_mercator_round_trips_to_degrees() {
        let to_merc = Reprojector::new(&Crs::wgs84(), &Crs::Epsg(3857)).unwrap();
        let merc = to_merc.transform_coord(Coord { x: 90.0, y: 0.0 }).unwrap();
        assert!((merc.x - 10_018_754.171_394_622).abs() < 1e-3);
        assert!(merc.y.abs() < 1e-6);

        let back = Reprojector::new(&Crs::Epsg(3857), &Crs::wgs84()).unwrap();
        let geo = back.transform_coord(merc).unwrap();
        assert!((geo.x - 90.0).abs() < 1e-9);
        assert!(geo.y.abs() < 1e-9);
    }
}
