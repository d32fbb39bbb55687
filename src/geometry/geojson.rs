use super::{Crs, PolygonRecord};
use crate::attributes::{AttrValue, AttributeTable};
use crate::errors::{AqGridError, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Read polygon records from a GeoJSON file.
///
/// Accepts a `FeatureCollection`, a single `Feature`, or a bare `Polygon` /
/// `MultiPolygon` geometry. Geometries are returned exactly as written; no
/// validity repair happens here.
///
/// # Errors
///
/// Returns [`AqGridError::InvalidInput`] if the file cannot be read or parsed,
/// holds no features, or holds a feature that is not a polygon or multipolygon.
pub fn load_regions(path: &Path) -> Result<Vec<PolygonRecord>> {
    let bytes = fs::read(path).map_err(|e| {
        AqGridError::InvalidInput(format!("cannot read region file {}: {e}", path.display()))
    })?;
    let records = parse_regions(&bytes)
        .map_err(|e| match e {
            AqGridError::InvalidInput(msg) => {
                AqGridError::InvalidInput(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
    log::info!("Loaded {} polygon record(s) from {}", records.len(), path.display());
    Ok(records)
}

/// Parse polygon records from GeoJSON bytes. See [`load_regions`].
///
/// # Errors
///
/// Same conditions as [`load_regions`], minus the file access.
pub fn parse_regions(bytes: &[u8]) -> Result<Vec<PolygonRecord>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| AqGridError::InvalidInput(format!("not valid JSON: {e}")))?;

    let source_crs = parse_crs_member(&value)?;

    let records = match value["type"].as_str() {
        Some("FeatureCollection") => {
            let features = value["features"].as_array().ok_or_else(|| {
                AqGridError::InvalidInput("FeatureCollection without a 'features' array".into())
            })?;
            features
                .iter()
                .enumerate()
                .map(|(idx, feature)| parse_feature(idx, feature, &source_crs))
                .collect::<Result<Vec<_>>>()?
        }
        Some("Feature") => vec![parse_feature(0, &value, &source_crs)?],
        Some("Polygon" | "MultiPolygon") => vec![PolygonRecord::new(
            parse_geometry(0, &value)?,
            AttributeTable::new(),
            source_crs,
        )],
        Some(other) => {
            return Err(AqGridError::InvalidInput(format!(
                "unsupported GeoJSON type '{other}'"
            )))
        }
        None => return Err(AqGridError::InvalidInput("missing GeoJSON 'type' member".into())),
    };

    if records.is_empty() {
        return Err(AqGridError::InvalidInput("region source contains zero features".into()));
    }
    Ok(records)
}

/// Legacy GeoJSON (2008) `crs` member; RFC 7946 files are always WGS84.
fn parse_crs_member(value: &Value) -> Result<Crs> {
    let Some(name) = value["crs"]["properties"]["name"].as_str() else {
        return Ok(Crs::wgs84());
    };
    Crs::parse(name)
        .ok_or_else(|| AqGridError::InvalidInput(format!("unrecognised CRS name '{name}'")))
}

fn parse_feature(idx: usize, feature: &Value, source_crs: &Crs) -> Result<PolygonRecord> {
    if feature["type"].as_str() != Some("Feature") {
        return Err(AqGridError::InvalidInput(format!("feature {idx} is not a GeoJSON Feature")));
    }

    let geometry = &feature["geometry"];
    if geometry.is_null() {
        return Err(AqGridError::InvalidInput(format!("feature {idx} has no geometry")));
    }

    let attributes: AttributeTable = feature["properties"]
        .as_object()
        .map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                .collect()
        })
        .unwrap_or_default();

    Ok(PolygonRecord::new(parse_geometry(idx, geometry)?, attributes, source_crs.clone()))
}

fn parse_geometry(idx: usize, geometry: &Value) -> Result<MultiPolygon<f64>> {
    let coords = geometry["coordinates"].as_array();
    match (geometry["type"].as_str(), coords) {
        (Some("Polygon"), Some(rings)) => Ok(MultiPolygon(vec![parse_polygon(idx, rings)?])),
        (Some("MultiPolygon"), Some(polygons)) => polygons
            .iter()
            .map(|poly| {
                let rings = poly.as_array().ok_or_else(|| invalid_coords(idx))?;
                parse_polygon(idx, rings)
            })
            .collect::<Result<Vec<_>>>()
            .map(MultiPolygon),
        (Some("Polygon" | "MultiPolygon"), None) => Err(invalid_coords(idx)),
        (Some(other), _) => Err(AqGridError::InvalidInput(format!(
            "feature {idx} has geometry type '{other}', expected Polygon or MultiPolygon"
        ))),
        (None, _) => Err(AqGridError::InvalidInput(format!("feature {idx} has an untyped geometry"))),
    }
}

/// Rings are `[exterior, hole, hole, ...]`
fn parse_polygon(idx: usize, rings: &[Value]) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|ring| {
        let ring = ring.as_array().ok_or_else(|| invalid_coords(idx))?;
        parse_ring(idx, ring)
    });
    let exterior = rings
        .next()
        .ok_or_else(|| AqGridError::InvalidInput(format!("feature {idx} has a polygon without rings")))??;
    let interiors = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(idx: usize, positions: &[Value]) -> Result<LineString<f64>> {
    let mut points = positions
        .iter()
        .map(|position| {
            let xy = position.as_array().filter(|p| p.len() >= 2).ok_or_else(|| invalid_coords(idx))?;
            match (xy[0].as_f64(), xy[1].as_f64()) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(invalid_coords(idx)),
            }
        })
        .collect::<Result<Vec<_>>>()?;

    // Ensure ring is closed (first point == last point)
    if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
        if first != last {
            points.push(first);
        }
    }
    Ok(LineString(points))
}

fn invalid_coords(idx: usize) -> AqGridError {
    AqGridError::InvalidInput(format!("feature {idx} has malformed coordinates"))
}
