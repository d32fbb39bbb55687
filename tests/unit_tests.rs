//! Unit tests for the aqgrid modules
//!
//! These cover each stage on its own: loading, grouping, masking,
//! aggregation, reporting and configuration.

use aqgrid::{
    attributes::{AttrValue, GroupKey},
    config::RunConfig,
    errors::{AqGridError, RegionError, Result},
    geometry::{parse_regions, Crs},
    grouping::{resolve_regions, GroupingMode},
    mask::{mask_region, rasterize, CellMask},
    parallel::{get_parallel_info, ParallelConfig},
    raster::{GeoTransform, MemoryProvider, RasterGrid, TimeSelection},
    report::{format_table, write_csv, write_json, write_report},
    statistics::{aggregate_masked, StatField},
    pipeline::RegionalAggregator,
};
use geo::{polygon, MultiPolygon};
use ndarray::Array2;
use std::collections::HashMap;
use tempfile::tempdir;

const TOLERANCE: f64 = 1e-9;

/// `rows` x `cols` grid of unit cells whose south-west corner is (0, 0)
fn grid_of(values: Array2<f64>, nodata: Option<f64>) -> RasterGrid {
    let rows = values.nrows() as f64;
    let transform = GeoTransform::new(0.0, 1.0, rows, -1.0).expect("valid transform");
    RasterGrid::new(values, Crs::wgs84(), transform, nodata)
}

fn square_feature(name: &str, state: Option<&str>, x: f64, y: f64, size: f64) -> String {
    let state = state.map_or("null".to_string(), |s| format!("\"{s}\""));
    format!(
        r#"{{"type":"Feature","properties":{{"name":"{name}","state":{state}}},
            "geometry":{{"type":"Polygon","coordinates":[[[{x},{y}],[{x1},{y}],[{x1},{y1}],[{x},{y1}],[{x},{y}]]]}}}}"#,
        x1 = x + size,
        y1 = y + size,
    )
}

fn collection(features: &[String]) -> String {
    format!(r#"{{"type":"FeatureCollection","features":[{}]}}"#, features.join(","))
}

#[test]
fn test_error_types() {
    let err = AqGridError::InvalidInput("empty".to_string());
    assert_eq!(err.to_string(), "Invalid input: empty");
    assert!(err.is_fatal());

    assert!(!AqGridError::Projection("x".to_string()).is_fatal());
    assert!(!AqGridError::Geometry("x".to_string()).is_fatal());
    assert!(AqGridError::DataUnavailable("x".to_string()).is_fatal());
    assert!(AqGridError::Aggregation("x".to_string()).is_fatal());

    let var_err = AqGridError::VariableNotFound {
        var: "PM25".to_string(),
        available: "lat, lon".to_string(),
    };
    assert!(var_err.to_string().contains("Variable 'PM25' not found"));

    let region: RegionError = AqGridError::Projection("EPSG:9999".to_string()).into();
    assert_eq!(region, RegionError::Projection("EPSG:9999".to_string()));
}

#[test]
fn test_parallel_config() {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());
    assert!(default_config.effective_threads() > 0);

    let config_2 = ParallelConfig::with_threads(2);
    assert_eq!(config_2.num_threads, Some(2));
    let pool = config_2.build_pool().expect("pool with 2 threads");
    assert_eq!(pool.current_num_threads(), 2);

    let all_cores = ParallelConfig::all_cores();
    assert!(all_cores.num_threads.unwrap() > 0);

    assert!(matches!(
        ParallelConfig::with_threads(0).build_pool(),
        Err(AqGridError::ThreadPool(_))
    ));
}

#[test]
fn test_parallel_info() {
    let info = get_parallel_info();
    assert!(info.current_threads > 0);
    assert!(info.available_cores > 0);
    assert!(info.available_parallelism > 0);
    info.log_info();
}

#[test]
fn test_geojson_loading() -> Result<()> {
    let json = collection(&[
        square_feature("a", Some("X"), 0.0, 0.0, 1.0),
        square_feature("b", None, 2.0, 0.0, 1.0),
    ]);
    let records = parse_regions(json.as_bytes())?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].attributes().get("name"), Some(&AttrValue::from("a")));
    assert_eq!(records[1].attributes().get("state"), Some(&AttrValue::Null));
    assert_eq!(records[0].source_crs(), &Crs::wgs84());

    // Attribute order follows the file
    let keys: Vec<&str> = records[0].attributes().keys().map(String::as_str).collect();
    assert_eq!(keys, ["name", "state"]);
    Ok(())
}

#[test]
fn test_geojson_rejects_bad_sources() {
    let empty = r#"{"type":"FeatureCollection","features":[]}"#;
    assert!(matches!(parse_regions(empty.as_bytes()), Err(AqGridError::InvalidInput(_))));

    let point = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{},"geometry":{"type":"Point","coordinates":[0,0]}}]}"#;
    assert!(matches!(parse_regions(point.as_bytes()), Err(AqGridError::InvalidInput(_))));

    assert!(matches!(parse_regions(b"not json"), Err(AqGridError::InvalidInput(_))));
}

#[test]
fn test_geojson_legacy_crs_member() -> Result<()> {
    let json = r#"{"type":"FeatureCollection",
        "crs":{"type":"name","properties":{"name":"urn:ogc:def:crs:EPSG::3857"}},
        "features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}}]}"#;
    let records = parse_regions(json.as_bytes())?;
    assert_eq!(records[0].source_crs(), &Crs::Epsg(3857));
    Ok(())
}

#[test]
fn test_grouping_first_seen_order() -> Result<()> {
    let json = collection(&[
        square_feature("a", Some("B"), 0.0, 0.0, 1.0),
        square_feature("b", Some("A"), 1.0, 0.0, 1.0),
        square_feature("c", Some("B"), 2.0, 0.0, 1.0),
        square_feature("d", None, 3.0, 0.0, 1.0),
    ]);
    let records = parse_regions(json.as_bytes())?;
    let mode = GroupingMode::GroupBy(vec!["state".to_string()]);
    let resolution = resolve_regions(&records, &mode)?;

    assert!(resolution.failed.is_empty());
    let keys: Vec<String> = resolution.regions.iter().map(|r| r.key().to_string()).collect();
    assert_eq!(keys, ["(B)", "(A)", "(null)"]);
    let members: Vec<usize> = resolution.regions.iter().map(|r| r.member_count()).collect();
    assert_eq!(members, [2, 1, 1]);
    assert_eq!(
        resolution.regions[0].attributes().get("state"),
        Some(&AttrValue::from("B"))
    );
    Ok(())
}

#[test]
fn test_grouping_unknown_attribute() -> Result<()> {
    let records = parse_regions(collection(&[square_feature("a", None, 0.0, 0.0, 1.0)]).as_bytes())?;
    let mode = GroupingMode::GroupBy(vec!["district".to_string()]);
    match resolve_regions(&records, &mode) {
        Err(AqGridError::InvalidInput(msg)) => {
            assert!(msg.contains("district"));
            assert!(msg.contains("name"));
        }
        other => panic!("Expected InvalidInput, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_grouping_empty_input() {
    assert!(matches!(
        resolve_regions(&[], &GroupingMode::Combine),
        Err(AqGridError::InvalidInput(_))
    ));
}

#[test]
fn test_combine_mode_single_region() -> Result<()> {
    let json = collection(&[
        square_feature("a", None, 0.0, 0.0, 1.0),
        square_feature("b", None, 2.0, 2.0, 1.0),
    ]);
    let records = parse_regions(json.as_bytes())?;
    let resolution = resolve_regions(&records, &GroupingMode::Combine)?;
    assert_eq!(resolution.regions.len(), 1);
    let region = &resolution.regions[0];
    assert!(region.key().is_empty());
    assert!(region.attributes().is_empty());
    assert_eq!(region.member_count(), 2);
    assert_eq!(region.geometry().0.len(), 2);
    Ok(())
}

#[test]
fn test_four_by_four_example() -> Result<()> {
    let mut values = Array2::from_elem((4, 4), 10.0);
    values[[0, 0]] = -999.0;
    let grid = grid_of(values, Some(-999.0));

    let full = MultiPolygon::new(vec![polygon![
        (x: 0.0, y: 0.0), (x: 4.0, y: 0.0), (x: 4.0, y: 4.0), (x: 0.0, y: 4.0), (x: 0.0, y: 0.0),
    ]]);
    let mask = rasterize(&full, &grid);
    assert_eq!(mask.count(), 16);

    let stats = aggregate_masked(&grid, &mask)?;
    assert_eq!(stats.count, 15);
    assert!((stats.mean.unwrap() - 10.0).abs() < TOLERANCE);
    assert!(stats.std.unwrap().abs() < TOLERANCE);
    assert_eq!(stats.min, Some(10.0));
    assert_eq!(stats.max, Some(10.0));
    Ok(())
}

#[test]
fn test_single_cell_has_null_std() -> Result<()> {
    let grid = grid_of(Array2::from_elem((3, 3), 7.5), None);
    let mut cells = Array2::from_elem((3, 3), false);
    cells[[1, 1]] = true;
    let mask = CellMask::from_array(cells);
    let stats = aggregate_masked(&grid, &mask)?;
    assert_eq!(stats.count, 1);
    assert_eq!(stats.mean, Some(7.5));
    assert_eq!(stats.std, None);
    Ok(())
}

#[test]
fn test_nan_cells_are_skipped() -> Result<()> {
    let mut values = Array2::from_elem((2, 2), 4.0);
    values[[0, 1]] = f64::NAN;
    values[[1, 0]] = f64::INFINITY;
    let grid = grid_of(values, None);
    let stats = aggregate_masked(&grid, &CellMask::from_array(Array2::from_elem((2, 2), true)))?;
    assert_eq!(stats.count, 2);
    assert_eq!(stats.get(StatField::Count), Some(2.0));
    Ok(())
}

#[test]
fn test_mask_shape_mismatch_is_fatal() {
    let grid = grid_of(Array2::zeros((4, 4)), None);
    let err = aggregate_masked(&grid, &CellMask::from_array(Array2::from_elem((3, 3), true))).unwrap_err();
    assert!(matches!(err, AqGridError::Aggregation(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_large_grid_aggregates_only_the_region_window() -> Result<()> {
    let values = Array2::from_shape_fn((400, 600), |(r, c)| (r * 1000 + c) as f64);
    let grid = grid_of(values, None);
    let square = MultiPolygon::new(vec![polygon![
        (x: 100.0, y: 50.0), (x: 102.0, y: 50.0), (x: 102.0, y: 52.0), (x: 100.0, y: 52.0), (x: 100.0, y: 50.0),
    ]]);
    let mask = rasterize(&square, &grid);
    assert_eq!(mask.dim(), (400, 600));
    assert!(mask.window().len() <= 9);

    // Rows 348 and 349, columns 100 and 101
    let stats = aggregate_masked(&grid, &mask)?;
    assert_eq!(stats.count, 4);
    assert_eq!(stats.min, Some(348_100.0));
    assert_eq!(stats.max, Some(349_101.0));
    assert!((stats.mean.unwrap() - 348_600.5).abs() < TOLERANCE);

    let full = aggregate_masked(&grid, &CellMask::from_array(mask.to_array()))?;
    assert_eq!(full, stats);
    Ok(())
}

#[test]
fn test_unsupported_crs_fails_region() -> Result<()> {
    let json = r#"{"type":"FeatureCollection",
        "crs":{"type":"name","properties":{"name":"EPSG:9999"}},
        "features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}}]}"#;
    let records = parse_regions(json.as_bytes())?;
    let resolution = resolve_regions(&records, &GroupingMode::PerPolygon)?;
    let grid = grid_of(Array2::zeros((2, 2)), None);
    let err = mask_region(&resolution.regions[0], &grid).unwrap_err();
    assert!(matches!(err, RegionError::Projection(_)));
    Ok(())
}

#[test]
fn test_web_mercator_region_is_reprojected() -> Result<()> {
    // Roughly the square (0..2, 0..2) degrees expressed in EPSG:3857 metres
    let json = r#"{"type":"FeatureCollection",
        "crs":{"type":"name","properties":{"name":"EPSG:3857"}},
        "features":[{"type":"Feature","properties":{},
            "geometry":{"type":"Polygon","coordinates":[[[0,0],[222638.98,0],[222638.98,222684.21],[0,222684.21],[0,0]]]}}]}"#;
    let records = parse_regions(json.as_bytes())?;
    let resolution = resolve_regions(&records, &GroupingMode::PerPolygon)?;
    let grid = grid_of(Array2::zeros((4, 4)), None);
    let mask = mask_region(&resolution.regions[0], &grid).expect("reprojected mask");
    assert_eq!(mask.count(), 4);
    assert!(mask[[2, 0]] && mask[[3, 1]]);
    Ok(())
}

fn sample_report(per_polygon: bool) -> Result<aqgrid::report::AggregationReport> {
    let json = collection(&[
        square_feature("west", Some("A"), 0.0, 0.0, 2.0),
        square_feature("east", Some("A"), 2.0, 0.0, 2.0),
    ]);
    let records = parse_regions(json.as_bytes())?;
    let mut values = Array2::from_elem((4, 4), 1.0);
    values.slice_mut(ndarray::s![.., 2..]).fill(3.0);
    let provider = MemoryProvider::uniform(grid_of(values, None));
    let mode = if per_polygon {
        GroupingMode::PerPolygon
    } else {
        GroupingMode::GroupBy(vec!["state".to_string()])
    };
    RegionalAggregator::new(&provider).aggregate_records(&records, TimeSelection::annual(2020), &mode)
}

#[test]
fn test_csv_columns_per_polygon() -> Result<()> {
    let report = sample_report(true)?;
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("out.csv");
    write_csv(&report, &path)?;

    let mut reader = csv::Reader::from_path(&path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    assert_eq!(headers, ["index", "name", "count", "mean", "std", "min", "max"]);

    let rows: Vec<HashMap<String, String>> = reader.deserialize().collect::<std::result::Result<_, _>>()?;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], "west");
    assert_eq!(rows[0]["count"], "4");
    assert_eq!(rows[0]["mean"], "1");
    assert_eq!(rows[1]["mean"], "3");
    Ok(())
}

#[test]
fn test_id_field_labels_per_polygon_rows() -> Result<()> {
    let json = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"name":"west","district_code":"D-01"},
         "geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
        {"type":"Feature","properties":{"name":"east","district_code":"D-02"},
         "geometry":{"type":"Polygon","coordinates":[[[2,0],[4,0],[4,2],[2,2],[2,0]]]}}]}"#;
    let records = parse_regions(json.as_bytes())?;
    let provider = MemoryProvider::uniform(grid_of(Array2::from_elem((4, 4), 1.0), None));
    let report = RegionalAggregator::new(&provider)
        .aggregate_records(&records, TimeSelection::annual(2020), &GroupingMode::PerPolygon)?;
    assert_eq!(report.label_column(), Some("name"));

    let report = report.with_id_field(Some("district_code".to_string()));
    assert_eq!(report.label_column(), Some("district_code"));
    assert_eq!(report.columns()[..2], ["index", "district_code"]);
    let records = report.records();
    assert_eq!(records[0][1], "D-01");
    assert_eq!(records[1][1], "D-02");

    // A field no row carries falls back to the default labels
    let report = report.with_id_field(Some("missing".to_string()));
    assert_eq!(report.label_column(), Some("name"));
    Ok(())
}

#[test]
fn test_csv_columns_group_by() -> Result<()> {
    let report = sample_report(false)?;
    assert_eq!(report.columns(), ["state", "count", "mean", "std", "min", "max"]);
    let records = report.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][0], "A");
    assert_eq!(records[0][1], "8");
    assert_eq!(records[0][2], "2");
    Ok(())
}

#[test]
fn test_json_report() -> Result<()> {
    let report = sample_report(false)?;
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("out.json");
    write_json(&report, &path)?;

    let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    assert_eq!(value["selection"]["year"], 2020);
    assert!(value["selection"]["month"].is_null());
    assert_eq!(value["group_by"][0], "state");
    assert_eq!(value["rows"][0]["key"][0], "A");
    assert_eq!(value["rows"][0]["count"], 8);
    assert_eq!(value["rows"][0]["min"], 1.0);
    assert_eq!(value["failed"].as_array().map(Vec::len), Some(0));
    Ok(())
}

#[test]
fn test_write_report_dispatch() -> Result<()> {
    let report = sample_report(true)?;
    let dir = tempdir().expect("Failed to create temp dir");
    assert!(write_report(&report, &dir.path().join("r.CSV")).is_ok());
    assert!(matches!(
        write_report(&report, &dir.path().join("r.parquet")),
        Err(AqGridError::InvalidInput(_))
    ));

    let table = format_table(&report);
    assert!(table.lines().next().unwrap_or_default().contains("count"));
    assert!(table.contains("west"));
    Ok(())
}

#[test]
fn test_group_key_display() {
    assert_eq!(GroupKey::empty().to_string(), "<all>");
    let key = GroupKey::new(vec![AttrValue::from("A"), AttrValue::Null]);
    assert_eq!(key.to_string(), "(A, null)");
}

#[test]
fn test_run_config_from_lookup() -> Result<()> {
    let defaults = RunConfig::from_lookup(|_| None)?;
    assert_eq!(defaults, RunConfig::default());
    assert_eq!(defaults.cache_capacity, 4);

    let env: HashMap<&str, &str> = [
        ("AQGRID_DATA_DIR", "/data/pm25"),
        ("AQGRID_VARIABLE", "GWRPM25"),
        ("AQGRID_CACHE_CAPACITY", "8"),
        ("AQGRID_THREADS", " 3 "),
    ]
    .into_iter()
    .collect();
    let config = RunConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()))?;
    assert_eq!(config.data_dir, std::path::PathBuf::from("/data/pm25"));
    assert_eq!(config.variable.as_deref(), Some("GWRPM25"));
    assert_eq!(config.cache_capacity, 8);
    assert_eq!(config.threads, Some(3));
    assert_eq!(config.parallel().num_threads, Some(3));
    Ok(())
}

#[test]
fn test_run_config_rejects_bad_numbers() {
    let bad = RunConfig::from_lookup(|k| (k == "AQGRID_CACHE_CAPACITY").then(|| "lots".to_string()));
    assert!(matches!(bad, Err(AqGridError::Config(_))));

    let zero = RunConfig::from_lookup(|k| (k == "AQGRID_THREADS").then(|| "0".to_string()));
    assert!(matches!(zero, Err(AqGridError::Config(_))));
}
