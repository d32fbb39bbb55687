//! Assembling region statistics into an ordered result table, and writing it out
//!
//! The table keeps the order produced by the group resolver. Regions that
//! failed are listed separately so a missing row is never mistaken for a
//! zero-valued one.

use crate::attributes::{AttrValue, AttributeTable, GroupKey};
use crate::errors::{AqGridError, FailedRegion, RegionError, Result};
use crate::grouping::{AnalysisRegion, GroupingMode};
use crate::raster::TimeSelection;
use crate::statistics::{RegionStats, StatField};
use chrono::Utc;
use serde::Serialize;
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Attributes used to label rows in per-polygon mode when no id field is set,
/// in order of preference
pub const LABEL_ATTRIBUTES: [&str; 2] = ["NAME_1", "name"];

/// Statistics of one analysis region
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub index: usize,
    pub key: GroupKey,
    pub attributes: AttributeTable,
    pub member_count: usize,
    #[serde(flatten)]
    pub stats: RegionStats,
}

/// Ordered result table of one run
#[derive(Debug, Clone, Serialize)]
pub struct AggregationReport {
    pub selection: TimeSelection,
    pub group_by: Vec<String>,
    pub combine: bool,
    /// Preferred label attribute of per-polygon rows
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
    pub generated_at: String,
    pub rows: Vec<ResultRow>,
    pub failed: Vec<FailedRegion>,
}

impl AggregationReport {
    /// Label per-polygon rows with `id_field` where the rows carry it
    #[must_use]
    pub fn with_id_field(mut self, id_field: Option<String>) -> Self {
        self.id_field = id_field;
        self
    }

    /// The single row of a combined run
    pub fn combined(&self) -> Option<&ResultRow> {
        match self.rows.as_slice() {
            [row] if self.combine => Some(row),
            _ => None,
        }
    }

    /// Keys of the regions that could not be computed
    pub fn failed_keys(&self) -> Vec<&GroupKey> {
        self.failed.iter().map(|f| &f.key).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Attribute used to label per-polygon rows: the id field, then
    /// [`LABEL_ATTRIBUTES`], whichever some row carries first
    pub fn label_column(&self) -> Option<&str> {
        if self.combine || !self.group_by.is_empty() {
            return None;
        }
        let carried = |name: &str| self.rows.iter().any(|r| r.attributes.contains_key(name));
        if let Some(field) = self.id_field.as_deref().filter(|f| carried(f)) {
            return Some(field);
        }
        LABEL_ATTRIBUTES.into_iter().find(|name| carried(name))
    }

    /// Column headers of the tabular outputs
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = if !self.group_by.is_empty() {
            self.group_by.clone()
        } else if self.combine {
            Vec::new()
        } else {
            let mut c = vec!["index".to_string()];
            c.extend(self.label_column().map(str::to_string));
            c
        };
        columns.extend(StatField::ALL.iter().map(|f| f.as_str().to_string()));
        columns
    }

    /// One tabular record per row, empty strings for missing values
    pub fn records(&self) -> Vec<Vec<String>> {
        let label = self.label_column();
        self.rows
            .iter()
            .map(|row| {
                let mut record: Vec<String> = if !self.group_by.is_empty() {
                    row.key.values().iter().map(AttrValue::to_string).collect()
                } else if self.combine {
                    Vec::new()
                } else {
                    let mut r = vec![row.index.to_string()];
                    if let Some(name) = label {
                        r.push(row.attributes.get(name).map(AttrValue::to_string).unwrap_or_default());
                    }
                    r
                };
                record.extend(StatField::ALL.iter().map(|f| format_stat(row.stats.get(*f))));
                record
            })
            .collect()
    }
}

fn format_stat(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Zip regions with their outcomes, in region order.
///
/// `outcomes[i]` belongs to `regions[i]`. Regions that failed earlier, while
/// grouping, are passed in `failed` and merged into the failure list.
///
/// # Errors
///
/// Returns [`AqGridError::Aggregation`] if the two slices differ in length.
pub fn assemble(
    selection: TimeSelection,
    mode: &GroupingMode,
    regions: &[AnalysisRegion],
    outcomes: Vec<std::result::Result<RegionStats, RegionError>>,
    mut failed: Vec<FailedRegion>,
) -> Result<AggregationReport> {
    if regions.len() != outcomes.len() {
        return Err(AqGridError::Aggregation(format!(
            "{} regions but {} outcomes",
            regions.len(),
            outcomes.len()
        )));
    }

    let mut rows = Vec::with_capacity(regions.len());
    for (region, outcome) in regions.iter().zip(outcomes) {
        match outcome {
            Ok(stats) => rows.push(ResultRow {
                index: region.index(),
                key: region.key().clone(),
                attributes: region.attributes().clone(),
                member_count: region.member_count(),
                stats,
            }),
            Err(error) => failed.push(FailedRegion::new(region.index(), region.key().clone(), error)),
        }
    }
    rows.sort_by_key(|r| r.index);
    failed.sort_by_key(|f| f.index);

    Ok(AggregationReport {
        selection,
        group_by: mode.group_columns().to_vec(),
        combine: matches!(mode, GroupingMode::Combine),
        id_field: None,
        generated_at: Utc::now().to_rfc3339(),
        rows,
        failed,
    })
}

/// Pretty-printed JSON
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_json(report: &AggregationReport, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// CSV with the grouping columns followed by `count,mean,std,min,max`
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_csv(report: &AggregationReport, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(report.columns())?;
    for record in report.records() {
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `report` in the format given by the extension of `path` (`.json` or `.csv`).
///
/// # Errors
///
/// Returns [`AqGridError::InvalidInput`] for any other extension.
pub fn write_report(report: &AggregationReport, path: &Path) -> Result<()> {
    let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => write_json(report, path),
        Some("csv") => write_csv(report, path),
        _ => Err(AqGridError::InvalidInput(format!(
            "unsupported output format for {}; use .csv or .json",
            path.display()
        ))),
    }
}

/// Aligned plain-text table, followed by the failed regions if any
pub fn format_table(report: &AggregationReport) -> String {
    let columns = report.columns();
    let records = report.records();
    let widths: Vec<usize> = (0..columns.len())
        .map(|i| {
            records
                .iter()
                .map(|r| r[i].len())
                .chain(std::iter::once(columns[i].len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut out = String::new();
    let line = |cells: &[String], out: &mut String| {
        let padded: Vec<String> =
            cells.iter().zip(&widths).map(|(c, w)| format!("{c:>w$}", w = *w)).collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(columns.as_slice(), &mut out);
    for record in &records {
        line(record.as_slice(), &mut out);
    }

    if !report.failed.is_empty() {
        let _ = writeln!(out, "\nFailed regions ({}):", report.failed.len());
        for failed in &report.failed {
            let _ = writeln!(out, "  #{} {}: {}", failed.index, failed.key, failed.error);
        }
    }
    out
}

/// Print [`format_table`] to stdout
pub fn print_table(report: &AggregationReport) {
    println!("\n PM2.5 statistics for {}", report.selection);
    println!("==============================");
    print!("{}", format_table(report));
}
