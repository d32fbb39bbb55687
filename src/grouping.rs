//! Turning polygon records into analysis regions
//!
//! Three modes exist, checked in this order:
//!
//! 1. **Group-by**: records are partitioned by the tuple of values of the
//!    grouping attributes. Each partition's geometries are unioned into one
//!    region. Partitions appear in the order their key is first seen.
//! 2. **Combine**: every record is unioned into a single region with an empty key.
//! 3. **Per polygon**: one region per record, in input order.
//!
//! A union that fails is retried once on repaired members; if it fails again
//! only that region is dropped (see [`Resolution::failed`]).

use crate::attributes::{AttributeTable, GroupKey};
use crate::errors::{AqGridError, FailedRegion, RegionError, Result};
use crate::geometry::{topology, Crs, PolygonRecord};
use geo::MultiPolygon;
use indexmap::IndexMap;
use rayon::prelude::*;

/// How records are combined into regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingMode {
    PerPolygon,
    Combine,
    GroupBy(Vec<String>),
}

impl GroupingMode {
    /// Grouping attributes win over `combine`.
    #[must_use]
    pub fn from_options(group_by: &[String], combine: bool) -> Self {
        if !group_by.is_empty() {
            Self::GroupBy(group_by.to_vec())
        } else if combine {
            Self::Combine
        } else {
            Self::PerPolygon
        }
    }

    /// Names of the grouping attributes (empty outside group-by mode)
    #[must_use]
    pub fn group_columns(&self) -> &[String] {
        match self {
            Self::GroupBy(names) => names,
            _ => &[],
        }
    }
}

/// The unit over which one set of statistics is computed
#[derive(Debug, Clone)]
pub struct AnalysisRegion {
    index: usize,
    key: GroupKey,
    attributes: AttributeTable,
    geometry: MultiPolygon<f64>,
    member_count: usize,
    source_crs: Crs,
}

impl AnalysisRegion {
    /// Position in the resolver's deterministic output order
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Representative attributes: the grouping values in group-by mode, the
    /// record's own properties in per-polygon mode, nothing when combined.
    pub fn attributes(&self) -> &AttributeTable {
        &self.attributes
    }

    pub fn geometry(&self) -> &MultiPolygon<f64> {
        &self.geometry
    }

    pub fn member_count(&self) -> usize {
        self.member_count
    }

    pub fn source_crs(&self) -> &Crs {
        &self.source_crs
    }
}

/// Output of [`resolve_regions`]
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub regions: Vec<AnalysisRegion>,
    /// Regions whose union failed; their indices are skipped in `regions`
    pub failed: Vec<FailedRegion>,
}

impl Resolution {
    /// Number of regions attempted, including failed ones
    pub fn total(&self) -> usize {
        self.regions.len() + self.failed.len()
    }
}

struct Partition<'a> {
    key: GroupKey,
    attributes: AttributeTable,
    members: Vec<&'a PolygonRecord>,
}

/// Partition and merge `records` into analysis regions.
///
/// # Errors
///
/// Returns [`AqGridError::InvalidInput`] when `records` is empty, or when a
/// grouping attribute is absent from every record.
pub fn resolve_regions(records: &[PolygonRecord], mode: &GroupingMode) -> Result<Resolution> {
    if records.is_empty() {
        return Err(AqGridError::InvalidInput("no polygon records to group".into()));
    }

    let partitions = match mode {
        GroupingMode::PerPolygon => {
            let regions = records
                .iter()
                .enumerate()
                .map(|(index, record)| AnalysisRegion {
                    index,
                    key: GroupKey::empty(),
                    attributes: record.attributes().clone(),
                    geometry: record.geometry().clone(),
                    member_count: 1,
                    source_crs: record.source_crs().clone(),
                })
                .collect();
            return Ok(Resolution { regions, failed: Vec::new() });
        }
        GroupingMode::Combine => vec![Partition {
            key: GroupKey::empty(),
            attributes: AttributeTable::new(),
            members: records.iter().collect(),
        }],
        GroupingMode::GroupBy(names) => partition_by(records, names)?,
    };

    let outcomes: Vec<std::result::Result<AnalysisRegion, FailedRegion>> = partitions
        .into_par_iter()
        .enumerate()
        .map(|(index, partition)| merge_partition(index, partition))
        .collect();

    let mut resolution = Resolution::default();
    for outcome in outcomes {
        match outcome {
            Ok(region) => resolution.regions.push(region),
            Err(failed) => resolution.failed.push(failed),
        }
    }
    log::info!(
        "Resolved {} record(s) into {} region(s), {} failed",
        records.len(),
        resolution.total(),
        resolution.failed.len()
    );
    Ok(resolution)
}

fn partition_by<'a>(records: &'a [PolygonRecord], names: &[String]) -> Result<Vec<Partition<'a>>> {
    for name in names {
        if !records.iter().any(|r| r.attributes().contains_key(name)) {
            let mut available: Vec<&str> = Vec::new();
            for key in records.iter().flat_map(|r| r.attributes().keys()) {
                if !available.contains(&key.as_str()) {
                    available.push(key);
                }
            }
            return Err(AqGridError::InvalidInput(format!(
                "grouping attribute '{name}' not found in any feature (available: {})",
                available.join(", ")
            )));
        }
    }

    let mut groups: IndexMap<GroupKey, Vec<&PolygonRecord>> = IndexMap::new();
    for record in records {
        let key = GroupKey::from_attributes(record.attributes(), names);
        groups.entry(key).or_default().push(record);
    }

    Ok(groups
        .into_iter()
        .map(|(key, members)| Partition {
            attributes: names.iter().cloned().zip(key.values().iter().cloned()).collect(),
            key,
            members,
        })
        .collect())
}

fn merge_partition(
    index: usize,
    partition: Partition<'_>,
) -> std::result::Result<AnalysisRegion, FailedRegion> {
    let Partition { key, attributes, members } = partition;
    let fail = |error: RegionError| {
        log::warn!("Region {index} {key} excluded: {error}");
        FailedRegion::new(index, key.clone(), error)
    };

    let source_crs = members[0].source_crs().clone();
    if let Some(other) = members.iter().find(|m| *m.source_crs() != source_crs) {
        return Err(fail(RegionError::Projection(format!(
            "members mix {source_crs} and {}",
            other.source_crs()
        ))));
    }

    let shapes: Vec<&MultiPolygon<f64>> = members.iter().map(|m| m.geometry()).collect();
    let geometry = topology::union_with_repair(&shapes)
        .map_err(|e| fail(RegionError::Union(e.to_string())))?;

    log::debug!("Region {index} {key}: union of {} member(s)", members.len());
    Ok(AnalysisRegion {
        index,
        key,
        attributes,
        geometry,
        member_count: members.len(),
        source_crs,
    })
}
