//! Core statistical types
//!
//! [`StatsAccumulator`] uses Welford's online update, and Chan's formula to
//! merge partial accumulators. Neither ever sums raw values, so the result
//! does not drift on grids with millions of cells.

use serde::Serialize;

/// Reported statistics, in output column order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatField {
    Count,
    Mean,
    Std,
    Min,
    Max,
}

impl StatField {
    pub const ALL: [Self; 5] = [Self::Count, Self::Mean, Self::Std, Self::Min, Self::Max];

    /// Column name of the statistic
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Mean => "mean",
            Self::Std => "std",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// Statistics of the valid cells of one region.
///
/// `std` is the population standard deviation and is `None` when fewer than two
/// cells are valid: a single sample has no spread worth reporting, and `0.0`
/// would be indistinguishable from a genuinely uniform region. With no valid
/// cells every field but `count` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegionStats {
    pub count: u64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RegionStats {
    /// Stats of a region with no valid cells
    #[must_use]
    pub const fn empty() -> Self {
        Self { count: 0, mean: None, std: None, min: None, max: None }
    }

    /// Value of one field; `count` is always present
    #[must_use]
    pub fn get(&self, field: StatField) -> Option<f64> {
        match field {
            #[allow(clippy::cast_precision_loss)]
            StatField::Count => Some(self.count as f64),
            StatField::Mean => self.mean,
            StatField::Std => self.std,
            StatField::Min => self.min,
            StatField::Max => self.max,
        }
    }
}

impl Default for RegionStats {
    fn default() -> Self {
        Self::empty()
    }
}

/// Streaming count, mean, variance, min and max
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsAccumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for StatsAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsAccumulator {
    #[must_use]
    pub const fn new() -> Self {
        Self { count: 0, mean: 0.0, m2: 0.0, min: f64::INFINITY, max: f64::NEG_INFINITY }
    }

    /// Add one value. Callers filter out NaN and nodata beforehand.
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        self.mean += delta / n;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    /// Fold `other` into `self`
    pub fn merge(&mut self, other: &Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = other.mean - self.mean;
        self.mean += delta * nb / n;
        self.m2 += other.m2 + delta * delta * na * nb / n;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    #[must_use]
    pub fn finish(&self) -> RegionStats {
        if self.count == 0 {
            return RegionStats::empty();
        }
        #[allow(clippy::cast_precision_loss)]
        let std = (self.count >= 2).then(|| (self.m2.max(0.0) / self.count as f64).sqrt());
        RegionStats {
            count: self.count,
            mean: Some(self.mean),
            std,
            min: Some(self.min),
            max: Some(self.max),
        }
    }
}

impl Extend<f64> for StatsAccumulator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for value in iter {
            self.push(value);
        }
    }
}

impl FromIterator<f64> for StatsAccumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut acc = Self::new();
        acc.extend(iter);
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn population_std() {
        let stats = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]
            .into_iter()
            .collect::<StatsAccumulator>()
            .finish();
        assert_eq!(stats.count, 8);
        assert!((stats.mean.unwrap() - 5.0).abs() < 1e-12);
        assert!((stats.std.unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(stats.min, Some(2.0));
        assert_eq!(stats.max, Some(9.0));
    }

    #[test]
    fn single_value_has_no_std() {
        let stats = std::iter::once(3.5).collect::<StatsAccumulator>().finish();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.mean, Some(3.5));
        assert_eq!(stats.std, None);
    }

    #[test]
    fn empty_has_only_count() {
        assert_eq!(StatsAccumulator::new().finish(), RegionStats::empty());
    }

    #[test]
    fn merge_matches_sequential() {
        let values: Vec<f64> = (0..1000).map(|i| (f64::from(i) * 0.37).sin() * 50.0 + 20.0).collect();
        let whole: StatsAccumulator = values.iter().copied().collect();
        let mut merged: StatsAccumulator = values[..333].iter().copied().collect();
        merged.merge(&values[333..].iter().copied().collect());
        let (a, b) = (whole.finish(), merged.finish());
        assert_eq!(a.count, b.count);
        assert!((a.mean.unwrap() - b.mean.unwrap()).abs() < 1e-9);
        assert!((a.std.unwrap() - b.std.unwrap()).abs() < 1e-9);
        assert_eq!(a.min, b.min);
        assert_eq!(a.max, b.max);
    }

    #[test]
    fn large_offset_does_not_lose_precision() {
        let stats = (0..100_000)
            .map(|i| 1e9 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect::<StatsAccumulator>()
            .finish();
        assert!((stats.mean.unwrap() - 1e9).abs() < 1e-6);
        assert!((stats.std.unwrap() - 1.0).abs() < 1e-6);
    }
}
