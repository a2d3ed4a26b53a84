//! Turns the two raw tables into the aggregate views the dashboard charts.
//!
//! Pipeline: sort both tables, join each order to the nearest sensor reading,
//! derive period and range features, then group and pivot. Everything is
//! recomputed from scratch per load; [`cache::SessionCache`] holds the result
//! for the life of a session.

pub mod aggregate;
pub mod align;
pub mod cache;
pub mod features;
pub mod pivot;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::record::{EnvironmentalRecord, FulfillmentRecord};

pub use aggregate::{GroupStats, PeriodAggregate, PeriodRow, RangeAggregate, RangeRow};
pub use align::{align_nearest, AlignedRecord};
pub use features::{mitigation_period_for, MitigationPeriod, NoiseRange, RangeBin, TempRange};
pub use pivot::PivotView;

/// Errors building a [`DataPackage`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no fulfillment rows to analyse")]
    EmptyFulfillment,

    #[error("no environmental rows to align against")]
    EmptyEnvironmental,
}

/// Every derived view of one load.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPackage {
    pub merged: Vec<AlignedRecord>,
    pub grouped_temp: RangeAggregate<TempRange>,
    pub grouped_noise: RangeAggregate<NoiseRange>,
    pub grouped_all_defects: PeriodAggregate,
    pub pivot_pre: PivotView,
    pub pivot_post: PivotView,
}

impl DataPackage {
    /// The pivot for `period`.
    pub fn pivot(&self, period: MitigationPeriod) -> &PivotView {
        match period {
            MitigationPeriod::Pre => &self.pivot_pre,
            MitigationPeriod::Post => &self.pivot_post,
        }
    }

    /// One view as JSON. Undefined rates become `null`.
    pub fn view_json(&self, name: ViewName) -> serde_json::Result<serde_json::Value> {
        match name {
            ViewName::Merged => serde_json::to_value(&self.merged),
            ViewName::GroupedTemp => serde_json::to_value(&self.grouped_temp),
            ViewName::GroupedNoise => serde_json::to_value(&self.grouped_noise),
            ViewName::GroupedAllDefects => serde_json::to_value(&self.grouped_all_defects),
            ViewName::PivotPre => serde_json::to_value(&self.pivot_pre),
            ViewName::PivotPost => serde_json::to_value(&self.pivot_post),
        }
    }
}

/// Name of a view in a [`DataPackage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewName {
    Merged,
    GroupedTemp,
    GroupedNoise,
    GroupedAllDefects,
    PivotPre,
    PivotPost,
}

impl ViewName {
    pub const ALL: [Self; 6] = [
        Self::Merged,
        Self::GroupedTemp,
        Self::GroupedNoise,
        Self::GroupedAllDefects,
        Self::PivotPre,
        Self::PivotPost,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::GroupedTemp => "grouped_temp",
            Self::GroupedNoise => "grouped_noise",
            Self::GroupedAllDefects => "grouped_all_defects",
            Self::PivotPre => "pivot_pre",
            Self::PivotPost => "pivot_post",
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unknown view name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown view {0:?}")]
pub struct UnknownView(pub String);

impl FromStr for ViewName {
    type Err = UnknownView;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| UnknownView(s.to_string()))
    }
}

/// Builds every view from freshly fetched tables.
///
/// Records whose temperature or noise level falls outside the range bins
/// stay in `merged` and the period-only grouping but are left out of the
/// range groupings and pivots; a warning reports how many.
pub fn build_package(
    fulfillment: &[FulfillmentRecord],
    environmental: &[EnvironmentalRecord],
) -> Result<DataPackage, AnalysisError> {
    let merged = align_nearest(fulfillment, environmental)?;

    let grouped_temp = RangeAggregate::from_records(&merged, |r| r.temp_range);
    let grouped_noise = RangeAggregate::from_records(&merged, |r| r.noise_level_range);
    let grouped_all_defects = PeriodAggregate::from_records(&merged);
    let pivot_pre = PivotView::from_records(MitigationPeriod::Pre, &merged);
    let pivot_post = PivotView::from_records(MitigationPeriod::Post, &merged);

    if grouped_temp.unbinned > 0 || grouped_noise.unbinned > 0 {
        warn!(
            records = merged.len(),
            unbinned_temperature = grouped_temp.unbinned,
            unbinned_noise = grouped_noise.unbinned,
            "readings outside the range bins left out of range aggregates",
        );
    }

    debug!(
        orders = fulfillment.len(),
        readings = environmental.len(),
        "built data package"
    );

    Ok(DataPackage {
        merged,
        grouped_temp,
        grouped_noise,
        grouped_all_defects,
        pivot_pre,
        pivot_post,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_name_round_trip() {
        for view in ViewName::ALL {
            assert_eq!(view.as_str().parse::<ViewName>(), Ok(view));
        }
        assert_eq!(
            "pivot_sideways".parse::<ViewName>(),
            Err(UnknownView("pivot_sideways".to_string()))
        );
    }

    #[test]
    fn test_build_package_rejects_empty_tables() {
        assert_eq!(build_package(&[], &[]), Err(AnalysisError::EmptyFulfillment));
    }
}
