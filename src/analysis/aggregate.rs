use serde::Serialize;

use super::align::AlignedRecord;
use super::features::{MitigationPeriod, RangeBin, NUM_BINS};

const NUM_PERIODS: usize = MitigationPeriod::ALL.len();

/// Order and defect counts for one group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub total_orders: u64,
    pub defect_count: u64,
}

impl GroupStats {
    /// Counts one order.
    pub fn record(&mut self, defect: bool) {
        self.total_orders += 1;
        if defect {
            self.defect_count += 1;
        }
    }

    /// `defect_count / total_orders`, undefined for an empty group.
    pub fn defect_rate(&self) -> Option<f64> {
        if self.total_orders == 0 {
            return None;
        }
        Some(self.defect_count as f64 / self.total_orders as f64)
    }
}

/// One group of the period-only grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub mitigation_period: MitigationPeriod,
    pub total_orders: u64,
    pub defect_count: u64,
    pub defect_rate: Option<f64>,
}

/// Defect counts grouped by mitigation period alone.
///
/// Every record counts here, binned or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodAggregate {
    pub rows: Vec<PeriodRow>,
}

impl PeriodAggregate {
    pub fn from_records(records: &[AlignedRecord]) -> Self {
        let mut stats = [GroupStats::default(); NUM_PERIODS];
        for rec in records {
            stats[rec.mitigation_period.index()].record(rec.defect_reported_bool);
        }

        let rows = MitigationPeriod::ALL
            .into_iter()
            .map(|period| {
                let s = stats[period.index()];
                PeriodRow {
                    mitigation_period: period,
                    total_orders: s.total_orders,
                    defect_count: s.defect_count,
                    defect_rate: s.defect_rate(),
                }
            })
            .collect();

        Self { rows }
    }

    pub fn get(&self, period: MitigationPeriod) -> Option<&PeriodRow> {
        self.rows.iter().find(|r| r.mitigation_period == period)
    }
}

/// One group of a period-by-range grouping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeRow<B> {
    pub mitigation_period: MitigationPeriod,
    pub range: B,
    pub total_orders: u64,
    pub defect_count: u64,
    pub defect_rate: Option<f64>,
}

/// Defect counts grouped by mitigation period and one range dimension.
///
/// Rows cover every (period, bin) pair, pre before post and bins ascending,
/// so empty groups are present with an undefined rate. Records whose value
/// fell outside the bins are left out and tallied in `unbinned`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeAggregate<B> {
    pub rows: Vec<RangeRow<B>>,
    pub unbinned: u64,
}

impl<B: RangeBin> RangeAggregate<B> {
    pub fn from_records<F>(records: &[AlignedRecord], key: F) -> Self
    where
        F: Fn(&AlignedRecord) -> Option<B>,
    {
        let mut stats = [[GroupStats::default(); NUM_BINS]; NUM_PERIODS];
        let mut unbinned = 0u64;

        for rec in records {
            match key(rec) {
                Some(bin) => {
                    stats[rec.mitigation_period.index()][bin.index()]
                        .record(rec.defect_reported_bool);
                }
                None => unbinned += 1,
            }
        }

        let rows = MitigationPeriod::ALL
            .into_iter()
            .flat_map(|period| {
                let per_bin = stats[period.index()];
                B::ALL.into_iter().map(move |bin| {
                    let s = per_bin[bin.index()];
                    RangeRow {
                        mitigation_period: period,
                        range: bin,
                        total_orders: s.total_orders,
                        defect_count: s.defect_count,
                        defect_rate: s.defect_rate(),
                    }
                })
            })
            .collect();

        Self { rows, unbinned }
    }

    pub fn get(&self, period: MitigationPeriod, bin: B) -> Option<&RangeRow<B>> {
        self.rows
            .iter()
            .find(|r| r.mitigation_period == period && r.range == bin)
    }

    /// Rows of one period, bins ascending.
    pub fn period_rows(&self, period: MitigationPeriod) -> impl Iterator<Item = &RangeRow<B>> {
        self.rows
            .iter()
            .filter(move |r| r.mitigation_period == period)
    }

    /// Sums of (total_orders, defect_count) over one period's rows.
    pub fn period_totals(&self, period: MitigationPeriod) -> GroupStats {
        self.period_rows(period)
            .fold(GroupStats::default(), |acc, r| GroupStats {
                total_orders: acc.total_orders + r.total_orders,
                defect_count: acc.defect_count + r.defect_count,
            })
    }
}
