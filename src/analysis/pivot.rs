use serde::Serialize;

use super::aggregate::GroupStats;
use super::align::AlignedRecord;
use super::features::{MitigationPeriod, NoiseRange, RangeBin, TempRange, NUM_BINS};

/// Mean defect rate by temperature range (rows) and noise range (columns)
/// for one mitigation period.
///
/// The grid is always 6x6. Cells without records hold `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotView {
    pub mitigation_period: MitigationPeriod,
    pub temp_ranges: [TempRange; NUM_BINS],
    pub noise_level_ranges: [NoiseRange; NUM_BINS],
    pub defect_rate: [[Option<f64>; NUM_BINS]; NUM_BINS],
    pub order_count: [[u64; NUM_BINS]; NUM_BINS],
}

impl PivotView {
    /// Builds the pivot for `period` from records of any period.
    pub fn from_records(period: MitigationPeriod, records: &[AlignedRecord]) -> Self {
        let mut stats = [[GroupStats::default(); NUM_BINS]; NUM_BINS];

        for rec in records.iter().filter(|r| r.mitigation_period == period) {
            if let (Some(t), Some(n)) = (rec.temp_range, rec.noise_level_range) {
                stats[t.index()][n.index()].record(rec.defect_reported_bool);
            }
        }

        Self {
            mitigation_period: period,
            temp_ranges: TempRange::ALL,
            noise_level_ranges: NoiseRange::ALL,
            defect_rate: stats.map(|row| row.map(|s| s.defect_rate())),
            order_count: stats.map(|row| row.map(|s| s.total_orders)),
        }
    }

    pub fn cell(&self, temp: TempRange, noise: NoiseRange) -> Option<f64> {
        self.defect_rate[temp.index()][noise.index()]
    }

    /// Records that landed in any cell.
    pub fn total_orders(&self) -> u64 {
        self.order_count.iter().flatten().sum()
    }

    /// Whether every cell is empty.
    pub fn is_empty(&self) -> bool {
        self.total_orders() == 0
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::analysis::features::mitigation_period_for;
    use crate::record::OrderId;

    fn rec(month: u32, temp: f64, noise: f64, defect: bool) -> AlignedRecord {
        let ts = Utc
            .with_ymd_and_hms(2024, month, 1, 8, 0, 0)
            .single()
            .expect("valid date");
        AlignedRecord {
            order_id: OrderId("o".to_string()),
            pack_date: ts,
            ship_date: Some(ts),
            defect_reported: None,
            defect_reported_bool: defect,
            sensor_timestamp: ts,
            noise_level: noise,
            temperature: temp,
            mitigation_period: mitigation_period_for(ts),
            temp_range: TempRange::from_value(temp),
            noise_level_range: NoiseRange::from_value(noise),
        }
    }

    #[test]
    fn test_pivot_cell_rates() {
        let records = vec![
            rec(6, 81.0, 65.0, true),
            rec(6, 82.0, 66.0, false),
            rec(6, 83.0, 67.0, false),
            rec(6, 84.0, 68.0, false),
            rec(6, 61.0, 21.0, false),
        ];

        let pivot = PivotView::from_records(MitigationPeriod::Pre, &records);
        assert_eq!(
            pivot.cell(TempRange::F80To85, NoiseRange::Db60To70),
            Some(0.25)
        );
        assert_eq!(
            pivot.cell(TempRange::F60To65, NoiseRange::Db20To30),
            Some(0.0)
        );
        assert_eq!(pivot.cell(TempRange::F70To75, NoiseRange::Db40To50), None);
        assert_eq!(pivot.total_orders(), 5);
    }

    #[test]
    fn test_pivot_filters_by_period() {
        let records = vec![rec(6, 70.0, 40.0, true), rec(8, 70.0, 40.0, false)];

        let pre = PivotView::from_records(MitigationPeriod::Pre, &records);
        let post = PivotView::from_records(MitigationPeriod::Post, &records);
        assert_eq!(pre.cell(TempRange::F70To75, NoiseRange::Db40To50), Some(1.0));
        assert_eq!(post.cell(TempRange::F70To75, NoiseRange::Db40To50), Some(0.0));
        assert_eq!(pre.total_orders() + post.total_orders(), 2);
    }

    #[test]
    fn test_pivot_skips_unbinned() {
        let records = vec![rec(7, 120.0, 40.0, true), rec(7, 70.0, 5.0, true)];
        let pivot = PivotView::from_records(MitigationPeriod::Pre, &records);
        assert!(pivot.is_empty());
        assert!(pivot.defect_rate.iter().flatten().all(Option::is_none));
    }

    #[test]
    fn test_pivot_serializes_labels_and_nulls() {
        let pivot = PivotView::from_records(MitigationPeriod::Post, &[]);
        let json = serde_json::to_value(&pivot).expect("serialize");
        assert_eq!(json["mitigation_period"], "post");
        assert_eq!(json["temp_ranges"][0], "60-65");
        assert_eq!(json["noise_level_ranges"][5], "70-80");
        assert_eq!(json["defect_rate"][0][0], serde_json::Value::Null);
    }
}
