use chrono::{DateTime, Utc};
use serde::Serialize;

use super::features::{mitigation_period_for, MitigationPeriod, NoiseRange, RangeBin, TempRange};
use super::AnalysisError;
use crate::record::{EnvironmentalRecord, FulfillmentRecord, OrderId};

/// A fulfillment row joined to the environmental reading nearest its pack time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRecord {
    pub order_id: OrderId,
    pub pack_date: DateTime<Utc>,
    pub ship_date: Option<DateTime<Utc>>,
    /// Raw marker from the order system, `null` when no defect was reported.
    pub defect_reported: Option<serde_json::Value>,
    pub defect_reported_bool: bool,
    /// Timestamp of the matched environmental reading.
    pub sensor_timestamp: DateTime<Utc>,
    pub noise_level: f64,
    pub temperature: f64,
    pub mitigation_period: MitigationPeriod,
    pub temp_range: Option<TempRange>,
    pub noise_level_range: Option<NoiseRange>,
}

impl AlignedRecord {
    fn new(order: &FulfillmentRecord, reading: &EnvironmentalRecord) -> Self {
        Self {
            order_id: order.order_id.clone(),
            pack_date: order.pack_date,
            ship_date: order.ship_date,
            defect_reported: order.defect_reported.clone().filter(|v| !v.is_null()),
            defect_reported_bool: order.has_defect(),
            sensor_timestamp: reading.timestamp,
            noise_level: reading.noise_level,
            temperature: reading.temperature,
            mitigation_period: mitigation_period_for(order.pack_date),
            temp_range: TempRange::from_value(reading.temperature),
            noise_level_range: NoiseRange::from_value(reading.noise_level),
        }
    }

    /// Whether both range features fell inside their bins.
    pub fn is_binned(&self) -> bool {
        self.temp_range.is_some() && self.noise_level_range.is_some()
    }
}

/// Joins every fulfillment row to its nearest environmental reading in time.
///
/// The output is ordered by `pack_date` and holds exactly one record per
/// fulfillment row. When two readings are equally distant the earlier one
/// wins; readings sharing a timestamp resolve to the first in input order.
pub fn align_nearest(
    fulfillment: &[FulfillmentRecord],
    environmental: &[EnvironmentalRecord],
) -> Result<Vec<AlignedRecord>, AnalysisError> {
    if fulfillment.is_empty() {
        return Err(AnalysisError::EmptyFulfillment);
    }
    if environmental.is_empty() {
        return Err(AnalysisError::EmptyEnvironmental);
    }

    let mut readings: Vec<&EnvironmentalRecord> = environmental.iter().collect();
    readings.sort_by_key(|r| r.timestamp);

    let mut orders: Vec<&FulfillmentRecord> = fulfillment.iter().collect();
    orders.sort_by_key(|o| o.pack_date);

    let aligned = orders
        .into_iter()
        .filter_map(|order| {
            nearest(&readings, order.pack_date).map(|reading| AlignedRecord::new(order, reading))
        })
        .collect::<Vec<_>>();

    debug_assert_eq!(aligned.len(), fulfillment.len());

    Ok(aligned)
}

/// Nearest reading to `at` in a slice sorted by timestamp.
fn nearest<'a>(
    sorted: &[&'a EnvironmentalRecord],
    at: DateTime<Utc>,
) -> Option<&'a EnvironmentalRecord> {
    // First reading at or after `at`.
    let after_idx = sorted.partition_point(|r| r.timestamp < at);

    let before = after_idx.checked_sub(1).and_then(|i| sorted.get(i)).map(|last| {
        // Earliest of the readings sharing the last timestamp before `at`.
        let first = sorted.partition_point(|r| r.timestamp < last.timestamp);
        sorted.get(first).copied().unwrap_or(*last)
    });
    let after = sorted.get(after_idx).copied();

    match (before, after) {
        (Some(b), Some(a)) => {
            if a.timestamp - at < at - b.timestamp {
                Some(a)
            } else {
                Some(b)
            }
        }
        (Some(b), None) => Some(b),
        (None, a) => a,
    }
}
