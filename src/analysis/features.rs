//! Categorical features derived from an aligned row.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

/// Calendar months (1-based) packed before the cooling and noise
/// mitigation went in. Every other month counts as post-mitigation.
pub const PRE_MITIGATION_MONTHS: [u32; 2] = [6, 7];

/// Number of bins in each range dimension.
pub const NUM_BINS: usize = 6;

/// Before/after split around the environmental intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MitigationPeriod {
    Pre,
    Post,
}

impl MitigationPeriod {
    /// Both periods, pre first.
    pub const ALL: [Self; 2] = [Self::Pre, Self::Post];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Post => "post",
        }
    }

    /// Display label, e.g. "Pre-mitigation".
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pre => "Pre-mitigation",
            Self::Post => "Post-mitigation",
        }
    }

    pub const fn index(self) -> usize {
        match self {
            Self::Pre => 0,
            Self::Post => 1,
        }
    }
}

/// Mitigation period of an order packed at `pack_date`.
pub fn mitigation_period_for(pack_date: DateTime<Utc>) -> MitigationPeriod {
    if PRE_MITIGATION_MONTHS.contains(&pack_date.month()) {
        MitigationPeriod::Pre
    } else {
        MitigationPeriod::Post
    }
}

/// A fixed set of six contiguous bins over a numeric range.
///
/// Bins are closed on the left and open on the right, except the last bin
/// which also includes the upper edge.
pub trait RangeBin: Copy + Eq + Ord + std::hash::Hash + Serialize + 'static {
    /// Every bin in ascending order.
    const ALL: [Self; NUM_BINS];

    /// Bin edges; bin `i` spans `EDGES[i]..EDGES[i + 1]`.
    const EDGES: [f64; NUM_BINS + 1];

    /// Axis label for the dimension.
    const AXIS_LABEL: &'static str;

    fn label(self) -> &'static str;

    fn index(self) -> usize;

    /// Bin containing `value`, or `None` when it falls outside every bin.
    fn from_value(value: f64) -> Option<Self> {
        bin_index(value, &Self::EDGES).and_then(|i| Self::ALL.get(i).copied())
    }
}

/// Index of the bin containing `value`.
fn bin_index(value: f64, edges: &[f64; NUM_BINS + 1]) -> Option<usize> {
    if value.is_nan() || value < edges[0] || value > edges[NUM_BINS] {
        return None;
    }
    for (i, &upper) in edges[1..].iter().enumerate() {
        if value < upper {
            return Some(i);
        }
    }
    // Equal to the top edge: the last bin is closed.
    Some(NUM_BINS - 1)
}

/// Temperature bins over [60, 90] °F in 5° steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TempRange {
    #[serde(rename = "60-65")]
    F60To65,
    #[serde(rename = "65-70")]
    F65To70,
    #[serde(rename = "70-75")]
    F70To75,
    #[serde(rename = "75-80")]
    F75To80,
    #[serde(rename = "80-85")]
    F80To85,
    #[serde(rename = "85-90")]
    F85To90,
}

impl RangeBin for TempRange {
    const ALL: [Self; NUM_BINS] = [
        Self::F60To65,
        Self::F65To70,
        Self::F70To75,
        Self::F75To80,
        Self::F80To85,
        Self::F85To90,
    ];

    const EDGES: [f64; NUM_BINS + 1] = [60.0, 65.0, 70.0, 75.0, 80.0, 85.0, 90.0];

    const AXIS_LABEL: &'static str = "Temperature Range (°F)";

    fn label(self) -> &'static str {
        match self {
            Self::F60To65 => "60-65",
            Self::F65To70 => "65-70",
            Self::F70To75 => "70-75",
            Self::F75To80 => "75-80",
            Self::F80To85 => "80-85",
            Self::F85To90 => "85-90",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Noise bins over [20, 80] dB in 10 dB steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NoiseRange {
    #[serde(rename = "20-30")]
    Db20To30,
    #[serde(rename = "30-40")]
    Db30To40,
    #[serde(rename = "40-50")]
    Db40To50,
    #[serde(rename = "50-60")]
    Db50To60,
    #[serde(rename = "60-70")]
    Db60To70,
    #[serde(rename = "70-80")]
    Db70To80,
}

impl RangeBin for NoiseRange {
    const ALL: [Self; NUM_BINS] = [
        Self::Db20To30,
        Self::Db30To40,
        Self::Db40To50,
        Self::Db50To60,
        Self::Db60To70,
        Self::Db70To80,
    ];

    const EDGES: [f64; NUM_BINS + 1] = [20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0];

    const AXIS_LABEL: &'static str = "Noise Level Range (dB)";

    fn label(self) -> &'static str {
        match self {
            Self::Db20To30 => "20-30",
            Self::Db30To40 => "30-40",
            Self::Db40To50 => "40-50",
            Self::Db50To60 => "50-60",
            Self::Db60To70 => "60-70",
            Self::Db70To80 => "70-80",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}
