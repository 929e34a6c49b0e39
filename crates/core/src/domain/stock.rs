use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Most short-interest snapshots kept per ticker.
pub const MAX_SHORT_HISTORY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShortInterestPoint {
    pub date: NaiveDate,
    pub short_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShortTrend {
    #[serde(rename = "↓ Declining")]
    Declining,
    #[serde(rename = "→ Stable")]
    Stable,
    #[serde(rename = "↑ Increasing")]
    Increasing,
    #[serde(rename = "No Data")]
    NoData,
    #[serde(rename = "Insufficient Data")]
    InsufficientData,
}

impl ShortTrend {
    pub const ALL: [ShortTrend; 5] = [
        ShortTrend::Declining,
        ShortTrend::Stable,
        ShortTrend::Increasing,
        ShortTrend::NoData,
        ShortTrend::InsufficientData,
    ];

    /// Label shown in tables and exports.
    pub fn label(self) -> &'static str {
        match self {
            ShortTrend::Declining => "↓ Declining",
            ShortTrend::Stable => "→ Stable",
            ShortTrend::Increasing => "↑ Increasing",
            ShortTrend::NoData => "No Data",
            ShortTrend::InsufficientData => "Insufficient Data",
        }
    }

    /// Stable machine code used for storage and query parameters.
    pub fn code(self) -> &'static str {
        match self {
            ShortTrend::Declining => "declining",
            ShortTrend::Stable => "stable",
            ShortTrend::Increasing => "increasing",
            ShortTrend::NoData => "no_data",
            ShortTrend::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for ShortTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ShortTrend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if let Some(t) = ShortTrend::ALL.into_iter().find(|t| t.label() == s) {
            return Ok(t);
        }

        let normalized = s.to_ascii_lowercase().replace(&['-', ' '][..], "_");
        match normalized.as_str() {
            "declining" => Ok(ShortTrend::Declining),
            "stable" => Ok(ShortTrend::Stable),
            "increasing" => Ok(ShortTrend::Increasing),
            "no_data" | "nodata" => Ok(ShortTrend::NoData),
            "insufficient_data" | "insufficient" => Ok(ShortTrend::InsufficientData),
            _ => bail!("unknown short trend: {s}"),
        }
    }
}

/// One ticker as delivered by the fetch layer. Never mutated after collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub ticker: String,
    pub company_name: String,
    pub sector: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
    pub week52_high: f64,
    pub week52_low: f64,
    pub range_position_pct: Option<f64>,
    /// Chronological, oldest first, at most [`MAX_SHORT_HISTORY`] entries.
    pub short_history: Vec<ShortInterestPoint>,
    pub short_absolute_change: Option<f64>,
    pub short_trend: ShortTrend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: StockRecord,
    pub range_score: f64,
    pub short_score: f64,
    pub pe_score: f64,
    pub composite_score: f64,
    pub rank: u32,
}

/// Position of `price` within `[low, high]` as a percentage, one decimal.
/// A flat range reports the midpoint.
pub fn range_position_pct(price: f64, high: f64, low: f64) -> f64 {
    if high > low {
        round_to(((price - low) / (high - low)) * 100.0, 1)
    } else {
        50.0
    }
}

/// Round to `decimals` places, exact halves to even.
pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
