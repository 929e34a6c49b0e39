//! Cross-sectional scoring of a frozen stock universe.
//!
//! Pipeline: eligibility filter, per-metric min/max over the survivors, rescale to 0..=100,
//! weighted blend, stable descending sort, contiguous ranks.

mod composite;
mod normalize;
mod trend;

pub use composite::{score, WEIGHT_PE, WEIGHT_RANGE, WEIGHT_SHORT};
pub use normalize::{normalize, MinMax, NEUTRAL_SCORE};
pub use trend::{classify_trend, TrendSummary, TREND_DEADBAND};
