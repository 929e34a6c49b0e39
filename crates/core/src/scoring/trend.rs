use crate::domain::stock::{ShortInterestPoint, ShortTrend};

/// Net change (percentage points) that must be exceeded before a trend is called.
pub const TREND_DEADBAND: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendSummary {
    pub absolute_change: Option<f64>,
    pub trend: ShortTrend,
}

/// Classify a chronologically sorted short-interest history.
///
/// The change is newest minus oldest over whatever history is available, so the window
/// shrinks when fewer than six weekly snapshots exist.
pub fn classify_trend(history: &[ShortInterestPoint]) -> TrendSummary {
    match history {
        [] => TrendSummary {
            absolute_change: None,
            trend: ShortTrend::NoData,
        },
        [_] => TrendSummary {
            absolute_change: None,
            trend: ShortTrend::InsufficientData,
        },
        [first, .., last] => {
            let change = last.short_pct - first.short_pct;
            let trend = if change < -TREND_DEADBAND {
                ShortTrend::Declining
            } else if change > TREND_DEADBAND {
                ShortTrend::Increasing
            } else {
                ShortTrend::Stable
            };
            TrendSummary {
                absolute_change: Some(change),
                trend,
            }
        }
    }
}
