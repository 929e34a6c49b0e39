use crate::domain::stock::{ScoredRecord, ShortInterestPoint, ShortTrend, MAX_SHORT_HISTORY};
use serde::{Deserialize, Serialize};

/// Presentation row. Field renames are the exported column headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayRow {
    #[serde(rename = "Rank")]
    pub rank: u32,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Sector")]
    pub sector: String,
    #[serde(rename = "Price ($)")]
    pub price: f64,
    #[serde(rename = "Market Cap")]
    pub market_cap: String,
    #[serde(rename = "P/E")]
    pub pe_ratio: Option<f64>,
    #[serde(rename = "52w High")]
    pub week52_high: f64,
    #[serde(rename = "52w Low")]
    pub week52_low: f64,
    #[serde(rename = "52w Position %")]
    pub range_position_pct: Option<f64>,
    #[serde(rename = "Short Interest (6 weeks)")]
    pub short_history: String,
    #[serde(rename = "Short Change")]
    pub short_change: Option<f64>,
    #[serde(rename = "Short Trend")]
    pub short_trend: ShortTrend,
    #[serde(rename = "Score")]
    pub score: f64,
}

pub const DISPLAY_COLUMNS: [&str; 14] = [
    "Rank",
    "Ticker",
    "Company",
    "Sector",
    "Price ($)",
    "Market Cap",
    "P/E",
    "52w High",
    "52w Low",
    "52w Position %",
    "Short Interest (6 weeks)",
    "Short Change",
    "Short Trend",
    "Score",
];

pub fn format_rows(records: &[ScoredRecord]) -> Vec<DisplayRow> {
    records.iter().map(DisplayRow::from_scored).collect()
}

impl DisplayRow {
    pub fn from_scored(scored: &ScoredRecord) -> Self {
        let r = &scored.record;
        Self {
            rank: scored.rank,
            ticker: r.ticker.clone(),
            company: r.company_name.clone(),
            sector: r.sector.clone(),
            price: r.current_price,
            market_cap: format_market_cap(r.market_cap),
            pe_ratio: r.pe_ratio,
            week52_high: r.week52_high,
            week52_low: r.week52_low,
            range_position_pct: r.range_position_pct,
            short_history: format_short_history(&r.short_history),
            short_change: r.short_absolute_change,
            short_trend: r.short_trend,
            score: scored.composite_score,
        }
    }
}

/// `$X.XXB`, `$X.XXM`, or a whole-dollar amount with thousands separators.
pub fn format_market_cap(value: f64) -> String {
    if value >= 1e9 {
        format!("${:.2}B", value / 1e9)
    } else if value >= 1e6 {
        format!("${:.2}M", value / 1e6)
    } else {
        format!("${}", group_thousands(value))
    }
}

/// Newest first, e.g. `13-Jan: 2.45% | 06-Jan: 2.60%`.
pub fn format_short_history(history: &[ShortInterestPoint]) -> String {
    if history.is_empty() {
        return "No Data".to_string();
    }

    let start = history.len().saturating_sub(MAX_SHORT_HISTORY);
    history[start..]
        .iter()
        .rev()
        .map(|p| format!("{}: {:.2}%", p.date.format("%d-%b"), p.short_pct))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn group_thousands(value: f64) -> String {
    let digits = format!("{:.0}", value.abs());
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0.0 && digits != "0" {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i != 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::stock::StockRecord;
    use chrono::NaiveDate;

    fn point(y: i32, m: u32, d: u32, pct: f64) -> ShortInterestPoint {
        ShortInterestPoint {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            short_pct: pct,
        }
    }

    #[test]
    fn market_cap_tiers() {
        assert_eq!(format_market_cap(215_000_000_000.0), "$215.00B");
        assert_eq!(format_market_cap(1_000_000_000.0), "$1.00B");
        assert_eq!(format_market_cap(999_999_999.0), "$1000.00M");
        assert_eq!(format_market_cap(45_670_000.0), "$45.67M");
        assert_eq!(format_market_cap(1_000_000.0), "$1.00M");
        assert_eq!(format_market_cap(999_999.0), "$999,999");
        assert_eq!(format_market_cap(1_234.4), "$1,234");
        assert_eq!(format_market_cap(999.0), "$999");
        assert_eq!(format_market_cap(0.0), "$0");
    }

    #[test]
    fn short_history_is_newest_first() {
        let history = vec![
            point(2025, 1, 6, 2.6),
            point(2025, 1, 13, 2.45),
            point(2025, 1, 20, 2.3),
        ];
        assert_eq!(
            format_short_history(&history),
            "20-Jan: 2.30% | 13-Jan: 2.45% | 06-Jan: 2.60%"
        );
    }

    #[test]
    fn short_history_keeps_six_most_recent() {
        let history: Vec<_> = (1..=8).map(|d| point(2025, 3, d, d as f64)).collect();
        let s = format_short_history(&history);
        assert_eq!(s.split(" | ").count(), 6);
        assert!(s.starts_with("08-Mar: 8.00%"));
        assert!(s.ends_with("03-Mar: 3.00%"));
    }

    #[test]
    fn empty_history_renders_no_data() {
        assert_eq!(format_short_history(&[]), "No Data");
    }

    #[test]
    fn formatting_keeps_numbers_untouched() {
        let scored = ScoredRecord {
            record: StockRecord {
                ticker: "BHP.AX".to_string(),
                company_name: "BHP Group Ltd".to_string(),
                sector: "Materials".to_string(),
                current_price: 42.5,
                market_cap: 215_000_000_000.0,
                pe_ratio: Some(12.5),
                week52_high: 50.0,
                week52_low: 38.0,
                range_position_pct: Some(37.5),
                short_history: vec![point(2025, 1, 1, 2.5)],
                short_absolute_change: Some(-0.5),
                short_trend: ShortTrend::Declining,
            },
            range_score: 100.0,
            short_score: 100.0,
            pe_score: 100.0,
            composite_score: 100.0,
            rank: 1,
        };

        let rows = format_rows(&[scored]);
        let row = &rows[0];
        assert_eq!(row.rank, 1);
        assert_eq!(row.company, "BHP Group Ltd");
        assert_eq!(row.price, 42.5);
        assert_eq!(row.market_cap, "$215.00B");
        assert_eq!(row.pe_ratio, Some(12.5));
        assert_eq!(row.range_position_pct, Some(37.5));
        assert_eq!(row.short_history, "01-Jan: 2.50%");
        assert_eq!(row.short_change, Some(-0.5));
        assert_eq!(row.short_trend, ShortTrend::Declining);
        assert_eq!(row.score, 100.0);
    }
}
