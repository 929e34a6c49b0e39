//! Post-hoc filtering of an already ranked table. Filters never re-score; they drop rows and
//! renumber the survivors 1..=M in their existing order.

use crate::domain::display::DisplayRow;
use crate::domain::stock::ShortTrend;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Range position below which a stock counts as "near its low" in the summary.
const LOW_IN_RANGE_PCT: f64 = 30.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Exact sector label. `None` keeps every sector.
    pub sector: Option<String>,
    /// Rows without a P/E always pass.
    pub max_pe: Option<f64>,
    pub max_range_position: Option<f64>,
    /// Empty keeps every trend.
    pub trends: Vec<ShortTrend>,
}

impl FilterOptions {
    /// Starting position of the dashboard controls.
    pub fn dashboard_default() -> Self {
        Self {
            sector: None,
            max_pe: Some(30.0),
            max_range_position: Some(50.0),
            trends: vec![ShortTrend::Declining, ShortTrend::Stable],
        }
    }

    pub fn matches(&self, row: &DisplayRow) -> bool {
        if let Some(sector) = self.sector.as_deref() {
            if row.sector != sector {
                return false;
            }
        }

        if let (Some(max), Some(pe)) = (self.max_pe, row.pe_ratio) {
            if pe > max {
                return false;
            }
        }

        if let Some(max) = self.max_range_position {
            match row.range_position_pct {
                Some(pos) if pos <= max => {}
                _ => return false,
            }
        }

        self.trends.is_empty() || self.trends.contains(&row.short_trend)
    }
}

pub fn apply_filters(rows: &[DisplayRow], filters: &FilterOptions) -> Vec<DisplayRow> {
    let kept: Vec<DisplayRow> = rows
        .iter()
        .filter(|row| filters.matches(row))
        .cloned()
        .collect();
    rerank(kept)
}

pub fn rerank(mut rows: Vec<DisplayRow>) -> Vec<DisplayRow> {
    for (idx, row) in rows.iter_mut().enumerate() {
        row.rank = (idx + 1) as u32;
    }
    rows
}

pub fn top_n(rows: &[DisplayRow], n: usize) -> &[DisplayRow] {
    &rows[..rows.len().min(n)]
}

/// Distinct sector labels, sorted.
pub fn sectors(rows: &[DisplayRow]) -> Vec<String> {
    rows.iter()
        .map(|r| r.sector.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetrics {
    pub total_stocks: usize,
    pub declining_shorts: usize,
    pub average_pe: Option<f64>,
    pub low_in_range: usize,
}

impl SummaryMetrics {
    pub fn from_rows(rows: &[DisplayRow]) -> Self {
        let pes: Vec<f64> = rows.iter().filter_map(|r| r.pe_ratio).collect();
        let average_pe = if pes.is_empty() {
            None
        } else {
            Some(pes.iter().sum::<f64>() / pes.len() as f64)
        };

        Self {
            total_stocks: rows.len(),
            declining_shorts: rows
                .iter()
                .filter(|r| r.short_trend == ShortTrend::Declining)
                .count(),
            average_pe,
            low_in_range: rows
                .iter()
                .filter(|r| r.range_position_pct.is_some_and(|p| p < LOW_IN_RANGE_PCT))
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        rank: u32,
        ticker: &str,
        sector: &str,
        pe: Option<f64>,
        pos: f64,
        trend: ShortTrend,
    ) -> DisplayRow {
        DisplayRow {
            rank,
            ticker: ticker.to_string(),
            company: format!("{ticker} Ltd"),
            sector: sector.to_string(),
            price: 10.0,
            market_cap: "$1.00B".to_string(),
            pe_ratio: pe,
            week52_high: 12.0,
            week52_low: 8.0,
            range_position_pct: Some(pos),
            short_history: "No Data".to_string(),
            short_change: None,
            short_trend: trend,
            score: 100.0 - rank as f64,
        }
    }

    fn table() -> Vec<DisplayRow> {
        vec![
            row(1, "AAA.AX", "Materials", Some(8.0), 10.0, ShortTrend::Declining),
            row(2, "BBB.AX", "Financials", Some(45.0), 20.0, ShortTrend::Stable),
            row(3, "CCC.AX", "Materials", None, 35.0, ShortTrend::Increasing),
            row(4, "DDD.AX", "Energy", Some(12.0), 80.0, ShortTrend::Stable),
            row(5, "EEE.AX", "Materials", Some(20.0), 45.0, ShortTrend::NoData),
        ]
    }

    fn tickers(rows: &[DisplayRow]) -> Vec<&str> {
        rows.iter().map(|r| r.ticker.as_str()).collect()
    }

    #[test]
    fn no_filters_keep_everything() {
        let out = apply_filters(&table(), &FilterOptions::default());
        assert_eq!(out, table());
    }

    #[test]
    fn sector_filter_reranks_survivors() {
        let filters = FilterOptions {
            sector: Some("Materials".to_string()),
            ..Default::default()
        };
        let out = apply_filters(&table(), &filters);
        assert_eq!(tickers(&out), vec!["AAA.AX", "CCC.AX", "EEE.AX"]);
        assert_eq!(out.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
        // Scores are untouched by re-ranking.
        assert_eq!(out[1].score, 97.0);
    }

    #[test]
    fn missing_pe_passes_pe_filter() {
        let filters = FilterOptions {
            max_pe: Some(15.0),
            ..Default::default()
        };
        let out = apply_filters(&table(), &filters);
        assert_eq!(tickers(&out), vec!["AAA.AX", "CCC.AX", "DDD.AX"]);
    }

    #[test]
    fn dashboard_defaults() {
        let out = apply_filters(&table(), &FilterOptions::dashboard_default());
        // BBB fails P/E, CCC fails trend, DDD fails range, EEE fails trend.
        assert_eq!(tickers(&out), vec!["AAA.AX"]);
        assert_eq!(out[0].rank, 1);
    }

    #[test]
    fn trend_set_membership() {
        let filters = FilterOptions {
            trends: vec![ShortTrend::Stable, ShortTrend::NoData],
            ..Default::default()
        };
        let out = apply_filters(&table(), &filters);
        assert_eq!(tickers(&out), vec!["BBB.AX", "DDD.AX", "EEE.AX"]);
        assert_eq!(out.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn summary_metrics() {
        let m = SummaryMetrics::from_rows(&table());
        assert_eq!(m.total_stocks, 5);
        assert_eq!(m.declining_shorts, 1);
        assert_eq!(m.low_in_range, 2);
        assert!((m.average_pe.unwrap() - 21.25).abs() < 1e-9);

        let empty = SummaryMetrics::from_rows(&[]);
        assert_eq!(empty.total_stocks, 0);
        assert_eq!(empty.average_pe, None);
    }

    #[test]
    fn sectors_and_top_n() {
        let t = table();
        assert_eq!(sectors(&t), vec!["Energy", "Financials", "Materials"]);
        assert_eq!(top_n(&t, 2).len(), 2);
        assert_eq!(top_n(&t, 10).len(), 5);
    }
}
