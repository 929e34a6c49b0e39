use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Market-data snapshot for one ticker, before short-interest enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockQuote {
    pub ticker: String,
    pub company_name: String,
    pub sector: String,
    pub current_price: f64,
    pub market_cap: f64,
    pub pe_ratio: Option<f64>,
    pub week52_high: f64,
    pub week52_low: f64,
    pub range_position_pct: f64,
}

/// One line of a regulator short-position report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortPositionRow {
    pub date: NaiveDate,
    pub product_name: String,
    pub product_code: String,
    pub short_positions: String,
    pub short_pct: f64,
}
