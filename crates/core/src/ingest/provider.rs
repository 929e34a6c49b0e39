use crate::config::Settings;
use crate::domain::stock::{range_position_pct, round_to};
use crate::ingest::types::StockQuote;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Deserialize;

const CHART_PATH: &str = "/v8/finance/chart";
const QUOTE_SUMMARY_PATH: &str = "/v10/finance/quoteSummary";
const QUOTE_SUMMARY_MODULES: &str = "price,summaryDetail,assetProfile";
const UNKNOWN_SECTOR: &str = "Unknown";

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// `Ok(None)` when the provider has no usable data for `ticker`.
    async fn fetch_quote(&self, ticker: &str) -> Result<Option<StockQuote>>;
}

#[derive(Debug, Clone)]
pub struct YahooFinanceClient {
    http: reqwest::Client,
    base_url: String,
}

impl YahooFinanceClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.market_data_timeout)
            .user_agent(concat!("asx-screener/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url: settings.market_data_base_url.clone(),
        })
    }

    fn url(&self, path: &str, ticker: &str) -> String {
        format!("{}{}/{}", self.base_url.trim_end_matches('/'), path, ticker)
    }

    async fn fetch_chart(&self, ticker: &str) -> Result<Option<PriceHistory>> {
        let res = self
            .http
            .get(self.url(CHART_PATH, ticker))
            .query(&[("range", "1y"), ("interval", "1d")])
            .send()
            .await
            .context("chart request failed")?;

        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let text = res.text().await.context("failed to read chart response")?;
        if !status.is_success() {
            anyhow::bail!("chart HTTP {status}: {text}");
        }

        parse_chart(&text)
    }

    async fn fetch_fundamentals(&self, ticker: &str) -> Result<Fundamentals> {
        let res = self
            .http
            .get(self.url(QUOTE_SUMMARY_PATH, ticker))
            .query(&[("modules", QUOTE_SUMMARY_MODULES)])
            .send()
            .await
            .context("quoteSummary request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read quoteSummary response")?;
        if !status.is_success() {
            anyhow::bail!("quoteSummary HTTP {status}: {text}");
        }

        parse_fundamentals(&text)
    }
}

#[async_trait::async_trait]
impl MarketDataClient for YahooFinanceClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Option<StockQuote>> {
        let Some(history) = self.fetch_chart(ticker).await? else {
            return Ok(None);
        };

        let fundamentals = match self.fetch_fundamentals(ticker).await {
            Ok(f) => f,
            Err(err) => {
                tracing::warn!(%ticker, error = %err, "fundamentals unavailable; using defaults");
                Fundamentals::default()
            }
        };

        Ok(Some(build_quote(ticker, &history, fundamentals)))
    }
}

/// Summary of one year of daily bars.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub last_close: f64,
    pub high: f64,
    pub low: f64,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fundamentals {
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub sector: Option<String>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub market_cap: Option<f64>,
}

pub fn build_quote(ticker: &str, history: &PriceHistory, f: Fundamentals) -> StockQuote {
    let company_name = f
        .long_name
        .or(f.short_name)
        .or_else(|| history.long_name.clone())
        .or_else(|| history.short_name.clone())
        .unwrap_or_else(|| ticker.to_string());

    // Loss-making companies report a negative or missing multiple; both map to absent.
    let pe_ratio = f
        .trailing_pe
        .or(f.forward_pe)
        .filter(|pe| pe.is_finite() && *pe > 0.0)
        .map(|pe| round_to(pe, 2));

    StockQuote {
        ticker: ticker.to_string(),
        company_name,
        sector: f.sector.unwrap_or_else(|| UNKNOWN_SECTOR.to_string()),
        current_price: round_to(history.last_close, 2),
        market_cap: f.market_cap.unwrap_or(0.0),
        pe_ratio,
        week52_high: round_to(history.high, 2),
        week52_low: round_to(history.low, 2),
        range_position_pct: range_position_pct(history.last_close, history.high, history.low),
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    indicators: ChartIndicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
}

/// `None` when fewer than two daily closes are available.
pub fn parse_chart(text: &str) -> Result<Option<PriceHistory>> {
    let env: ChartEnvelope =
        serde_json::from_str(text).context("failed to parse chart response")?;

    let Some(result) = env.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(None);
    };
    let Some(quote) = result.indicators.quote.into_iter().next() else {
        return Ok(None);
    };

    let closes: Vec<f64> = quote.close.iter().flatten().copied().collect();
    if closes.len() < 2 {
        return Ok(None);
    }
    let Some(&last_close) = closes.last() else {
        return Ok(None);
    };

    let high = quote
        .high
        .iter()
        .flatten()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let low = quote
        .low
        .iter()
        .flatten()
        .copied()
        .fold(f64::INFINITY, f64::min);
    if !high.is_finite() || !low.is_finite() {
        return Ok(None);
    }

    Ok(Some(PriceHistory {
        last_close,
        high,
        low,
        long_name: result.meta.long_name,
        short_name: result.meta.short_name,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryEnvelope {
    quote_summary: SummaryBody,
}

#[derive(Debug, Deserialize)]
struct SummaryBody {
    #[serde(default)]
    result: Option<Vec<SummaryResult>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResult {
    #[serde(default)]
    price: SummaryPrice,
    #[serde(default)]
    summary_detail: SummaryDetail,
    #[serde(default)]
    asset_profile: AssetProfile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryPrice {
    long_name: Option<String>,
    short_name: Option<String>,
    #[serde(default)]
    market_cap: RawValue,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(default, rename = "trailingPE")]
    trailing_pe: RawValue,
    #[serde(default, rename = "forwardPE")]
    forward_pe: RawValue,
    #[serde(default)]
    market_cap: RawValue,
}

#[derive(Debug, Default, Deserialize)]
struct AssetProfile {
    sector: Option<String>,
}

// Yahoo wraps numbers as {"raw": 1.0, "fmt": "1.00"} and sends {} when absent.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

pub fn parse_fundamentals(text: &str) -> Result<Fundamentals> {
    let env: SummaryEnvelope =
        serde_json::from_str(text).context("failed to parse quoteSummary response")?;
    let r = env
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .context("quoteSummary response has no result")?;

    let non_empty = |s: Option<String>| s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

    Ok(Fundamentals {
        long_name: non_empty(r.price.long_name),
        short_name: non_empty(r.price.short_name),
        sector: non_empty(r.asset_profile.sector),
        trailing_pe: r.summary_detail.trailing_pe.raw,
        forward_pe: r.summary_detail.forward_pe.raw,
        market_cap: r.price.market_cap.raw.or(r.summary_detail.market_cap.raw),
    })
}
