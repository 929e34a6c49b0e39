use crate::domain::stock::{round_to, StockRecord};
use crate::ingest::provider::MarketDataClient;
use crate::ingest::short_interest::ShortInterestTable;
use crate::ingest::types::StockQuote;
use crate::scoring::classify_trend;
use crate::universe::{short_code, Universe};
use std::time::Duration;

const MAX_LOGGED_FAILURES: usize = 10;
const PROGRESS_EVERY: usize = 25;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub requested: usize,
    pub collected: usize,
    pub unresolved: usize,
    pub failures: usize,
}

/// Fetch every ticker in order, one at a time, and attach its short-interest trend.
/// Tickers the provider cannot resolve, or that fail, are left out.
pub async fn collect_universe(
    market: &dyn MarketDataClient,
    shorts: &ShortInterestTable,
    universe: &Universe,
    delay: Duration,
) -> (Vec<StockRecord>, CollectStats) {
    let total = universe.len();
    let mut stats = CollectStats {
        requested: total,
        ..Default::default()
    };
    let mut records = Vec::with_capacity(total);

    for (idx, ticker) in universe.tickers().iter().enumerate() {
        if idx != 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match market.fetch_quote(ticker).await {
            Ok(Some(quote)) => records.push(enrich(quote, shorts)),
            Ok(None) => {
                stats.unresolved += 1;
                tracing::debug!(%ticker, "no market data; excluded");
            }
            Err(err) => {
                stats.failures += 1;
                if stats.failures <= MAX_LOGGED_FAILURES {
                    tracing::warn!(
                        idx,
                        %ticker,
                        provider = market.provider_name(),
                        failure_count = stats.failures,
                        error = %err,
                        "market data fetch failed; skipping stock"
                    );
                }
            }
        }

        let n = idx + 1;
        if n == 1 || n == total || n % PROGRESS_EVERY == 0 {
            tracing::info!(
                processed = n,
                total,
                collected = records.len(),
                failures = stats.failures,
                "market data progress"
            );
        }
    }

    stats.collected = records.len();
    (records, stats)
}

pub fn enrich(quote: StockQuote, shorts: &ShortInterestTable) -> StockRecord {
    let short_history = shorts.history_for(short_code(&quote.ticker));
    let summary = classify_trend(&short_history);

    StockRecord {
        ticker: quote.ticker,
        company_name: quote.company_name,
        sector: quote.sector,
        current_price: quote.current_price,
        market_cap: quote.market_cap,
        pe_ratio: quote.pe_ratio,
        week52_high: quote.week52_high,
        week52_low: quote.week52_low,
        range_position_pct: Some(quote.range_position_pct),
        short_history,
        short_absolute_change: summary.absolute_change.map(|c| round_to(c, 2)),
        short_trend: summary.trend,
    }
}
