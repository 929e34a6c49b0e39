//! One end-to-end analysis run: short interest, market data, scoring. Strictly sequential;
//! any abort discards everything produced so far.

pub mod error;

use crate::config::Settings;
use crate::domain::display::{format_rows, DisplayRow};
use crate::domain::stock::ScoredRecord;
use crate::ingest::collect::{collect_universe, CollectStats};
use crate::ingest::provider::MarketDataClient;
use crate::ingest::short_interest::{fetch_weekly, ShortInterestSource};
use crate::scoring;
use crate::storage::runs::RunStore;
use crate::time::asx_market::weekly_snapshot_dates;
use crate::universe::Universe;
use anyhow::ensure;
use chrono::{DateTime, NaiveDate, Utc};
use error::{AnalysisError, Stage};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub run_date: NaiveDate,
    pub short_interest_weeks: u32,
    pub short_interest_delay: Duration,
    pub market_data_delay: Duration,
}

impl AnalysisOptions {
    pub fn from_settings(settings: &Settings, run_date: NaiveDate) -> Self {
        Self {
            run_date,
            short_interest_weeks: settings.short_interest_weeks,
            short_interest_delay: settings.short_interest_req_delay,
            market_data_delay: settings.market_data_req_delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub universe_size: usize,
    pub collected: usize,
    /// Ranked, best first.
    pub scored: Vec<ScoredRecord>,
}

impl AnalysisReport {
    pub fn display_rows(&self) -> Vec<DisplayRow> {
        format_rows(&self.scored)
    }
}

pub async fn run_analysis(
    market: &dyn MarketDataClient,
    shorts: &dyn ShortInterestSource,
    universe: &Universe,
    opts: &AnalysisOptions,
) -> anyhow::Result<AnalysisReport> {
    tracing::info!(
        run_date = %opts.run_date,
        tickers = universe.len(),
        weeks = opts.short_interest_weeks,
        market = market.provider_name(),
        short_source = shorts.source_name(),
        "analysis started"
    );

    let dates = weekly_snapshot_dates(opts.run_date, opts.short_interest_weeks);
    let short_table = fetch_weekly(shorts, &dates, opts.short_interest_delay).await;
    if short_table.reports() == 0 && !dates.is_empty() {
        tracing::warn!(
            stage = Stage::ShortInterest.as_str(),
            "no short reports retrieved; every stock gets a neutral short score"
        );
    }

    let (records, stats) =
        collect_universe(market, &short_table, universe, opts.market_data_delay).await;
    log_collect_stats(&stats);
    if records.is_empty() {
        return Err(AnalysisError::new(
            Stage::MarketData,
            format!("no market data collected for {} tickers", universe.len()),
        )
        .into());
    }

    let scored = scoring::score(&records);
    validate_ranking(&scored).map_err(|e| AnalysisError::from_anyhow(Stage::Scoring, &e))?;

    tracing::info!(
        run_date = %opts.run_date,
        collected = records.len(),
        scored = scored.len(),
        "analysis complete"
    );

    Ok(AnalysisReport {
        run_date: opts.run_date,
        generated_at: Utc::now(),
        universe_size: universe.len(),
        collected: records.len(),
        scored,
    })
}

/// Record how a run ended and hand back its result.
///
/// A run whose report cannot be stored is recorded as failed. The cause is logged before any
/// write, and the run's own error is returned even when recording it fails. With no store
/// the result passes through untouched.
pub async fn record_outcome(
    store: Option<&dyn RunStore>,
    run_date: NaiveDate,
    universe_size: usize,
    result: anyhow::Result<AnalysisReport>,
) -> anyhow::Result<AnalysisReport> {
    let err = match (result, store) {
        (Ok(report), None) => return Ok(report),
        (Ok(report), Some(store)) => match store.persist_success(&report).await {
            Ok(run_id) => {
                tracing::info!(
                    %run_date,
                    %run_id,
                    ranked = report.scored.len(),
                    "persisted analysis run"
                );
                return Ok(report);
            }
            Err(e) => e.context("persist analysis run failed"),
        },
        (Err(err), _) => err,
    };

    let detail = format!("{err:#}");
    let stage = err
        .downcast_ref::<AnalysisError>()
        .map(|e| e.stage.as_str())
        .unwrap_or("storage");
    tracing::error!(%run_date, stage, error = %detail, "analysis run failed");

    if let Some(store) = store {
        match store
            .persist_failure(run_date, Utc::now(), universe_size, &detail)
            .await
        {
            Ok(run_id) => tracing::info!(%run_date, %run_id, "recorded failed analysis run"),
            Err(e) => tracing::warn!(
                %run_date,
                error = %format!("{e:#}"),
                "could not record failed analysis run"
            ),
        }
    }
    Err(err)
}

fn log_collect_stats(stats: &CollectStats) {
    tracing::info!(
        requested = stats.requested,
        collected = stats.collected,
        unresolved = stats.unresolved,
        failures = stats.failures,
        "market data collected"
    );
}

/// Ranks must be exactly 1..=N in order, scores within 0..=100 and non-increasing.
pub fn validate_ranking(scored: &[ScoredRecord]) -> anyhow::Result<()> {
    for (idx, s) in scored.iter().enumerate() {
        let expected = (idx + 1) as u32;
        ensure!(
            s.rank == expected,
            "rank gap at position {idx}: expected {expected}, got {} ({})",
            s.rank,
            s.record.ticker
        );
        for (name, v) in [
            ("range_score", s.range_score),
            ("short_score", s.short_score),
            ("pe_score", s.pe_score),
            ("composite_score", s.composite_score),
        ] {
            ensure!(
                (0.0..=100.0).contains(&v),
                "{name} out of range for {}: {v}",
                s.record.ticker
            );
        }
    }

    for w in scored.windows(2) {
        ensure!(
            w[0].composite_score >= w[1].composite_score,
            "ranking not sorted: {} ({}) before {} ({})",
            w[0].record.ticker,
            w[0].composite_score,
            w[1].record.ticker,
            w[1].composite_score
        );
    }
    Ok(())
}
