use crate::domain::stock::{ShortInterestPoint, MAX_SHORT_HISTORY};
use crate::ingest::types::ShortPositionRow;
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::time::Duration;

#[async_trait::async_trait]
pub trait ShortInterestSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// `Ok(None)` when no report was published for `date`.
    async fn fetch_report(&self, date: NaiveDate) -> Result<Option<Vec<ShortPositionRow>>>;
}

/// Short-interest observations for every product code seen across the fetched reports.
#[derive(Debug, Clone, Default)]
pub struct ShortInterestTable {
    by_code: HashMap<String, Vec<ShortInterestPoint>>,
    reports: usize,
}

impl ShortInterestTable {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ShortPositionRow>,
    {
        let mut table = Self::default();
        table.extend(rows);
        table
    }

    fn extend<I>(&mut self, rows: I)
    where
        I: IntoIterator<Item = ShortPositionRow>,
    {
        for row in rows {
            self.by_code
                .entry(row.product_code)
                .or_default()
                .push(ShortInterestPoint {
                    date: row.date,
                    short_pct: row.short_pct,
                });
        }
    }

    /// Oldest first, at most the six most recent observations.
    pub fn history_for(&self, code: &str) -> Vec<ShortInterestPoint> {
        let Some(points) = self.by_code.get(code) else {
            return Vec::new();
        };

        let mut points = points.clone();
        points.sort_by_key(|p| p.date);
        let start = points.len().saturating_sub(MAX_SHORT_HISTORY);
        points.split_off(start)
    }

    pub fn codes(&self) -> usize {
        self.by_code.len()
    }

    /// Number of weekly reports that contributed at least one row.
    pub fn reports(&self) -> usize {
        self.reports
    }
}

/// Fetch one report per date, sequentially, pausing `delay` between requests.
/// A week that fails or has no report is skipped.
pub async fn fetch_weekly(
    source: &dyn ShortInterestSource,
    dates: &[NaiveDate],
    delay: Duration,
) -> ShortInterestTable {
    let mut table = ShortInterestTable::default();
    let mut rows_total: usize = 0;

    for (idx, &date) in dates.iter().enumerate() {
        if idx != 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match source.fetch_report(date).await {
            Ok(Some(rows)) if rows.is_empty() => {
                tracing::warn!(%date, "short report has no rows; skipping week");
            }
            Ok(Some(rows)) => {
                rows_total += rows.len();
                table.reports += 1;
                tracing::info!(%date, rows = rows.len(), "short report retrieved");
                table.extend(rows);
            }
            Ok(None) => {
                tracing::info!(%date, "no short report for date");
            }
            Err(err) => {
                tracing::warn!(
                    %date,
                    source = source.source_name(),
                    error = %err,
                    "short report fetch failed; skipping week"
                );
            }
        }
    }

    tracing::info!(
        weeks = dates.len(),
        reports = table.reports,
        rows = rows_total,
        codes = table.codes(),
        "short interest collected"
    );
    table
}
