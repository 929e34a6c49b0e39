use crate::analysis::AnalysisReport;
use crate::domain::stock::{ScoredRecord, ShortInterestPoint, ShortTrend, StockRecord};
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use uuid::Uuid;

const INSERT_BATCH: usize = 200;

/// A successful run read back from the database.
#[derive(Debug, Clone)]
pub struct StoredRun {
    pub id: Uuid,
    pub report: AnalysisReport,
}

/// Where finished runs are recorded.
#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    async fn persist_success(&self, report: &AnalysisReport) -> anyhow::Result<Uuid>;

    async fn persist_failure(
        &self,
        run_date: NaiveDate,
        generated_at: DateTime<Utc>,
        universe_size: usize,
        error: &str,
    ) -> anyhow::Result<Uuid>;
}

#[async_trait::async_trait]
impl RunStore for sqlx::PgPool {
    async fn persist_success(&self, report: &AnalysisReport) -> anyhow::Result<Uuid> {
        persist_success(self, report).await
    }

    async fn persist_failure(
        &self,
        run_date: NaiveDate,
        generated_at: DateTime<Utc>,
        universe_size: usize,
        error: &str,
    ) -> anyhow::Result<Uuid> {
        persist_failure(self, run_date, generated_at, universe_size, error).await
    }
}

/// Persist a completed run and all of its ranked rows atomically.
pub async fn persist_success(
    pool: &sqlx::PgPool,
    report: &AnalysisReport,
) -> anyhow::Result<Uuid> {
    let histories = report
        .scored
        .iter()
        .map(|s| serde_json::to_value(&s.record.short_history))
        .collect::<Result<Vec<Value>, _>>()
        .context("serialize short history failed")?;

    let id = Uuid::new_v4();
    let mut tx = pool.begin().await.context("begin transaction failed")?;

    sqlx::query(
        "INSERT INTO analysis_runs (id, run_date, generated_at, status, error, universe_size, collected_count, scored_count) \
         VALUES ($1, $2, $3, 'success', NULL, $4, $5, $6)",
    )
    .persistent(false)
    .bind(id)
    .bind(report.run_date)
    .bind(report.generated_at)
    .bind(report.universe_size as i32)
    .bind(report.collected as i32)
    .bind(report.scored.len() as i32)
    .execute(&mut *tx)
    .await
    .context("insert analysis_runs failed")?;

    let rows: Vec<(&ScoredRecord, Value)> = report.scored.iter().zip(histories).collect();
    for (batch_idx, chunk) in rows.chunks(INSERT_BATCH).enumerate() {
        let mut qb = sqlx::QueryBuilder::new(
            "INSERT INTO analysis_rows (run_id, rank, ticker, company_name, sector, current_price, market_cap, \
             pe_ratio, week52_high, week52_low, range_position_pct, short_history, short_absolute_change, \
             short_trend, range_score, short_score, pe_score, composite_score) ",
        );
        qb.push_values(chunk, |mut b, (s, history)| {
            let r = &s.record;
            b.push_bind(id)
                .push_bind(s.rank as i32)
                .push_bind(&r.ticker)
                .push_bind(&r.company_name)
                .push_bind(&r.sector)
                .push_bind(r.current_price)
                .push_bind(r.market_cap)
                .push_bind(r.pe_ratio)
                .push_bind(r.week52_high)
                .push_bind(r.week52_low)
                .push_bind(r.range_position_pct)
                .push_bind(history.clone())
                .push_bind(r.short_absolute_change)
                .push_bind(r.short_trend.code())
                .push_bind(s.range_score)
                .push_bind(s.short_score)
                .push_bind(s.pe_score)
                .push_bind(s.composite_score);
        });

        qb.build()
            .persistent(false)
            .execute(&mut *tx)
            .await
            .context("batch insert analysis_rows failed")?;

        tracing::debug!(%id, batch_idx, batch_size = chunk.len(), "analysis_rows batch insert");
    }

    tx.commit().await.context("commit transaction failed")?;
    Ok(id)
}

/// Record an aborted run. No rows are stored so partial output is never served.
pub async fn persist_failure(
    pool: &sqlx::PgPool,
    run_date: NaiveDate,
    generated_at: DateTime<Utc>,
    universe_size: usize,
    error: &str,
) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO analysis_runs (id, run_date, generated_at, status, error, universe_size) \
         VALUES ($1, $2, $3, 'error', $4, $5)",
    )
    .persistent(false)
    .bind(id)
    .bind(run_date)
    .bind(generated_at)
    .bind(error)
    .bind(universe_size as i32)
    .execute(pool)
    .await
    .context("insert error analysis_runs failed")?;

    Ok(id)
}

pub async fn load_latest_run(pool: &sqlx::PgPool) -> anyhow::Result<Option<StoredRun>> {
    let row = sqlx::query_as::<_, RunHeader>(
        "SELECT id, run_date, generated_at, universe_size, collected_count \
         FROM analysis_runs \
         WHERE status = 'success' \
         ORDER BY run_date DESC, generated_at DESC \
         LIMIT 1",
    )
    .persistent(false)
    .fetch_optional(pool)
    .await
    .context("select latest analysis_runs failed")?;

    match row {
        Some(header) => Ok(Some(load_rows(pool, header).await?)),
        None => Ok(None),
    }
}

pub async fn load_run(pool: &sqlx::PgPool, id: Uuid) -> anyhow::Result<Option<StoredRun>> {
    let row = sqlx::query_as::<_, RunHeader>(
        "SELECT id, run_date, generated_at, universe_size, collected_count \
         FROM analysis_runs \
         WHERE status = 'success' AND id = $1",
    )
    .persistent(false)
    .bind(id)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("select analysis_runs {id} failed"))?;

    match row {
        Some(header) => Ok(Some(load_rows(pool, header).await?)),
        None => Ok(None),
    }
}

#[derive(Debug, sqlx::FromRow)]
struct RunHeader {
    id: Uuid,
    run_date: NaiveDate,
    generated_at: DateTime<Utc>,
    universe_size: i32,
    collected_count: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct RowRecord {
    rank: i32,
    ticker: String,
    company_name: String,
    sector: String,
    current_price: f64,
    market_cap: f64,
    pe_ratio: Option<f64>,
    week52_high: f64,
    week52_low: f64,
    range_position_pct: Option<f64>,
    short_history: Value,
    short_absolute_change: Option<f64>,
    short_trend: String,
    range_score: f64,
    short_score: f64,
    pe_score: f64,
    composite_score: f64,
}

async fn load_rows(pool: &sqlx::PgPool, header: RunHeader) -> anyhow::Result<StoredRun> {
    let rows = sqlx::query_as::<_, RowRecord>(
        "SELECT rank, ticker, company_name, sector, current_price, market_cap, pe_ratio, \
                week52_high, week52_low, range_position_pct, short_history, short_absolute_change, \
                short_trend, range_score, short_score, pe_score, composite_score \
         FROM analysis_rows \
         WHERE run_id = $1 \
         ORDER BY rank ASC",
    )
    .persistent(false)
    .bind(header.id)
    .fetch_all(pool)
    .await
    .context("select analysis_rows failed")?;

    let scored = rows
        .into_iter()
        .map(into_scored)
        .collect::<anyhow::Result<Vec<_>>>()
        .with_context(|| format!("invalid analysis_rows for run_id={}", header.id))?;

    Ok(StoredRun {
        id: header.id,
        report: AnalysisReport {
            run_date: header.run_date,
            generated_at: header.generated_at,
            universe_size: header.universe_size.max(0) as usize,
            collected: header.collected_count.max(0) as usize,
            scored,
        },
    })
}

fn into_scored(row: RowRecord) -> anyhow::Result<ScoredRecord> {
    let rank = u32::try_from(row.rank)
        .with_context(|| format!("negative rank for {}", row.ticker))?;
    let short_history: Vec<ShortInterestPoint> = serde_json::from_value(row.short_history)
        .with_context(|| format!("invalid short_history for {}", row.ticker))?;
    let short_trend: ShortTrend = row.short_trend.parse()?;

    Ok(ScoredRecord {
        record: StockRecord {
            ticker: row.ticker,
            company_name: row.company_name,
            sector: row.sector,
            current_price: row.current_price,
            market_cap: row.market_cap,
            pe_ratio: row.pe_ratio,
            week52_high: row.week52_high,
            week52_low: row.week52_low,
            range_position_pct: row.range_position_pct,
            short_history,
            short_absolute_change: row.short_absolute_change,
            short_trend,
        },
        range_score: row.range_score,
        short_score: row.short_score,
        pe_score: row.pe_score,
        composite_score: row.composite_score,
        rank,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(rank: i32, history: Value, trend: &str) -> RowRecord {
        RowRecord {
            rank,
            ticker: "BHP.AX".to_string(),
            company_name: "BHP Group Limited".to_string(),
            sector: "Basic Materials".to_string(),
            current_price: 42.5,
            market_cap: 2.15e11,
            pe_ratio: Some(12.5),
            week52_high: 50.0,
            week52_low: 38.0,
            range_position_pct: Some(37.5),
            short_history: history,
            short_absolute_change: Some(-0.5),
            short_trend: trend.to_string(),
            range_score: 100.0,
            short_score: 100.0,
            pe_score: 100.0,
            composite_score: 100.0,
        }
    }

    #[test]
    fn stored_row_maps_back_to_scored_record() {
        let history = json!([
            {"date": "2025-02-28", "short_pct": 2.5},
            {"date": "2025-03-07", "short_pct": 2.0}
        ]);
        let s = into_scored(row(1, history, "declining")).unwrap();
        assert_eq!(s.rank, 1);
        assert_eq!(s.record.short_trend, ShortTrend::Declining);
        assert_eq!(s.record.short_history.len(), 2);
        assert_eq!(s.record.short_history[1].short_pct, 2.0);
    }

    #[test]
    fn corrupt_rows_are_rejected() {
        assert!(into_scored(row(-1, json!([]), "stable")).is_err());
        assert!(into_scored(row(1, json!({"oops": 1}), "stable")).is_err());
        assert!(into_scored(row(1, json!([]), "sideways")).is_err());
    }
}
