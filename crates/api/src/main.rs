use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use asx_screener_core::analysis::{record_outcome, run_analysis, AnalysisOptions};
use asx_screener_core::config::Settings;
use asx_screener_core::domain::display::DisplayRow;
use asx_screener_core::domain::stock::ShortTrend;
use asx_screener_core::filter::{apply_filters, top_n, FilterOptions, SummaryMetrics};
use asx_screener_core::ingest::asic::AsicShortClient;
use asx_screener_core::ingest::provider::YahooFinanceClient;
use asx_screener_core::storage::runs::{RunStore, StoredRun};
use asx_screener_core::universe::Universe;

const DEFAULT_TOP: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();
    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match asx_screener_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        pool,
        settings: Arc::new(settings),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/runs", post(trigger_run))
        .route("/runs/latest", get(get_latest_run))
        .route("/runs/latest/top", get(get_latest_top))
        .route("/runs/latest/sectors", get(get_latest_sectors))
        .route("/runs/latest/export.csv", get(export_latest_csv))
        .route("/runs/:run_id", get(get_run_by_id))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
    settings: Arc<Settings>,
}

/// Table controls, mirrored from the dashboard sidebar.
#[derive(Debug, Default, Deserialize)]
struct TableQuery {
    sector: Option<String>,
    max_pe: Option<f64>,
    max_range: Option<f64>,
    /// Comma-separated trend codes, e.g. `declining,stable`.
    trends: Option<String>,
    /// Start from the dashboard's default filters.
    #[serde(default)]
    defaults: bool,
    limit: Option<usize>,
}

impl TableQuery {
    fn filters(&self) -> Result<FilterOptions, StatusCode> {
        let mut filters = if self.defaults {
            FilterOptions::dashboard_default()
        } else {
            FilterOptions::default()
        };
        if let Some(sector) = self.sector.as_deref().filter(|s| !s.is_empty() && *s != "All") {
            filters.sector = Some(sector.to_string());
        }
        if self.max_pe.is_some() {
            filters.max_pe = self.max_pe;
        }
        if self.max_range.is_some() {
            filters.max_range_position = self.max_range;
        }
        if let Some(list) = &self.trends {
            filters.trends = parse_trends(list).map_err(|_| StatusCode::BAD_REQUEST)?;
        }
        Ok(filters)
    }
}

fn parse_trends(list: &str) -> anyhow::Result<Vec<ShortTrend>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

#[derive(Debug, Serialize)]
struct ApiRun {
    run_id: Uuid,
    run_date: NaiveDate,
    generated_at: DateTime<Utc>,
    universe_size: usize,
    collected: usize,
    ranked: usize,
    summary: SummaryMetrics,
    rows: Vec<DisplayRow>,
}

impl ApiRun {
    fn build(run: StoredRun, query: &TableQuery) -> Result<Self, StatusCode> {
        let filters = query.filters()?;
        let mut rows = apply_filters(&run.report.display_rows(), &filters);
        let summary = SummaryMetrics::from_rows(&rows);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(Self {
            run_id: run.id,
            run_date: run.report.run_date,
            generated_at: run.report.generated_at,
            universe_size: run.report.universe_size,
            collected: run.report.collected,
            ranked: run.report.scored.len(),
            summary,
            rows,
        })
    }
}

fn internal_error(e: anyhow::Error) -> StatusCode {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %e, "request failed");
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn latest_run(state: &AppState) -> Result<StoredRun, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    asx_screener_core::storage::runs::load_latest_run(pool)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_latest_run(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<Json<ApiRun>, StatusCode> {
    let run = latest_run(&state).await?;
    Ok(Json(ApiRun::build(run, &query)?))
}

async fn get_run_by_id(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Json<ApiRun>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let run_id = Uuid::parse_str(&run_id).map_err(|_| StatusCode::BAD_REQUEST)?;

    let run = asx_screener_core::storage::runs::load_run(pool, run_id)
        .await
        .map_err(internal_error)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiRun::build(run, &query)?))
}

#[derive(Debug, Deserialize)]
struct TopQuery {
    n: Option<usize>,
}

/// Top opportunities, unfiltered.
async fn get_latest_top(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Result<Json<Vec<DisplayRow>>, StatusCode> {
    let run = latest_run(&state).await?;
    let rows = run.report.display_rows();
    Ok(Json(top_n(&rows, query.n.unwrap_or(DEFAULT_TOP)).to_vec()))
}

async fn get_latest_sectors(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let run = latest_run(&state).await?;
    Ok(Json(asx_screener_core::filter::sectors(
        &run.report.display_rows(),
    )))
}

async fn export_latest_csv(
    State(state): State<AppState>,
    Query(query): Query<TableQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let run = latest_run(&state).await?;
    let filters = query.filters()?;
    let rows = apply_filters(&run.report.display_rows(), &filters);
    let body = asx_screener_core::export::to_csv(&rows).map_err(internal_error)?;

    // Named after the day of the download.
    let file_name = asx_screener_core::export::export_file_name(Utc::now().date_naive());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        body,
    ))
}

#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    run_date: Option<String>,
    /// Comma-separated tickers overriding the configured universe.
    tickers: Option<String>,
}

#[derive(Debug, Serialize)]
struct TriggerResponse {
    run_date: NaiveDate,
    tickers: usize,
}

/// Start a full analysis in the background. Results land in the database.
async fn trigger_run(
    State(state): State<AppState>,
    body: Option<Json<TriggerRequest>>,
) -> Result<(StatusCode, Json<TriggerResponse>), StatusCode> {
    let Some(pool) = state.pool.clone() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let req = body.map(|Json(b)| b).unwrap_or_default();

    let run_date = asx_screener_core::time::asx_market::resolve_run_date(
        req.run_date.as_deref(),
        Utc::now(),
    )
    .map_err(|_| StatusCode::BAD_REQUEST)?;

    let universe = match req.tickers.as_deref() {
        Some(list) => Universe::from_csv_list(list).map_err(|_| StatusCode::BAD_REQUEST)?,
        None => Universe::from_file(&state.settings.tickers_file).map_err(internal_error)?,
    };

    let Some(run_lock) = asx_screener_core::storage::lock::try_acquire_run_lock(&pool, run_date)
        .await
        .map_err(internal_error)?
    else {
        tracing::warn!(%run_date, "run lock not acquired; another run in progress");
        return Err(StatusCode::CONFLICT);
    };

    let response = TriggerResponse {
        run_date,
        tickers: universe.len(),
    };
    let settings = state.settings.clone();
    tokio::spawn(async move {
        // The cause is already logged and recorded by the run itself.
        if let Err(e) = execute_run(&pool, &settings, &universe, run_date).await {
            sentry_anyhow::capture_anyhow(&e);
        }
        if let Err(e) = run_lock.release().await {
            tracing::warn!(%run_date, error = %e, "run lock release failed");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn execute_run(
    pool: &PgPool,
    settings: &Settings,
    universe: &Universe,
    run_date: NaiveDate,
) -> anyhow::Result<()> {
    let market = YahooFinanceClient::from_settings(settings)?;
    let shorts = AsicShortClient::from_settings(settings)?;
    let opts = AnalysisOptions::from_settings(settings, run_date);

    let result = run_analysis(&market, &shorts, universe, &opts).await;
    record_outcome(Some(pool as &dyn RunStore), run_date, universe.len(), result).await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_query_builds_filters() {
        let q = TableQuery {
            sector: Some("Materials".to_string()),
            max_pe: Some(25.0),
            trends: Some("declining, no_data".to_string()),
            ..Default::default()
        };
        let f = q.filters().unwrap();
        assert_eq!(f.sector.as_deref(), Some("Materials"));
        assert_eq!(f.max_pe, Some(25.0));
        assert_eq!(f.max_range_position, None);
        assert_eq!(f.trends, vec![ShortTrend::Declining, ShortTrend::NoData]);
    }

    #[test]
    fn all_sector_means_no_sector_filter() {
        let q = TableQuery {
            sector: Some("All".to_string()),
            defaults: true,
            ..Default::default()
        };
        let f = q.filters().unwrap();
        assert_eq!(f.sector, None);
        assert_eq!(f.max_pe, Some(30.0));
    }

    #[test]
    fn unknown_trend_is_bad_request() {
        let q = TableQuery {
            trends: Some("sideways".to_string()),
            ..Default::default()
        };
        assert_eq!(q.filters().unwrap_err(), StatusCode::BAD_REQUEST);
    }
}
