use anyhow::Context;
use asx_screener_core::analysis::{record_outcome, run_analysis, AnalysisOptions, AnalysisReport};
use asx_screener_core::config::Settings;
use asx_screener_core::domain::stock::ShortTrend;
use asx_screener_core::filter::{apply_filters, top_n, FilterOptions, SummaryMetrics};
use asx_screener_core::ingest::asic::AsicShortClient;
use asx_screener_core::ingest::provider::YahooFinanceClient;
use asx_screener_core::storage::runs::RunStore;
use asx_screener_core::universe::Universe;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "asx_screener_worker")]
struct Args {
    /// Run date (YYYY-MM-DD). Defaults to today's Sydney date.
    #[arg(long)]
    run_date: Option<String>,

    /// Ticker list file, one symbol per line. Overrides TICKERS_FILE.
    #[arg(long)]
    tickers_file: Option<PathBuf>,

    /// Comma-separated tickers, e.g. BHP.AX,CBA.AX. Overrides any ticker file.
    #[arg(long)]
    tickers: Option<String>,

    /// Weeks of short-interest history to fetch. Overrides SHORT_INTEREST_WEEKS.
    #[arg(long)]
    weeks: Option<u32>,

    /// Write the (filtered) ranked table as CSV to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep only this sector.
    #[arg(long)]
    sector: Option<String>,

    /// Drop stocks with a P/E above this value. Stocks without a P/E are kept.
    #[arg(long)]
    max_pe: Option<f64>,

    /// Drop stocks above this percentage of their 52-week range.
    #[arg(long)]
    max_range: Option<f64>,

    /// Keep only these short trends (declining, stable, increasing, no-data, insufficient-data).
    #[arg(long, value_delimiter = ',')]
    trend: Vec<String>,

    /// Start from the dashboard's default filters (max P/E 30, max range 50%, declining/stable).
    #[arg(long)]
    dashboard_filters: bool,

    /// Number of top opportunities to log.
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Do everything except writing to the database.
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn filters(&self) -> anyhow::Result<FilterOptions> {
        let mut filters = if self.dashboard_filters {
            FilterOptions::dashboard_default()
        } else {
            FilterOptions::default()
        };

        if let Some(sector) = &self.sector {
            filters.sector = Some(sector.clone());
        }
        if let Some(v) = self.max_pe {
            filters.max_pe = Some(v);
        }
        if let Some(v) = self.max_range {
            filters.max_range_position = Some(v);
        }
        if !self.trend.is_empty() {
            filters.trends = self
                .trend
                .iter()
                .map(|s| s.parse::<ShortTrend>())
                .collect::<anyhow::Result<Vec<_>>>()?;
        }
        Ok(filters)
    }

    fn universe(&self, settings: &Settings) -> anyhow::Result<Universe> {
        if let Some(list) = &self.tickers {
            return Universe::from_csv_list(list);
        }
        match &self.tickers_file {
            Some(path) => Universe::from_file(path),
            None => Universe::from_file(&settings.tickers_file),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();
    if let Some(weeks) = args.weeks {
        settings.short_interest_weeks = weeks;
    }

    let run_date = asx_screener_core::time::asx_market::resolve_run_date(
        args.run_date.as_deref(),
        chrono::Utc::now(),
    )?;
    let filters = args.filters()?;
    let universe = args.universe(&settings)?;

    let (pool, run_lock) = if args.dry_run {
        (None, None)
    } else {
        let db_url = settings.require_database_url()?;
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .context("connect DATABASE_URL failed")?;
        asx_screener_core::storage::migrate(&pool).await?;

        let Some(lock) =
            asx_screener_core::storage::lock::try_acquire_run_lock(&pool, run_date).await?
        else {
            tracing::warn!(%run_date, "run lock not acquired; another run in progress");
            return Ok(());
        };
        (Some(pool), Some(lock))
    };

    let market = YahooFinanceClient::from_settings(&settings)?;
    let shorts = AsicShortClient::from_settings(&settings)?;
    let opts = AnalysisOptions::from_settings(&settings, run_date);

    let result = run_analysis(&market, &shorts, &universe, &opts).await;
    let store = pool.as_ref().map(|p| p as &dyn RunStore);
    if store.is_none() {
        tracing::info!(%run_date, dry_run = true, "skipping persistence");
    }

    let outcome = match record_outcome(store, run_date, universe.len(), result).await {
        Ok(report) => report_success(&args, &filters, &report),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            Err(err)
        }
    };

    if let Some(lock) = run_lock {
        if let Err(e) = lock.release().await {
            tracing::warn!(%run_date, error = %e, "run lock release failed");
        }
    }
    outcome
}

/// Log the summary and top rows, then write the CSV export. Runs after the report is stored.
fn report_success(
    args: &Args,
    filters: &FilterOptions,
    report: &AnalysisReport,
) -> anyhow::Result<()> {
    let rows = apply_filters(&report.display_rows(), filters);
    let summary = SummaryMetrics::from_rows(&rows);

    tracing::info!(
        run_date = %report.run_date,
        scored = report.scored.len(),
        shown = summary.total_stocks,
        declining_shorts = summary.declining_shorts,
        average_pe = ?summary.average_pe,
        low_in_range = summary.low_in_range,
        "analysis summary"
    );

    for row in top_n(&rows, args.top) {
        tracing::info!(
            rank = row.rank,
            ticker = %row.ticker,
            company = %row.company,
            score = row.score,
            range_position = ?row.range_position_pct,
            pe = ?row.pe_ratio,
            short_trend = %row.short_trend,
            "opportunity"
        );
    }

    if let Some(path) = &args.output {
        let csv = asx_screener_core::export::to_csv(&rows)?;
        std::fs::write(path, csv)
            .with_context(|| format!("failed to write CSV export to {}", path.display()))?;
        tracing::info!(path = %path.display(), rows = rows.len(), "wrote CSV export");
    }
    Ok(())
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
