pub mod analysis;
pub mod domain;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod scoring;
pub mod storage;
pub mod time;
pub mod universe;

pub mod config {
    use anyhow::Context;
    use std::time::Duration;

    const DEFAULT_MARKET_DATA_BASE_URL: &str = "https://query1.finance.yahoo.com";
    const DEFAULT_SHORT_INTEREST_BASE_URL: &str = "https://download.asic.gov.au/short-selling";
    const DEFAULT_TICKERS_FILE: &str = "config/asx300_tickers.txt";

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub database_url: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: String,
        pub market_data_timeout: Duration,
        pub market_data_req_delay: Duration,
        pub short_interest_base_url: String,
        pub short_interest_timeout: Duration,
        pub short_interest_req_delay: Duration,
        pub short_interest_weeks: u32,
        pub tickers_file: String,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                database_url: std::env::var("DATABASE_URL").ok(),
                sentry_dsn: std::env::var("SENTRY_DSN").ok(),
                market_data_base_url: env_or("MARKET_DATA_BASE_URL", DEFAULT_MARKET_DATA_BASE_URL),
                market_data_timeout: Duration::from_secs(env_parse("MARKET_DATA_TIMEOUT_SECS", 30)),
                market_data_req_delay: Duration::from_millis(env_parse(
                    "MARKET_DATA_REQ_DELAY_MS",
                    300,
                )),
                short_interest_base_url: env_or(
                    "SHORT_INTEREST_BASE_URL",
                    DEFAULT_SHORT_INTEREST_BASE_URL,
                ),
                short_interest_timeout: Duration::from_secs(env_parse(
                    "SHORT_INTEREST_TIMEOUT_SECS",
                    10,
                )),
                short_interest_req_delay: Duration::from_millis(env_parse(
                    "SHORT_INTEREST_REQ_DELAY_MS",
                    500,
                )),
                short_interest_weeks: env_parse("SHORT_INTEREST_WEEKS", 6),
                tickers_file: env_or("TICKERS_FILE", DEFAULT_TICKERS_FILE),
            })
        }

        pub fn require_database_url(&self) -> anyhow::Result<&str> {
            self.database_url
                .as_deref()
                .context("DATABASE_URL is required")
        }
    }

    fn env_or(key: &str, default: &str) -> String {
        std::env::var(key)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
        std::env::var(key)
            .ok()
            .and_then(|s| s.trim().parse::<T>().ok())
            .unwrap_or(default)
    }
}
