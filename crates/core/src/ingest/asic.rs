use crate::config::Settings;
use crate::ingest::short_interest::ShortInterestSource;
use crate::ingest::types::ShortPositionRow;
use anyhow::{Context, Result};
use chrono::NaiveDate;

const HEADER_PREFIX: &str = "Product,Product Code";

/// Client for the regulator's daily short-position reports.
#[derive(Debug, Clone)]
pub struct AsicShortClient {
    http: reqwest::Client,
    base_url: String,
}

impl AsicShortClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(settings.short_interest_timeout)
            .build()
            .context("failed to build short interest http client")?;

        Ok(Self {
            http,
            base_url: settings.short_interest_base_url.clone(),
        })
    }

    fn url(&self, date: NaiveDate) -> String {
        format!(
            "{}/RR{}-001-SSDailyYTD.csv",
            self.base_url.trim_end_matches('/'),
            date.format("%Y%m%d")
        )
    }
}

#[async_trait::async_trait]
impl ShortInterestSource for AsicShortClient {
    fn source_name(&self) -> &'static str {
        "asic"
    }

    async fn fetch_report(&self, date: NaiveDate) -> Result<Option<Vec<ShortPositionRow>>> {
        let res = self
            .http
            .get(self.url(date))
            .send()
            .await
            .context("short report request failed")?;

        let status = res.status();
        if !status.is_success() {
            tracing::debug!(%date, http_status = %status, "no short report for date");
            return Ok(None);
        }

        let text = res
            .text()
            .await
            .context("failed to read short report body")?;
        Ok(Some(parse_report(&text, date)?))
    }
}

/// Parse one report. Everything above the `Product,Product Code` header is preamble.
pub fn parse_report(text: &str, date: NaiveDate) -> Result<Vec<ShortPositionRow>> {
    let Some(header_at) = find_header(text) else {
        return Ok(Vec::new());
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text[header_at..].as_bytes());

    let mut out = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed short report row")?;
        if record.len() < 4 {
            continue;
        }

        let product_name = record.get(0).unwrap_or("");
        let product_code = record.get(1).unwrap_or("");
        let short_positions = record.get(2).unwrap_or("");
        let short_pct = record.get(3).unwrap_or("");

        if short_positions.is_empty() || short_positions == "-" || product_code.is_empty() {
            continue;
        }

        out.push(ShortPositionRow {
            date,
            product_name: product_name.to_string(),
            product_code: product_code.to_ascii_uppercase(),
            short_positions: short_positions.to_string(),
            short_pct: short_pct.parse::<f64>().unwrap_or(0.0),
        });
    }

    Ok(out)
}

fn find_header(text: &str) -> Option<usize> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.starts_with(HEADER_PREFIX) {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 7).unwrap()
    }

    #[test]
    fn parses_rows_after_header() {
        let text = "Short Positions Report,07/03/2025\n\
                    \n\
                    Product,Product Code,Reported Short Positions,% of Total Product in Issue Reported as Short Positions\n\
                    BHP GROUP LIMITED,BHP,12345678,0.24\n\
                    CSL LIMITED,CSL,-,-\n\
                    COMMONWEALTH BANK.,CBA,1000, \n\
                    ZZZ LTD,ZZZ,500,abc\n";

        let rows = parse_report(text, date()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].product_code, "BHP");
        assert_eq!(rows[0].short_pct, 0.24);
        assert_eq!(rows[0].date, date());
        assert_eq!(rows[1].product_code, "CBA");
        assert_eq!(rows[1].short_pct, 0.0);
        assert_eq!(rows[2].short_pct, 0.0);
    }

    #[test]
    fn report_without_header_has_no_rows() {
        let text = "<html>maintenance</html>\n";
        assert!(parse_report(text, date()).unwrap().is_empty());
    }

    #[test]
    fn short_lines_are_skipped() {
        let text = "Product,Product Code,Positions,Pct\nBHP GROUP,BHP\nRIO,RIO,10,1.5\n";
        let rows = parse_report(text, date()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_code, "RIO");
        assert_eq!(rows[0].short_pct, 1.5);
    }

    #[test]
    fn url_uses_compact_date() {
        let settings = Settings {
            database_url: None,
            sentry_dsn: None,
            market_data_base_url: "http://localhost".to_string(),
            market_data_timeout: std::time::Duration::from_secs(1),
            market_data_req_delay: std::time::Duration::ZERO,
            short_interest_base_url: "https://download.asic.gov.au/short-selling/".to_string(),
            short_interest_timeout: std::time::Duration::from_secs(1),
            short_interest_req_delay: std::time::Duration::ZERO,
            short_interest_weeks: 6,
            tickers_file: "tickers.txt".to_string(),
        };
        let client = AsicShortClient::from_settings(&settings).unwrap();
        assert_eq!(
            client.url(date()),
            "https://download.asic.gov.au/short-selling/RR20250307-001-SSDailyYTD.csv"
        );
    }
}
