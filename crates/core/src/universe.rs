use anyhow::Context;
use std::collections::HashSet;
use std::path::Path;

const EXCHANGE_SUFFIX: &str = ".AX";

/// Ordered, de-duplicated list of ticker symbols to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Universe {
    tickers: Vec<String>,
}

impl Universe {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ticker file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid ticker file {}", path.display()))
    }

    /// One symbol per line. `#` starts a comment.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Self::from_symbols(text.lines().map(|line| match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        }))
    }

    pub fn from_symbols<I, S>(symbols: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut tickers = Vec::new();
        for s in symbols {
            let t = s.as_ref().trim().to_ascii_uppercase();
            if t.is_empty() {
                continue;
            }
            if seen.insert(t.clone()) {
                tickers.push(t);
            }
        }

        anyhow::ensure!(!tickers.is_empty(), "ticker universe must be non-empty");
        Ok(Self { tickers })
    }

    /// Comma-separated override, e.g. `BHP.AX,CBA.AX`.
    pub fn from_csv_list(list: &str) -> anyhow::Result<Self> {
        Self::from_symbols(list.split(','))
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Regulator product code for an exchange ticker (`BHP.AX` -> `BHP`).
pub fn short_code(ticker: &str) -> &str {
    ticker.strip_suffix(EXCHANGE_SUFFIX).unwrap_or(ticker)
}
