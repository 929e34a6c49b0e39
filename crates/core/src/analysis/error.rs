use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ShortInterest,
    MarketData,
    Scoring,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ShortInterest => "short_interest",
            Stage::MarketData => "market_data",
            Stage::Scoring => "scoring",
        }
    }
}

/// An analysis run that was aborted. Carries the stage so operators can tell a dead data
/// provider from a scoring defect.
#[derive(Debug, Clone)]
pub struct AnalysisError {
    pub stage: Stage,
    pub detail: String,
}

impl AnalysisError {
    pub fn new(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }

    pub fn from_anyhow(stage: Stage, err: &anyhow::Error) -> Self {
        Self::new(stage, format!("{err:#}"))
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "analysis aborted (stage={}): {}",
            self.stage.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for AnalysisError {}
