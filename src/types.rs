use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A list of prices, where the last index is the most recent
pub type Data = Vec<f64>;

/// The ticker and trading date an episode is drawn from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub ticker: String,
    pub date: NaiveDate,
}

impl EpisodeKey {
    pub fn new(ticker: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            date,
        }
    }

    /// Builds every ticker/date combination, tickers outermost
    pub fn cartesian(tickers: &[String], dates: &[NaiveDate]) -> Vec<Self> {
        tickers
            .iter()
            .flat_map(|ticker| dates.iter().map(move |date| Self::new(ticker.clone(), *date)))
            .collect()
    }
}

impl fmt::Display for EpisodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ticker, self.date)
    }
}
