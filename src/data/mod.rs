//! Market-data collaborators. A source hands the environment one analysis
//! record and the reference price window for a (ticker, date) pair.

pub mod historical;
pub mod synthetic;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{encoder::AnalysisRecord, error::Result, types::Data};

pub use historical::FileSource;
pub use synthetic::SyntheticSource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub record: AnalysisRecord,
    /// Close prices from the episode date onward, oldest first
    pub prices: Data,
}

pub trait MarketDataSource {
    fn snapshot(&mut self, ticker: &str, date: NaiveDate) -> Result<MarketSnapshot>;
}

impl<S: MarketDataSource + ?Sized> MarketDataSource for Box<S> {
    fn snapshot(&mut self, ticker: &str, date: NaiveDate) -> Result<MarketSnapshot> {
        (**self).snapshot(ticker, date)
    }
}
