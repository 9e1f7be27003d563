use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use hashbrown::HashMap;
use tracing::debug;

use crate::{
    error::{EngineError, Result},
    types::EpisodeKey,
    utils::create_folder_if_not_exists,
};

use super::{MarketDataSource, MarketSnapshot};

/// Reads snapshots from `<dir>/<TICKER>_<YYYY-MM-DD>.json`, keeping each one
/// in memory after the first read
pub struct FileSource {
    dir: PathBuf,
    cache: HashMap<EpisodeKey, MarketSnapshot>,
}

impl FileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    pub fn path_for(dir: &Path, ticker: &str, date: NaiveDate) -> PathBuf {
        dir.join(format!("{ticker}_{}.json", date.format("%Y-%m-%d")))
    }

    /// Writes a snapshot where [`FileSource`] will look for it
    pub fn write(dir: &Path, ticker: &str, date: NaiveDate, snapshot: &MarketSnapshot) -> Result<PathBuf> {
        create_folder_if_not_exists(dir)?;
        let path = Self::path_for(dir, ticker, date);
        fs::write(&path, serde_json::to_vec_pretty(snapshot)?)?;
        Ok(path)
    }

    fn read(&self, ticker: &str, date: NaiveDate) -> Result<MarketSnapshot> {
        let path = Self::path_for(&self.dir, ticker, date);
        let unavailable = |reason: String| EngineError::DataUnavailable {
            ticker: ticker.to_string(),
            date: date.to_string(),
            reason,
        };

        let raw = fs::read(&path)
            .map_err(|error| unavailable(format!("{}: {error}", path.display())))?;
        let snapshot: MarketSnapshot = serde_json::from_slice(&raw)?;
        if snapshot.prices.len() < 2 {
            return Err(unavailable(format!(
                "{} holds {} prices, need at least 2",
                path.display(),
                snapshot.prices.len()
            )));
        }

        debug!(path = %path.display(), prices = snapshot.prices.len(), "loaded market snapshot");
        Ok(snapshot)
    }
}

impl MarketDataSource for FileSource {
    fn snapshot(&mut self, ticker: &str, date: NaiveDate) -> Result<MarketSnapshot> {
        let key = EpisodeKey::new(ticker, date);
        if let Some(snapshot) = self.cache.get(&key) {
            return Ok(snapshot.clone());
        }

        let snapshot = self.read(ticker, date)?;
        self.cache.insert(key, snapshot.clone());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{AnalysisRecord, NewsReport};

    #[test]
    fn test_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let snapshot = MarketSnapshot {
            record: AnalysisRecord {
                news: Some(NewsReport {
                    sentiment: Some(0.3),
                    ..Default::default()
                }),
                ..Default::default()
            },
            prices: vec![100.0, 101.0, 99.5],
        };
        let path = FileSource::write(dir.path(), "NVDA", date, &snapshot).unwrap();
        assert!(path.ends_with("NVDA_2024-05-10.json"));

        let mut source = FileSource::new(dir.path());
        assert_eq!(source.snapshot("NVDA", date).unwrap(), snapshot);
        // Served from the cache once the file is gone
        fs::remove_file(path).unwrap();
        assert_eq!(source.snapshot("NVDA", date).unwrap(), snapshot);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = FileSource::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(matches!(
            source.snapshot("AAPL", date),
            Err(EngineError::DataUnavailable { .. })
        ));
    }
}
