use chrono::NaiveDate;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, LogNormal, Normal};

use crate::{
    constants::{
        env::{PRICE_WINDOW, SYNTHETIC_START_PRICE, SYNTHETIC_VOLATILITY},
        options::{DAYS_PER_YEAR, RISK_FREE_RATE},
    },
    encoder::{AnalysisRecord, ContractTerms, OptionsReport, TechnicalReport, TradingMode, Trend},
    error::{EngineError, Result},
    options::{chain::historical_volatility, price, OptionContract, OptionRight},
    types::Data,
    utils::{ema, get_rsi_values, mean, sma, std_dev},
};

use super::{MarketDataSource, MarketSnapshot};

/// Prices generated before the episode date so the long averages are defined
const LOOKBACK: usize = 260;
const RSI_PERIOD: usize = 14;
const OPTION_DAYS: f64 = 30.0;

/// Deterministic geometric random walk per (ticker, date, seed), for offline
/// training without a data directory
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    seed: u64,
    window: usize,
    volatility: f64,
    trading_mode: TradingMode,
}

impl SyntheticSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            window: PRICE_WINDOW,
            volatility: SYNTHETIC_VOLATILITY,
            trading_mode: TradingMode::Stock,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(2);
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    /// Attaches an at-the-money call to every record
    pub fn with_trading_mode(mut self, trading_mode: TradingMode) -> Self {
        self.trading_mode = trading_mode;
        self
    }

    /// FNV-1a over the ticker and date, mixed with the source seed
    fn episode_seed(&self, ticker: &str, date: NaiveDate) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325 ^ self.seed;
        for byte in ticker.bytes().chain(date.to_string().into_bytes()) {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn walk(&self, rng: &mut StdRng, length: usize) -> Result<Data> {
        let steps = Normal::new(-0.5 * self.volatility.powi(2), self.volatility)
            .map_err(|error| EngineError::Config(format!("synthetic volatility: {error}")))?;
        let mut prices = Vec::with_capacity(length);
        let mut current = SYNTHETIC_START_PRICE;
        for _ in 0..length {
            current *= steps.sample(rng).exp();
            prices.push(current);
        }
        Ok(prices)
    }
}

fn technical_report(history: &[f64], volumes: &[f64]) -> TechnicalReport {
    let price = history.last().copied();
    let ema_12 = ema(history, 2.0 / 13.0);
    let ema_26 = ema(history, 2.0 / 27.0);
    let macd_line: Data = ema_12.iter().zip(&ema_26).map(|(fast, slow)| fast - slow).collect();
    let signal = ema(&macd_line, 2.0 / 10.0);

    let sma_20 = sma(history, 20);
    let sma_50 = sma(history, 50);
    let sma_200 = sma(history, 200);
    let band_width = 2.0 * std_dev(&history[history.len().saturating_sub(20)..]);
    let bollinger_position = match (price, sma_20) {
        (Some(price), Some(mid)) if band_width > 0.0 => {
            Some((price - (mid - band_width)) / (2.0 * band_width))
        }
        _ => None,
    };

    let recent = &history[history.len().saturating_sub(RSI_PERIOD + 1)..];
    let atr = Some(mean(
        &recent.windows(2).map(|pair| (pair[1] - pair[0]).abs()).collect::<Vec<_>>(),
    ));

    let trend = match (price, sma_50, sma_200) {
        (Some(price), Some(fast), Some(slow)) if price > fast && fast > slow => Trend::Bullish,
        (Some(price), Some(fast), Some(slow)) if price < fast && fast < slow => Trend::Bearish,
        _ => Trend::Neutral,
    };

    TechnicalReport {
        price,
        rsi: get_rsi_values(history, RSI_PERIOD).last().copied(),
        macd: macd_line.last().copied(),
        macd_signal: signal.last().copied(),
        sma_50,
        sma_200,
        ema_10: ema(history, 2.0 / 11.0).last().copied(),
        volume: volumes.last().copied(),
        average_volume: Some(mean(volumes)),
        volatility: historical_volatility(&history[history.len().saturating_sub(30)..]),
        atr,
        bollinger_position,
        trend: Some(trend),
    }
}

impl MarketDataSource for SyntheticSource {
    fn snapshot(&mut self, ticker: &str, date: NaiveDate) -> Result<MarketSnapshot> {
        let mut rng = StdRng::seed_from_u64(self.episode_seed(ticker, date));
        let series = self.walk(&mut rng, LOOKBACK + self.window - 1)?;
        let volume_dist = LogNormal::new(15.0, 0.3)
            .map_err(|error| EngineError::Config(format!("synthetic volume: {error}")))?;
        let volumes: Data = (0..LOOKBACK).map(|_| volume_dist.sample(&mut rng)).collect();

        let history = &series[..LOOKBACK];
        let technical = technical_report(history, &volumes);

        let options = match self.trading_mode {
            TradingMode::Stock => None,
            TradingMode::Options => {
                let spot = history[LOOKBACK - 1];
                let volatility = technical.volatility.filter(|v| *v > 0.0).unwrap_or(0.3);
                let strike = spot.round().max(1.0);
                let time_to_expiry = OPTION_DAYS / DAYS_PER_YEAR;
                let contract = OptionContract::new(
                    OptionRight::Call,
                    spot,
                    strike,
                    time_to_expiry,
                    RISK_FREE_RATE,
                    volatility,
                );
                Some(OptionsReport {
                    contract: Some(ContractTerms {
                        right: OptionRight::Call,
                        underlying: spot,
                        strike,
                        time_to_expiry,
                        risk_free_rate: None,
                        volatility: None,
                    }),
                    market_price: Some(price(&contract)?),
                    ..Default::default()
                })
            }
        };

        Ok(MarketSnapshot {
            record: AnalysisRecord {
                trading_mode: self.trading_mode,
                technical: Some(technical),
                options,
                ..Default::default()
            },
            prices: series[LOOKBACK - 1..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap()
    }

    #[test]
    fn test_deterministic_per_episode() {
        let mut source = SyntheticSource::new(7).with_window(32);
        let first = source.snapshot("NVDA", date()).unwrap();
        let second = source.snapshot("NVDA", date()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.prices.len(), 32);
        assert!(first.prices.iter().all(|price| *price > 0.0));

        let other = source.snapshot("AAPL", date()).unwrap();
        assert_ne!(first.prices, other.prices);
    }

    #[test]
    fn test_record_shape() {
        let mut source = SyntheticSource::new(1).with_trading_mode(TradingMode::Options);
        let snapshot = source.snapshot("TSLA", date()).unwrap();
        let technical = snapshot.record.technical.unwrap();
        let rsi = technical.rsi.unwrap();
        assert!((0.0..=100.0).contains(&rsi));
        assert!(technical.sma_200.is_some());
        assert_eq!(technical.price, snapshot.prices.first().copied());
        assert!(snapshot.record.options.unwrap().market_price.unwrap() > 0.0);
    }
}
