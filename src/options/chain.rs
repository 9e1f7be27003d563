use chrono::NaiveDate;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::{
    constants::options::{
        ATM_STRIKES, BEARISH_PUT_CALL, BULLISH_PUT_CALL, IV_PREMIUM_BAND, TRADING_DAYS_PER_YEAR,
    },
    utils::std_dev,
};

use super::pricing::OptionRight;

/// One row of an option chain as delivered by the market-data collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub expiry: NaiveDate,
    pub right: OptionRight,
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub last: f64,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub open_interest: u64,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

impl OptionQuote {
    /// Bid/ask midpoint, falling back to the last trade when either side is missing
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainSentiment {
    Bullish,
    Neutral,
    Bearish,
}

impl ChainSentiment {
    pub fn from_put_call_ratio(ratio: f64) -> Self {
        if ratio > BEARISH_PUT_CALL {
            ChainSentiment::Bearish
        } else if ratio < BULLISH_PUT_CALL {
            ChainSentiment::Bullish
        } else {
            ChainSentiment::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IvAssessment {
    Expensive,
    Fair,
    Cheap,
}

impl IvAssessment {
    pub fn from_premium(premium: f64) -> Self {
        if premium > IV_PREMIUM_BAND {
            IvAssessment::Expensive
        } else if premium < -IV_PREMIUM_BAND {
            IvAssessment::Cheap
        } else {
            IvAssessment::Fair
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainSummary {
    pub put_call_volume_ratio: f64,
    pub put_call_oi_ratio: f64,
    pub atm_call_iv: Option<f64>,
    pub atm_put_iv: Option<f64>,
    pub sentiment: ChainSentiment,
}

impl ChainSummary {
    pub fn from_quotes(quotes: &[OptionQuote], spot: f64) -> Self {
        let (mut call_volume, mut put_volume, mut call_oi, mut put_oi) = (0u64, 0u64, 0u64, 0u64);
        for quote in quotes {
            match quote.right {
                OptionRight::Call => {
                    call_volume = call_volume.saturating_add(quote.volume);
                    call_oi = call_oi.saturating_add(quote.open_interest);
                }
                OptionRight::Put => {
                    put_volume = put_volume.saturating_add(quote.volume);
                    put_oi = put_oi.saturating_add(quote.open_interest);
                }
            }
        }

        let ratio = |puts: u64, calls: u64| {
            if calls == 0 {
                0.0
            } else {
                puts as f64 / calls as f64
            }
        };
        let put_call_volume_ratio = ratio(put_volume, call_volume);

        Self {
            put_call_volume_ratio,
            put_call_oi_ratio: ratio(put_oi, call_oi),
            atm_call_iv: atm_iv(quotes, spot, OptionRight::Call),
            atm_put_iv: atm_iv(quotes, spot, OptionRight::Put),
            sentiment: ChainSentiment::from_put_call_ratio(put_call_volume_ratio),
        }
    }

    pub fn iv_premium(&self, historical_volatility: f64) -> Option<f64> {
        self.atm_call_iv.map(|iv| iv - historical_volatility)
    }

    pub fn iv_assessment(&self, historical_volatility: f64) -> Option<IvAssessment> {
        self.iv_premium(historical_volatility).map(IvAssessment::from_premium)
    }
}

/// Mean implied volatility of the quotes closest to spot
fn atm_iv(quotes: &[OptionQuote], spot: f64, right: OptionRight) -> Option<f64> {
    let mut candidates: Vec<(f64, f64)> = quotes
        .iter()
        .filter(|quote| quote.right == right)
        .filter_map(|quote| {
            quote
                .implied_volatility
                .filter(|iv| iv.is_finite() && *iv > 0.0)
                .map(|iv| (quote.strike, iv))
        })
        .collect();
    if candidates.is_empty() {
        return None;
    }

    candidates.sort_by_key(|(strike, _)| OrderedFloat((strike - spot).abs()));
    let nearest = &candidates[..candidates.len().min(ATM_STRIKES)];
    Some(nearest.iter().map(|(_, iv)| iv).sum::<f64>() / nearest.len() as f64)
}

/// Annualized standard deviation of daily log returns
pub fn historical_volatility(prices: &[f64]) -> Option<f64> {
    let log_returns: Vec<f64> = prices
        .windows(2)
        .filter(|pair| pair[0] > 0.0 && pair[1] > 0.0)
        .map(|pair| (pair[1] / pair[0]).ln())
        .collect();
    if log_returns.len() < 2 {
        return None;
    }
    Some(std_dev(&log_returns) * TRADING_DAYS_PER_YEAR.sqrt())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn quote(right: OptionRight, strike: f64, volume: u64, oi: u64, iv: f64) -> OptionQuote {
        OptionQuote {
            strike,
            expiry: NaiveDate::from_ymd_opt(2024, 6, 21).unwrap(),
            right,
            bid: 1.0,
            ask: 1.2,
            last: 1.1,
            volume,
            open_interest: oi,
            implied_volatility: Some(iv),
        }
    }

    #[test]
    fn test_summary_ratios_and_sentiment() {
        let quotes = vec![
            quote(OptionRight::Call, 100.0, 100, 1000, 0.30),
            quote(OptionRight::Call, 150.0, 100, 1000, 0.90),
            quote(OptionRight::Put, 100.0, 300, 500, 0.40),
        ];
        let summary = ChainSummary::from_quotes(&quotes, 101.0);
        assert_relative_eq!(summary.put_call_volume_ratio, 1.5);
        assert_relative_eq!(summary.put_call_oi_ratio, 0.25);
        assert_eq!(summary.sentiment, ChainSentiment::Bearish);
        assert_eq!(summary.atm_put_iv, Some(0.40));
        assert_relative_eq!(summary.atm_call_iv.unwrap(), 0.60);
        assert_relative_eq!(quotes[0].mid(), 1.1);
    }

    #[test]
    fn test_empty_call_side() {
        let quotes = vec![quote(OptionRight::Put, 100.0, 10, 10, 0.2)];
        let summary = ChainSummary::from_quotes(&quotes, 100.0);
        assert_eq!(summary.put_call_volume_ratio, 0.0);
        assert_eq!(summary.sentiment, ChainSentiment::Bullish);
        assert_eq!(summary.atm_call_iv, None);
        assert_eq!(summary.iv_assessment(0.2), None);
    }

    #[test]
    fn test_huge_volumes_saturate() {
        let quotes = vec![
            quote(OptionRight::Call, 100.0, u64::MAX, u64::MAX, 0.3),
            quote(OptionRight::Call, 105.0, 10, 10, 0.3),
            quote(OptionRight::Put, 100.0, u64::MAX, 1, 0.3),
            quote(OptionRight::Put, 95.0, u64::MAX, 1, 0.3),
        ];
        let summary = ChainSummary::from_quotes(&quotes, 100.0);
        assert_relative_eq!(summary.put_call_volume_ratio, 1.0);
        assert!(summary.put_call_oi_ratio.is_finite());
    }

    #[test]
    fn test_iv_assessment_bands() {
        assert_eq!(IvAssessment::from_premium(0.2), IvAssessment::Expensive);
        assert_eq!(IvAssessment::from_premium(-0.2), IvAssessment::Cheap);
        assert_eq!(IvAssessment::from_premium(0.05), IvAssessment::Fair);
    }

    #[test]
    fn test_historical_volatility() {
        assert_eq!(historical_volatility(&[100.0, 101.0]), None);
        let flat = historical_volatility(&[100.0; 10]).unwrap();
        assert_eq!(flat, 0.0);
        let choppy = historical_volatility(&[100.0, 102.0, 99.0, 103.0, 98.0]).unwrap();
        assert!(choppy > 0.3);
    }
}
