//! Structured analysis reports handed over by the upstream pipeline. Every
//! numeric field is optional; the encoder substitutes neutral defaults.

use serde::{Deserialize, Serialize};

use crate::options::{OptionQuote, OptionRight, StrategyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    #[default]
    Stock,
    Options,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Neutral,
    Bearish,
}

impl Trend {
    pub fn signal(&self) -> f64 {
        match self {
            Trend::Bullish => 1.0,
            Trend::Neutral => 0.0,
            Trend::Bearish => -1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisRecord {
    pub trading_mode: TradingMode,
    pub technical: Option<TechnicalReport>,
    pub fundamental: Option<FundamentalReport>,
    pub news: Option<NewsReport>,
    pub social: Option<SocialReport>,
    pub options: Option<OptionsReport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TechnicalReport {
    /// Latest close the indicators were computed against
    pub price: Option<f64>,
    /// Oscillator in [0, 100]
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_10: Option<f64>,
    pub volume: Option<f64>,
    pub average_volume: Option<f64>,
    /// Annualized volatility as a fraction
    pub volatility: Option<f64>,
    pub atr: Option<f64>,
    /// Position inside the Bollinger bands, 0 at the lower band and 1 at the upper
    pub bollinger_position: Option<f64>,
    pub trend: Option<Trend>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundamentalReport {
    pub pe_ratio: Option<f64>,
    pub forward_pe: Option<f64>,
    pub peg_ratio: Option<f64>,
    pub price_to_book: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_ratio: Option<f64>,
    /// Fractions, e.g. 0.15 for 15%
    pub return_on_equity: Option<f64>,
    pub profit_margin: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub free_cash_flow_yield: Option<f64>,
    pub market_cap: Option<f64>,
    pub beta: Option<f64>,
    /// Consensus rating from -1 (strong sell) to +1 (strong buy)
    pub analyst_rating: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsReport {
    /// Aggregate sentiment in [-1, 1]
    pub sentiment: Option<f64>,
    /// Expected market impact in [0, 1]
    pub impact: Option<f64>,
    pub article_count: Option<f64>,
    pub positive_ratio: Option<f64>,
    pub negative_ratio: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocialReport {
    /// Aggregate sentiment in [-1, 1]
    pub sentiment: Option<f64>,
    /// Signal strength in [0, 1]
    pub strength: Option<f64>,
    pub mention_count: Option<f64>,
    pub bullish_ratio: Option<f64>,
}

/// The contract an options analysis refers to. Volatility and rate fall back
/// to the report's implied volatility and the configured risk free rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractTerms {
    pub right: OptionRight,
    pub underlying: f64,
    pub strike: f64,
    pub time_to_expiry: f64,
    #[serde(default)]
    pub risk_free_rate: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsReport {
    pub contract: Option<ContractTerms>,
    /// Observed premium, used to solve for implied volatility
    pub market_price: Option<f64>,
    pub implied_volatility: Option<f64>,
    pub put_call_ratio: Option<f64>,
    pub strategy: Option<StrategyId>,
    pub quotes: Vec<OptionQuote>,
}
