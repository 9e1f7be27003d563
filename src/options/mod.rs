//! Black-Scholes pricing, implied volatility, strategy payoffs and option
//! chain analytics

pub mod chain;
pub mod pricing;
pub mod strategy;

pub use chain::{historical_volatility, ChainSentiment, ChainSummary, IvAssessment, OptionQuote};
pub use pricing::{
    implied_volatility, price, price_and_greeks, put_call_parity_gap, Greeks, IvSolver,
    OptionContract, OptionRight,
};
pub use strategy::{
    analyze_strategy, expiry_payoff, LegRight, OptionLeg, Side, StrategyAnalysis,
    StrategyAnalyzer, StrategyId,
};
