//! Turns an [`AnalysisRecord`] into a fixed-size [`StateVector`].
//!
//! Encoding is pure: the same record always produces a bit-identical vector.
//! Missing categories, missing fields and option pricing failures all fall
//! back to each slot's neutral default so the network input never changes
//! shape.

pub mod record;
pub mod state;

use tracing::debug;

use crate::{
    config::OptionsConfig,
    constants::{
        options::RISK_FREE_RATE,
        state::{
            EPISODE_LEN, EPISODE_OFFSET, FUNDAMENTAL_LEN, FUNDAMENTAL_OFFSET, META_LEN, META_OFFSET,
            NEWS_LEN, NEWS_OFFSET, OPTIONS_LEN, OPTIONS_OFFSET, RESERVED_OFFSET, SOCIAL_LEN,
            SOCIAL_OFFSET, STATE_DIM, TECHNICAL_LEN, TECHNICAL_OFFSET,
        },
    },
    error::{EngineError, Result},
    options::{
        price_and_greeks, ChainSentiment, ChainSummary, Greeks, IvSolver, OptionContract,
        StrategyAnalyzer,
    },
    utils::{finite_or, symlog},
};

pub use record::{
    AnalysisRecord, ContractTerms, FundamentalReport, NewsReport, OptionsReport, SocialReport,
    TechnicalReport, TradingMode, Trend,
};
pub use state::StateVector;

/// Neutral value of a ratio squashed through `x / (1 + x)`
const NEUTRAL_RATIO: f64 = 0.5;

/// Options segment when no contract could be priced
const OPTIONS_NEUTRAL: [f64; OPTIONS_LEN] = [
    0.0, 0.0, 0.0, 0.0, 0.0, 0.0, NEUTRAL_RATIO, 0.0, // greeks, iv, put/call, strategy
    0.0, 0.0, 0.0, 0.0, 0.0, NEUTRAL_RATIO, 0.0, 0.0,
];

const TECHNICAL_FEATURES: &[&str] = &[
    "rsi",
    "macd",
    "macd_histogram",
    "price_vs_sma_50",
    "price_vs_sma_200",
    "price_vs_ema_10",
    "sma_50_vs_sma_200",
    "relative_volume",
    "volume",
    "volatility",
    "atr_ratio",
    "bollinger_position",
    "trend",
];

const FUNDAMENTAL_FEATURES: &[&str] = &[
    "pe_ratio",
    "forward_pe",
    "peg_ratio",
    "price_to_book",
    "price_to_sales",
    "debt_to_equity",
    "current_ratio",
    "return_on_equity",
    "profit_margin",
    "revenue_growth",
    "earnings_growth",
    "dividend_yield",
    "free_cash_flow_yield",
    "market_cap",
    "beta",
    "analyst_rating",
];

const NEWS_FEATURES: &[&str] = &[
    "news_sentiment",
    "news_impact",
    "news_article_count",
    "news_positive_ratio",
    "news_negative_ratio",
];

const SOCIAL_FEATURES: &[&str] = &[
    "social_sentiment",
    "social_strength",
    "social_mention_count",
    "social_bullish_ratio",
];

const OPTIONS_FEATURES: &[&str] = &[
    "delta",
    "gamma",
    "theta",
    "vega",
    "rho",
    "implied_volatility",
    "put_call_ratio",
    "strategy_bias",
    "log_moneyness",
    "time_to_expiry",
    "mispricing",
    "atm_call_iv",
    "iv_premium",
    "put_call_oi_ratio",
    "chain_sentiment",
];

const META_FEATURES: &[&str] = &[
    "is_options_mode",
    "has_technical",
    "has_fundamental",
    "has_news",
    "has_social",
    "has_options",
];

const EPISODE_FEATURES: &[&str] = &[
    "position_direction",
    "unrealized_return",
    "episode_progress",
    "last_step_return",
    "capital_change",
];

const NO_FEATURES: &[&str] = &[];

/// Appends features into one fixed window of the state buffer
struct Segment<'a> {
    slots: &'a mut [f64],
    cursor: usize,
}

impl<'a> Segment<'a> {
    fn new(buffer: &'a mut [f64; STATE_DIM], offset: usize, len: usize) -> Self {
        Self {
            slots: &mut buffer[offset..offset + len],
            cursor: 0,
        }
    }

    /// Writes `transform(value)`, or `neutral` when the field is missing or not finite
    fn push(&mut self, value: Option<f64>, neutral: f64, transform: impl Fn(f64) -> f64) {
        let encoded = value
            .filter(|value| value.is_finite())
            .map(transform)
            .filter(|encoded| encoded.is_finite())
            .unwrap_or(neutral);
        self.push_raw(encoded);
    }

    fn push_raw(&mut self, value: f64) {
        debug_assert!(self.cursor < self.slots.len(), "segment overflow");
        if let Some(slot) = self.slots.get_mut(self.cursor) {
            *slot = finite_or(value, 0.0);
        }
        self.cursor += 1;
    }
}

fn identity(value: f64) -> f64 {
    value
}

fn unit_interval(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn signed_unit(value: f64) -> f64 {
    value.clamp(-1.0, 1.0)
}

fn squash_ratio(value: f64) -> f64 {
    let value = value.max(0.0);
    value / (1.0 + value)
}

/// Relative distance of `price` from a reference level
fn relative_to(price: Option<f64>, level: Option<f64>) -> Option<f64> {
    match (price, level) {
        (Some(price), Some(level)) if level > 0.0 => Some(price / level - 1.0),
        _ => None,
    }
}

fn ratio_of(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(numerator), Some(denominator)) if denominator > 0.0 => Some(numerator / denominator),
        _ => None,
    }
}

/// A priced option position extracted from an options report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricedOption {
    pub contract: OptionContract,
    pub price: f64,
    pub greeks: Greeks,
}

#[derive(Debug, Clone)]
pub struct StateEncoder {
    risk_free_rate: f64,
    solver: IvSolver,
    strategies: StrategyAnalyzer,
}

impl Default for StateEncoder {
    fn default() -> Self {
        Self {
            risk_free_rate: RISK_FREE_RATE,
            solver: IvSolver::default(),
            strategies: StrategyAnalyzer::default(),
        }
    }
}

impl StateEncoder {
    pub fn new(config: &OptionsConfig) -> Self {
        Self {
            risk_free_rate: config.risk_free_rate,
            solver: IvSolver::from(config),
            strategies: StrategyAnalyzer::new(config.allowed_strategies.clone()),
        }
    }

    /// Name of every state slot, in layout order. Slots no feature writes to
    /// are named `<segment>_<slot>`.
    pub fn feature_names() -> Vec<String> {
        let mut names = Vec::with_capacity(STATE_DIM);
        for (segment, offset, len, features) in [
            ("technical", TECHNICAL_OFFSET, TECHNICAL_LEN, TECHNICAL_FEATURES),
            ("fundamental", FUNDAMENTAL_OFFSET, FUNDAMENTAL_LEN, FUNDAMENTAL_FEATURES),
            ("news", NEWS_OFFSET, NEWS_LEN, NEWS_FEATURES),
            ("social", SOCIAL_OFFSET, SOCIAL_LEN, SOCIAL_FEATURES),
            ("options", OPTIONS_OFFSET, OPTIONS_LEN, OPTIONS_FEATURES),
            ("meta", META_OFFSET, META_LEN, META_FEATURES),
            ("episode", EPISODE_OFFSET, EPISODE_LEN, EPISODE_FEATURES),
            ("reserved", RESERVED_OFFSET, STATE_DIM - RESERVED_OFFSET, NO_FEATURES),
        ] {
            debug_assert_eq!(names.len(), offset, "{segment} segment out of order");
            names.extend((0..len).map(|slot| match features.get(slot) {
                Some(name) => name.to_string(),
                None => format!("{segment}_{slot}"),
            }));
        }
        names
    }

    pub fn encode(&self, record: &AnalysisRecord) -> StateVector {
        let mut buffer = [0.0; STATE_DIM];

        encode_technical(&mut buffer, record.technical.as_ref());
        encode_fundamental(&mut buffer, record.fundamental.as_ref());
        encode_news(&mut buffer, record.news.as_ref());
        encode_social(&mut buffer, record.social.as_ref());

        let options_report = match record.trading_mode {
            TradingMode::Options => record.options.as_ref(),
            TradingMode::Stock => None,
        };
        self.encode_options(&mut buffer, options_report, record.technical.as_ref());

        let mut meta = Segment::new(&mut buffer, META_OFFSET, META_LEN);
        meta.push_raw(if record.trading_mode == TradingMode::Options { 1.0 } else { 0.0 });
        for present in [
            record.technical.is_some(),
            record.fundamental.is_some(),
            record.news.is_some(),
            record.social.is_some(),
            options_report.is_some(),
        ] {
            meta.push_raw(if present { 1.0 } else { 0.0 });
        }

        StateVector::from_array(buffer)
    }

    /// Resolves volatility for the report's contract and prices it.
    ///
    /// Volatility comes from the contract terms, then the report's implied
    /// volatility, then a solve against the observed market price.
    pub fn price_report(&self, report: &OptionsReport) -> Result<PricedOption> {
        let terms = report
            .contract
            .ok_or_else(|| EngineError::InvalidInput("options report has no contract".into()))?;
        let contract = OptionContract::new(
            terms.right,
            terms.underlying,
            terms.strike,
            terms.time_to_expiry,
            terms.risk_free_rate.unwrap_or(self.risk_free_rate),
            0.0,
        );

        let volatility = match terms.volatility.or(report.implied_volatility) {
            Some(volatility) => volatility,
            None => {
                let observed = report.market_price.ok_or_else(|| {
                    EngineError::InvalidInput(
                        "options report has neither a volatility nor a market price".into(),
                    )
                })?;
                self.solver.solve(&contract, observed)?
            }
        };

        let contract = contract.with_volatility(volatility);
        let (price, greeks) = price_and_greeks(&contract)?;
        Ok(PricedOption {
            contract,
            price,
            greeks,
        })
    }

    fn encode_options(
        &self,
        buffer: &mut [f64; STATE_DIM],
        report: Option<&OptionsReport>,
        technical: Option<&TechnicalReport>,
    ) {
        buffer[OPTIONS_OFFSET..OPTIONS_OFFSET + OPTIONS_LEN].copy_from_slice(&OPTIONS_NEUTRAL);
        let Some(report) = report else {
            return;
        };

        let priced = match self.price_report(report) {
            Ok(priced) => Some(priced),
            Err(error) => {
                debug!(%error, "option pricing failed, using neutral option features");
                None
            }
        };

        let chain = (!report.quotes.is_empty()).then(|| {
            let spot = report
                .contract
                .map(|terms| terms.underlying)
                .or(technical.and_then(|technical| technical.price))
                .unwrap_or_default();
            ChainSummary::from_quotes(&report.quotes, spot)
        });

        let strategy_bias = report.strategy.and_then(|strategy| {
            if self.strategies.is_allowed(strategy) {
                Some(strategy.bias())
            } else {
                debug!(%strategy, "strategy outside the configured whitelist, ignoring");
                None
            }
        });

        let put_call_ratio = report
            .put_call_ratio
            .or(chain.as_ref().map(|chain| chain.put_call_volume_ratio));

        let mut segment = Segment::new(buffer, OPTIONS_OFFSET, OPTIONS_LEN);
        let greeks = priced.map(|priced| priced.greeks);
        segment.push(greeks.map(|greeks| greeks.delta), 0.0, identity);
        segment.push(greeks.map(|greeks| greeks.gamma), 0.0, identity);
        segment.push(greeks.map(|greeks| greeks.theta), 0.0, identity);
        segment.push(greeks.map(|greeks| greeks.vega), 0.0, identity);
        segment.push(greeks.map(|greeks| greeks.rho), 0.0, identity);
        segment.push(priced.map(|priced| priced.contract.volatility), 0.0, identity);
        segment.push(put_call_ratio, NEUTRAL_RATIO, squash_ratio);
        segment.push(strategy_bias, 0.0, identity);

        let contract = priced.map(|priced| priced.contract);
        segment.push(
            contract.map(|contract| (contract.underlying / contract.strike).ln()),
            0.0,
            identity,
        );
        segment.push(contract.map(|contract| contract.time_to_expiry), 0.0, symlog);
        let mispricing = match (priced, report.market_price) {
            (Some(priced), Some(market)) if priced.price > 0.0 => Some(market / priced.price - 1.0),
            _ => None,
        };
        segment.push(mispricing, 0.0, symlog);

        let atm_iv = chain.as_ref().and_then(|chain| chain.atm_call_iv);
        segment.push(atm_iv, 0.0, identity);
        let historical = technical.and_then(|technical| technical.volatility);
        let iv_premium = chain
            .as_ref()
            .zip(historical)
            .and_then(|(chain, historical)| chain.iv_premium(historical));
        segment.push(iv_premium, 0.0, identity);
        segment.push(chain.as_ref().map(|chain| chain.put_call_oi_ratio), NEUTRAL_RATIO, squash_ratio);
        segment.push(
            chain.as_ref().map(|chain| match chain.sentiment {
                ChainSentiment::Bullish => 1.0,
                ChainSentiment::Neutral => 0.0,
                ChainSentiment::Bearish => -1.0,
            }),
            0.0,
            identity,
        );
    }
}

fn encode_technical(buffer: &mut [f64; STATE_DIM], report: Option<&TechnicalReport>) {
    let default = TechnicalReport::default();
    let report = report.unwrap_or(&default);
    let mut segment = Segment::new(buffer, TECHNICAL_OFFSET, TECHNICAL_LEN);

    segment.push(report.rsi, 0.5, |rsi| (rsi / 100.0).clamp(0.0, 1.0));
    segment.push(report.macd, 0.0, symlog);
    let histogram = report.macd.zip(report.macd_signal).map(|(macd, signal)| macd - signal);
    segment.push(histogram, 0.0, symlog);
    segment.push(relative_to(report.price, report.sma_50), 0.0, identity);
    segment.push(relative_to(report.price, report.sma_200), 0.0, identity);
    segment.push(relative_to(report.price, report.ema_10), 0.0, identity);
    segment.push(relative_to(report.sma_50, report.sma_200), 0.0, identity);
    segment.push(ratio_of(report.volume, report.average_volume), NEUTRAL_RATIO, squash_ratio);
    segment.push(report.volume, 0.0, |volume| symlog(volume.max(0.0)));
    segment.push(report.volatility, 0.0, |volatility| volatility.max(0.0));
    segment.push(ratio_of(report.atr, report.price), 0.0, identity);
    segment.push(report.bollinger_position, 0.5, unit_interval);
    segment.push(report.trend.map(|trend| trend.signal()), 0.0, identity);
}

fn encode_fundamental(buffer: &mut [f64; STATE_DIM], report: Option<&FundamentalReport>) {
    let default = FundamentalReport::default();
    let report = report.unwrap_or(&default);
    let mut segment = Segment::new(buffer, FUNDAMENTAL_OFFSET, FUNDAMENTAL_LEN);

    for multiple in [
        report.pe_ratio,
        report.forward_pe,
        report.peg_ratio,
        report.price_to_book,
        report.price_to_sales,
        report.debt_to_equity,
    ] {
        segment.push(multiple, 0.0, symlog);
    }
    segment.push(report.current_ratio, NEUTRAL_RATIO, squash_ratio);
    for fraction in [
        report.return_on_equity,
        report.profit_margin,
        report.revenue_growth,
        report.earnings_growth,
        report.dividend_yield,
        report.free_cash_flow_yield,
    ] {
        segment.push(fraction, 0.0, signed_unit);
    }
    segment.push(report.market_cap, 0.0, |cap| symlog(cap.max(0.0)));
    segment.push(report.beta, 0.0, identity);
    segment.push(report.analyst_rating, 0.0, signed_unit);
}

fn encode_news(buffer: &mut [f64; STATE_DIM], report: Option<&NewsReport>) {
    let default = NewsReport::default();
    let report = report.unwrap_or(&default);
    let mut segment = Segment::new(buffer, NEWS_OFFSET, NEWS_LEN);

    segment.push(report.sentiment, 0.0, signed_unit);
    segment.push(report.impact, 0.0, unit_interval);
    segment.push(report.article_count, 0.0, |count| symlog(count.max(0.0)));
    segment.push(report.positive_ratio, 0.5, unit_interval);
    segment.push(report.negative_ratio, 0.5, unit_interval);
}

fn encode_social(buffer: &mut [f64; STATE_DIM], report: Option<&SocialReport>) {
    let default = SocialReport::default();
    let report = report.unwrap_or(&default);
    let mut segment = Segment::new(buffer, SOCIAL_OFFSET, SOCIAL_LEN);

    segment.push(report.sentiment, 0.0, signed_unit);
    segment.push(report.strength, 0.0, unit_interval);
    segment.push(report.mention_count, 0.0, |count| symlog(count.max(0.0)));
    segment.push(report.bullish_ratio, 0.5, unit_interval);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptionRight, StrategyId};

    fn full_record() -> AnalysisRecord {
        AnalysisRecord {
            trading_mode: TradingMode::Options,
            technical: Some(TechnicalReport {
                price: Some(105.0),
                rsi: Some(70.0),
                macd: Some(1.2),
                macd_signal: Some(0.8),
                sma_50: Some(100.0),
                sma_200: Some(95.0),
                volatility: Some(0.25),
                trend: Some(Trend::Bullish),
                ..Default::default()
            }),
            fundamental: Some(FundamentalReport {
                pe_ratio: Some(30.0),
                current_ratio: Some(1.5),
                ..Default::default()
            }),
            news: Some(NewsReport {
                sentiment: Some(0.4),
                ..Default::default()
            }),
            social: Some(SocialReport {
                sentiment: Some(f64::NAN),
                strength: Some(0.7),
                ..Default::default()
            }),
            options: Some(OptionsReport {
                contract: Some(ContractTerms {
                    right: OptionRight::Call,
                    underlying: 105.0,
                    strike: 100.0,
                    time_to_expiry: 0.25,
                    risk_free_rate: None,
                    volatility: None,
                }),
                implied_volatility: Some(0.3),
                put_call_ratio: Some(0.8),
                strategy: Some(StrategyId::ProtectivePut),
                ..Default::default()
            }),
        }
    }

    fn assert_finite(state: &StateVector) {
        assert_eq!(state.len(), STATE_DIM);
        assert!(state.as_slice().iter().all(|value| value.is_finite()));
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = StateEncoder::default();
        let record = full_record();
        let first = encoder.encode(&record);
        let second = encoder.encode(&record);
        let bits = |state: &StateVector| state.as_slice().iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&first), bits(&second));
        assert_finite(&first);
    }

    #[test]
    fn test_missing_categories_take_neutral_defaults() {
        let encoder = StateEncoder::default();
        let state = encoder.encode(&AnalysisRecord::default());
        assert_finite(&state);

        let technical = state.segment(TECHNICAL_OFFSET, TECHNICAL_LEN);
        assert_eq!(technical[0], 0.5);
        assert_eq!(technical[7], NEUTRAL_RATIO);
        assert_eq!(technical[11], 0.5);
        assert!(technical[12..].iter().all(|v| *v == 0.0));

        assert_eq!(state.segment(OPTIONS_OFFSET, OPTIONS_LEN), &OPTIONS_NEUTRAL);
        assert!(state.segment(META_OFFSET, META_LEN).iter().all(|v| *v == 0.0));
        assert!(state.segment(EPISODE_OFFSET, EPISODE_LEN).iter().all(|v| *v == 0.0));
        assert!(state.as_slice()[RESERVED_OFFSET..].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_dropping_one_category_only_changes_its_segment() {
        let encoder = StateEncoder::default();
        let full = encoder.encode(&full_record());
        let mut record = full_record();
        record.news = None;
        let partial = encoder.encode(&record);

        assert_eq!(partial.segment(NEWS_OFFSET, NEWS_LEN), &[0.0, 0.0, 0.0, 0.5, 0.5, 0.0, 0.0, 0.0]);
        assert_eq!(partial.get(META_OFFSET + 3), Some(0.0));
        assert_eq!(
            full.segment(TECHNICAL_OFFSET, TECHNICAL_LEN),
            partial.segment(TECHNICAL_OFFSET, TECHNICAL_LEN)
        );
    }

    #[test]
    fn test_option_features_follow_pricing_engine() {
        let encoder = StateEncoder::default();
        let record = full_record();
        let state = encoder.encode(&record);
        let priced = encoder.price_report(record.options.as_ref().unwrap()).unwrap();

        let options = state.segment(OPTIONS_OFFSET, OPTIONS_LEN);
        assert_eq!(options[0], priced.greeks.delta);
        assert_eq!(options[2], priced.greeks.theta);
        assert_eq!(options[5], 0.3);
        assert_eq!(options[6], 0.8 / (1.0 + 0.8));
        assert_eq!(options[7], 0.8);
        assert_eq!(state.get(META_OFFSET), Some(1.0));
        // NaN social sentiment falls back
        assert_eq!(state.get(SOCIAL_OFFSET), Some(0.0));
        assert_eq!(state.get(SOCIAL_OFFSET + 1), Some(0.7));
    }

    #[test]
    fn test_feature_names_cover_the_layout() {
        let names = StateEncoder::feature_names();
        assert_eq!(names.len(), STATE_DIM);
        assert_eq!(names.iter().collect::<hashbrown::HashSet<_>>().len(), STATE_DIM);

        let index = |name: &str| names.iter().position(|candidate| candidate == name).unwrap();
        assert_eq!(index("rsi"), TECHNICAL_OFFSET);
        assert_eq!(index("pe_ratio"), FUNDAMENTAL_OFFSET);
        assert_eq!(index("news_sentiment"), NEWS_OFFSET);
        assert_eq!(index("delta"), OPTIONS_OFFSET);
        assert_eq!(index("is_options_mode"), META_OFFSET);
        assert_eq!(index("position_direction"), EPISODE_OFFSET);
        assert_eq!(index("reserved_0"), RESERVED_OFFSET);
        assert_eq!(names[TECHNICAL_OFFSET + 13], "technical_13");

        let state = StateEncoder::default().encode(&full_record());
        assert_eq!(state.get(index("social_strength")), Some(0.7));
        assert_eq!(state.get(index("put_call_ratio")), Some(0.8 / (1.0 + 0.8)));
    }

    #[test]
    fn test_stock_mode_ignores_options_report() {
        let encoder = StateEncoder::default();
        let mut record = full_record();
        record.trading_mode = TradingMode::Stock;
        let state = encoder.encode(&record);
        assert_eq!(state.segment(OPTIONS_OFFSET, OPTIONS_LEN), &OPTIONS_NEUTRAL);
        assert_eq!(state.get(META_OFFSET), Some(0.0));
    }

    #[test]
    fn test_pricing_failure_falls_back() {
        let encoder = StateEncoder::default();
        let mut record = full_record();
        if let Some(options) = record.options.as_mut() {
            options.contract = options.contract.map(|terms| ContractTerms {
                time_to_expiry: 0.0,
                ..terms
            });
            options.put_call_ratio = None;
            options.strategy = None;
        }
        let state = encoder.encode(&record);
        assert_eq!(state.segment(OPTIONS_OFFSET, OPTIONS_LEN), &OPTIONS_NEUTRAL);
    }
}
