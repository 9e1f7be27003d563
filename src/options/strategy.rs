use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    LongCall,
    LongPut,
    BullCallSpread,
    BearCallSpread,
    BullPutSpread,
    BearPutSpread,
    Straddle,
    Strangle,
    IronCondor,
    CoveredCall,
    ProtectivePut,
}

impl StrategyId {
    pub const ALL: [StrategyId; 11] = [
        StrategyId::LongCall,
        StrategyId::LongPut,
        StrategyId::BullCallSpread,
        StrategyId::BearCallSpread,
        StrategyId::BullPutSpread,
        StrategyId::BearPutSpread,
        StrategyId::Straddle,
        StrategyId::Strangle,
        StrategyId::IronCondor,
        StrategyId::CoveredCall,
        StrategyId::ProtectivePut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::LongCall => "long_call",
            StrategyId::LongPut => "long_put",
            StrategyId::BullCallSpread => "bull_call_spread",
            StrategyId::BearCallSpread => "bear_call_spread",
            StrategyId::BullPutSpread => "bull_put_spread",
            StrategyId::BearPutSpread => "bear_put_spread",
            StrategyId::Straddle => "straddle",
            StrategyId::Strangle => "strangle",
            StrategyId::IronCondor => "iron_condor",
            StrategyId::CoveredCall => "covered_call",
            StrategyId::ProtectivePut => "protective_put",
        }
    }

    /// Directional code written into the state vector, -1 bearish to +1 bullish
    pub fn bias(&self) -> f64 {
        match self {
            StrategyId::LongCall | StrategyId::BullCallSpread | StrategyId::BullPutSpread => 1.0,
            StrategyId::LongPut | StrategyId::BearCallSpread | StrategyId::BearPutSpread => -1.0,
            StrategyId::CoveredCall => 0.5,
            StrategyId::ProtectivePut => 0.8,
            StrategyId::Straddle | StrategyId::Strangle | StrategyId::IronCondor => 0.0,
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        StrategyId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| EngineError::UnsupportedStrategy(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LegRight {
    Call,
    Put,
    /// Shares of the underlying; `strike` holds the entry price
    Underlying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

/// One leg of a strategy, priced per unit of underlying
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub right: LegRight,
    pub side: Side,
    pub strike: f64,
    pub premium: f64,
}

impl OptionLeg {
    pub fn new(right: LegRight, side: Side, strike: f64, premium: f64) -> Self {
        Self {
            right,
            side,
            strike,
            premium,
        }
    }

    /// Profit of this leg alone when held to expiry at `spot`
    pub fn expiry_payoff(&self, spot: f64) -> f64 {
        let value = match self.right {
            LegRight::Call => (spot - self.strike).max(0.0) - self.premium,
            LegRight::Put => (self.strike - spot).max(0.0) - self.premium,
            LegRight::Underlying => spot - self.strike,
        };
        self.side.sign() * value
    }
}

impl FromStr for OptionLeg {
    type Err = EngineError;

    /// Parses `right:side:strike:premium`, e.g. `call:long:100:2.5`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        let [right, side, strike, premium] = parts.as_slice() else {
            return Err(EngineError::InvalidInput(format!(
                "leg `{s}` should look like right:side:strike:premium"
            )));
        };

        let right = match right.to_ascii_lowercase().as_str() {
            "call" | "c" => LegRight::Call,
            "put" | "p" => LegRight::Put,
            "stock" | "underlying" | "s" => LegRight::Underlying,
            other => return Err(EngineError::InvalidInput(format!("unknown leg right `{other}`"))),
        };
        let side = match side.to_ascii_lowercase().as_str() {
            "long" | "buy" => Side::Long,
            "short" | "sell" => Side::Short,
            other => return Err(EngineError::InvalidInput(format!("unknown leg side `{other}`"))),
        };
        let parse = |name: &str, value: &str| {
            value
                .parse::<f64>()
                .map_err(|_| EngineError::InvalidInput(format!("leg {name} `{value}` is not a number")))
        };

        Ok(OptionLeg::new(right, side, parse("strike", strike)?, parse("premium", premium)?))
    }
}

/// Sum of every leg's expiry payoff
pub fn expiry_payoff(legs: &[OptionLeg], spot: f64) -> f64 {
    legs.iter().map(|leg| leg.expiry_payoff(spot)).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAnalysis {
    pub strategy: StrategyId,
    /// `None` when the profit is unbounded
    pub max_profit: Option<f64>,
    /// `None` when the loss is unbounded
    pub max_loss: Option<f64>,
    pub breakevens: Vec<f64>,
}

/// Legs grouped by right and side, each group ordered by strike
struct LegBook<'a> {
    legs: &'a [OptionLeg],
}

impl<'a> LegBook<'a> {
    fn new(legs: &'a [OptionLeg]) -> Result<Self> {
        for leg in legs {
            if !leg.strike.is_finite() || leg.strike <= 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "leg strike must be positive, got {}",
                    leg.strike
                )));
            }
            if !leg.premium.is_finite() || leg.premium < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "leg premium must be non-negative, got {}",
                    leg.premium
                )));
            }
        }
        Ok(Self { legs })
    }

    fn take(&self, right: LegRight, side: Side) -> Vec<OptionLeg> {
        let mut found: Vec<OptionLeg> = self
            .legs
            .iter()
            .filter(|leg| leg.right == right && leg.side == side)
            .copied()
            .collect();
        found.sort_by(|a, b| a.strike.total_cmp(&b.strike));
        found
    }

    /// Checks the leg set is exactly `shape`, returning the matched legs in shape order
    fn shaped(&self, strategy: StrategyId, shape: &[(LegRight, Side)]) -> Result<Vec<OptionLeg>> {
        let mismatch = || {
            EngineError::InvalidInput(format!(
                "{strategy} expects {} legs {:?}, got {:?}",
                shape.len(),
                shape,
                self.legs.iter().map(|leg| (leg.right, leg.side)).collect::<Vec<_>>()
            ))
        };

        if self.legs.len() != shape.len() {
            return Err(mismatch());
        }

        let mut matched = Vec::with_capacity(shape.len());
        for (index, (right, side)) in shape.iter().enumerate() {
            let group = self.take(*right, *side);
            // Repeated (right, side) pairs in a shape pick successive strikes
            let occurrence = shape[..index].iter().filter(|entry| **entry == (*right, *side)).count();
            let leg = group.get(occurrence).ok_or_else(mismatch)?;
            matched.push(*leg);
        }
        Ok(matched)
    }
}

fn require(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(EngineError::InvalidInput(message()))
    }
}

fn analysis(
    strategy: StrategyId,
    max_profit: Option<f64>,
    max_loss: Option<f64>,
    breakevens: Vec<f64>,
) -> StrategyAnalysis {
    StrategyAnalysis {
        strategy,
        max_profit,
        max_loss,
        breakevens,
    }
}

/// Closed-form payoff analysis. Every figure is per unit of underlying.
pub fn analyze_strategy(strategy: StrategyId, legs: &[OptionLeg]) -> Result<StrategyAnalysis> {
    use LegRight::{Call, Put, Underlying};
    use Side::{Long, Short};

    let book = LegBook::new(legs)?;

    let result = match strategy {
        StrategyId::LongCall => {
            let call = book.shaped(strategy, &[(Call, Long)])?[0];
            analysis(strategy, None, Some(call.premium), vec![call.strike + call.premium])
        }
        StrategyId::LongPut => {
            let put = book.shaped(strategy, &[(Put, Long)])?[0];
            analysis(
                strategy,
                Some(put.strike - put.premium),
                Some(put.premium),
                vec![put.strike - put.premium],
            )
        }
        StrategyId::BullCallSpread | StrategyId::BearPutSpread => {
            let right = if strategy == StrategyId::BullCallSpread { Call } else { Put };
            let (long, short) = vertical(&book, strategy, right)?;
            let (low, high) = if right == Call { (long, short) } else { (short, long) };
            require(low.strike < high.strike, || {
                format!("{strategy} buys the {} strike", if right == Call { "lower" } else { "higher" })
            })?;
            let debit = long.premium - short.premium;
            let width = high.strike - low.strike;
            let breakeven = if right == Call { long.strike + debit } else { long.strike - debit };
            analysis(strategy, Some(width - debit), Some(debit), vec![breakeven])
        }
        StrategyId::BearCallSpread | StrategyId::BullPutSpread => {
            let right = if strategy == StrategyId::BearCallSpread { Call } else { Put };
            let (long, short) = vertical(&book, strategy, right)?;
            let (low, high) = if right == Call { (short, long) } else { (long, short) };
            require(low.strike < high.strike, || {
                format!("{strategy} sells the {} strike", if right == Call { "lower" } else { "higher" })
            })?;
            let credit = short.premium - long.premium;
            let width = high.strike - low.strike;
            let breakeven = if right == Call { short.strike + credit } else { short.strike - credit };
            analysis(strategy, Some(credit), Some(width - credit), vec![breakeven])
        }
        StrategyId::Straddle => {
            let legs = book.shaped(strategy, &[(Call, Long), (Put, Long)])?;
            let (call, put) = (legs[0], legs[1]);
            require(call.strike == put.strike, || {
                format!("straddle legs share one strike, got {} and {}", put.strike, call.strike)
            })?;
            let total = call.premium + put.premium;
            analysis(strategy, None, Some(total), vec![put.strike - total, call.strike + total])
        }
        StrategyId::Strangle => {
            let legs = book.shaped(strategy, &[(Call, Long), (Put, Long)])?;
            let (call, put) = (legs[0], legs[1]);
            require(put.strike < call.strike, || {
                format!("strangle put strike {} must sit below call strike {}", put.strike, call.strike)
            })?;
            let total = call.premium + put.premium;
            analysis(strategy, None, Some(total), vec![put.strike - total, call.strike + total])
        }
        StrategyId::IronCondor => {
            let legs = book.shaped(
                strategy,
                &[(Put, Long), (Put, Short), (Call, Short), (Call, Long)],
            )?;
            let (put_long, put_short, call_short, call_long) = (legs[0], legs[1], legs[2], legs[3]);
            require(
                put_long.strike < put_short.strike
                    && put_short.strike <= call_short.strike
                    && call_short.strike < call_long.strike,
                || "iron condor strikes must be ordered long put < short put <= short call < long call".into(),
            )?;
            let credit =
                put_short.premium + call_short.premium - put_long.premium - call_long.premium;
            let widest = (put_short.strike - put_long.strike).max(call_long.strike - call_short.strike);
            analysis(
                strategy,
                Some(credit),
                Some(widest - credit),
                vec![put_short.strike - credit, call_short.strike + credit],
            )
        }
        StrategyId::CoveredCall => {
            let legs = book.shaped(strategy, &[(Underlying, Long), (Call, Short)])?;
            let (shares, call) = (legs[0], legs[1]);
            let entry = shares.strike;
            analysis(
                strategy,
                Some(call.strike - entry + call.premium),
                Some(entry - call.premium),
                vec![entry - call.premium],
            )
        }
        StrategyId::ProtectivePut => {
            let legs = book.shaped(strategy, &[(Underlying, Long), (Put, Long)])?;
            let (shares, put) = (legs[0], legs[1]);
            let entry = shares.strike;
            analysis(
                strategy,
                None,
                Some(entry - put.strike + put.premium),
                vec![entry + put.premium],
            )
        }
    };

    Ok(result)
}

/// Returns the (long, short) legs of a two-leg vertical
fn vertical(book: &LegBook, strategy: StrategyId, right: LegRight) -> Result<(OptionLeg, OptionLeg)> {
    let legs = book.shaped(strategy, &[(right, Side::Long), (right, Side::Short)])?;
    Ok((legs[0], legs[1]))
}

/// Restricts analysis to a configured whitelist of strategies
#[derive(Debug, Clone)]
pub struct StrategyAnalyzer {
    allowed: Vec<StrategyId>,
}

impl Default for StrategyAnalyzer {
    fn default() -> Self {
        Self {
            allowed: StrategyId::ALL.to_vec(),
        }
    }
}

impl StrategyAnalyzer {
    pub fn new(allowed: Vec<StrategyId>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, strategy: StrategyId) -> bool {
        self.allowed.contains(&strategy)
    }

    /// Resolves a strategy identifier against the whitelist
    pub fn resolve(&self, strategy_id: &str) -> Result<StrategyId> {
        let strategy: StrategyId = strategy_id.parse()?;
        if !self.is_allowed(strategy) {
            return Err(EngineError::UnsupportedStrategy(strategy_id.to_string()));
        }
        Ok(strategy)
    }

    pub fn analyze(&self, strategy_id: &str, legs: &[OptionLeg]) -> Result<StrategyAnalysis> {
        analyze_strategy(self.resolve(strategy_id)?, legs)
    }
}
